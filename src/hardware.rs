// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains the hardware abstraction of the exoskeleton and a simulated
//! stand-in used by the demo programs and tests.
use crate::control_types::Torques;
use crate::exo::meii::N_RJ;
use crate::MeiiResult;
use std::time::Duration;

/// One sample of the joint sensors.
#[derive(Debug, Copy, Clone, Default)]
pub struct JointReadings {
    /// Robot-joint positions \[rad, rad, m ×3\].
    pub positions: [f64; N_RJ],
    /// Robot-joint velocities \[rad/s, rad/s, m/s ×3\].
    pub velocities: [f64; N_RJ],
}

/// Boundary between the control core and the amplifier/DAQ stack.
///
/// The control loop calls [`read_inputs`](`HardwareInterface::read_inputs`)
/// and [`write_outputs`](`HardwareInterface::write_outputs`) exactly once per
/// cycle and kicks the watchdog after every write.
#[cfg_attr(test, mockall::automock)]
pub trait HardwareInterface {
    /// Enables the amplifiers.
    fn enable(&mut self) -> MeiiResult<()>;
    /// Disables the amplifiers. Must be safe to call repeatedly.
    fn disable(&mut self) -> MeiiResult<()>;
    /// Samples all joint sensors.
    fn read_inputs(&mut self) -> MeiiResult<JointReadings>;
    /// Applies the torque command to the actuators.
    fn write_outputs(&mut self, torques: &Torques) -> MeiiResult<()>;
    /// Pets the hardware watchdog, false when the watchdog has tripped.
    fn kick_watchdog(&mut self) -> bool;
}

/// Simulated device: one double integrator with viscous friction per joint.
///
/// The plant steps once per [`write_outputs`](`HardwareInterface::write_outputs`)
/// call by the configured period, so simulated time advances exactly with the
/// control cycle.
pub struct VirtualMeii {
    positions: [f64; N_RJ],
    velocities: [f64; N_RJ],
    inertia: [f64; N_RJ],
    damping: [f64; N_RJ],
    period: Duration,
    enabled: bool,
}

impl VirtualMeii {
    /// Creates a plant at rest in the given configuration.
    pub fn new(initial_positions: [f64; N_RJ], period: Duration) -> Self {
        VirtualMeii {
            positions: initial_positions,
            velocities: [0.; N_RJ],
            inertia: [1.0, 0.3, 5.0, 5.0, 5.0],
            damping: [5.0, 2.0, 50.0, 50.0, 50.0],
            period,
            enabled: false,
        }
    }
    /// Current simulated positions.
    pub fn positions(&self) -> &[f64; N_RJ] {
        &self.positions
    }
}

impl HardwareInterface for VirtualMeii {
    fn enable(&mut self) -> MeiiResult<()> {
        self.enabled = true;
        Ok(())
    }
    fn disable(&mut self) -> MeiiResult<()> {
        self.enabled = false;
        Ok(())
    }
    fn read_inputs(&mut self) -> MeiiResult<JointReadings> {
        Ok(JointReadings {
            positions: self.positions,
            velocities: self.velocities,
        })
    }
    fn write_outputs(&mut self, torques: &Torques) -> MeiiResult<()> {
        let dt = self.period.as_secs_f64();
        for joint in 0..N_RJ {
            let tau = if self.enabled { torques.tau[joint] } else { 0. };
            let acceleration =
                (tau - self.damping[joint] * self.velocities[joint]) / self.inertia[joint];
            // symplectic Euler keeps the PD-driven plant stable at 1 kHz
            self.velocities[joint] += acceleration * dt;
            self.positions[joint] += self.velocities[joint] * dt;
        }
        Ok(())
    }
    fn kick_watchdog(&mut self) -> bool {
        true
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn plant_holds_still_without_torque() {
        let mut plant = VirtualMeii::new([0.1; 5], Duration::from_millis(1));
        plant.enable().unwrap();
        for _ in 0..100 {
            plant.write_outputs(&Torques::zero()).unwrap();
        }
        let readings = plant.read_inputs().unwrap();
        assert_eq!(readings.positions, [0.1; 5]);
        assert_eq!(readings.velocities, [0.; 5]);
    }

    #[test]
    fn constant_force_moves_a_joint() {
        let mut plant = VirtualMeii::new([0.; 5], Duration::from_millis(1));
        plant.enable().unwrap();
        let mut command = Torques::zero();
        command.tau[2] = 10.;
        for _ in 0..1000 {
            plant.write_outputs(&command).unwrap();
        }
        let readings = plant.read_inputs().unwrap();
        assert!(readings.positions[2] > 0.01);
        assert_eq!(readings.positions[0], 0.);
    }

    #[test]
    fn disabled_plant_ignores_torques() {
        let mut plant = VirtualMeii::new([0.; 5], Duration::from_millis(1));
        let mut command = Torques::zero();
        command.tau[0] = 5.;
        for _ in 0..100 {
            plant.write_outputs(&command).unwrap();
        }
        assert_eq!(plant.positions()[0], 0.);
    }
}
