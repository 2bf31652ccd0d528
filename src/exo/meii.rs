// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains the exoskeleton control object.
use crate::exception::MeiiException;
use crate::exo::config::MeiiParameters;
use crate::exo::exo_state::MeiiState;
use crate::exo::rps_kinematics::{RpsKinematics, RpsSolution, SELECT_Q_SER};
use crate::exo::smooth_reference::SmoothReferenceTrajectory;
use crate::hardware::JointReadings;
use crate::utils::{saturate, Vector3};
use crate::MeiiResult;
use log::warn;
use std::time::Duration;

/// Number of anatomical joints.
pub const N_AJ: usize = 5;
/// Number of robot joints.
pub const N_RJ: usize = 5;
/// Number of generalized coordinates of the wrist mechanism.
pub const N_QP: usize = 12;
/// Number of driving coordinates of the wrist mechanism.
pub const N_QS: usize = 3;

/// Control space of the three wrist actuators.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum RpsControlMode {
    /// PD control on the prismatic joints directly.
    RobotJointSpace,
    /// PD control on the wrist angles, the platform height left backdrivable.
    AnatomicalBackdriveHeight,
    /// PD control on wrist angles and platform height.
    AnatomicalActiveHeight,
}

/// The exoskeleton control object.
///
/// Owns the device parameters, the kinematics solver and the per-cycle state.
/// [`update_kinematics`](`MahiExoII::update_kinematics`) must be called with
/// fresh sensor readings before any torque setter or goal check each cycle.
pub struct MahiExoII {
    params: MeiiParameters,
    kinematics: RpsKinematics,
    rps_control_mode: RpsControlMode,
    rps_backdrive: bool,
    elbow_backdrive: bool,
    forearm_backdrive: bool,
    rps_init_pos: [f64; N_QS],
    joint_positions: [f64; N_RJ],
    joint_velocities: [f64; N_RJ],
    commanded_torques: [f64; N_RJ],
    anatomical_joint_positions: [f64; N_AJ],
    anatomical_joint_velocities: [f64; N_AJ],
    solution: Option<RpsSolution>,
}

impl MahiExoII {
    /// Creates the control object.
    pub fn new(params: MeiiParameters) -> Self {
        let kinematics = RpsKinematics::new(params.geometry);
        let rps_init_pos = params.rps_init_pos;
        MahiExoII {
            params,
            kinematics,
            rps_control_mode: RpsControlMode::RobotJointSpace,
            rps_backdrive: false,
            elbow_backdrive: false,
            forearm_backdrive: false,
            rps_init_pos,
            joint_positions: [0.; N_RJ],
            joint_velocities: [0.; N_RJ],
            commanded_torques: [0.; N_RJ],
            anatomical_joint_positions: [0.; N_AJ],
            anatomical_joint_velocities: [0.; N_AJ],
            solution: None,
        }
    }

    /// Updates the kinematic state from fresh sensor readings.
    ///
    /// The elbow and forearm pass through unchanged; the wrist coordinates
    /// come from the forward solve of the RPS mechanism.
    ///
    /// # Errors
    /// * KinematicsException if the solver does not converge. The cycle must
    /// then not command torques derived from the kinematic state.
    pub fn update_kinematics(&mut self, readings: &JointReadings) -> MeiiResult<()> {
        self.joint_positions = readings.positions;
        self.joint_velocities = readings.velocities;
        let q_par = Vector3::new(
            readings.positions[2],
            readings.positions[3],
            readings.positions[4],
        );
        let solution = match self.kinematics.forward(&q_par) {
            Ok(solution) => solution,
            Err(error) => {
                warn!("wrist kinematics solve failed: {}", error);
                self.solution = None;
                return Err(error);
            }
        };
        let q_par_dot = Vector3::new(
            readings.velocities[2],
            readings.velocities[3],
            readings.velocities[4],
        );
        let q_ser_dot = solution.output_velocity(&q_par_dot);
        self.anatomical_joint_positions = [
            readings.positions[0],
            readings.positions[1],
            solution.qs_out[0],
            solution.qs_out[1],
            solution.qs_out[2],
        ];
        self.anatomical_joint_velocities = [
            readings.velocities[0],
            readings.velocities[1],
            q_ser_dot[0],
            q_ser_dot[1],
            q_ser_dot[2],
        ];
        self.solution = Some(solution);
        Ok(())
    }

    /// Snapshot of the current cycle for telemetry.
    pub fn state(&self, time: Duration) -> MeiiState {
        MeiiState {
            time,
            joint_positions: self.joint_positions,
            joint_velocities: self.joint_velocities,
            commanded_torques: self.commanded_torques,
            anatomical_joint_positions: self.anatomical_joint_positions,
            anatomical_joint_velocities: self.anatomical_joint_velocities,
        }
    }

    /// Selects the control space of the wrist actuators.
    pub fn set_rps_control_mode(&mut self, mode: RpsControlMode) {
        self.rps_control_mode = mode;
    }
    /// Current control space of the wrist actuators.
    pub fn rps_control_mode(&self) -> RpsControlMode {
        self.rps_control_mode
    }
    /// Makes the wrist actuators passive.
    pub fn set_rps_backdrive(&mut self, backdrive: bool) {
        self.rps_backdrive = backdrive;
    }
    /// Makes the elbow actuator passive.
    pub fn set_elbow_backdrive(&mut self, backdrive: bool) {
        self.elbow_backdrive = backdrive;
    }
    /// Makes the forearm actuator passive.
    pub fn set_forearm_backdrive(&mut self, backdrive: bool) {
        self.forearm_backdrive = backdrive;
    }

    /// Sets the prismatic target of the initialization routine.
    ///
    /// # Errors
    /// * ConfigException if a target lies outside the prismatic joint range.
    pub fn set_rps_init_pos(&mut self, pos: [f64; N_QS]) -> MeiiResult<()> {
        for leg in 0..N_QS {
            if pos[leg] < self.params.pos_limits_min[2 + leg]
                || pos[leg] > self.params.pos_limits_max[2 + leg]
            {
                return Err(MeiiException::ConfigException {
                    message: format!(
                        "libmeii-rs: RPS initialization position {} is outside the prismatic joint range",
                        pos[leg]
                    ),
                });
            }
        }
        self.rps_init_pos = pos;
        Ok(())
    }
    /// The prismatic target of the initialization routine.
    pub fn rps_init_pos(&self) -> &[f64; N_QS] {
        &self.rps_init_pos
    }

    /// Commands all robot joints directly.
    pub fn set_joint_torques(&mut self, tau: [f64; N_RJ]) {
        self.commanded_torques = tau;
    }

    /// Commands the prismatic actuators directly.
    pub fn set_rps_par_torques(&mut self, tau_par: [f64; N_QS]) {
        for leg in 0..N_QS {
            self.commanded_torques[2 + leg] = tau_par[leg];
        }
    }

    /// Commands wrist torques `[α β z]`, mapped to prismatic forces by the
    /// static duality. The height component is discarded in
    /// [`RpsControlMode::AnatomicalBackdriveHeight`].
    ///
    /// # Errors
    /// * ControlException if no kinematic solution is available.
    /// * KinematicsException if the sensitivity solve fails.
    pub fn set_rps_ser_torques(&mut self, tau_ser: [f64; N_QS]) -> MeiiResult<()> {
        let solution = self.solution.as_ref().ok_or_else(|| {
            MeiiException::ControlException {
                log: None,
                error: "libmeii-rs: torques commanded without a kinematic update".to_string(),
            }
        })?;
        let height_torque = match self.rps_control_mode {
            RpsControlMode::AnatomicalBackdriveHeight => 0.,
            _ => tau_ser[2],
        };
        let tau_b = Vector3::new(tau_ser[0], tau_ser[1], height_torque);
        let (tau_par, _) =
            self.kinematics
                .solve_static_rps_torques(SELECT_Q_SER, &tau_b, &solution.qp)?;
        self.set_rps_par_torques([tau_par[0], tau_par[1], tau_par[2]]);
        Ok(())
    }

    /// Commands anatomical torques, the wrist part mapped through the static
    /// duality.
    ///
    /// # Errors
    /// * ControlException if no kinematic solution is available.
    /// * KinematicsException if the sensitivity solve fails.
    pub fn set_anatomical_joint_torques(&mut self, tau_aj: [f64; N_AJ]) -> MeiiResult<()> {
        self.commanded_torques[0] = tau_aj[0];
        self.commanded_torques[1] = tau_aj[1];
        self.set_rps_ser_torques([tau_aj[2], tau_aj[3], tau_aj[4]])
    }

    /// PD position control of the wrist actuators against a ramped reference.
    ///
    /// The reference is interpreted in the space selected by the control
    /// mode: prismatic positions in
    /// [`RpsControlMode::RobotJointSpace`], wrist coordinates `[α β z]`
    /// otherwise. Returns the commanded torques before mapping.
    ///
    /// # Errors
    /// * TrajectoryException if the reference generator was not started.
    pub fn set_rps_pos_ctrl_torques(
        &mut self,
        reference: &mut SmoothReferenceTrajectory<N_QS>,
        time: Duration,
    ) -> MeiiResult<[f64; N_QS]> {
        let mut tau = [0.; N_QS];
        match self.rps_control_mode {
            RpsControlMode::RobotJointSpace => {
                for leg in 0..N_QS {
                    let ref_pos = Self::smooth_ref(reference, leg, time)?;
                    if !self.rps_backdrive {
                        tau[leg] = self.params.robot_joint_pd[2 + leg].calculate(
                            ref_pos,
                            self.joint_positions[2 + leg],
                            0.,
                            self.joint_velocities[2 + leg],
                        );
                    }
                }
                self.set_rps_par_torques(tau);
            }
            _ => {
                for dof in 0..N_QS {
                    let ref_pos = Self::smooth_ref(reference, dof, time)?;
                    if !self.rps_backdrive {
                        tau[dof] = self.params.anatomical_joint_pd[2 + dof].calculate(
                            ref_pos,
                            self.anatomical_joint_positions[2 + dof],
                            0.,
                            self.anatomical_joint_velocities[2 + dof],
                        );
                    }
                }
                self.set_rps_ser_torques(tau)?;
            }
        }
        Ok(tau)
    }

    /// PD position control of all anatomical joints against a ramped
    /// reference, saturated into the anatomical workspace. Returns the
    /// commanded anatomical torques before mapping.
    ///
    /// # Errors
    /// * TrajectoryException if the reference generator was not started.
    /// * KinematicsException if the wrist torque mapping fails.
    pub fn set_anat_pos_ctrl_torques(
        &mut self,
        reference: &mut SmoothReferenceTrajectory<N_AJ>,
        time: Duration,
    ) -> MeiiResult<[f64; N_AJ]> {
        let mut tau = [0.; N_AJ];
        for dof in 0..N_AJ {
            let ref_pos = saturate(
                Self::smooth_ref(reference, dof, time)?,
                self.params.anat_pos_min[dof],
                self.params.anat_pos_max[dof],
            );
            let backdriven = match dof {
                0 => self.elbow_backdrive,
                1 => self.forearm_backdrive,
                _ => self.rps_backdrive,
            };
            if !backdriven {
                tau[dof] = self.params.anatomical_joint_pd[dof].calculate(
                    ref_pos,
                    self.anatomical_joint_positions[dof],
                    0.,
                    self.anatomical_joint_velocities[dof],
                );
            }
        }
        self.commanded_torques[0] = tau[0];
        self.commanded_torques[1] = tau[1];
        self.set_rps_ser_torques([tau[2], tau[3], tau[4]])?;
        Ok(tau)
    }

    fn smooth_ref<const N: usize>(
        reference: &SmoothReferenceTrajectory<N>,
        dof: usize,
        time: Duration,
    ) -> MeiiResult<f64> {
        reference.calculate_smooth_ref(dof, time).ok_or_else(|| {
            MeiiException::TrajectoryException {
                message: "libmeii-rs: reference generator used before being started".to_string(),
            }
        })
    }

    /// Whether all prismatic joints reached the initialization target.
    pub fn check_rps_init(&self) -> bool {
        let tol = [self.params.rps_init_err_tol; N_QS];
        check_goal_pos(
            &self.rps_init_pos,
            &self.joint_positions[2..],
            &[true; N_QS],
            &tol,
        )
    }

    /// Whether the prismatic joints reached a parallel-space goal.
    pub fn check_goal_rps_par_pos(&self, goal: [f64; N_QS], check_dof: [bool; N_QS]) -> bool {
        check_goal_pos(
            &goal,
            &self.joint_positions[2..],
            &check_dof,
            &self.params.rps_par_goal_err_tol,
        )
    }

    /// Whether the wrist coordinates reached a serial-space goal.
    pub fn check_goal_rps_ser_pos(&self, goal: [f64; N_QS], check_dof: [bool; N_QS]) -> bool {
        check_goal_pos(
            &goal,
            &self.anatomical_joint_positions[2..],
            &check_dof,
            &self.params.rps_ser_goal_err_tol,
        )
    }

    /// Whether the anatomical joints reached a goal posture.
    pub fn check_goal_anat_pos(&self, goal: [f64; N_AJ], check_dof: [bool; N_AJ]) -> bool {
        check_goal_pos(
            &goal,
            &self.anatomical_joint_positions,
            &check_dof,
            &self.params.anat_goal_err_tol,
        )
    }

    /// Whether the anatomical joints settled on the neutral posture, with the
    /// tighter tolerance.
    pub fn check_neutral_anat_pos(&self, goal: [f64; N_AJ], check_dof: [bool; N_AJ]) -> bool {
        check_goal_pos(
            &goal,
            &self.anatomical_joint_positions,
            &check_dof,
            &self.params.anat_neutral_err_tol,
        )
    }

    /// Checks every robot joint against its position, velocity and torque
    /// bounds. Returns the first violation found.
    pub fn any_limit_exceeded(&self) -> Option<MeiiException> {
        for joint in 0..N_RJ {
            let position = self.joint_positions[joint];
            if position < self.params.pos_limits_min[joint] {
                return Some(MeiiException::LimitException {
                    joint,
                    limit: "position",
                    value: position,
                    bound: self.params.pos_limits_min[joint],
                });
            }
            if position > self.params.pos_limits_max[joint] {
                return Some(MeiiException::LimitException {
                    joint,
                    limit: "position",
                    value: position,
                    bound: self.params.pos_limits_max[joint],
                });
            }
            let velocity = self.joint_velocities[joint];
            if velocity.abs() > self.params.velocity_limits[joint] {
                return Some(MeiiException::LimitException {
                    joint,
                    limit: "velocity",
                    value: velocity,
                    bound: self.params.velocity_limits[joint],
                });
            }
            let torque = self.commanded_torques[joint];
            if torque.abs() > self.params.torque_limits[joint] {
                return Some(MeiiException::LimitException {
                    joint,
                    limit: "torque",
                    value: torque,
                    bound: self.params.torque_limits[joint],
                });
            }
        }
        None
    }

    /// The device parameters.
    pub fn params(&self) -> &MeiiParameters {
        &self.params
    }
    /// Measured robot-joint positions.
    pub fn joint_positions(&self) -> &[f64; N_RJ] {
        &self.joint_positions
    }
    /// Measured robot-joint velocities.
    pub fn joint_velocities(&self) -> &[f64; N_RJ] {
        &self.joint_velocities
    }
    /// Last commanded robot-joint torques.
    pub fn commanded_torques(&self) -> &[f64; N_RJ] {
        &self.commanded_torques
    }
    /// Anatomical positions from the last kinematic update.
    pub fn anatomical_joint_positions(&self) -> &[f64; N_AJ] {
        &self.anatomical_joint_positions
    }
    /// Anatomical velocities from the last kinematic update.
    pub fn anatomical_joint_velocities(&self) -> &[f64; N_AJ] {
        &self.anatomical_joint_velocities
    }
    /// Prismatic positions of the wrist mechanism.
    pub fn wrist_parallel_positions(&self) -> [f64; N_QS] {
        [
            self.joint_positions[2],
            self.joint_positions[3],
            self.joint_positions[4],
        ]
    }
    /// Wrist coordinates `[α β z]` of the wrist mechanism.
    pub fn wrist_serial_positions(&self) -> [f64; N_QS] {
        [
            self.anatomical_joint_positions[2],
            self.anatomical_joint_positions[3],
            self.anatomical_joint_positions[4],
        ]
    }
}

fn check_goal_pos(goal: &[f64], current: &[f64], check_dof: &[bool], tol: &[f64]) -> bool {
    goal.iter()
        .zip(current.iter())
        .zip(check_dof.iter().zip(tol.iter()))
        .all(|((goal, current), (check, tol))| !check || (goal - current).abs() < *tol)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::exo::config::MeiiParameters;
    use crate::hardware::JointReadings;

    fn exo_at_rest() -> MahiExoII {
        let params = MeiiParameters::default();
        let readings = JointReadings {
            positions: params.rest_positions,
            velocities: [0.; N_RJ],
        };
        let mut exo = MahiExoII::new(params);
        exo.update_kinematics(&readings).unwrap();
        exo
    }

    #[test]
    fn kinematic_update_fills_the_anatomical_state() {
        let exo = exo_at_rest();
        let anatomical = exo.anatomical_joint_positions();
        // symmetric legs keep the platform level
        assert!(anatomical[2].abs() < 1e-9);
        assert!(anatomical[3].abs() < 1e-9);
        assert!(anatomical[4] > 0.07 && anatomical[4] < 0.09);
        assert_eq!(anatomical[0], exo.joint_positions()[0]);
    }

    #[test]
    fn backdriven_wrist_commands_zero_torque() {
        let mut exo = exo_at_rest();
        exo.set_rps_backdrive(true);
        let mut reference = SmoothReferenceTrajectory::with_ref([0.015; N_QS], [0.12; N_QS]);
        reference.start(exo.wrist_parallel_positions(), Duration::ZERO);
        let tau = exo
            .set_rps_pos_ctrl_torques(&mut reference, Duration::from_secs(1))
            .unwrap();
        assert_eq!(tau, [0.; N_QS]);
        assert_eq!(&exo.commanded_torques()[2..], &[0.; N_QS]);
    }

    #[test]
    fn rps_position_control_pushes_towards_the_reference() {
        let mut exo = exo_at_rest();
        let mut reference = SmoothReferenceTrajectory::with_ref([0.015; N_QS], [0.12; N_QS]);
        reference.start(exo.wrist_parallel_positions(), Duration::ZERO);
        let tau = exo
            .set_rps_pos_ctrl_torques(&mut reference, Duration::from_millis(500))
            .unwrap();
        for leg in 0..N_QS {
            assert!(tau[leg] > 0., "leg {} should push outward", leg);
            assert!(tau[leg].is_finite());
        }
    }

    #[test]
    fn backdrive_height_mode_discards_the_height_force() {
        let mut exo = exo_at_rest();
        exo.set_rps_control_mode(RpsControlMode::AnatomicalBackdriveHeight);
        exo.set_rps_ser_torques([0., 0., 10.]).unwrap();
        for leg in 0..N_QS {
            assert!(exo.commanded_torques()[2 + leg].abs() < 1e-9);
        }
        exo.set_rps_control_mode(RpsControlMode::AnatomicalActiveHeight);
        exo.set_rps_ser_torques([0., 0., 10.]).unwrap();
        let total: f64 = exo.commanded_torques()[2..].iter().sum();
        assert!(total > 1.);
    }

    #[test]
    fn limit_checks_catch_violations() {
        let mut exo = exo_at_rest();
        assert!(exo.any_limit_exceeded().is_none());
        let mut readings = JointReadings {
            positions: *exo.joint_positions(),
            velocities: [0.; N_RJ],
        };
        readings.velocities[0] = 5.;
        exo.update_kinematics(&readings).unwrap();
        match exo.any_limit_exceeded() {
            Some(MeiiException::LimitException { joint, limit, .. }) => {
                assert_eq!(joint, 0);
                assert_eq!(limit, "velocity");
            }
            other => panic!("expected a velocity limit violation, got {:?}", other),
        }
    }

    #[test]
    fn init_check_uses_the_documented_tolerance() {
        let mut exo = exo_at_rest();
        assert!(!exo.check_rps_init());
        let readings = JointReadings {
            positions: [-0.7, 0., 0.1205, 0.1195, 0.12],
            velocities: [0.; N_RJ],
        };
        exo.update_kinematics(&readings).unwrap();
        assert!(exo.check_rps_init());
    }

    #[test]
    fn init_target_is_validated() {
        let mut exo = exo_at_rest();
        assert!(exo.set_rps_init_pos([0.12; N_QS]).is_ok());
        assert!(matches!(
            exo.set_rps_init_pos([0.25, 0.12, 0.12]),
            Err(MeiiException::ConfigException { .. })
        ));
    }
}
