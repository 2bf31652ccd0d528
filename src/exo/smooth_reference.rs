// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains the online ramp generator for position references.
use crate::utils::saturate;
use std::time::Duration;

/// Constant-speed ramp between the current position and a reference, updated
/// online.
///
/// Each degree of freedom moves from its anchor towards the reference at its
/// own speed. [`set_ref`](`SmoothReferenceTrajectory::set_ref`) re-anchors the
/// ramp at the currently interpolated value, so a reference change never
/// produces a discontinuity in the output.
#[derive(Debug, Clone)]
pub struct SmoothReferenceTrajectory<const N: usize> {
    speed: [f64; N],
    ref_pos: [f64; N],
    prev_ref: [f64; N],
    start_time: Duration,
    started: bool,
    ref_init: bool,
}

impl<const N: usize> SmoothReferenceTrajectory<N> {
    /// Creates a ramp generator without an initial reference.
    /// [`set_ref`](`SmoothReferenceTrajectory::set_ref`) must be called before
    /// the output is meaningful.
    pub fn new(speed: [f64; N]) -> Self {
        SmoothReferenceTrajectory {
            speed,
            ref_pos: [0.; N],
            prev_ref: [0.; N],
            start_time: Duration::ZERO,
            started: false,
            ref_init: false,
        }
    }

    /// Creates a ramp generator with a fixed initial reference.
    pub fn with_ref(speed: [f64; N], ref_pos: [f64; N]) -> Self {
        let mut generator = Self::new(speed);
        generator.ref_pos = ref_pos;
        generator.ref_init = true;
        generator
    }

    /// Starts ramping from the given current position at the given time.
    pub fn start(&mut self, current_pos: [f64; N], time: Duration) {
        self.prev_ref = current_pos;
        self.start_time = time;
        self.started = true;
    }

    /// Starts ramping towards `ref_pos` from the given current position.
    pub fn start_with_ref(&mut self, ref_pos: [f64; N], current_pos: [f64; N], time: Duration) {
        self.ref_pos = ref_pos;
        self.ref_init = true;
        self.start(current_pos, time);
    }

    /// Replaces the reference, re-anchoring each DOF at its currently
    /// interpolated value so the output stays continuous.
    pub fn set_ref(&mut self, ref_pos: [f64; N], time: Duration) {
        if !self.started || !self.ref_init {
            self.ref_pos = ref_pos;
            self.ref_init = true;
            return;
        }
        for dof in 0..N {
            if let Some(value) = self.calculate_smooth_ref(dof, time) {
                self.prev_ref[dof] = value;
            }
        }
        self.ref_pos = ref_pos;
        self.start_time = time;
    }

    /// Interpolated reference of one DOF at the given time. None until the
    /// generator was started and a reference was set.
    pub fn calculate_smooth_ref(&self, dof: usize, time: Duration) -> Option<f64> {
        if !self.started || !self.ref_init {
            return None;
        }
        let distance = (self.ref_pos[dof] - self.prev_ref[dof]).abs();
        if distance == 0. {
            return Some(self.ref_pos[dof]);
        }
        let elapsed = time.saturating_sub(self.start_time).as_secs_f64();
        let frac = saturate(elapsed * self.speed[dof] / distance, 0., 1.);
        Some(self.prev_ref[dof] + frac * (self.ref_pos[dof] - self.prev_ref[dof]))
    }

    /// Stops the ramp; the generator must be started again before use.
    pub fn stop(&mut self) {
        self.started = false;
    }

    /// Whether the ramp is running.
    pub fn is_started(&self) -> bool {
        self.started
    }

    /// The current reference.
    pub fn ref_pos(&self) -> &[f64; N] {
        &self.ref_pos
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn ramps_at_constant_speed_and_saturates() {
        let mut reference = SmoothReferenceTrajectory::with_ref([0.5, 1.0], [1.0, -1.0]);
        reference.start([0.0, 0.0], Duration::ZERO);
        let half = reference
            .calculate_smooth_ref(0, Duration::from_secs(1))
            .unwrap();
        assert!((half - 0.5).abs() < 1e-12);
        // each DOF ramps at its own speed
        let done = reference
            .calculate_smooth_ref(1, Duration::from_secs(1))
            .unwrap();
        assert!((done + 1.0).abs() < 1e-12);
        // past the arrival time the reference is held
        let held = reference
            .calculate_smooth_ref(0, Duration::from_secs(100))
            .unwrap();
        assert!((held - 1.0).abs() < 1e-12);
    }

    #[test]
    fn set_ref_keeps_the_output_continuous() {
        let mut reference = SmoothReferenceTrajectory::with_ref([1.0], [1.0]);
        reference.start([0.0], Duration::ZERO);
        let t = Duration::from_millis(400);
        let before = reference.calculate_smooth_ref(0, t).unwrap();
        reference.set_ref([-1.0], t);
        let after = reference.calculate_smooth_ref(0, t).unwrap();
        assert!((before - after).abs() < 1e-12);
        assert!((before - 0.4).abs() < 1e-12);
    }

    #[test]
    fn unstarted_generator_yields_none() {
        let reference = SmoothReferenceTrajectory::<3>::new([1.; 3]);
        assert!(reference
            .calculate_smooth_ref(0, Duration::from_secs(1))
            .is_none());
    }
}
