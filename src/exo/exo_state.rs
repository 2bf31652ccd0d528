// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains the per-cycle state snapshot of the exoskeleton.
use crate::exo::meii::{N_AJ, N_RJ};
use serde::Deserialize;
use serde::Serialize;
use std::time::Duration;

/// Snapshot of the exoskeleton taken once per control cycle.
///
/// Robot-joint ordering is `[elbow FE, forearm PS, d1, d2, d3]`, anatomical
/// ordering `[elbow FE, forearm PS, wrist FE, wrist RU, wrist height]`.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct MeiiState {
    /// Time since the control loop started.
    pub time: Duration,
    /// Measured robot-joint positions \[rad, rad, m ×3\].
    pub joint_positions: [f64; N_RJ],
    /// Measured robot-joint velocities \[rad/s, rad/s, m/s ×3\].
    pub joint_velocities: [f64; N_RJ],
    /// Last commanded robot-joint torques \[Nm, Nm, N ×3\].
    pub commanded_torques: [f64; N_RJ],
    /// Anatomical positions derived from the forward kinematics.
    pub anatomical_joint_positions: [f64; N_AJ],
    /// Anatomical velocities derived from the kinematic Jacobian.
    pub anatomical_joint_velocities: [f64; N_AJ],
}
