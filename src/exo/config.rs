// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains the tuned device parameters of the exoskeleton.
use crate::exo::meii::{N_AJ, N_QS, N_RJ};
use crate::exo::pd_controller::PdController;
use crate::utils::DEG2RAD;
use serde::Deserialize;
use serde::Serialize;

/// Geometry of the 3-RPS wrist mechanism.
#[derive(Serialize, Deserialize, Debug, Copy, Clone)]
pub struct RpsGeometry {
    /// Radius of the base circle carrying the revolute pivots \[m\].
    pub base_radius: f64,
    /// Radius of the moving platform circle carrying the spherical joints \[m\].
    pub platform_radius: f64,
}

impl Default for RpsGeometry {
    fn default() -> Self {
        RpsGeometry {
            base_radius: 0.104_495_6,
            platform_radius: 0.052_881_75,
        }
    }
}

/// Tuned parameters of the device.
///
/// The defaults are the values the physical exoskeleton runs with. Robot-joint
/// ordering throughout is `[elbow FE, forearm PS, d1, d2, d3]`, anatomical
/// ordering is `[elbow FE, forearm PS, wrist FE, wrist RU, wrist height]`.
/// Angles are in \[rad\], prismatic positions in \[m\].
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct MeiiParameters {
    /// PD gains of the robot-joint-space controllers.
    pub robot_joint_pd: [PdController; N_RJ],
    /// PD gains of the anatomical-joint-space controllers.
    pub anatomical_joint_pd: [PdController; N_AJ],
    /// Prismatic positions the RPS mechanism is driven to during
    /// initialization \[m\].
    pub rps_init_pos: [f64; N_QS],
    /// Per-leg tolerance on reaching the initialization position \[m\].
    pub rps_init_err_tol: f64,
    /// Goal tolerance for parallel-space (prismatic) moves \[m\].
    pub rps_par_goal_err_tol: [f64; N_QS],
    /// Goal tolerance for serial-space moves \[rad, rad, m\].
    pub rps_ser_goal_err_tol: [f64; N_QS],
    /// Goal tolerance for anatomical moves.
    pub anat_goal_err_tol: [f64; N_AJ],
    /// Tighter tolerance used when settling on the neutral posture.
    pub anat_neutral_err_tol: [f64; N_AJ],
    /// Interpolation speed of parallel-space references \[m/s\].
    pub rps_par_joint_speed: [f64; N_QS],
    /// Interpolation speed of anatomical references.
    pub anat_joint_speed: [f64; N_AJ],
    /// Robot-joint positions the passive device settles in.
    pub rest_positions: [f64; N_RJ],
    /// Lower robot-joint position limits.
    pub pos_limits_min: [f64; N_RJ],
    /// Upper robot-joint position limits.
    pub pos_limits_max: [f64; N_RJ],
    /// Robot-joint velocity limits \[rad/s, rad/s, m/s ×3\].
    pub velocity_limits: [f64; N_RJ],
    /// Robot-joint torque limits \[Nm, Nm, N ×3\].
    pub torque_limits: [f64; N_RJ],
    /// Lower bounds of the anatomical workspace, used to saturate references.
    pub anat_pos_min: [f64; N_AJ],
    /// Upper bounds of the anatomical workspace, used to saturate references.
    pub anat_pos_max: [f64; N_AJ],
    /// Wrist mechanism geometry.
    pub geometry: RpsGeometry,
}

impl Default for MeiiParameters {
    fn default() -> Self {
        MeiiParameters {
            robot_joint_pd: [
                PdController::new(100., 1.25),
                PdController::new(28., 0.20),
                PdController::new(2200., 30.),
                PdController::new(2200., 30.),
                PdController::new(2200., 30.),
            ],
            anatomical_joint_pd: [
                PdController::new(100., 1.25),
                PdController::new(28., 0.20),
                PdController::new(15., 0.01),
                PdController::new(15., 0.01),
                PdController::new(1000., 10.),
            ],
            rps_init_pos: [0.12; N_QS],
            rps_init_err_tol: 0.01,
            rps_par_goal_err_tol: [0.003; N_QS],
            rps_ser_goal_err_tol: [2. * DEG2RAD, 2. * DEG2RAD, 0.005],
            anat_goal_err_tol: [
                2. * DEG2RAD,
                3. * DEG2RAD,
                5. * DEG2RAD,
                5. * DEG2RAD,
                0.01,
            ],
            anat_neutral_err_tol: [
                1. * DEG2RAD,
                2. * DEG2RAD,
                3. * DEG2RAD,
                3. * DEG2RAD,
                0.01,
            ],
            rps_par_joint_speed: [0.015; N_QS],
            anat_joint_speed: [0.25, 0.35, 0.15, 0.15, 0.015],
            rest_positions: [-45. * DEG2RAD, 0., 0.0952, 0.0952, 0.0952],
            pos_limits_min: [-95. * DEG2RAD, -95. * DEG2RAD, 0.05, 0.05, 0.05],
            pos_limits_max: [5. * DEG2RAD, 95. * DEG2RAD, 0.1350, 0.1350, 0.1350],
            velocity_limits: [2.0, 2.0, 0.10, 0.10, 0.10],
            torque_limits: [60., 25., 250., 250., 250.],
            anat_pos_min: [-90. * DEG2RAD, -90. * DEG2RAD, -15. * DEG2RAD, -15. * DEG2RAD, 0.08],
            anat_pos_max: [0., 90. * DEG2RAD, 15. * DEG2RAD, 15. * DEG2RAD, 0.115],
            geometry: RpsGeometry::default(),
        }
    }
}
