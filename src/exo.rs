// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains the exoskeleton control object, its configuration and the
//! wrist-mechanism kinematics.
pub mod config;
pub mod exo_state;
pub mod meii;
pub mod pd_controller;
pub mod rps_kinematics;
pub mod smooth_reference;

pub use config::MeiiParameters;
pub use exo_state::MeiiState;
pub use meii::{MahiExoII, RpsControlMode};
pub use pd_controller::PdController;
pub use rps_kinematics::{RpsKinematics, RpsSolution};
pub use smooth_reference::SmoothReferenceTrajectory;
