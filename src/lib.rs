// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! # libmeii-rs
//! libmeii-rs is a library to control the MAHI Exo-II, a five degree-of-freedom
//! upper-limb rehabilitation exoskeleton with a 3-RPS parallel wrist mechanism.
//!
//! **ALWAYS HAVE THE EMERGENCY STOP AT HAND WHILE A SUBJECT WEARS THE DEVICE!**
//!
//! ## Design
//! The library is divided into four layers:
//! * [exo](`crate::exo`) - the exoskeleton object: device parameters, the
//!   closure-constraint kinematics of the wrist mechanism, PD control and
//!   limit checks.
//! * [trajectory](`crate::trajectory`) - offline reference generators:
//!   waypoint paths, minimum-jerk motions and dynamic motion primitives.
//! * [session](`crate::session`) - the phase machine driving a rehabilitation
//!   session from passive backdrive through initialization to the task.
//! * [control_loop](`crate::control_loop`) - the fixed-period loop tying a
//!   [`HardwareInterface`] implementation to the session.
//!
//! # Example:
//!```no_run
//! use std::time::Duration;
//! use meii::{
//!     ControlLoop, MahiExoII, MeiiParameters, MeiiResult, RealtimeConfig, Session,
//!     SessionConfig, TaskPlanner, VirtualMeii,
//! };
//! fn main() -> MeiiResult<()> {
//!     let params = MeiiParameters::default();
//!     let plant = VirtualMeii::new(params.rest_positions, Duration::from_millis(1));
//!     let exo = MahiExoII::new(params);
//!     let session = Session::new(
//!         SessionConfig::default(),
//!         TaskPlanner::hold(Duration::from_secs(5)),
//!     );
//!     let mut control_loop = ControlLoop::new(plant, exo, session, RealtimeConfig::Ignore)?;
//!     control_loop.run()
//! }
//!```
//! The main function returns a [`MeiiResult`] which is either Ok(()) or an
//! error of type [`MeiiException`]. A fault during control carries the last
//! telemetry rows so the cycles leading up to the fault can be inspected.
//!
//! Replace [`VirtualMeii`] with your own [`HardwareInterface`] implementation
//! to drive the physical device, and pass
//! [`RealtimeConfig::Enforce`](`crate::RealtimeConfig::Enforce`) to pin the
//! loop thread to a realtime scheduler priority.

pub mod control_loop;
pub mod control_tools;
pub mod control_types;
pub mod exception;
pub mod exo;
pub mod hardware;
pub mod logger;
pub mod session;
pub mod timer;
pub mod trajectory;
pub mod utils;

pub use control_loop::ControlLoop;
pub use control_types::{Finishable, RealtimeConfig, Torques};
pub use exception::{MeiiException, MeiiResult};
pub use exo::{
    MahiExoII, MeiiParameters, MeiiState, PdController, RpsControlMode, RpsKinematics,
    RpsSolution, SmoothReferenceTrajectory,
};
pub use hardware::{HardwareInterface, JointReadings, VirtualMeii};
pub use logger::Record;
pub use session::{IntentEstimator, Session, SessionConfig, SessionState, TaskPlanner};
pub use timer::Timer;
pub use trajectory::{DynamicMotionPrimitive, Interp, MinimumJerk, Trajectory, WayPoint};
