// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains the reference-trajectory representation and the offline generators
//! which produce it.
pub mod dmp;
pub mod min_jerk;
pub mod path;
pub mod waypoint;

pub use dmp::DynamicMotionPrimitive;
pub use min_jerk::MinimumJerk;
pub use path::{Interp, Trajectory};
pub use waypoint::WayPoint;
