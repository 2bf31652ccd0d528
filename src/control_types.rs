// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains helper types for returning joint-level torque commands.

use serde::Deserialize;
use serde::Serialize;

use crate::exo::meii::N_RJ;

/// Used to decide whether to enforce realtime mode for a control loop thread.
/// see [`ControlLoop`](`crate::control_loop::ControlLoop`)
#[derive(Copy, Clone, PartialEq)]
pub enum RealtimeConfig {
    Enforce,
    Ignore,
}

pub trait Finishable {
    /// Determines whether to finish a currently running motion.
    fn is_finished(&self) -> bool;
    /// Sets the attribute which decide if the currently running motion should be finished
    fn set_motion_finished(&mut self, finished: bool);
    /// Helper method to indicate that a motion should stop after processing the given command.
    fn motion_finished(self) -> Self;
}

/// Stores robot-joint torque commands.
///
/// The first two entries are the elbow and forearm torques in \[Nm\], the last three are the
/// RPS prismatic actuator forces in \[N\].
#[derive(Serialize, Deserialize, Debug, Copy, Clone)]
pub struct Torques {
    motion_finished: bool,
    /// Desired robot-joint torques.
    pub tau: [f64; N_RJ],
}

impl Torques {
    /// Creates a new Torques instance
    /// # Arguments
    /// * `torques` - Desired robot-joint torques.
    pub fn new(torques: [f64; N_RJ]) -> Self {
        Torques {
            tau: torques,
            motion_finished: false,
        }
    }
    /// Creates an all-zero torque command, the only command allowed in backdrive and
    /// fault handling.
    pub fn zero() -> Self {
        Torques::new([0.; N_RJ])
    }
}

impl Finishable for Torques {
    fn is_finished(&self) -> bool {
        self.motion_finished
    }
    fn set_motion_finished(&mut self, finished: bool) {
        self.motion_finished = finished;
    }
    fn motion_finished(mut self) -> Self {
        self.set_motion_finished(true);
        self
    }
}
