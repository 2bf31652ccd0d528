// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains the proportional-derivative joint controller.
use serde::Deserialize;
use serde::Serialize;

/// Stateless proportional-derivative controller for a single joint.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq)]
pub struct PdController {
    /// Proportional gain.
    pub kp: f64,
    /// Derivative gain.
    pub kd: f64,
}

impl PdController {
    /// Creates a new controller with the given gains.
    pub fn new(kp: f64, kd: f64) -> Self {
        PdController { kp, kd }
    }
    /// Computes `kp (x_ref − x) + kd (xdot_ref − xdot)`.
    pub fn calculate(&self, x_ref: f64, x: f64, xdot_ref: f64, xdot: f64) -> f64 {
        self.kp * (x_ref - x) + self.kd * (xdot_ref - xdot)
    }
}
