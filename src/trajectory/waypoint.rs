// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains the WayPoint value type.
use serde::Deserialize;
use serde::Serialize;
use std::time::Duration;

/// A single point of a reference trajectory: a timestamp and one position per
/// degree of freedom.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct WayPoint {
    /// Time at which the point should be reached, relative to trajectory start.
    pub time: Duration,
    /// Position per degree of freedom. Units are those of the joint space the
    /// trajectory is planned in.
    pub pos: Vec<f64>,
}

impl WayPoint {
    /// Creates a new WayPoint.
    pub fn new(time: Duration, pos: Vec<f64>) -> Self {
        WayPoint { time, pos }
    }
    /// Number of degrees of freedom.
    pub fn dof(&self) -> usize {
        self.pos.len()
    }
}
