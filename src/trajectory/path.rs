// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains the Trajectory container and its interpolation and validation
//! rules.
use crate::trajectory::waypoint::WayPoint;
use std::time::Duration;

/// Interpolation method between neighboring waypoints.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Interp {
    /// No interpolation, the most recent waypoint is held.
    None,
    /// Piecewise linear interpolation.
    Linear,
}

/// A timed sequence of waypoints with a per-DOF rate-of-change bound.
///
/// A trajectory is usable once [`validate`](`Trajectory::validate`) returns
/// true: at least two waypoints, strictly increasing timestamps, equal DOF
/// counts and no segment steeper than `max_diff` (units per second).
#[derive(Debug, Clone)]
pub struct Trajectory {
    waypoints: Vec<WayPoint>,
    interp: Interp,
    max_diff: Vec<f64>,
}

impl Trajectory {
    /// Creates an empty trajectory with linear interpolation and the given
    /// rate bound.
    pub fn new(max_diff: Vec<f64>) -> Self {
        Trajectory {
            waypoints: Vec::new(),
            interp: Interp::Linear,
            max_diff,
        }
    }

    /// Replaces all waypoints.
    pub fn set_waypoints(&mut self, waypoints: Vec<WayPoint>) {
        self.waypoints = waypoints;
    }
    /// Appends a waypoint.
    pub fn push_back(&mut self, waypoint: WayPoint) {
        self.waypoints.push(waypoint);
    }
    /// Removes all waypoints.
    pub fn clear(&mut self) {
        self.waypoints.clear();
    }
    /// Sets the per-DOF rate bound in units per second.
    pub fn set_max_diff(&mut self, max_diff: Vec<f64>) {
        self.max_diff = max_diff;
    }
    /// Sets the interpolation method used by [`at_time`](`Trajectory::at_time`).
    pub fn set_interp_method(&mut self, interp: Interp) {
        self.interp = interp;
    }

    /// First waypoint, if any.
    pub fn front(&self) -> Option<&WayPoint> {
        self.waypoints.first()
    }
    /// Last waypoint, if any.
    pub fn back(&self) -> Option<&WayPoint> {
        self.waypoints.last()
    }
    /// Number of waypoints.
    pub fn size(&self) -> usize {
        self.waypoints.len()
    }
    /// Whether the trajectory holds no waypoints.
    pub fn empty(&self) -> bool {
        self.waypoints.is_empty()
    }
    /// Total duration, zero when fewer than two waypoints are present.
    pub fn duration(&self) -> Duration {
        match (self.front(), self.back()) {
            (Some(front), Some(back)) => back.time.saturating_sub(front.time),
            _ => Duration::ZERO,
        }
    }

    /// Checks whether the trajectory can be followed.
    ///
    /// Returns false if there are fewer than two waypoints, if the timestamps
    /// are not strictly increasing, if the DOF count varies between waypoints
    /// or if any segment exceeds the per-DOF rate bound.
    pub fn validate(&self) -> bool {
        if self.waypoints.len() < 2 {
            return false;
        }
        let dof = self.waypoints[0].dof();
        if dof != self.max_diff.len() {
            return false;
        }
        for pair in self.waypoints.windows(2) {
            if pair[1].dof() != dof || pair[1].time <= pair[0].time {
                return false;
            }
            let dt = (pair[1].time - pair[0].time).as_secs_f64();
            for i in 0..dof {
                let diff = pair[1].pos[i] - pair[0].pos[i];
                if !diff.is_finite() || diff.abs() > self.max_diff[i] * dt {
                    return false;
                }
            }
        }
        true
    }

    /// Evaluates the trajectory at the given time.
    ///
    /// Times before the first waypoint yield the first position, times after
    /// the last waypoint yield the last position. There is no extrapolation.
    /// Returns None when the trajectory is empty.
    pub fn at_time(&self, time: Duration) -> Option<Vec<f64>> {
        let front = self.front()?;
        if time <= front.time {
            return Some(front.pos.clone());
        }
        let back = self.back()?;
        if time >= back.time {
            return Some(back.pos.clone());
        }
        let upper = self
            .waypoints
            .iter()
            .position(|w| w.time > time)
            .unwrap_or(self.waypoints.len() - 1);
        let a = &self.waypoints[upper - 1];
        let b = &self.waypoints[upper];
        match self.interp {
            Interp::None => Some(a.pos.clone()),
            Interp::Linear => {
                let frac =
                    (time - a.time).as_secs_f64() / (b.time - a.time).as_secs_f64();
                Some(
                    a.pos
                        .iter()
                        .zip(b.pos.iter())
                        .map(|(p0, p1)| p0 + frac * (p1 - p0))
                        .collect(),
                )
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn ramp() -> Trajectory {
        let mut trajectory = Trajectory::new(vec![1.0, 2.0]);
        trajectory.set_waypoints(vec![
            WayPoint::new(Duration::from_secs(0), vec![0.0, 0.0]),
            WayPoint::new(Duration::from_secs(1), vec![0.5, 1.0]),
            WayPoint::new(Duration::from_secs(2), vec![1.0, 0.0]),
        ]);
        trajectory
    }

    #[test]
    fn at_time_interpolates_and_clamps() {
        let trajectory = ramp();
        assert!(trajectory.validate());
        let mid = trajectory.at_time(Duration::from_millis(500)).unwrap();
        assert!((mid[0] - 0.25).abs() < 1e-12);
        assert!((mid[1] - 0.5).abs() < 1e-12);
        // before the first and after the last waypoint the endpoints are held
        let before = trajectory.at_time(Duration::ZERO).unwrap();
        assert_eq!(before, vec![0.0, 0.0]);
        let after = trajectory.at_time(Duration::from_secs(10)).unwrap();
        assert_eq!(after, vec![1.0, 0.0]);
    }

    #[test]
    fn validate_rejects_rate_violation() {
        let mut trajectory = ramp();
        trajectory.set_max_diff(vec![1.0, 0.5]);
        assert!(!trajectory.validate());
    }

    #[test]
    fn validate_rejects_non_monotonic_timestamps() {
        let mut trajectory = ramp();
        trajectory.push_back(WayPoint::new(Duration::from_secs(2), vec![1.0, 0.0]));
        assert!(!trajectory.validate());
    }

    #[test]
    fn validate_needs_two_waypoints() {
        let mut trajectory = Trajectory::new(vec![1.0]);
        assert!(!trajectory.validate());
        trajectory.push_back(WayPoint::new(Duration::ZERO, vec![0.0]));
        assert!(!trajectory.validate());
    }
}
