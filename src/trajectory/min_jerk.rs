// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains the minimum-jerk point-to-point generator.
use crate::exception::MeiiException;
use crate::trajectory::path::Trajectory;
use crate::trajectory::waypoint::WayPoint;
use crate::MeiiResult;
use std::time::Duration;

/// Quintic point-to-point generator with zero velocity and acceleration at
/// both endpoints.
///
/// The closed-form profile is sampled at a fixed period into a
/// [`Trajectory`](`crate::trajectory::Trajectory`) which is validated against
/// the given rate bound before it is handed out.
pub struct MinimumJerk {
    duration: Duration,
    start: WayPoint,
    goal: WayPoint,
    max_diff: Vec<f64>,
    sample_period: Duration,
    path: Trajectory,
}

impl MinimumJerk {
    /// Default sampling period of the generated trajectory.
    pub const DEFAULT_SAMPLE_PERIOD: Duration = Duration::from_millis(50);

    /// Plans a minimum-jerk motion from `start` to `goal`.
    ///
    /// Both waypoints must share the DOF count of `max_diff` and the goal must
    /// lie after the start in time.
    ///
    /// # Errors
    /// * TrajectoryException if the endpoints are inconsistent or the sampled
    /// trajectory violates the rate bound.
    pub fn new(start: WayPoint, goal: WayPoint, max_diff: Vec<f64>) -> MeiiResult<Self> {
        let mut generator = MinimumJerk {
            duration: Duration::ZERO,
            start: WayPoint::new(Duration::ZERO, vec![]),
            goal: WayPoint::new(Duration::ZERO, vec![]),
            max_diff: max_diff.clone(),
            sample_period: Self::DEFAULT_SAMPLE_PERIOD,
            path: Trajectory::new(max_diff),
        };
        generator.set_endpoints(start, goal)?;
        Ok(generator)
    }

    /// Replans with new endpoints.
    pub fn set_endpoints(&mut self, start: WayPoint, goal: WayPoint) -> MeiiResult<()> {
        if start.dof() != goal.dof()
            || start.dof() != self.max_diff.len()
            || goal.time <= start.time
        {
            return Err(MeiiException::TrajectoryException {
                message: "libmeii-rs: minimum-jerk endpoints are inconsistent".to_string(),
            });
        }
        self.duration = goal.time - start.time;
        self.start = start;
        self.goal = goal;
        self.generate()
    }

    /// The generated trajectory. Valid by construction.
    pub fn trajectory(&self) -> &Trajectory {
        &self.path
    }

    fn generate(&mut self) -> MeiiResult<()> {
        let duration_s = self.duration.as_secs_f64();
        let mut path = Trajectory::new(self.max_diff.clone());
        let mut t = Duration::ZERO;
        loop {
            let tau = (t.as_secs_f64() / duration_s).min(1.);
            let blend = 10. * tau.powi(3) - 15. * tau.powi(4) + 6. * tau.powi(5);
            let pos = self
                .start
                .pos
                .iter()
                .zip(self.goal.pos.iter())
                .map(|(y0, g)| y0 + (g - y0) * blend)
                .collect();
            path.push_back(WayPoint::new(self.start.time + t, pos));
            if t >= self.duration {
                break;
            }
            t = Duration::min(t + self.sample_period, self.duration);
        }
        if !path.validate() {
            return Err(MeiiException::TrajectoryException {
                message: "libmeii-rs: minimum-jerk trajectory exceeds the rate bound".to_string(),
            });
        }
        self.path = path;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn plan() -> MinimumJerk {
        MinimumJerk::new(
            WayPoint::new(Duration::ZERO, vec![0.0, 1.0]),
            WayPoint::new(Duration::from_secs(4), vec![1.0, -1.0]),
            vec![1.0, 2.0],
        )
        .unwrap()
    }

    #[test]
    fn endpoints_are_reached() {
        let generator = plan();
        let path = generator.trajectory();
        assert!(path.validate());
        let start = path.at_time(Duration::ZERO).unwrap();
        let end = path.at_time(Duration::from_secs(4)).unwrap();
        assert!((start[0] - 0.0).abs() < 1e-12 && (start[1] - 1.0).abs() < 1e-12);
        assert!((end[0] - 1.0).abs() < 1e-12 && (end[1] + 1.0).abs() < 1e-12);
    }

    #[test]
    fn endpoint_velocities_are_zero() {
        let generator = plan();
        let path = generator.trajectory();
        let h = Duration::from_millis(50);
        let first = path.at_time(Duration::ZERO).unwrap();
        let second = path.at_time(h).unwrap();
        let v_start = (second[0] - first[0]) / h.as_secs_f64();
        let last = path.at_time(Duration::from_secs(4)).unwrap();
        let prev = path.at_time(Duration::from_secs(4) - h).unwrap();
        let v_end = (last[0] - prev[0]) / h.as_secs_f64();
        // the quintic blend has zero velocity and acceleration at both ends,
        // so the first and last 50 ms samples move O(h^2) at most
        assert!(v_start.abs() < 1e-3);
        assert!(v_end.abs() < 1e-3);
    }

    #[test]
    fn rate_bound_is_enforced() {
        let result = MinimumJerk::new(
            WayPoint::new(Duration::ZERO, vec![0.0]),
            WayPoint::new(Duration::from_secs(1), vec![10.0]),
            vec![1.0],
        );
        assert!(matches!(
            result,
            Err(MeiiException::TrajectoryException { .. })
        ));
    }
}
