// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains the dynamic-motion-primitive generator with optional online
//! reshaping of its forcing term.
use crate::exception::MeiiException;
use crate::trajectory::path::Trajectory;
use crate::trajectory::waypoint::WayPoint;
use crate::MeiiResult;
use log::warn;
use std::time::Duration;

/// Evaluates the feature matrix Φ(y) of the nonlinear forcing term at a given
/// position. One row per degree of freedom; the forcing applied to DOF i is
/// the dot product of row i with the weight vector θ.
pub type FeatureMap = Box<dyn Fn(&[f64]) -> Vec<Vec<f64>> + Send>;

/// Goal spring constant of the transformation system.
const K: f64 = 25.;
/// Damping of the transformation system, critically damped for [`K`].
const D: f64 = 10.;
/// Decay rate of the canonical system.
const GAMMA: f64 = 4.;

/// Point-to-point generator built on a critically damped goal attractor,
/// a decaying canonical phase and an optional learned forcing term.
///
/// The transformation system `τ²ÿ = K(g−y) − Dτẏ − K(g−y₀)s + K·s·Φ(y)·θ` is
/// integrated at a fine internal step and sampled at a coarser period into a
/// [`Trajectory`](`crate::trajectory::Trajectory`). The weight vector θ can be
/// replaced while a session runs; a reshaped trajectory that fails validation
/// is rejected and the previous valid one kept.
pub struct DynamicMotionPrimitive {
    duration: Duration,
    start: WayPoint,
    goal: WayPoint,
    max_diff: Vec<f64>,
    sample_period: Duration,
    integration_period: Duration,
    features: Option<FeatureMap>,
    theta: Vec<f64>,
    path: Trajectory,
}

impl DynamicMotionPrimitive {
    /// Default sampling period of the generated trajectory.
    pub const DEFAULT_SAMPLE_PERIOD: Duration = Duration::from_millis(50);
    /// Internal integration step of the transformation system.
    pub const DEFAULT_INTEGRATION_PERIOD: Duration = Duration::from_millis(1);

    /// Plans an unforced motion from `start` to `goal`.
    ///
    /// # Errors
    /// * TrajectoryException if the endpoints are inconsistent or the sampled
    /// trajectory violates the rate bound.
    pub fn new(start: WayPoint, goal: WayPoint, max_diff: Vec<f64>) -> MeiiResult<Self> {
        Self::with_features(start, goal, max_diff, None, Vec::new())
    }

    /// Plans a motion whose forcing term is shaped by `features` and `theta`.
    ///
    /// # Errors
    /// * TrajectoryException if the endpoints are inconsistent or the sampled
    /// trajectory violates the rate bound.
    pub fn with_features(
        start: WayPoint,
        goal: WayPoint,
        max_diff: Vec<f64>,
        features: Option<FeatureMap>,
        theta: Vec<f64>,
    ) -> MeiiResult<Self> {
        let mut generator = DynamicMotionPrimitive {
            duration: Duration::ZERO,
            start: WayPoint::new(Duration::ZERO, vec![]),
            goal: WayPoint::new(Duration::ZERO, vec![]),
            max_diff: max_diff.clone(),
            sample_period: Self::DEFAULT_SAMPLE_PERIOD,
            integration_period: Self::DEFAULT_INTEGRATION_PERIOD,
            features,
            theta,
            path: Trajectory::new(max_diff),
        };
        generator.set_endpoints(start, goal)?;
        Ok(generator)
    }

    /// Replans with new endpoints, keeping the current weights.
    ///
    /// # Errors
    /// * TrajectoryException if the endpoints are inconsistent or the sampled
    /// trajectory violates the rate bound.
    pub fn set_endpoints(&mut self, start: WayPoint, goal: WayPoint) -> MeiiResult<()> {
        if start.dof() != goal.dof()
            || start.dof() != self.max_diff.len()
            || goal.time <= start.time
        {
            return Err(MeiiException::TrajectoryException {
                message: "libmeii-rs: motion-primitive endpoints are inconsistent".to_string(),
            });
        }
        self.duration = goal.time - start.time;
        self.start = start;
        self.goal = goal;
        let path = self.generate(&self.theta);
        if !path.validate() {
            return Err(MeiiException::TrajectoryException {
                message: "libmeii-rs: motion-primitive trajectory exceeds the rate bound"
                    .to_string(),
            });
        }
        self.path = path;
        Ok(())
    }

    /// Replaces the forcing weights and regenerates the trajectory.
    ///
    /// Returns false and keeps the previous valid trajectory if the reshaped
    /// one fails validation. A transient weight estimate must not kill a
    /// running session.
    pub fn update(&mut self, theta: Vec<f64>) -> bool {
        let path = self.generate(&theta);
        if !path.validate() {
            warn!("trajectory update rejected, reference changing too quickly");
            return false;
        }
        self.theta = theta;
        self.path = path;
        true
    }

    /// The generated trajectory. Valid by construction.
    pub fn trajectory(&self) -> &Trajectory {
        &self.path
    }

    /// Current forcing weights.
    pub fn theta(&self) -> &[f64] {
        &self.theta
    }

    /// Evaluates the feature matrix at a position, None for unforced motions.
    pub fn features_at(&self, pos: &[f64]) -> Option<Vec<Vec<f64>>> {
        self.features.as_ref().map(|features| features(pos))
    }

    /// Canonical phase `s(t) = exp(−γ·t/τ)`, clamped after the motion ends.
    pub fn canonical(&self, time: Duration) -> f64 {
        let tau = self.duration.as_secs_f64();
        let t = time.as_secs_f64().min(tau);
        (-GAMMA * t / tau).exp()
    }

    fn generate(&self, theta: &[f64]) -> Trajectory {
        let tau = self.duration.as_secs_f64();
        let dt = self.integration_period.as_secs_f64();
        let dof = self.start.dof();
        let mut y = self.start.pos.clone();
        let mut dy = vec![0.; dof];
        let mut s = 1.;
        let mut path = Trajectory::new(self.max_diff.clone());
        path.push_back(self.start.clone());
        let mut t = 0.;
        let mut next_sample = self.sample_period.as_secs_f64();
        while t < tau {
            let forcing = self.forcing(&y, theta);
            for i in 0..dof {
                let attractor = K * (self.goal.pos[i] - y[i]) - D * tau * dy[i];
                let offset = K * (self.goal.pos[i] - self.start.pos[i]) * s;
                let ddy = (attractor - offset + K * s * forcing[i]) / (tau * tau);
                dy[i] += ddy * dt;
                y[i] += dy[i] * dt;
            }
            s += -GAMMA * s / tau * dt;
            t += dt;
            if t >= next_sample || t >= tau {
                path.push_back(WayPoint::new(
                    self.start.time + Duration::from_secs_f64(t.min(tau)),
                    y.clone(),
                ));
                next_sample += self.sample_period.as_secs_f64();
            }
        }
        path
    }

    fn forcing(&self, y: &[f64], theta: &[f64]) -> Vec<f64> {
        match &self.features {
            None => vec![0.; y.len()],
            Some(features) => {
                let phi = features(y);
                phi.iter()
                    .map(|row| row.iter().zip(theta.iter()).map(|(p, w)| p * w).sum())
                    .collect()
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn endpoints() -> (WayPoint, WayPoint) {
        (
            WayPoint::new(Duration::ZERO, vec![0.0, 0.5]),
            WayPoint::new(Duration::from_secs(5), vec![1.0, -0.5]),
        )
    }

    #[test]
    fn unforced_motion_approaches_the_goal() {
        let (start, goal) = endpoints();
        let generator = DynamicMotionPrimitive::new(start, goal, vec![1.0, 1.0]).unwrap();
        let path = generator.trajectory();
        assert!(path.validate());
        // the canonical phase has only decayed to exp(-4) at the end of the
        // motion, so a residual of a few percent of the amplitude remains
        let end = path.at_time(Duration::from_secs(5)).unwrap();
        assert!((end[0] - 1.0).abs() < 0.25);
        assert!((end[1] + 0.5).abs() < 0.25);
        let mid = path.at_time(Duration::from_millis(2500)).unwrap();
        assert!(mid[0] > 0.1 && mid[0] < 1.0);
        let begin = path.at_time(Duration::ZERO).unwrap();
        assert!((begin[0] - 0.0).abs() < 1e-12);
    }

    #[test]
    fn canonical_phase_decays() {
        let (start, goal) = endpoints();
        let generator = DynamicMotionPrimitive::new(start, goal, vec![1.0, 1.0]).unwrap();
        assert!((generator.canonical(Duration::ZERO) - 1.).abs() < 1e-12);
        let s_end = generator.canonical(Duration::from_secs(5));
        assert!((s_end - (-4f64).exp()).abs() < 1e-12);
        // clamped past the end of the motion
        assert_eq!(generator.canonical(Duration::from_secs(50)), s_end);
    }

    #[test]
    fn invalid_online_update_is_rejected() {
        let (start, goal) = endpoints();
        let features: FeatureMap = Box::new(|pos| vec![vec![1.0], vec![pos[0]]]);
        let mut generator = DynamicMotionPrimitive::with_features(
            start,
            goal,
            vec![1.0, 1.0],
            Some(features),
            vec![0.0],
        )
        .unwrap();
        let before = generator.trajectory().clone();
        // a huge weight makes the forcing term violate the rate bound
        assert!(!generator.update(vec![1e4]));
        assert_eq!(generator.theta(), &[0.0]);
        let after = generator.trajectory();
        assert_eq!(before.size(), after.size());
        assert_eq!(
            before.at_time(Duration::from_secs(2)),
            after.at_time(Duration::from_secs(2))
        );
    }

    #[test]
    fn forced_update_reshapes_the_path() {
        let (start, goal) = endpoints();
        let features: FeatureMap = Box::new(|_| vec![vec![1.0], vec![0.0]]);
        let mut generator = DynamicMotionPrimitive::with_features(
            start,
            goal,
            vec![1.0, 1.0],
            Some(features),
            vec![0.0],
        )
        .unwrap();
        let unforced = generator
            .trajectory()
            .at_time(Duration::from_secs(2))
            .unwrap();
        assert!(generator.update(vec![0.2]));
        let forced = generator
            .trajectory()
            .at_time(Duration::from_secs(2))
            .unwrap();
        assert!((forced[0] - unforced[0]).abs() > 1e-3);
        assert!((forced[1] - unforced[1]).abs() < 1e-9);
    }
}
