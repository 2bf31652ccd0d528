// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! contains useful type definitions and conversion functions.
use nalgebra::{SMatrix, SVector};
use std::time::Duration;

/// Conversion factor from degrees to radians.
pub const DEG2RAD: f64 = std::f64::consts::PI / 180.;

/// A Vector with 3 entries
pub type Vector3 = SVector<f64, 3>;
/// A Vector with 9 entries
pub type Vector9 = SVector<f64, 9>;
/// A Vector with 12 entries
pub type Vector12 = SVector<f64, 12>;
/// A Matrix with 3 rows and 3 columns
pub type Matrix3 = SMatrix<f64, 3, 3>;
/// A Matrix with 9 rows and 12 columns
pub type Matrix9x12 = SMatrix<f64, 9, 12>;
/// A Matrix with 12 rows and 3 columns
pub type Matrix12x3 = SMatrix<f64, 12, 3>;
/// A Matrix with 12 rows and 12 columns
pub type Matrix12 = SMatrix<f64, 12, 12>;

/// Clamps a value into the closed interval `[min, max]`.
///
/// # Panics
/// This function panics if min > max.
pub fn saturate(value: f64, min: f64, max: f64) -> f64 {
    assert!(min <= max);
    value.max(min).min(max)
}

/// Clamps a value into the symmetric interval `[-bound, bound]`.
pub fn saturate_abs(value: f64, bound: f64) -> f64 {
    saturate(value, -bound.abs(), bound.abs())
}

/// Trapezoidal integrator for online parameter estimation.
///
/// Used by the learning session variant to integrate the feature-weight rates into the
/// weight estimate between control cycles.
#[derive(Debug, Clone)]
pub struct Integrator {
    integral: f64,
    last_input: f64,
    last_time: Option<Duration>,
}

impl Integrator {
    /// Creates a new integrator with the given initial value.
    pub fn new(initial: f64) -> Self {
        Integrator {
            integral: initial,
            last_input: 0.,
            last_time: None,
        }
    }
    /// Resets the accumulated value and forgets the previous sample.
    pub fn set_init(&mut self, initial: f64) {
        self.integral = initial;
        self.last_input = 0.;
        self.last_time = None;
    }
    /// Integrates the input up to `time` and returns the accumulated value.
    pub fn update(&mut self, input: f64, time: Duration) -> f64 {
        if let Some(last_time) = self.last_time {
            let dt = time.saturating_sub(last_time).as_secs_f64();
            self.integral += 0.5 * (input + self.last_input) * dt;
        }
        self.last_input = input;
        self.last_time = Some(time);
        self.integral
    }
    /// Returns the accumulated value without integrating a new sample.
    pub fn value(&self) -> f64 {
        self.integral
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn saturate_clamps_both_sides() {
        assert_eq!(saturate(2., 0., 1.), 1.);
        assert_eq!(saturate(-2., 0., 1.), 0.);
        assert_eq!(saturate(0.5, 0., 1.), 0.5);
        assert_eq!(saturate_abs(-3., 1.5), -1.5);
    }

    #[test]
    fn integrator_ramp() {
        // integrating a constant rate of 2.0 for one second yields 2.0
        let mut integrator = Integrator::new(1.0);
        let mut value = 0.;
        for i in 0..=1000 {
            value = integrator.update(2.0, Duration::from_millis(i));
        }
        assert!((value - 3.0).abs() < 1e-9);
    }
}
