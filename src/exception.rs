// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains exception and Result definitions
use crate::logger::Record;
use thiserror::Error;

/// Represents all kind of errors which can occur while controlling the exoskeleton.
#[derive(Error, Debug)]
pub enum MeiiException {
    /// ControlException is thrown if an error occurs during torque control or motion generation.
    /// The exception holds a vector with the telemetry records of the last cycles before the
    /// fault.
    #[error("{error}")]
    ControlException {
        /// Telemetry rows logged just before the exception occurred.
        log: Option<Vec<Record>>,
        /// Explanatory string.
        error: String,
    },

    /// KinematicsException is thrown when the RPS closure-constraint solver does not converge
    /// within its iteration budget. The mechanism configuration left in the solver context is
    /// the last best estimate and must not be used for commanding torques.
    #[error("RPS kinematics did not converge after {iterations} iterations (residual {residual:e})")]
    KinematicsException { iterations: u32, residual: f64 },

    /// TrajectoryException is thrown when a planned reference trajectory fails validation
    /// against its maximum rate-of-change constraint.
    #[error("{message}")]
    TrajectoryException { message: String },

    /// LimitException is thrown when a joint exceeds one of its position, velocity or torque
    /// bounds. Always fatal for the session.
    #[error("joint {joint} exceeded its {limit} limit: {value} is outside of {bound}")]
    LimitException {
        /// Robot joint index.
        joint: usize,
        /// Which bound was violated: "position", "velocity" or "torque".
        limit: &'static str,
        /// Measured or commanded value.
        value: f64,
        /// The violated bound.
        bound: f64,
    },

    /// HardwareException is thrown on a watchdog or I/O fault reported by the hardware layer.
    #[error("{message}")]
    HardwareException { message: String },

    /// RealTimeException is thrown if the real-time priority cannot be set, or if the control
    /// loop misses more deadlines than the tolerated rate.
    #[error("{message}")]
    RealTimeException { message: String },

    /// ConfigException is thrown when a configuration value is outside the physical range of
    /// the device.
    #[error("{message}")]
    ConfigException { message: String },
}

/// Result type which can have MeiiException as Error
pub type MeiiResult<T> = Result<T, MeiiException>;
