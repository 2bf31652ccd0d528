// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains the fixed-period loop runner tying hardware, exoskeleton and
//! session together.
use crate::control_tools::set_current_thread_to_highest_scheduler_priority;
use crate::control_types::{Finishable, RealtimeConfig, Torques};
use crate::exception::MeiiException;
use crate::exo::meii::MahiExoII;
use crate::hardware::HardwareInterface;
use crate::logger::Logger;
use crate::session::Session;
use crate::timer::Timer;
use crate::MeiiResult;
use log::warn;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Default control period, 1 kHz.
pub const DEFAULT_PERIOD: Duration = Duration::from_millis(1);
/// Number of telemetry rows retained for the fault report.
const LOG_SIZE: usize = 50;
/// Tolerated fraction of cycles missing their deadline.
const MISS_RATE_TOLERANCE: f64 = 0.05;
/// Cycles to observe before the miss rate is enforced.
const MISS_RATE_WARMUP: u64 = 100;

/// Single-threaded fixed-period control loop.
///
/// Each cycle: read sensors, update kinematics, step the session, write
/// torques, kick the watchdog, log telemetry, wait for the next deadline. On
/// any fatal condition the loop commands zero torque, disables the outputs
/// and returns a [`ControlException`](`MeiiException::ControlException`)
/// carrying the last telemetry rows.
pub struct ControlLoop<H: HardwareInterface> {
    hardware: H,
    exo: MahiExoII,
    session: Session,
    logger: Logger,
    period: Duration,
    stop_requested: Arc<AtomicBool>,
}

impl<H: HardwareInterface> ControlLoop<H> {
    /// Creates the loop, optionally moving the current thread to realtime
    /// priority.
    ///
    /// # Errors
    /// * RealTimeException if [`RealtimeConfig::Enforce`] is requested and
    /// realtime priority cannot be set.
    pub fn new(
        hardware: H,
        exo: MahiExoII,
        session: Session,
        realtime_config: RealtimeConfig,
    ) -> MeiiResult<Self> {
        if realtime_config == RealtimeConfig::Enforce {
            set_current_thread_to_highest_scheduler_priority()?;
        }
        Ok(ControlLoop {
            hardware,
            exo,
            session,
            logger: Logger::new(LOG_SIZE),
            period: DEFAULT_PERIOD,
            stop_requested: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Token which requests a cooperative stop when set, from any thread.
    pub fn stop_token(&self) -> Arc<AtomicBool> {
        self.stop_requested.clone()
    }

    /// Runs the loop until the session finishes, a stop is requested or a
    /// fatal condition occurs.
    ///
    /// # Errors
    /// * ControlException wrapping the underlying fault, with the last
    /// telemetry rows attached.
    pub fn run(&mut self) -> MeiiResult<()> {
        if let Err(error) = self.hardware.enable() {
            return Err(self.fail(error));
        }
        let result = self.spin();
        match result {
            Ok(()) => {
                let _ = self.hardware.write_outputs(&Torques::zero());
                self.hardware.disable()?;
                Ok(())
            }
            Err(error) => Err(self.fail(error)),
        }
    }

    fn spin(&mut self) -> MeiiResult<()> {
        let mut timer = Timer::new(self.period);
        let mut time = Duration::ZERO;
        let mut missed_seen = 0;
        loop {
            if self.stop_requested.load(Ordering::Relaxed) {
                return Ok(());
            }
            let readings = self.hardware.read_inputs()?;
            self.exo.update_kinematics(&readings)?;
            let command = self.session.update(&mut self.exo, time)?;
            self.hardware.write_outputs(&command)?;
            self.logger.log(&self.exo.state(time), &command);
            if !self.hardware.kick_watchdog() {
                return Err(MeiiException::HardwareException {
                    message: "libmeii-rs: hardware watchdog tripped".to_string(),
                });
            }
            if command.is_finished() {
                return Ok(());
            }
            time = timer.wait();
            if timer.missed_ticks() > missed_seen {
                missed_seen = timer.missed_ticks();
                warn!(
                    "control cycle missed its deadline ({} of {} cycles)",
                    missed_seen,
                    timer.elapsed_ticks()
                );
            }
            if timer.elapsed_ticks() > MISS_RATE_WARMUP
                && timer.miss_rate() > MISS_RATE_TOLERANCE
            {
                return Err(MeiiException::RealTimeException {
                    message: format!(
                        "libmeii-rs: {:.1}% of control cycles missed their deadline",
                        timer.miss_rate() * 100.
                    ),
                });
            }
        }
    }

    fn fail(&mut self, error: MeiiException) -> MeiiException {
        let _ = self.hardware.write_outputs(&Torques::zero());
        let _ = self.hardware.disable();
        MeiiException::ControlException {
            log: Some(self.logger.flush()),
            error: error.to_string(),
        }
    }
}
