// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains the periodic timer used by the control loop.
use std::time::{Duration, Instant};

/// Window before each deadline in which the timer switches from sleeping to
/// busy-waiting. Sleeping right up to the deadline overshoots by the OS
/// scheduling quantum.
const SPIN_WINDOW: Duration = Duration::from_micros(200);

/// Fixed-period timer with hybrid sleep/busy-wait waiting.
///
/// [`wait`](`Timer::wait`) blocks until the next multiple of the period after
/// the construction instant. Cycles which were already past their deadline on
/// entry are counted as missed; the deadline schedule itself never drifts.
pub struct Timer {
    period: Duration,
    start: Instant,
    next_deadline: Duration,
    elapsed_ticks: u64,
    missed_ticks: u64,
}

impl Timer {
    /// Starts a timer whose first deadline is one period from now.
    pub fn new(period: Duration) -> Self {
        Timer {
            period,
            start: Instant::now(),
            next_deadline: period,
            elapsed_ticks: 0,
            missed_ticks: 0,
        }
    }

    /// Blocks until the next deadline and returns the time elapsed since the
    /// timer was started.
    pub fn wait(&mut self) -> Duration {
        let deadline = self.next_deadline;
        self.next_deadline += self.period;
        self.elapsed_ticks += 1;
        if self.start.elapsed() > deadline {
            self.missed_ticks += 1;
            return self.start.elapsed();
        }
        loop {
            let now = self.start.elapsed();
            if now >= deadline {
                return now;
            }
            let remaining = deadline - now;
            if remaining > SPIN_WINDOW {
                std::thread::sleep(remaining - SPIN_WINDOW);
            } else {
                std::hint::spin_loop();
            }
        }
    }

    /// Number of completed wait cycles.
    pub fn elapsed_ticks(&self) -> u64 {
        self.elapsed_ticks
    }

    /// Number of cycles which were already past their deadline when
    /// [`wait`](`Timer::wait`) was entered.
    pub fn missed_ticks(&self) -> u64 {
        self.missed_ticks
    }

    /// Fraction of elapsed cycles which missed their deadline.
    pub fn miss_rate(&self) -> f64 {
        if self.elapsed_ticks == 0 {
            return 0.;
        }
        self.missed_ticks as f64 / self.elapsed_ticks as f64
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn timer_does_not_drift() {
        let mut timer = Timer::new(Duration::from_millis(2));
        for _ in 0..10 {
            timer.wait();
        }
        let elapsed = timer.wait();
        assert_eq!(timer.elapsed_ticks(), 11);
        assert!(elapsed >= Duration::from_millis(22));
    }

    #[test]
    fn timer_counts_missed_deadlines() {
        let mut timer = Timer::new(Duration::from_micros(100));
        std::thread::sleep(Duration::from_millis(5));
        timer.wait();
        assert_eq!(timer.missed_ticks(), 1);
        assert!(timer.miss_rate() > 0.99);
    }
}
