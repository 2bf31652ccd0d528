// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains the telemetry type definitions for [`ControlException`](`crate::exception::MeiiException::ControlException`)
use crate::control_types::Torques;
use crate::exo::exo_state::MeiiState;
use std::collections::VecDeque;

/// One row of the log contains a torque command of timestamp n and a
/// corresponding exoskeleton state of timestamp n+1.
/// Provided by the [`ControlException`](`crate::exception::MeiiException::ControlException`).
#[derive(Debug, Clone)]
pub struct Record {
    /// Exoskeleton state of timestamp n+1.
    pub state: MeiiState,
    /// Torque command of timestamp n.
    pub command: Torques,
}

impl Record {
    /// creates a string representation based on the debug formatter
    pub fn log(&self) -> String {
        format!("{:?}", self)
    }
}

pub(crate) struct Logger {
    states: VecDeque<MeiiState>,
    commands: VecDeque<Torques>,
    log_size: usize,
}

impl Logger {
    pub fn new(log_size: usize) -> Self {
        Logger {
            states: VecDeque::with_capacity(log_size),
            commands: VecDeque::with_capacity(log_size),
            log_size,
        }
    }
    pub fn log(&mut self, state: &MeiiState, command: &Torques) {
        if self.states.len() == self.log_size {
            self.states.pop_front();
            self.commands.pop_front();
        }
        self.states.push_back(state.clone());
        self.commands.push_back(*command);
    }
    /// Empties the ring and returns the retained rows, oldest first.
    pub fn flush(&mut self) -> Vec<Record> {
        let mut out: Vec<Record> = Vec::with_capacity(self.states.len());
        while let (Some(state), Some(command)) = (self.states.pop_front(), self.commands.pop_front())
        {
            out.push(Record { state, command });
        }
        out
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn logger_keeps_only_the_last_rows() {
        let mut logger = Logger::new(3);
        for i in 0..5 {
            let mut state = MeiiState::default();
            state.time = std::time::Duration::from_millis(i);
            logger.log(&state, &Torques::new([i as f64; 5]));
        }
        let records = logger.flush();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].command.tau[0], 2.);
        assert_eq!(records[2].command.tau[0], 4.);
        assert!(logger.flush().is_empty());
    }
}
