// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! A position-control session against the simulated device: backdrive,
//! wrist initialization, move to the neutral posture and hold it.
use clap::Parser;
use meii::{
    ControlLoop, MahiExoII, MeiiParameters, MeiiResult, RealtimeConfig, Session, SessionConfig,
    TaskPlanner, VirtualMeii,
};
use std::time::Duration;

/// Runs a full session on the simulated exoskeleton and holds the neutral
/// posture.
#[derive(Parser)]
#[clap(author, version, name = "pos_ctrl")]
struct CommandLineArguments {
    /// How long to hold the neutral posture, in seconds.
    #[clap(long, default_value = "5")]
    hold_time: u64,
    /// Pin the control thread to a realtime scheduler priority.
    #[clap(long)]
    enforce_realtime: bool,
}

fn main() -> MeiiResult<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();
    let arguments = CommandLineArguments::parse();
    let realtime_config = if arguments.enforce_realtime {
        RealtimeConfig::Enforce
    } else {
        RealtimeConfig::Ignore
    };
    let params = MeiiParameters::default();
    let plant = VirtualMeii::new(params.rest_positions, Duration::from_millis(1));
    let exo = MahiExoII::new(params);
    let session = Session::new(
        SessionConfig::default(),
        TaskPlanner::hold(Duration::from_secs(arguments.hold_time)),
    );
    let mut control_loop = ControlLoop::new(plant, exo, session, realtime_config)?;
    control_loop.run()?;
    println!("session finished");
    Ok(())
}
