// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! A session whose task follows a minimum-jerk motion from the neutral
//! posture to a flexed one.
use clap::Parser;
use meii::utils::DEG2RAD;
use meii::{
    ControlLoop, MahiExoII, MeiiParameters, MeiiResult, MinimumJerk, RealtimeConfig, Session,
    SessionConfig, TaskPlanner, VirtualMeii, WayPoint,
};
use std::time::Duration;

/// Runs a minimum-jerk anatomical motion on the simulated exoskeleton.
#[derive(Parser)]
#[clap(author, version, name = "min_jerk_motion")]
struct CommandLineArguments {
    /// Duration of the motion, in seconds.
    #[clap(long, default_value = "5")]
    motion_time: u64,
}

fn main() -> MeiiResult<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();
    let arguments = CommandLineArguments::parse();
    let config = SessionConfig::default();
    let start = WayPoint::new(Duration::ZERO, config.neutral_position.to_vec());
    let goal = WayPoint::new(
        Duration::from_secs(arguments.motion_time),
        vec![-55. * DEG2RAD, 20. * DEG2RAD, 10. * DEG2RAD, 0., 0.10],
    );
    let max_diff = vec![10. * DEG2RAD, 10. * DEG2RAD, 5. * DEG2RAD, 5. * DEG2RAD, 0.01];
    let generator = MinimumJerk::new(start, goal, max_diff)?;
    let params = MeiiParameters::default();
    let plant = VirtualMeii::new(params.rest_positions, Duration::from_millis(1));
    let exo = MahiExoII::new(params);
    let session = Session::new(config, TaskPlanner::minimum_jerk(generator)?);
    let mut control_loop = ControlLoop::new(plant, exo, session, RealtimeConfig::Ignore)?;
    control_loop.run()?;
    println!("motion finished");
    Ok(())
}
