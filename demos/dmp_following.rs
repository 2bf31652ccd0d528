// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! A session whose task follows a dynamic motion primitive from the neutral
//! posture towards an extended one.
use clap::Parser;
use meii::utils::DEG2RAD;
use meii::{
    ControlLoop, DynamicMotionPrimitive, MahiExoII, MeiiParameters, MeiiResult, RealtimeConfig,
    Session, SessionConfig, TaskPlanner, VirtualMeii, WayPoint,
};
use std::time::Duration;

/// Runs a motion-primitive reference on the simulated exoskeleton.
#[derive(Parser)]
#[clap(author, version, name = "dmp_following")]
struct CommandLineArguments {
    /// Duration of the motion, in seconds.
    #[clap(long, default_value = "8")]
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
        vec![-20. * DEG2RAD, 0., -5. * DEG2RAD, 5. * DEG2RAD, 0.095],
    );
    let max_diff = vec![10. * DEG2RAD, 10. * DEG2RAD, 5. * DEG2RAD, 5. * DEG2RAD, 0.01];
    let generator = DynamicMotionPrimitive::new(start, goal, max_diff)?;
    let params = MeiiParameters::default();
    let plant = VirtualMeii::new(params.rest_positions, Duration::from_millis(1));
    let exo = MahiExoII::new(params);
    let session = Session::new(config, TaskPlanner::dmp(generator)?);
    let mut control_loop = ControlLoop::new(plant, exo, session, RealtimeConfig::Ignore)?;
    control_loop.run()?;
    println!("motion finished");
    Ok(())
}
