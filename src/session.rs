// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains the rehabilitation-session state machine.
use crate::control_types::{Finishable, Torques};
use crate::exception::MeiiException;
use crate::exo::meii::{MahiExoII, RpsControlMode, N_AJ, N_QS, N_RJ};
use crate::exo::smooth_reference::SmoothReferenceTrajectory;
use crate::trajectory::dmp::DynamicMotionPrimitive;
use crate::trajectory::min_jerk::MinimumJerk;
use crate::trajectory::path::Trajectory;
use crate::utils::{saturate_abs, Integrator, DEG2RAD};
use crate::MeiiResult;
use log::info;
use serde::Deserialize;
use serde::Serialize;
use std::time::Duration;

/// Phases of a session.
///
/// The nominal order is `Backdrive → RpsInit → NeutralMove → NeutralHold →
/// Task → Finished`. `Stopped` is the terminal fault state; any limit
/// violation or hardware fault forces it from every other state.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum SessionState {
    /// All joints passive so the operator can position the arm.
    Backdrive,
    /// The wrist mechanism drives its prismatic joints to the initialization
    /// posture.
    RpsInit,
    /// All anatomical joints move to the neutral posture.
    NeutralMove,
    /// The neutral posture is held until it has settled.
    NeutralHold,
    /// The task planner generates the anatomical reference.
    Task,
    /// The task completed; the loop may wind down.
    Finished,
    /// Terminal fault state, only zero torques are commanded.
    Stopped,
}

/// Timing and posture parameters of a session.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SessionConfig {
    /// How long the device stays passive at the start.
    pub backdrive_time: Duration,
    /// How long the neutral posture is held before the task starts.
    pub neutral_hold_time: Duration,
    /// The anatomical neutral posture.
    pub neutral_position: [f64; N_AJ],
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            backdrive_time: Duration::from_secs(3),
            neutral_hold_time: Duration::from_secs(1),
            neutral_position: [-35. * DEG2RAD, 0., 0., 0., 0.09],
        }
    }
}

/// Estimates the effort the user applies to each anatomical joint, consumed
/// by the learning task variant.
pub trait IntentEstimator {
    /// Effort estimate for the current cycle.
    fn effort(&mut self, state: &crate::exo::exo_state::MeiiState) -> [f64; N_AJ];
}

/// Source of the anatomical reference during the task phase.
pub enum TaskPlanner {
    /// Hold the neutral posture for a fixed time.
    Hold { duration: Duration },
    /// Follow a waypoint trajectory with linear interpolation.
    Follow { trajectory: Trajectory },
    /// Follow a minimum-jerk point-to-point motion.
    MinimumJerk { generator: MinimumJerk },
    /// Follow a dynamic motion primitive.
    Dmp { generator: DynamicMotionPrimitive },
    /// Follow a dynamic motion primitive whose forcing weights adapt to the
    /// estimated user effort.
    DmpLearning {
        generator: DynamicMotionPrimitive,
        estimator: Box<dyn IntentEstimator + Send>,
        learning_rate: f64,
        theta_dot_max: f64,
        learn_period: Duration,
        integrators: Vec<Integrator>,
    },
}

impl TaskPlanner {
    /// Task which holds the neutral posture.
    pub fn hold(duration: Duration) -> Self {
        TaskPlanner::Hold { duration }
    }

    /// Task which follows a waypoint trajectory. The trajectory must already
    /// be valid; a broken plan must not reach the control loop.
    ///
    /// # Errors
    /// * TrajectoryException if the trajectory fails validation or is not
    /// planned in the anatomical degrees of freedom.
    pub fn follow(trajectory: Trajectory) -> MeiiResult<Self> {
        if !trajectory.validate() {
            return Err(MeiiException::TrajectoryException {
                message: "libmeii-rs: task trajectory failed validation".to_string(),
            });
        }
        check_plan_dof(trajectory.front().map_or(0, |waypoint| waypoint.dof()))?;
        Ok(TaskPlanner::Follow { trajectory })
    }

    /// Task which follows a minimum-jerk motion.
    ///
    /// # Errors
    /// * TrajectoryException if the motion is not planned in the anatomical
    /// degrees of freedom.
    pub fn minimum_jerk(generator: MinimumJerk) -> MeiiResult<Self> {
        check_plan_dof(
            generator
                .trajectory()
                .front()
                .map_or(0, |waypoint| waypoint.dof()),
        )?;
        Ok(TaskPlanner::MinimumJerk { generator })
    }

    /// Task which follows a motion primitive.
    ///
    /// # Errors
    /// * TrajectoryException if the motion is not planned in the anatomical
    /// degrees of freedom.
    pub fn dmp(generator: DynamicMotionPrimitive) -> MeiiResult<Self> {
        check_plan_dof(
            generator
                .trajectory()
                .front()
                .map_or(0, |waypoint| waypoint.dof()),
        )?;
        Ok(TaskPlanner::Dmp { generator })
    }

    /// Task which follows a motion primitive and reshapes it online from the
    /// estimated user effort.
    ///
    /// # Errors
    /// * TrajectoryException if the motion is not planned in the anatomical
    /// degrees of freedom.
    pub fn dmp_learning(
        generator: DynamicMotionPrimitive,
        estimator: Box<dyn IntentEstimator + Send>,
        learning_rate: f64,
        theta_dot_max: f64,
        learn_period: Duration,
    ) -> MeiiResult<Self> {
        check_plan_dof(
            generator
                .trajectory()
                .front()
                .map_or(0, |waypoint| waypoint.dof()),
        )?;
        let integrators = generator
            .theta()
            .iter()
            .map(|&weight| Integrator::new(weight))
            .collect();
        Ok(TaskPlanner::DmpLearning {
            generator,
            estimator,
            learning_rate,
            theta_dot_max,
            learn_period,
            integrators,
        })
    }

    fn duration(&self) -> Duration {
        match self {
            TaskPlanner::Hold { duration } => *duration,
            TaskPlanner::Follow { trajectory } => trajectory.duration(),
            TaskPlanner::MinimumJerk { generator } => generator.trajectory().duration(),
            TaskPlanner::Dmp { generator } => generator.trajectory().duration(),
            TaskPlanner::DmpLearning { generator, .. } => generator.trajectory().duration(),
        }
    }

    fn goal(&self, neutral: &[f64; N_AJ]) -> Option<[f64; N_AJ]> {
        let back = match self {
            TaskPlanner::Hold { .. } => return Some(*neutral),
            TaskPlanner::Follow { trajectory } => trajectory.back(),
            TaskPlanner::MinimumJerk { generator } => generator.trajectory().back(),
            TaskPlanner::Dmp { generator } => generator.trajectory().back(),
            TaskPlanner::DmpLearning { generator, .. } => generator.trajectory().back(),
        }?;
        let mut goal = [0.; N_AJ];
        goal.copy_from_slice(&back.pos);
        Some(goal)
    }
}

/// Drives one exoskeleton through the session phases, one call per control
/// cycle.
///
/// The session owns the ramp generators and hands them to the torque setters
/// of the exoskeleton object. Every fatal condition leaves the session in
/// [`SessionState::Stopped`] with zero commanded torques.
pub struct Session {
    config: SessionConfig,
    task: TaskPlanner,
    state: SessionState,
    state_entry: Duration,
    task_start: Duration,
    last_learn: Duration,
    rps_ref: SmoothReferenceTrajectory<N_QS>,
    anat_ref: SmoothReferenceTrajectory<N_AJ>,
}

impl Session {
    /// Creates a session which begins in the backdrive phase.
    ///
    /// The ramp generators take their interpolation speeds from the device
    /// parameters when the respective phase starts.
    pub fn new(config: SessionConfig, task: TaskPlanner) -> Self {
        Session {
            config,
            task,
            state: SessionState::Backdrive,
            state_entry: Duration::ZERO,
            task_start: Duration::ZERO,
            last_learn: Duration::ZERO,
            rps_ref: SmoothReferenceTrajectory::new([0.; N_QS]),
            anat_ref: SmoothReferenceTrajectory::new([0.; N_AJ]),
        }
    }

    /// The current phase.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The task planner driving the task phase.
    pub fn task(&self) -> &TaskPlanner {
        &self.task
    }

    /// Advances the session by one cycle and returns the torque command.
    ///
    /// [`MahiExoII::update_kinematics`] must have been called with this
    /// cycle's readings first.
    ///
    /// # Errors
    /// * LimitException if any joint bound is violated; the session stops.
    /// * Any error of the torque setters; the session stops.
    pub fn update(&mut self, exo: &mut MahiExoII, time: Duration) -> MeiiResult<Torques> {
        if self.state == SessionState::Stopped {
            exo.set_joint_torques([0.; N_RJ]);
            return Ok(Torques::zero().motion_finished());
        }
        if let Some(error) = exo.any_limit_exceeded() {
            self.stop(exo, time);
            return Err(error);
        }
        if let Err(error) = self.step(exo, time) {
            self.stop(exo, time);
            return Err(error);
        }
        let mut torques = Torques::new(*exo.commanded_torques());
        if self.state == SessionState::Finished {
            torques.set_motion_finished(true);
        }
        Ok(torques)
    }

    fn step(&mut self, exo: &mut MahiExoII, time: Duration) -> MeiiResult<()> {
        match self.state {
            SessionState::Backdrive => {
                exo.set_rps_backdrive(true);
                exo.set_elbow_backdrive(true);
                exo.set_forearm_backdrive(true);
                exo.set_joint_torques([0.; N_RJ]);
                if time - self.state_entry >= self.config.backdrive_time {
                    exo.set_rps_control_mode(RpsControlMode::RobotJointSpace);
                    exo.set_rps_backdrive(false);
                    self.rps_ref =
                        SmoothReferenceTrajectory::new(exo.params().rps_par_joint_speed);
                    self.rps_ref.start_with_ref(
                        *exo.rps_init_pos(),
                        exo.wrist_parallel_positions(),
                        time,
                    );
                    self.transition(SessionState::RpsInit, time);
                }
            }
            SessionState::RpsInit => {
                exo.set_joint_torques([0.; N_RJ]);
                exo.set_rps_pos_ctrl_torques(&mut self.rps_ref, time)?;
                if exo.check_rps_init() {
                    self.rps_ref.stop();
                    exo.set_elbow_backdrive(false);
                    exo.set_forearm_backdrive(false);
                    exo.set_rps_control_mode(RpsControlMode::AnatomicalActiveHeight);
                    self.anat_ref = SmoothReferenceTrajectory::new(exo.params().anat_joint_speed);
                    self.anat_ref.start_with_ref(
                        self.config.neutral_position,
                        *exo.anatomical_joint_positions(),
                        time,
                    );
                    self.transition(SessionState::NeutralMove, time);
                }
            }
            SessionState::NeutralMove => {
                exo.set_anat_pos_ctrl_torques(&mut self.anat_ref, time)?;
                if exo.check_goal_anat_pos(self.config.neutral_position, [true; N_AJ]) {
                    self.transition(SessionState::NeutralHold, time);
                }
            }
            SessionState::NeutralHold => {
                exo.set_anat_pos_ctrl_torques(&mut self.anat_ref, time)?;
                if time - self.state_entry >= self.config.neutral_hold_time
                    && exo.check_neutral_anat_pos(self.config.neutral_position, [true; N_AJ])
                {
                    self.task_start = time;
                    self.last_learn = time;
                    self.transition(SessionState::Task, time);
                }
            }
            SessionState::Task => {
                self.step_task(exo, time)?;
            }
            SessionState::Finished | SessionState::Stopped => {
                exo.set_joint_torques([0.; N_RJ]);
            }
        }
        Ok(())
    }

    fn step_task(&mut self, exo: &mut MahiExoII, time: Duration) -> MeiiResult<()> {
        let elapsed = time - self.task_start;
        if let TaskPlanner::DmpLearning {
            generator,
            estimator,
            learning_rate,
            theta_dot_max,
            learn_period,
            integrators,
        } = &mut self.task
        {
            if time - self.last_learn >= *learn_period {
                let state = exo.state(time);
                let effort = estimator.effort(&state);
                let phase = generator.canonical(elapsed);
                if let Some(features) = generator.features_at(&state.anatomical_joint_positions)
                {
                    let mut theta = generator.theta().to_vec();
                    for (j, integrator) in integrators.iter_mut().enumerate() {
                        let gradient: f64 = features
                            .iter()
                            .zip(effort.iter())
                            .map(|(row, effort)| row[j] * effort)
                            .sum();
                        let rate =
                            saturate_abs(*learning_rate * phase * gradient, *theta_dot_max);
                        theta[j] = integrator.update(rate, time);
                    }
                    generator.update(theta);
                }
                self.last_learn = time;
            }
        }
        let reference = match &self.task {
            TaskPlanner::Hold { .. } => self.config.neutral_position.to_vec(),
            TaskPlanner::Follow { trajectory } => trajectory
                .at_time(elapsed)
                .ok_or_else(empty_trajectory)?,
            TaskPlanner::MinimumJerk { generator } => generator
                .trajectory()
                .at_time(elapsed)
                .ok_or_else(empty_trajectory)?,
            TaskPlanner::Dmp { generator } => generator
                .trajectory()
                .at_time(elapsed)
                .ok_or_else(empty_trajectory)?,
            TaskPlanner::DmpLearning { generator, .. } => generator
                .trajectory()
                .at_time(elapsed)
                .ok_or_else(empty_trajectory)?,
        };
        let mut target = [0.; N_AJ];
        target.copy_from_slice(&reference);
        self.anat_ref.set_ref(target, time);
        exo.set_anat_pos_ctrl_torques(&mut self.anat_ref, time)?;
        if elapsed >= self.task.duration() {
            let reached = match self.task.goal(&self.config.neutral_position) {
                Some(goal) => exo.check_goal_anat_pos(goal, [true; N_AJ]),
                None => true,
            };
            if reached {
                self.transition(SessionState::Finished, time);
            }
        }
        Ok(())
    }

    fn stop(&mut self, exo: &mut MahiExoII, time: Duration) {
        exo.set_joint_torques([0.; N_RJ]);
        self.transition(SessionState::Stopped, time);
    }

    fn transition(&mut self, to: SessionState, time: Duration) {
        info!(
            "session state {:?} -> {:?} at {:.3} s",
            self.state,
            to,
            time.as_secs_f64()
        );
        self.state = to;
        self.state_entry = time;
    }
}

fn check_plan_dof(dof: usize) -> MeiiResult<()> {
    if dof != N_AJ {
        return Err(MeiiException::TrajectoryException {
            message: format!(
                "libmeii-rs: task plan has {} degrees of freedom, the device has {}",
                dof, N_AJ
            ),
        });
    }
    Ok(())
}

fn empty_trajectory() -> MeiiException {
    MeiiException::TrajectoryException {
        message: "libmeii-rs: task trajectory is empty".to_string(),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::exo::config::MeiiParameters;
    use crate::hardware::{HardwareInterface, VirtualMeii};
    use crate::trajectory::waypoint::WayPoint;

    const PERIOD: Duration = Duration::from_millis(1);

    fn virtual_rig() -> (MahiExoII, VirtualMeii) {
        let params = MeiiParameters::default();
        let mut plant = VirtualMeii::new(params.rest_positions, PERIOD);
        plant.enable().unwrap();
        (MahiExoII::new(params), plant)
    }

    fn spin(
        session: &mut Session,
        exo: &mut MahiExoII,
        plant: &mut VirtualMeii,
        from: Duration,
        until: Duration,
    ) -> MeiiResult<Torques> {
        let mut command = Torques::zero();
        let mut time = from;
        while time < until {
            let readings = plant.read_inputs()?;
            exo.update_kinematics(&readings)?;
            command = session.update(exo, time)?;
            plant.write_outputs(&command)?;
            time += PERIOD;
        }
        Ok(command)
    }

    #[test]
    fn backdrive_is_passive_then_hands_over_to_rps_init() {
        let (mut exo, mut plant) = virtual_rig();
        let mut session = Session::new(
            SessionConfig::default(),
            TaskPlanner::hold(Duration::from_secs(1)),
        );
        let command = spin(
            &mut session,
            &mut exo,
            &mut plant,
            Duration::ZERO,
            Duration::from_millis(2900),
        )
        .unwrap();
        assert_eq!(session.state(), SessionState::Backdrive);
        assert_eq!(command.tau, [0.; N_RJ]);
        spin(
            &mut session,
            &mut exo,
            &mut plant,
            Duration::from_millis(2900),
            Duration::from_millis(3100),
        )
        .unwrap();
        assert_eq!(session.state(), SessionState::RpsInit);
    }

    #[test]
    fn rps_init_converges_close_to_the_target() {
        let (mut exo, mut plant) = virtual_rig();
        exo.set_rps_control_mode(RpsControlMode::RobotJointSpace);
        let mut reference = SmoothReferenceTrajectory::with_ref([0.015; N_QS], [0.12; N_QS]);
        let rest = exo.params().rest_positions;
        reference.start([rest[2], rest[3], rest[4]], Duration::ZERO);
        let mut time = Duration::ZERO;
        while time < Duration::from_secs(6) {
            let readings = plant.read_inputs().unwrap();
            exo.update_kinematics(&readings).unwrap();
            exo.set_joint_torques([0.; N_RJ]);
            exo.set_rps_pos_ctrl_torques(&mut reference, time).unwrap();
            plant
                .write_outputs(&Torques::new(*exo.commanded_torques()))
                .unwrap();
            time += PERIOD;
        }
        assert!(exo.check_rps_init());
        for leg in 0..N_QS {
            assert!((exo.wrist_parallel_positions()[leg] - 0.12).abs() < 0.003);
        }
        let geometry = exo.params().geometry;
        let offset = geometry.base_radius - geometry.platform_radius;
        let target_height = (0.12f64 * 0.12 - offset * offset).sqrt();
        assert!((exo.wrist_serial_positions()[2] - target_height).abs() < 0.003);
    }

    #[test]
    fn full_session_runs_to_completion() {
        let (mut exo, mut plant) = virtual_rig();
        let mut session = Session::new(
            SessionConfig::default(),
            TaskPlanner::hold(Duration::from_secs(1)),
        );
        let command = spin(
            &mut session,
            &mut exo,
            &mut plant,
            Duration::ZERO,
            Duration::from_secs(15),
        )
        .unwrap();
        assert_eq!(session.state(), SessionState::Finished);
        assert!(command.is_finished());
        let neutral = SessionConfig::default().neutral_position;
        let anatomical = exo.anatomical_joint_positions();
        assert!((anatomical[0] - neutral[0]).abs() < 3. * DEG2RAD);
        assert!((anatomical[4] - neutral[4]).abs() < 0.01);
    }

    #[test]
    fn limit_violation_stops_the_session_with_zero_torque() {
        let (mut exo, _plant) = virtual_rig();
        let mut session = Session::new(
            SessionConfig::default(),
            TaskPlanner::hold(Duration::from_secs(1)),
        );
        let mut readings = crate::hardware::JointReadings {
            positions: exo.params().rest_positions,
            velocities: [0.; N_RJ],
        };
        readings.velocities[1] = 10.;
        exo.update_kinematics(&readings).unwrap();
        let result = session.update(&mut exo, Duration::from_millis(1));
        assert!(matches!(
            result,
            Err(MeiiException::LimitException { joint: 1, .. })
        ));
        assert_eq!(session.state(), SessionState::Stopped);
        // once stopped only zero torque leaves the session
        let command = session.update(&mut exo, Duration::from_millis(2)).unwrap();
        assert_eq!(command.tau, [0.; N_RJ]);
        assert!(command.is_finished());
    }

    #[test]
    fn follow_task_rejects_an_invalid_plan() {
        let mut trajectory = Trajectory::new(vec![0.1; N_AJ]);
        trajectory.push_back(WayPoint::new(Duration::ZERO, vec![0.; N_AJ]));
        trajectory.push_back(WayPoint::new(Duration::from_secs(1), vec![1.; N_AJ]));
        assert!(matches!(
            TaskPlanner::follow(trajectory),
            Err(MeiiException::TrajectoryException { .. })
        ));
    }

    #[test]
    fn task_plans_must_match_the_device_dof() {
        // a plan which is internally valid but not in the anatomical space
        let mut trajectory = Trajectory::new(vec![1.0, 1.0]);
        trajectory.push_back(WayPoint::new(Duration::ZERO, vec![0.0, 0.0]));
        trajectory.push_back(WayPoint::new(Duration::from_secs(1), vec![0.5, 0.5]));
        assert!(trajectory.validate());
        assert!(matches!(
            TaskPlanner::follow(trajectory),
            Err(MeiiException::TrajectoryException { .. })
        ));
        let generator = MinimumJerk::new(
            WayPoint::new(Duration::ZERO, vec![0.0]),
            WayPoint::new(Duration::from_secs(1), vec![0.5]),
            vec![1.0],
        )
        .unwrap();
        assert!(matches!(
            TaskPlanner::minimum_jerk(generator),
            Err(MeiiException::TrajectoryException { .. })
        ));
    }

    #[test]
    fn configured_ramp_speeds_drive_the_initialization() {
        let mut params = MeiiParameters::default();
        params.rps_par_joint_speed = [0.; N_QS];
        let mut plant = VirtualMeii::new(params.rest_positions, PERIOD);
        plant.enable().unwrap();
        let mut exo = MahiExoII::new(params);
        let mut session = Session::new(
            SessionConfig::default(),
            TaskPlanner::hold(Duration::from_secs(1)),
        );
        spin(
            &mut session,
            &mut exo,
            &mut plant,
            Duration::ZERO,
            Duration::from_secs(8),
        )
        .unwrap();
        // a zero interpolation speed pins the reference to the start
        // position, so the initialization target is never approached
        assert_eq!(session.state(), SessionState::RpsInit);
        assert!(!exo.check_rps_init());
    }

    struct SteadyPush;

    impl IntentEstimator for SteadyPush {
        fn effort(&mut self, _state: &crate::exo::exo_state::MeiiState) -> [f64; N_AJ] {
            [1., 0., 0., 0., 0.]
        }
    }

    #[test]
    fn learning_task_integrates_the_capped_weight_rate() {
        use crate::trajectory::dmp::FeatureMap;
        let (mut exo, mut plant) = virtual_rig();
        let neutral = SessionConfig::default().neutral_position;
        let mut goal_pos = neutral.to_vec();
        goal_pos[0] += 5. * DEG2RAD;
        let features: FeatureMap =
            Box::new(|_| vec![vec![1.], vec![0.], vec![0.], vec![0.], vec![0.]]);
        let generator = DynamicMotionPrimitive::with_features(
            WayPoint::new(Duration::ZERO, neutral.to_vec()),
            WayPoint::new(Duration::from_secs(4), goal_pos),
            vec![10.; N_AJ],
            Some(features),
            vec![0.],
        )
        .unwrap();
        let task = TaskPlanner::dmp_learning(
            generator,
            Box::new(SteadyPush),
            1e3,
            0.1,
            Duration::from_millis(50),
        )
        .unwrap();
        let mut session = Session::new(SessionConfig::default(), task);
        spin(
            &mut session,
            &mut exo,
            &mut plant,
            Duration::ZERO,
            Duration::from_secs(15),
        )
        .unwrap();
        assert_eq!(session.state(), SessionState::Finished);
        let theta = match session.task() {
            TaskPlanner::DmpLearning { generator, .. } => generator.theta().to_vec(),
            _ => unreachable!(),
        };
        // the estimator pushes hard, so the weight rate sits at the cap of
        // 0.1 per second for the whole 4 s task
        assert!(theta[0] > 0.25);
        assert!(theta[0] < 0.5);
    }
}
