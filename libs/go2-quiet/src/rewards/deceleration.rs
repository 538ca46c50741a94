//! Quiet-landing reward: slow the feet down late in the swing without
//! shortening the stride.
//!
//! Two conditions are checked for every foot on every step:
//!
//! - the foot has been airborne for longer than `min_air_time` but not longer
//!   than `min_air_time + deceleration_phase` (late swing), and
//! - the foot touched down this step after a swing longer than `min_air_time`
//!   (good landing).
//!
//! Each foot earns `exp(-speed / velocity_threshold)` weighted by
//! `0.3 * late_swing + 0.7 * good_landing`. Feet that have not yet been in the
//! air for `min_air_time` earn nothing, whatever their speed.
//!
//! Unlike the air-time terms this reward is not gated on the velocity command.

use nalgebra as na;
use serde::Serialize;

use super::{check_batch, RewardTerm};
use crate::config::{AirTimeSource, FootDecelerationParams};
use crate::error::RewardError;
use crate::scene::{select_bodies, EnvState};

pub const PHASE_WEIGHT: f32 = 0.3;
pub const LANDING_WEIGHT: f32 = 0.7;

/// Per-foot intermediate values of one evaluation.
struct SwingPhase {
    air_time: na::DMatrix<f32>,
    speeds: na::DMatrix<f32>,
    sufficient_air: na::DMatrix<bool>,
    in_phase: na::DMatrix<bool>,
    good_landing: na::DMatrix<bool>,
    reward: na::DVector<f32>,
}

fn evaluate(
    env: &dyn EnvState,
    params: &FootDecelerationParams,
) -> Result<SwingPhase, RewardError> {
    let sensor = env.contact_sensor(&params.sensor_cfg.name)?;
    let robot = env.articulation(&params.asset_cfg.name)?;

    // Sensor body ids index the robot bodies too.
    let ids = &params.sensor_cfg.body_ids;
    params.sensor_cfg.check_ids(sensor.num_bodies())?;
    params.sensor_cfg.check_ids(robot.num_bodies())?;
    check_batch(env, &params.sensor_cfg.name, sensor.num_envs())?;
    check_batch(env, &params.asset_cfg.name, robot.body_lin_vel_w.nrows())?;

    let speeds = robot.body_speeds(ids);
    let air_time = select_bodies(&sensor.current_air_time, ids);
    if speeds.shape() != air_time.shape() {
        return Err(RewardError::shape(
            "foot velocities",
            format!("{:?}", air_time.shape()),
            format!("{:?}", speeds.shape()),
        ));
    }

    let first_contact = select_bodies(&sensor.compute_first_contact(env.step_dt()), ids);
    let landing_air_time = match params.landing_air_time {
        AirTimeSource::Current => air_time.clone(),
        AirTimeSource::LastSwing => select_bodies(&sensor.last_air_time, ids),
    };

    let min_air = params.min_air_time;
    let phase_end = params.min_air_time + params.deceleration_phase;

    let sufficient_air = air_time.map(|t| t > min_air);
    let in_phase = air_time.map(|t| t > min_air && t <= phase_end);
    let good_landing = first_contact.zip_map(&landing_air_time, |first, t| first && t > min_air);

    let velocity_reward = speeds.map(|s| (-s / params.velocity_threshold).exp());
    let weight = in_phase.zip_map(&good_landing, |phase, landing| {
        let mut w = 0.0;
        if phase {
            w += PHASE_WEIGHT;
        }
        if landing {
            w += LANDING_WEIGHT;
        }
        w
    });
    let phase_reward = velocity_reward.component_mul(&weight);

    let reward = na::DVector::from_fn(phase_reward.nrows(), |i, _| phase_reward.row(i).sum());

    Ok(SwingPhase {
        air_time,
        speeds,
        sufficient_air,
        in_phase,
        good_landing,
        reward,
    })
}

/// Quiet-landing reward for every env, without debug bookkeeping.
pub fn foot_deceleration_swing_phase(
    env: &dyn EnvState,
    params: &FootDecelerationParams,
) -> Result<na::DVector<f32>, RewardError> {
    Ok(evaluate(env, params)?.reward)
}

/// Snapshot of one env plus population-wide phase counts.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FootDecelerationDebug {
    pub step: u64,
    pub env_index: usize,
    pub air_times: Vec<f32>,
    pub foot_speeds: Vec<f32>,
    pub in_deceleration_phase: Vec<bool>,
    pub good_landings: Vec<bool>,
    pub total_reward: f32,
    pub feet_with_sufficient_air: usize,
    pub feet_in_deceleration_phase: usize,
    pub good_landings_count: usize,
    pub air_time_min: f32,
    pub air_time_max: f32,
}

impl FootDecelerationDebug {
    fn capture(step: u64, env_index: usize, eval: &SwingPhase) -> Option<Self> {
        if env_index >= eval.reward.len() {
            return None;
        }
        let row_f32 = |m: &na::DMatrix<f32>| m.row(env_index).iter().copied().collect::<Vec<_>>();
        let row_bool = |m: &na::DMatrix<bool>| m.row(env_index).iter().copied().collect::<Vec<_>>();
        let count = |m: &na::DMatrix<bool>| m.iter().filter(|&&b| b).count();

        Some(Self {
            step,
            env_index,
            air_times: row_f32(&eval.air_time),
            foot_speeds: row_f32(&eval.speeds),
            in_deceleration_phase: row_bool(&eval.in_phase),
            good_landings: row_bool(&eval.good_landing),
            total_reward: eval.reward[env_index],
            feet_with_sufficient_air: count(&eval.sufficient_air),
            feet_in_deceleration_phase: count(&eval.in_phase),
            good_landings_count: count(&eval.good_landing),
            air_time_min: eval.air_time.iter().copied().fold(f32::INFINITY, f32::min),
            air_time_max: eval.air_time.iter().copied().fold(f32::NEG_INFINITY, f32::max),
        })
    }
}

/// Reward-term object for [`foot_deceleration_swing_phase`].
///
/// Owns the step counter used to pace debug snapshots. The counter lives and
/// dies with the term, so rebuilding the term restarts it.
pub struct FootDecelerationSwingPhase {
    name: String,
    pub params: FootDecelerationParams,
    step_count: u64,
    last_debug: Option<FootDecelerationDebug>,
}

impl FootDecelerationSwingPhase {
    pub fn new(name: impl Into<String>, params: FootDecelerationParams) -> Self {
        Self {
            name: name.into(),
            params,
            step_count: 0,
            last_debug: None,
        }
    }

    /// Number of evaluations so far.
    pub fn step_count(&self) -> u64 {
        self.step_count
    }

    /// Most recent debug snapshot, if debug output is enabled and one was due.
    pub fn last_debug(&self) -> Option<&FootDecelerationDebug> {
        self.last_debug.as_ref()
    }

    fn debug_due(&self) -> bool {
        self.params.debug
            && self
                .step_count
                .checked_rem(self.params.debug_print_freq)
                .is_some_and(|r| r == 0)
    }

    fn emit_debug(&mut self, eval: &SwingPhase) {
        let env_index = self.params.debug_env_index;
        let Some(snapshot) = FootDecelerationDebug::capture(self.step_count, env_index, eval) else {
            log::warn!(
                "{}: debug env {} not in batch of {}",
                self.name,
                env_index,
                eval.reward.len()
            );
            return;
        };

        match serde_json::to_string(&snapshot) {
            Ok(json) => log::info!("{} debug: {}", self.name, json),
            Err(e) => log::warn!("{}: failed to serialize debug snapshot: {}", self.name, e),
        }
        self.last_debug = Some(snapshot);
    }
}

impl RewardTerm for FootDecelerationSwingPhase {
    fn name(&self) -> &str {
        &self.name
    }

    fn compute(&mut self, env: &dyn EnvState) -> Result<na::DVector<f32>, RewardError> {
        let eval = evaluate(env, &self.params)?;
        self.step_count += 1;
        if self.debug_due() {
            self.emit_debug(&eval);
        }
        Ok(eval.reward)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Go2Config;
    use crate::scene::{ArticulationData, ContactSensorData, SceneEntityCfg, SceneSnapshot};
    use approx::assert_relative_eq;
    use rand::Rng;

    const DT: f32 = Go2Config::CONTROL_DT;

    fn params() -> FootDecelerationParams {
        FootDecelerationParams {
            sensor_cfg: SceneEntityCfg::with_ids("contact_forces", vec![0]),
            asset_cfg: SceneEntityCfg::new("robot"),
            velocity_threshold: 0.3,
            min_air_time: 0.05,
            deceleration_phase: 0.1,
            ..FootDecelerationParams::default()
        }
    }

    /// One env, one foot.
    fn single_foot(air_time: f32, contact_time: f32, speed: f32) -> SceneSnapshot {
        let mut sensor = ContactSensorData::new(1, vec!["FL_foot".into()]);
        sensor.current_air_time[(0, 0)] = air_time;
        sensor.current_contact_time[(0, 0)] = contact_time;
        let mut robot = ArticulationData::new(1, vec!["FL_foot".into()]);
        robot.body_lin_vel_w[(0, 0)] = na::Vector3::new(speed, 0.0, 0.0);
        SceneSnapshot::new(1, DT)
            .with_sensor("contact_forces", sensor)
            .with_articulation("robot", robot)
    }

    fn reward_of(scene: &SceneSnapshot) -> f32 {
        foot_deceleration_swing_phase(scene, &params()).unwrap()[0]
    }

    #[test]
    fn test_inside_window() {
        let reward = reward_of(&single_foot(0.10, 0.0, 0.3));
        assert_relative_eq!(reward, (-1.0f32).exp() * 0.3, epsilon = 1e-6);
        assert_relative_eq!(reward, 0.1104, epsilon = 1e-4);
    }

    #[test]
    fn test_below_min_air_time() {
        for speed in [0.0, 0.3, 5.0] {
            assert_eq!(reward_of(&single_foot(0.03, 0.0, speed)), 0.0);
        }
        // the boundary itself is excluded
        assert_eq!(reward_of(&single_foot(0.05, 0.0, 0.0)), 0.0);
    }

    #[test]
    fn test_landing_after_window() {
        let reward = reward_of(&single_foot(0.25, DT, 0.0));
        assert_relative_eq!(reward, 0.7, epsilon = 1e-6);
    }

    #[test]
    fn test_landing_inside_window() {
        let reward = reward_of(&single_foot(0.12, DT, 0.0));
        assert_relative_eq!(reward, 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_late_swing_without_landing() {
        // past the window and not touching down
        assert_eq!(reward_of(&single_foot(0.4, 0.0, 0.0)), 0.0);
    }

    #[test]
    fn test_velocity_kernel_monotone() {
        let mut previous = reward_of(&single_foot(0.1, 0.0, 0.0));
        assert_relative_eq!(previous, PHASE_WEIGHT);
        for k in 1..50 {
            let r = reward_of(&single_foot(0.1, 0.0, k as f32 * 0.1));
            assert!(r < previous && r > 0.0);
            previous = r;
        }
    }

    #[test]
    fn test_sums_feet_independently() {
        let feet: Vec<String> = ["FL_foot", "FR_foot", "RL_foot", "RR_foot"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let mut sensor = ContactSensorData::new(2, feet.clone());
        // env 0: FL in window, FR landing after a long swing, RL too early, RR standing
        sensor.current_air_time = na::DMatrix::from_row_slice(
            2,
            4,
            &[0.1, 0.3, 0.02, 0.0, 0.0, 0.0, 0.0, 0.0],
        );
        sensor.current_contact_time = na::DMatrix::from_row_slice(
            2,
            4,
            &[0.0, DT, 0.0, 0.5, 0.3, 0.3, 0.3, 0.3],
        );
        let robot = ArticulationData::new(2, feet);
        let scene = SceneSnapshot::new(2, DT)
            .with_sensor("contact_forces", sensor)
            .with_articulation("robot", robot);

        let p = FootDecelerationParams {
            sensor_cfg: SceneEntityCfg::with_ids("contact_forces", vec![0, 1, 2, 3]),
            ..params()
        };
        let reward = foot_deceleration_swing_phase(&scene, &p).unwrap();
        assert_relative_eq!(reward[0], PHASE_WEIGHT + LANDING_WEIGHT, epsilon = 1e-6);
        assert_eq!(reward[1], 0.0);
    }

    #[test]
    fn test_no_command_gating() {
        // a standing command does not switch the shaping off
        let scene =
            single_foot(0.1, 0.0, 0.0).with_command("base_velocity", na::DMatrix::zeros(1, 3));
        assert_relative_eq!(reward_of(&scene), PHASE_WEIGHT);
    }

    #[test]
    fn test_last_swing_source() {
        let mut scene = single_foot(0.0, DT, 0.0);
        scene.sensors.get_mut("contact_forces").unwrap().last_air_time[(0, 0)] = 0.25;

        // the running timer is already zero at touchdown
        assert_eq!(reward_of(&scene), 0.0);

        let p = FootDecelerationParams {
            landing_air_time: AirTimeSource::LastSwing,
            ..params()
        };
        assert_relative_eq!(foot_deceleration_swing_phase(&scene, &p).unwrap()[0], LANDING_WEIGHT);
    }

    #[test]
    fn test_zero_threshold_is_not_finite() {
        let p = FootDecelerationParams {
            velocity_threshold: 0.0,
            ..params()
        };
        let reward = foot_deceleration_swing_phase(&single_foot(0.1, 0.0, 0.0), &p).unwrap();
        assert!(!reward[0].is_finite());
    }

    #[test]
    fn test_unknown_sensor() {
        let p = FootDecelerationParams {
            sensor_cfg: SceneEntityCfg::with_ids("feet_contact", vec![0]),
            ..params()
        };
        assert!(matches!(
            foot_deceleration_swing_phase(&single_foot(0.1, 0.0, 0.0), &p),
            Err(RewardError::UnknownSensor(_))
        ));
    }

    #[test]
    fn test_batch_must_match_env() {
        let mut scene = single_foot(0.1, 0.0, 0.0);
        scene.num_envs = 2;
        assert!(matches!(
            foot_deceleration_swing_phase(&scene, &params()),
            Err(RewardError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_debug_snapshot_cadence() {
        let scene = single_foot(0.1, 0.0, 0.3);
        let mut term = FootDecelerationSwingPhase::new(
            "foot_deceleration",
            FootDecelerationParams {
                debug: true,
                debug_print_freq: 3,
                ..params()
            },
        );

        let mut rewards = Vec::new();
        for _ in 0..2 {
            rewards.push(term.compute(&scene).unwrap()[0]);
            assert!(term.last_debug().is_none());
        }
        rewards.push(term.compute(&scene).unwrap()[0]);
        assert_eq!(term.step_count(), 3);

        let snapshot = term.last_debug().unwrap();
        assert_eq!(snapshot.step, 3);
        assert_eq!(snapshot.air_times, vec![0.1]);
        assert_eq!(snapshot.in_deceleration_phase, vec![true]);
        assert_eq!(snapshot.good_landings, vec![false]);
        assert_eq!(snapshot.feet_in_deceleration_phase, 1);
        assert_eq!(snapshot.feet_with_sufficient_air, 1);
        assert_eq!(snapshot.air_time_min, 0.1);
        assert_eq!(snapshot.air_time_max, 0.1);
        assert_eq!(snapshot.total_reward, rewards[2]);
        assert!(rewards.iter().all(|&r| r == rewards[0]));
    }

    #[test]
    fn test_debug_never_changes_reward() {
        let mut rng = rand::rng();
        let feet: Vec<String> = (0..4).map(|i| format!("foot_{i}")).collect();
        let p = FootDecelerationParams {
            sensor_cfg: SceneEntityCfg::with_ids("contact_forces", vec![0, 1, 2, 3]),
            ..params()
        };
        let mut quiet = FootDecelerationSwingPhase::new("quiet", p.clone());
        let mut noisy = FootDecelerationSwingPhase::new(
            "noisy",
            FootDecelerationParams {
                debug: true,
                debug_print_freq: 1,
                debug_env_index: 99,
                ..p
            },
        );

        for _ in 0..20 {
            let n = rng.random_range(1..8);
            let mut sensor = ContactSensorData::new(n, feet.clone());
            sensor.current_air_time = na::DMatrix::from_fn(n, 4, |_, _| rng.random_range(0.0..0.3));
            sensor.current_contact_time =
                na::DMatrix::from_fn(n, 4, |_, _| rng.random_range(0.0..0.04));
            let mut robot = ArticulationData::new(n, feet.clone());
            robot.body_lin_vel_w = na::DMatrix::from_fn(n, 4, |_, _| {
                na::Vector3::new(rng.random_range(-1.0..1.0), rng.random_range(-1.0..1.0), 0.0)
            });
            let scene = SceneSnapshot::new(n, DT)
                .with_sensor("contact_forces", sensor)
                .with_articulation("robot", robot);

            let a = quiet.compute(&scene).unwrap();
            let b = noisy.compute(&scene).unwrap();
            assert_eq!(a, b);
            assert!(a.iter().all(|&r| (0.0..=4.0).contains(&r)));
        }
        // env 99 never exists, so no snapshot is kept
        assert!(noisy.last_debug().is_none());
        assert_eq!(noisy.step_count(), 20);
    }

    #[test]
    fn test_zero_print_freq_does_not_panic() {
        let mut term = FootDecelerationSwingPhase::new(
            "foot_deceleration",
            FootDecelerationParams {
                debug: true,
                debug_print_freq: 0,
                ..params()
            },
        );
        term.compute(&single_foot(0.1, 0.0, 0.0)).unwrap();
        assert!(term.last_debug().is_none());
    }
}
