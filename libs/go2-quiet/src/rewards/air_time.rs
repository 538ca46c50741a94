//! Stride-length terms the quiet-landing reward is layered on.

use nalgebra as na;

use super::{check_batch, moving_command_mask, RewardTerm};
use crate::config::{AirTimeParams, BipedAirTimeParams};
use crate::error::RewardError;
use crate::scene::{select_bodies, EnvState, SceneEntityCfg};

/// Reward long steps.
///
/// On the step a foot touches down, adds `last_air_time - threshold` for that
/// foot, so swings shorter than `threshold` are penalised. Zero for envs that
/// are commanded to stand still.
pub fn feet_air_time(
    env: &dyn EnvState,
    command_name: &str,
    sensor_cfg: &SceneEntityCfg,
    threshold: f32,
) -> Result<na::DVector<f32>, RewardError> {
    let sensor = env.contact_sensor(&sensor_cfg.name)?;
    sensor_cfg.check_ids(sensor.num_bodies())?;
    check_batch(env, &sensor_cfg.name, sensor.num_envs())?;

    let ids = &sensor_cfg.body_ids;
    let first_contact = select_bodies(&sensor.compute_first_contact(env.step_dt()), ids);
    let last_air_time = select_bodies(&sensor.last_air_time, ids);

    let reward = na::DVector::from_fn(last_air_time.nrows(), |i, _| {
        last_air_time
            .row(i)
            .iter()
            .zip(first_contact.row(i).iter())
            .map(|(&t, &first)| if first { t - threshold } else { 0.0 })
            .sum::<f32>()
    });

    Ok(reward.component_mul(&moving_command_mask(env, command_name)?))
}

/// Reward single-stance phases for two-legged gaits, up to `threshold` seconds.
///
/// When exactly one tracked body is in contact, the reward is the shortest
/// current mode time (contact time for the stance body, air time for the
/// others). Any other contact pattern earns nothing.
pub fn feet_air_time_positive_biped(
    env: &dyn EnvState,
    command_name: &str,
    threshold: f32,
    sensor_cfg: &SceneEntityCfg,
) -> Result<na::DVector<f32>, RewardError> {
    let sensor = env.contact_sensor(&sensor_cfg.name)?;
    sensor_cfg.check_ids(sensor.num_bodies())?;
    check_batch(env, &sensor_cfg.name, sensor.num_envs())?;

    let ids = &sensor_cfg.body_ids;
    let air_time = select_bodies(&sensor.current_air_time, ids);
    let contact_time = select_bodies(&sensor.current_contact_time, ids);

    let reward = na::DVector::from_fn(air_time.nrows(), |i, _| {
        let in_contact = contact_time.row(i).iter().filter(|&&t| t > 0.0).count();
        if in_contact != 1 {
            return 0.0;
        }
        let min_mode_time = air_time
            .row(i)
            .iter()
            .zip(contact_time.row(i).iter())
            .map(|(&air, &contact)| if contact > 0.0 { contact } else { air })
            .fold(f32::INFINITY, f32::min);
        min_mode_time.min(threshold)
    });

    Ok(reward.component_mul(&moving_command_mask(env, command_name)?))
}

pub struct FeetAirTime {
    name: String,
    pub params: AirTimeParams,
}

impl FeetAirTime {
    pub fn new(name: impl Into<String>, params: AirTimeParams) -> Self {
        Self {
            name: name.into(),
            params,
        }
    }
}

impl RewardTerm for FeetAirTime {
    fn name(&self) -> &str {
        &self.name
    }

    fn compute(&mut self, env: &dyn EnvState) -> Result<na::DVector<f32>, RewardError> {
        feet_air_time(
            env,
            &self.params.command_name,
            &self.params.sensor_cfg,
            self.params.threshold,
        )
    }
}

pub struct FeetAirTimePositiveBiped {
    name: String,
    pub params: BipedAirTimeParams,
}

impl FeetAirTimePositiveBiped {
    pub fn new(name: impl Into<String>, params: BipedAirTimeParams) -> Self {
        Self {
            name: name.into(),
            params,
        }
    }
}

impl RewardTerm for FeetAirTimePositiveBiped {
    fn name(&self) -> &str {
        &self.name
    }

    fn compute(&mut self, env: &dyn EnvState) -> Result<na::DVector<f32>, RewardError> {
        feet_air_time_positive_biped(
            env,
            &self.params.command_name,
            self.params.threshold,
            &self.params.sensor_cfg,
        )
    }
}
