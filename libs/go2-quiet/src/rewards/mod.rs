//! Reward terms and the manager that sums them into the training signal.

mod air_time;
mod deceleration;
mod manager;

pub use air_time::{
    feet_air_time, feet_air_time_positive_biped, FeetAirTime, FeetAirTimePositiveBiped,
};
pub use deceleration::{
    foot_deceleration_swing_phase, FootDecelerationDebug, FootDecelerationSwingPhase,
};
pub use manager::RewardManager;

use nalgebra as na;

use crate::config::{Go2Config, RewardKind};
use crate::error::RewardError;
use crate::scene::EnvState;

/// A per-step reward evaluated over every env in the batch.
pub trait RewardTerm: Send {
    fn name(&self) -> &str;

    /// One value per env.
    fn compute(&mut self, env: &dyn EnvState) -> Result<na::DVector<f32>, RewardError>;
}

/// Rows of a per-env array must match the batch size.
pub(crate) fn check_batch(env: &dyn EnvState, what: &str, rows: usize) -> Result<(), RewardError> {
    if rows != env.num_envs() {
        return Err(RewardError::shape(what, env.num_envs(), rows));
    }
    Ok(())
}

/// 1.0 for envs whose planar command exceeds the standing threshold, else 0.0.
pub(crate) fn moving_command_mask(
    env: &dyn EnvState,
    command_name: &str,
) -> Result<na::DVector<f32>, RewardError> {
    let command = env.command(command_name)?;
    if command.nrows() != env.num_envs() || command.ncols() < 2 {
        return Err(RewardError::shape(
            format!("command {command_name}"),
            format!("[{}, >=2]", env.num_envs()),
            format!("[{}, {}]", command.nrows(), command.ncols()),
        ));
    }

    Ok(na::DVector::from_fn(command.nrows(), |i, _| {
        let planar = command[(i, 0)].hypot(command[(i, 1)]);
        if planar > Go2Config::STANDING_COMMAND_NORM {
            1.0
        } else {
            0.0
        }
    }))
}

/// Instantiate a configured term, resolving its body patterns against `env`.
///
/// Returns `Ok(None)` for terms the training framework evaluates itself.
pub fn build_term(
    name: &str,
    kind: &RewardKind,
    env: &dyn EnvState,
) -> Result<Option<Box<dyn RewardTerm>>, RewardError> {
    let term: Box<dyn RewardTerm> = match kind {
        RewardKind::FeetAirTime(params) => {
            let mut params = params.clone();
            let sensor = env.contact_sensor(&params.sensor_cfg.name)?;
            params.sensor_cfg.resolve(&sensor.body_names)?;
            Box::new(FeetAirTime::new(name, params))
        }
        RewardKind::FeetAirTimePositiveBiped(params) => {
            let mut params = params.clone();
            let sensor = env.contact_sensor(&params.sensor_cfg.name)?;
            params.sensor_cfg.resolve(&sensor.body_names)?;
            Box::new(FeetAirTimePositiveBiped::new(name, params))
        }
        RewardKind::FootDecelerationSwingPhase(params) => {
            let mut params = params.clone();
            let sensor = env.contact_sensor(&params.sensor_cfg.name)?;
            params.sensor_cfg.resolve(&sensor.body_names)?;
            let robot = env.articulation(&params.asset_cfg.name)?;
            params.asset_cfg.resolve(&robot.body_names)?;
            Box::new(FootDecelerationSwingPhase::new(name, params))
        }
        RewardKind::External(ext) => {
            log::debug!("reward term {name} ({}) is evaluated externally", ext.name);
            return Ok(None);
        }
    };
    Ok(Some(term))
}
