//! Parameters of the reward terms and Go2 constants shared by the task configs.

use serde::{Deserialize, Serialize};

use crate::scene::SceneEntityCfg;

pub struct Go2Config;

impl Go2Config {
    // Scene entity names
    pub const ROBOT: &'static str = "robot";
    pub const CONTACT_SENSOR: &'static str = "contact_forces";
    pub const VELOCITY_COMMAND: &'static str = "base_velocity";

    // Body patterns
    pub const FOOT_BODIES: &'static str = ".*_foot";
    pub const THIGH_BODIES: &'static str = ".*_thigh";

    /// Planar command norm at or below which locomotion is not requested.
    pub const STANDING_COMMAND_NORM: f32 = 0.1;

    /// Weight of the quiet-landing term in the total reward.
    pub const QUIET_LANDING_WEIGHT: f32 = 0.25;

    pub const ACTION_SCALE: f32 = 0.25;
    pub const CONTROL_DT: f32 = 0.02;
}

fn feet_contact() -> SceneEntityCfg {
    SceneEntityCfg::with_bodies(Go2Config::CONTACT_SENSOR, Go2Config::FOOT_BODIES)
}

/// Which air-time reading decides a good landing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AirTimeSource {
    /// The running air timer at the step touchdown is reported.
    #[default]
    Current,
    /// The duration of the swing that just completed.
    LastSwing,
}

/// Parameters of [`crate::rewards::FootDecelerationSwingPhase`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FootDecelerationParams {
    pub sensor_cfg: SceneEntityCfg,
    pub asset_cfg: SceneEntityCfg,
    /// Foot speed (m/s) at which the velocity kernel has decayed to 1/e.
    pub velocity_threshold: f32,
    /// Air time (s) below which a foot is never rewarded.
    pub min_air_time: f32,
    /// Length (s) of the late-swing window after `min_air_time`.
    pub deceleration_phase: f32,
    pub landing_air_time: AirTimeSource,
    pub debug: bool,
    pub debug_print_freq: u64,
    pub debug_env_index: usize,
}

impl Default for FootDecelerationParams {
    fn default() -> Self {
        Self {
            sensor_cfg: feet_contact(),
            asset_cfg: SceneEntityCfg::new(Go2Config::ROBOT),
            velocity_threshold: 0.5,
            min_air_time: 0.05,
            deceleration_phase: 0.1,
            landing_air_time: AirTimeSource::Current,
            debug: false,
            debug_print_freq: 100,
            debug_env_index: 0,
        }
    }
}

impl FootDecelerationParams {
    /// Defaults of the velocity-task package, which waits longer before shaping.
    pub fn go2_velocity() -> Self {
        Self {
            min_air_time: 0.2,
            ..Self::default()
        }
    }

    /// Values registered for the quiet-walking tasks.
    pub fn quiet() -> Self {
        Self {
            velocity_threshold: 0.3,
            min_air_time: 0.05,
            deceleration_phase: 0.1,
            ..Self::default()
        }
    }
}

/// Parameters of [`crate::rewards::feet_air_time`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AirTimeParams {
    pub command_name: String,
    pub sensor_cfg: SceneEntityCfg,
    pub threshold: f32,
}

impl Default for AirTimeParams {
    fn default() -> Self {
        Self {
            command_name: Go2Config::VELOCITY_COMMAND.to_string(),
            sensor_cfg: feet_contact(),
            threshold: 0.5,
        }
    }
}

/// Parameters of [`crate::rewards::feet_air_time_positive_biped`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BipedAirTimeParams {
    pub command_name: String,
    pub threshold: f32,
    pub sensor_cfg: SceneEntityCfg,
}

impl Default for BipedAirTimeParams {
    fn default() -> Self {
        Self {
            command_name: Go2Config::VELOCITY_COMMAND.to_string(),
            threshold: 0.4,
            sensor_cfg: feet_contact(),
        }
    }
}

/// Which reward function a configured term evaluates.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "func", content = "params", rename_all = "snake_case")]
pub enum RewardKind {
    FeetAirTime(AirTimeParams),
    FeetAirTimePositiveBiped(BipedAirTimeParams),
    FootDecelerationSwingPhase(FootDecelerationParams),
    /// A term evaluated by the training framework; only its weight lives here.
    External(ExternalTermParams),
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ExternalTermParams {
    pub name: String,
    #[serde(default)]
    pub body_names: Vec<String>,
}

/// One weighted entry of the reward table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RewardTermCfg {
    pub weight: f32,
    pub term: RewardKind,
}

impl RewardTermCfg {
    pub fn new(weight: f32, kind: RewardKind) -> Self {
        Self { weight, term: kind }
    }

    pub fn external(weight: f32, func: impl Into<String>) -> Self {
        Self::new(
            weight,
            RewardKind::External(ExternalTermParams {
                name: func.into(),
                body_names: Vec::new(),
            }),
        )
    }
}
