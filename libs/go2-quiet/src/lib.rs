//! Reward terms and task configs for teaching a Unitree Go2 to walk quietly.
//!
//! The simulator hands every reward call a batched, read-only [`EnvState`];
//! each term returns one value per env.

pub mod config;
pub mod error;
pub mod rewards;
pub mod scene;
pub mod tasks;

pub use config::{AirTimeSource, FootDecelerationParams, Go2Config, RewardKind, RewardTermCfg};
pub use error::RewardError;
pub use rewards::{
    feet_air_time, feet_air_time_positive_biped, foot_deceleration_swing_phase,
    FootDecelerationSwingPhase, RewardManager, RewardTerm,
};
pub use scene::{ArticulationData, ContactSensorData, EnvState, SceneEntityCfg, SceneSnapshot};
pub use tasks::{LocomotionEnvCfg, TaskRegistry};
