//! Go2 locomotion task configurations.
//!
//! Each variant is a builder that takes a config value and returns a derived
//! one with its overrides applied, e.g. `play(with_quiet_landing(go2_rough(rough())))`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::{AirTimeParams, FootDecelerationParams, Go2Config, RewardKind, RewardTermCfg};
use crate::error::RewardError;
use crate::scene::SceneEntityCfg;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SceneCfg {
    pub num_envs: usize,
    pub env_spacing: f32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TerrainCfg {
    /// `None` for a flat plane.
    pub generator: Option<TerrainGeneratorCfg>,
    pub max_init_terrain_level: Option<u32>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TerrainGeneratorCfg {
    pub num_rows: u32,
    pub num_cols: u32,
    pub curriculum: bool,
    pub boxes_grid_height_range: (f32, f32),
    pub random_rough_noise_range: (f32, f32),
    pub random_rough_noise_step: f32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EventsCfg {
    pub base_mass_distribution: (f32, f32),
    pub reset_joint_position_range: (f32, f32),
    pub push_robot: bool,
    pub base_external_force_torque: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LocomotionEnvCfg {
    pub scene: SceneCfg,
    pub terrain: TerrainCfg,
    pub action_scale: f32,
    pub observation_corruption: bool,
    pub events: EventsCfg,
    pub rewards: BTreeMap<String, RewardTermCfg>,
}

impl LocomotionEnvCfg {
    /// Rough-terrain velocity-tracking base.
    pub fn rough() -> Self {
        let mut rewards = BTreeMap::new();
        let mut external = |name: &str, weight: f32| {
            rewards.insert(name.to_string(), RewardTermCfg::external(weight, name));
        };
        external("track_lin_vel_xy_exp", 1.0);
        external("track_ang_vel_z_exp", 0.5);
        external("lin_vel_z_l2", -2.0);
        external("ang_vel_xy_l2", -0.05);
        external("dof_torques_l2", -1.0e-5);
        external("dof_acc_l2", -2.5e-7);
        external("action_rate_l2", -0.01);
        external("undesired_contacts", -1.0);
        external("flat_orientation_l2", 0.0);
        external("dof_pos_limits", 0.0);
        rewards.insert(
            "feet_air_time".to_string(),
            RewardTermCfg::new(
                0.125,
                RewardKind::FeetAirTime(AirTimeParams {
                    sensor_cfg: SceneEntityCfg::with_bodies(Go2Config::CONTACT_SENSOR, ".*FOOT"),
                    ..AirTimeParams::default()
                }),
            ),
        );

        Self {
            scene: SceneCfg {
                num_envs: 4096,
                env_spacing: 2.5,
            },
            terrain: TerrainCfg {
                generator: Some(TerrainGeneratorCfg {
                    num_rows: 10,
                    num_cols: 20,
                    curriculum: true,
                    boxes_grid_height_range: (0.05, 0.2),
                    random_rough_noise_range: (0.02, 0.10),
                    random_rough_noise_step: 0.02,
                }),
                max_init_terrain_level: Some(5),
            },
            action_scale: 0.5,
            observation_corruption: true,
            events: EventsCfg {
                base_mass_distribution: (-5.0, 5.0),
                reset_joint_position_range: (0.5, 1.5),
                push_robot: true,
                base_external_force_torque: true,
            },
            rewards,
        }
    }

    /// Flat-plane base.
    pub fn flat() -> Self {
        let mut cfg = Self::rough();
        cfg.terrain.generator = None;
        cfg.terrain.max_init_terrain_level = None;
        set_weight(&mut cfg, "flat_orientation_l2", -2.5);
        cfg
    }

    pub fn from_json(json: &str) -> Result<Self, RewardError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String, RewardError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

fn set_weight(cfg: &mut LocomotionEnvCfg, name: &str, weight: f32) {
    if let Some(term) = cfg.rewards.get_mut(name) {
        term.weight = weight;
    }
}

fn set_bodies(cfg: &mut LocomotionEnvCfg, name: &str, pattern: &str) {
    let Some(term) = cfg.rewards.get_mut(name) else {
        return;
    };
    let body_names = match &mut term.term {
        RewardKind::FeetAirTime(p) => &mut p.sensor_cfg.body_names,
        RewardKind::FeetAirTimePositiveBiped(p) => &mut p.sensor_cfg.body_names,
        RewardKind::FootDecelerationSwingPhase(p) => &mut p.sensor_cfg.body_names,
        RewardKind::External(p) => &mut p.body_names,
    };
    *body_names = vec![pattern.to_string()];
}

/// Unitree Go2 overrides on a locomotion base.
pub fn go2_rough(mut cfg: LocomotionEnvCfg) -> LocomotionEnvCfg {
    if let Some(generator) = cfg.terrain.generator.as_mut() {
        generator.boxes_grid_height_range = (0.025, 0.1);
        generator.random_rough_noise_range = (0.01, 0.06);
        generator.random_rough_noise_step = 0.01;
    }

    cfg.action_scale = Go2Config::ACTION_SCALE;

    cfg.events.base_mass_distribution = (-1.0, 3.0);
    cfg.events.reset_joint_position_range = (1.0, 1.0);

    set_weight(&mut cfg, "feet_air_time", 0.01);
    set_bodies(&mut cfg, "feet_air_time", Go2Config::FOOT_BODIES);
    set_weight(&mut cfg, "track_lin_vel_xy_exp", 1.5);
    set_weight(&mut cfg, "track_ang_vel_z_exp", 0.75);
    set_bodies(&mut cfg, "undesired_contacts", Go2Config::THIGH_BODIES);
    set_weight(&mut cfg, "dof_torques_l2", -0.0002);
    set_weight(&mut cfg, "dof_acc_l2", -2.5e-7);
    cfg
}

/// Smaller evaluation scene without randomisation.
pub fn play(mut cfg: LocomotionEnvCfg) -> LocomotionEnvCfg {
    cfg.scene.num_envs = 50;
    cfg.scene.env_spacing = 2.5;
    cfg.terrain.max_init_terrain_level = None;
    if let Some(generator) = cfg.terrain.generator.as_mut() {
        generator.num_rows = 5;
        generator.num_cols = 5;
        generator.curriculum = false;
    }
    cfg.observation_corruption = false;
    cfg.events.base_external_force_torque = false;
    cfg.events.push_robot = false;
    cfg
}

/// Add the quiet-landing term to any Go2 config.
pub fn with_quiet_landing(
    mut cfg: LocomotionEnvCfg,
    params: FootDecelerationParams,
) -> LocomotionEnvCfg {
    cfg.rewards.insert(
        "foot_deceleration".to_string(),
        RewardTermCfg::new(
            Go2Config::QUIET_LANDING_WEIGHT,
            RewardKind::FootDecelerationSwingPhase(params),
        ),
    );
    cfg
}

/// A registered training task.
#[derive(Clone, Debug)]
pub struct TaskSpec {
    pub id: &'static str,
    pub runner_cfg: &'static str,
    build: fn() -> LocomotionEnvCfg,
}

impl TaskSpec {
    fn new(id: &'static str, runner_cfg: &'static str, build: fn() -> LocomotionEnvCfg) -> Self {
        Self {
            id,
            runner_cfg,
            build,
        }
    }

    pub fn env_cfg(&self) -> LocomotionEnvCfg {
        (self.build)()
    }
}

fn base_flat() -> LocomotionEnvCfg {
    go2_rough(LocomotionEnvCfg::flat())
}

fn base_rough() -> LocomotionEnvCfg {
    go2_rough(LocomotionEnvCfg::rough())
}

fn quiet_flat() -> LocomotionEnvCfg {
    with_quiet_landing(base_flat(), FootDecelerationParams::quiet())
}

fn quiet_rough() -> LocomotionEnvCfg {
    with_quiet_landing(base_rough(), FootDecelerationParams::quiet())
}

const FLAT_RUNNER: &str = "UnitreeGo2FlatPPORunnerCfg";
const ROUGH_RUNNER: &str = "UnitreeGo2RoughPPORunnerCfg";

/// Environment-ID table.
pub struct TaskRegistry {
    tasks: Vec<TaskSpec>,
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskRegistry {
    pub fn new() -> Self {
        let task = TaskSpec::new;
        let tasks = vec![
            task("Base-Velocity-Flat-Unitree-Go2-v0", FLAT_RUNNER, base_flat),
            task("Base-Velocity-Flat-Unitree-Go2-Play-v0", FLAT_RUNNER, || play(base_flat())),
            task("Base-Velocity-Rough-Unitree-Go2-v0", ROUGH_RUNNER, base_rough),
            task("Base-Velocity-Rough-Unitree-Go2-Play-v0", ROUGH_RUNNER, || play(base_rough())),
            task("Acc-QuietVelocity-Flat-Unitree-Go2-v0", FLAT_RUNNER, quiet_flat),
            task("Acc-QuietVelocity-Flat-Unitree-Go2-Play-v0", FLAT_RUNNER, || play(quiet_flat())),
            task("Acc-QuietVelocity-Rough-Unitree-Go2-v0", ROUGH_RUNNER, quiet_rough),
            task("Acc-QuietVelocity-Rough-Unitree-Go2-Play-v0", ROUGH_RUNNER, || {
                play(quiet_rough())
            }),
        ];
        Self { tasks }
    }

    pub fn ids(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.tasks.iter().map(|t| t.id)
    }

    pub fn get(&self, id: &str) -> Result<&TaskSpec, RewardError> {
        self.tasks
            .iter()
            .find(|t| t.id == id)
            .ok_or_else(|| RewardError::UnknownTask(id.to_string()))
    }

    pub fn build(&self, id: &str) -> Result<LocomotionEnvCfg, RewardError> {
        Ok(self.get(id)?.env_cfg())
    }
}
