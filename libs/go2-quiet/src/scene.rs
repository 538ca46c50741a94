//! Batched simulator state read by the reward terms.
//!
//! The training framework owns all of this data. A reward call only ever sees
//! an immutable [`EnvState`] for the duration of one step.

use std::collections::HashMap;

use nalgebra as na;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::RewardError;

/// Tolerance used when deciding whether a contact/detach happened this step.
pub const FIRST_EVENT_TOL: f32 = 1.0e-8;

/// Selection of an entity (sensor or articulation) and a subset of its bodies.
///
/// Body names are regular expressions that must match a whole body name,
/// e.g. `".*_foot"` selects `FL_foot`, `FR_foot`, `RL_foot`, `RR_foot`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SceneEntityCfg {
    pub name: String,
    #[serde(default)]
    pub body_names: Vec<String>,
    #[serde(skip)]
    pub body_ids: Vec<usize>,
}

impl SceneEntityCfg {
    /// Entity with no body selection (all bodies once resolved).
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            body_names: Vec::new(),
            body_ids: Vec::new(),
        }
    }

    pub fn with_bodies(name: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            body_names: vec![pattern.into()],
            body_ids: Vec::new(),
        }
    }

    /// Entity whose body indices are already known.
    pub fn with_ids(name: impl Into<String>, body_ids: Vec<usize>) -> Self {
        Self {
            name: name.into(),
            body_names: Vec::new(),
            body_ids,
        }
    }

    /// Resolve `body_names` against the entity's bodies, in body order.
    ///
    /// An empty pattern list selects every body. Each pattern must match at
    /// least one body.
    pub fn resolve(&mut self, available: &[String]) -> Result<(), RewardError> {
        if self.body_names.is_empty() {
            self.body_ids = (0..available.len()).collect();
            return Ok(());
        }

        let mut matched = vec![false; available.len()];
        for pattern in &self.body_names {
            let re = Regex::new(&format!("^(?:{pattern})$")).map_err(|source| {
                RewardError::InvalidPattern {
                    pattern: pattern.clone(),
                    source,
                }
            })?;
            let mut hit = false;
            for (i, name) in available.iter().enumerate() {
                if re.is_match(name) {
                    matched[i] = true;
                    hit = true;
                }
            }
            if !hit {
                return Err(RewardError::UnmatchedBodyPattern {
                    entity: self.name.clone(),
                    pattern: pattern.clone(),
                });
            }
        }

        self.body_ids = matched
            .iter()
            .enumerate()
            .filter_map(|(i, &m)| m.then_some(i))
            .collect();
        Ok(())
    }

    pub(crate) fn check_ids(&self, available: usize) -> Result<(), RewardError> {
        if self.body_ids.is_empty() {
            return Err(RewardError::EmptyBodySelection {
                entity: self.name.clone(),
            });
        }
        match self.body_ids.iter().find(|&&i| i >= available) {
            Some(&index) => Err(RewardError::BodyIndexOutOfRange {
                entity: self.name.clone(),
                index,
                available,
            }),
            None => Ok(()),
        }
    }
}

/// Gather `ids` columns of a `[num_envs, num_bodies]` matrix.
pub(crate) fn select_bodies<T: na::Scalar>(m: &na::DMatrix<T>, ids: &[usize]) -> na::DMatrix<T> {
    na::DMatrix::from_fn(m.nrows(), ids.len(), |i, j| m[(i, ids[j])].clone())
}

/// Contact-sensor timers, one row per env and one column per body.
#[derive(Clone, Debug)]
pub struct ContactSensorData {
    pub body_names: Vec<String>,
    /// Time since the body last broke contact (0 while in contact).
    pub current_air_time: na::DMatrix<f32>,
    /// Time since the body last made contact (0 while airborne).
    pub current_contact_time: na::DMatrix<f32>,
    /// Duration of the most recently completed swing.
    pub last_air_time: na::DMatrix<f32>,
    /// Duration of the most recently completed stance.
    pub last_contact_time: na::DMatrix<f32>,
}

impl ContactSensorData {
    pub fn new(num_envs: usize, body_names: Vec<String>) -> Self {
        let n = body_names.len();
        Self {
            body_names,
            current_air_time: na::DMatrix::zeros(num_envs, n),
            current_contact_time: na::DMatrix::zeros(num_envs, n),
            last_air_time: na::DMatrix::zeros(num_envs, n),
            last_contact_time: na::DMatrix::zeros(num_envs, n),
        }
    }

    pub fn num_envs(&self) -> usize {
        self.current_air_time.nrows()
    }

    pub fn num_bodies(&self) -> usize {
        self.current_air_time.ncols()
    }

    /// Bodies that touched down within the last `dt`.
    pub fn compute_first_contact(&self, dt: f32) -> na::DMatrix<bool> {
        self.current_contact_time
            .map(|t| t > 0.0 && t < dt + FIRST_EVENT_TOL)
    }

    /// Bodies that lifted off within the last `dt`.
    pub fn compute_first_air(&self, dt: f32) -> na::DMatrix<bool> {
        self.current_air_time
            .map(|t| t > 0.0 && t < dt + FIRST_EVENT_TOL)
    }

    /// Advance all timers by one step given this step's contact state.
    ///
    /// On touchdown the finished swing is latched into `last_air_time`; on
    /// lift-off the finished stance is latched into `last_contact_time`.
    pub fn update(&mut self, dt: f32, in_contact: &na::DMatrix<bool>) -> Result<(), RewardError> {
        let shape = self.current_air_time.shape();
        if in_contact.shape() != shape {
            return Err(RewardError::shape(
                "contact state",
                format!("{shape:?}"),
                format!("{:?}", in_contact.shape()),
            ));
        }

        for i in 0..shape.0 {
            for j in 0..shape.1 {
                let air = self.current_air_time[(i, j)];
                let contact = self.current_contact_time[(i, j)];
                if in_contact[(i, j)] {
                    if air > 0.0 {
                        self.last_air_time[(i, j)] = air + dt;
                    }
                    self.current_air_time[(i, j)] = 0.0;
                    self.current_contact_time[(i, j)] = contact + dt;
                } else {
                    if contact > 0.0 {
                        self.last_contact_time[(i, j)] = contact + dt;
                    }
                    self.current_contact_time[(i, j)] = 0.0;
                    self.current_air_time[(i, j)] = air + dt;
                }
            }
        }
        Ok(())
    }
}

/// Kinematic state of an articulated robot.
#[derive(Clone, Debug)]
pub struct ArticulationData {
    pub body_names: Vec<String>,
    /// World-frame linear velocity, `[num_envs, num_bodies]`.
    pub body_lin_vel_w: na::DMatrix<na::Vector3<f32>>,
}

impl ArticulationData {
    pub fn new(num_envs: usize, body_names: Vec<String>) -> Self {
        let n = body_names.len();
        Self {
            body_names,
            body_lin_vel_w: na::DMatrix::from_element(num_envs, n, na::Vector3::zeros()),
        }
    }

    pub fn num_bodies(&self) -> usize {
        self.body_lin_vel_w.ncols()
    }

    /// Speed (velocity norm) of the selected bodies.
    pub fn body_speeds(&self, ids: &[usize]) -> na::DMatrix<f32> {
        select_bodies(&self.body_lin_vel_w, ids).map(|v| v.norm())
    }
}

/// Read-only view of the simulator for one reward evaluation.
pub trait EnvState {
    fn num_envs(&self) -> usize;

    /// Control-step duration in seconds.
    fn step_dt(&self) -> f32;

    fn contact_sensor(&self, name: &str) -> Result<&ContactSensorData, RewardError>;

    fn articulation(&self, name: &str) -> Result<&ArticulationData, RewardError>;

    /// Current command per env, `[num_envs, command_dim]`.
    fn command(&self, name: &str) -> Result<&na::DMatrix<f32>, RewardError>;
}

/// Plain owned [`EnvState`] for embedders and tests.
#[derive(Clone, Debug)]
pub struct SceneSnapshot {
    pub num_envs: usize,
    pub step_dt: f32,
    pub sensors: HashMap<String, ContactSensorData>,
    pub articulations: HashMap<String, ArticulationData>,
    pub commands: HashMap<String, na::DMatrix<f32>>,
}

impl SceneSnapshot {
    pub fn new(num_envs: usize, step_dt: f32) -> Self {
        Self {
            num_envs,
            step_dt,
            sensors: HashMap::new(),
            articulations: HashMap::new(),
            commands: HashMap::new(),
        }
    }

    pub fn with_sensor(mut self, name: impl Into<String>, data: ContactSensorData) -> Self {
        self.sensors.insert(name.into(), data);
        self
    }

    pub fn with_articulation(mut self, name: impl Into<String>, data: ArticulationData) -> Self {
        self.articulations.insert(name.into(), data);
        self
    }

    pub fn with_command(mut self, name: impl Into<String>, command: na::DMatrix<f32>) -> Self {
        self.commands.insert(name.into(), command);
        self
    }
}

impl EnvState for SceneSnapshot {
    fn num_envs(&self) -> usize {
        self.num_envs
    }

    fn step_dt(&self) -> f32 {
        self.step_dt
    }

    fn contact_sensor(&self, name: &str) -> Result<&ContactSensorData, RewardError> {
        self.sensors
            .get(name)
            .ok_or_else(|| RewardError::UnknownSensor(name.to_string()))
    }

    fn articulation(&self, name: &str) -> Result<&ArticulationData, RewardError> {
        self.articulations
            .get(name)
            .ok_or_else(|| RewardError::UnknownAsset(name.to_string()))
    }

    fn command(&self, name: &str) -> Result<&na::DMatrix<f32>, RewardError> {
        self.commands
            .get(name)
            .ok_or_else(|| RewardError::UnknownCommand(name.to_string()))
    }
}
