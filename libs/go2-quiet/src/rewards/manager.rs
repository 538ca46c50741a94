use std::collections::BTreeMap;

use nalgebra as na;

use super::{build_term, RewardTerm};
use crate::config::RewardTermCfg;
use crate::error::RewardError;
use crate::scene::EnvState;

struct WeightedTerm {
    weight: f32,
    term: Box<dyn RewardTerm>,
}

/// Sums weighted reward terms into the per-step training signal.
///
/// Each step contributes `weight * value * dt` per term. Per-env episode sums
/// are kept for logging until the env is reset.
pub struct RewardManager {
    num_envs: usize,
    terms: Vec<WeightedTerm>,
    step_reward: BTreeMap<String, na::DVector<f32>>,
    episode_sums: BTreeMap<String, na::DVector<f32>>,
}

impl RewardManager {
    pub fn new(num_envs: usize) -> Self {
        Self {
            num_envs,
            terms: Vec::new(),
            step_reward: BTreeMap::new(),
            episode_sums: BTreeMap::new(),
        }
    }

    /// Build every locally implemented term of a reward table.
    pub fn from_cfg(
        rewards: &BTreeMap<String, RewardTermCfg>,
        env: &dyn EnvState,
    ) -> Result<Self, RewardError> {
        let mut manager = Self::new(env.num_envs());
        for (name, cfg) in rewards {
            if let Some(term) = build_term(name, &cfg.term, env)? {
                manager.add_term(cfg.weight, term);
            }
        }
        log::info!(
            "reward manager: {} local terms of {} configured",
            manager.terms.len(),
            rewards.len()
        );
        Ok(manager)
    }

    pub fn add_term(&mut self, weight: f32, term: Box<dyn RewardTerm>) {
        let name = term.name().to_string();
        self.step_reward.insert(name.clone(), na::DVector::zeros(self.num_envs));
        self.episode_sums.insert(name, na::DVector::zeros(self.num_envs));
        self.terms.push(WeightedTerm { weight, term });
    }

    pub fn term_names(&self) -> Vec<&str> {
        self.terms.iter().map(|t| t.term.name()).collect()
    }

    /// Unweighted value of each term at the last step.
    pub fn step_reward(&self, name: &str) -> Option<&na::DVector<f32>> {
        self.step_reward.get(name)
    }

    pub fn episode_sum(&self, name: &str) -> Option<&na::DVector<f32>> {
        self.episode_sums.get(name)
    }

    /// Evaluate all terms for one control step.
    pub fn compute(&mut self, env: &dyn EnvState) -> Result<na::DVector<f32>, RewardError> {
        if env.num_envs() != self.num_envs {
            return Err(RewardError::shape("env batch", self.num_envs, env.num_envs()));
        }

        let dt = env.step_dt();
        let mut total = na::DVector::zeros(self.num_envs);
        for entry in &mut self.terms {
            if entry.weight == 0.0 {
                continue;
            }
            let raw = entry.term.compute(env)?;
            if raw.len() != self.num_envs {
                return Err(RewardError::shape(
                    format!("reward term {}", entry.term.name()),
                    self.num_envs,
                    raw.len(),
                ));
            }

            let value = &raw * (entry.weight * dt);
            total += &value;
            if let Some(sum) = self.episode_sums.get_mut(entry.term.name()) {
                *sum += &value;
            }
            self.step_reward.insert(entry.term.name().to_string(), raw);
        }
        Ok(total)
    }

    /// Clear the episode sums of `env_ids`, returning each term's mean over them.
    ///
    /// With `episode_length_s` the means are reported per second.
    pub fn reset(
        &mut self,
        env_ids: &[usize],
        episode_length_s: Option<f32>,
    ) -> BTreeMap<String, f32> {
        let mut extras = BTreeMap::new();
        for (name, sums) in &mut self.episode_sums {
            let ids: Vec<usize> = env_ids.iter().copied().filter(|&i| i < sums.len()).collect();
            let mean = if ids.is_empty() {
                0.0
            } else {
                ids.iter().map(|&i| sums[i]).sum::<f32>() / ids.len() as f32
            };
            extras.insert(name.clone(), episode_length_s.map_or(mean, |len| mean / len));
            for &i in &ids {
                sums[i] = 0.0;
            }
        }
        extras
    }
}
