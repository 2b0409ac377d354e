mod pendulum;

use {
    anyhow::Result,
    rand::{
        Rng,
        RngCore,
    },
    std::ops::RangeInclusive,
};

pub use crate::envs::pendulum::{
    PendulumConfig,
    PendulumEnv,
};


/// The outcome of a single environment step.
#[derive(Clone, Debug, PartialEq)]
pub struct Step {
    pub observation: Vec<f64>,
    /// Auxiliary features that accompany the observation (may be empty).
    pub aux: Vec<f64>,
    pub reward: f64,
    pub terminated: bool,
    pub truncated: bool,
}

/// Sample a uniformly random action from the given per-dimension domain.
pub fn sample_action(
    rng: &mut dyn RngCore,
    domain: &[RangeInclusive<f64>],
) -> Vec<f64> {
    domain
        .iter()
        .map(|range| rng.gen_range(range.clone()))
        .collect()
}

/// Anything that produces `(state, action, reward, next_state, done)` tuples
/// for the agent.
pub trait Environment {
    type Config;

    fn config(&self) -> &Self::Config;
    fn new(config: Self::Config) -> Result<Box<Self>>;
    fn reset(
        &mut self,
        seed: u64,
    ) -> Result<Vec<f64>>;
    fn step(
        &mut self,
        action: &[f64],
    ) -> Result<Step>;
    fn timelimit(&self) -> usize;
    fn action_space(&self) -> Vec<usize>;
    fn action_domain(&self) -> Vec<RangeInclusive<f64>>;
    fn observation_space(&self) -> Vec<usize>;
    /// Shape of the auxiliary features, empty if there are none.
    fn aux_space(&self) -> Vec<usize> {
        Vec::new()
    }
    fn current_observation(&self) -> Vec<f64>;
    fn current_aux(&self) -> Vec<f64> {
        Vec::new()
    }
}
