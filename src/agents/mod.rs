mod ddpg;

pub use ddpg::DDPG;


use {
    crate::components::{
        Action,
        PrioritizedReplayBuffer,
    },
    anyhow::Result,
    candle_core::Device,
    std::path::Path,
};


/// What a call to [`Algorithm::learn`] did.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum LearnStep {
    /// Too few transitions are stored, nothing was updated.
    WarmingUp {
        stored: usize,
        required: usize,
    },
    /// One gradient step was taken on the critic and on the actor.
    Trained {
        critic_loss: f64,
        actor_loss: f64,
        mean_abs_td_error: f64,
        target_synced: bool,
    },
}

pub trait Algorithm {
    type Config;

    fn config(&self) -> &Self::Config;

    /// Pick an action for the observation. Exploration noise is only added
    /// when `evaluate` is false.
    fn choose_action(
        &mut self,
        observation: &[f64],
        aux: &[f64],
        evaluate: bool,
    ) -> Result<Vec<f64>>;

    fn learn(&mut self) -> Result<LearnStep>;
}

/// Algorithms that can build their own function approximators from a config.
pub trait ConfigurableAlgorithm: Algorithm {
    fn from_config(
        device: &Device,
        config: &Self::Config,
        size_state: usize,
        size_aux: usize,
        size_action: usize,
    ) -> Result<Box<Self>>;
}

pub trait OffPolicyAlgorithm: Algorithm {
    #[allow(clippy::too_many_arguments)]
    fn remember(
        &mut self,
        state: &[f64],
        aux: &[f64],
        action: Action<'_>,
        reward: f64,
        next_state: &[f64],
        next_aux: &[f64],
        done: bool,
    ) -> Result<()>;

    fn replay_buffer(&self) -> &PrioritizedReplayBuffer;
    fn replay_buffer_mut(&mut self) -> &mut PrioritizedReplayBuffer;
}

pub trait SaveableAlgorithm {
    fn save<P: AsRef<Path> + ?Sized>(
        &self,
        path: &P,
        name: &str,
    ) -> Result<()>;

    fn load<P: AsRef<Path> + ?Sized>(
        &mut self,
        path: &P,
        name: &str,
    ) -> Result<()>;
}
