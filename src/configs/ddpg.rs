use serde::{
    Deserialize,
    Serialize,
};


#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DDPGConfig {
    // The learning rates for the Actor and Critic networks
    pub actor_learning_rate: f64,
    pub critic_learning_rate: f64,
    // The impact of the q value of the next state on the current state's q value.
    pub gamma: f64,
    // The weight for updating the target networks.
    pub tau: f64,
    // The number of neurons in the hidden layers of the Actor and Critic networks.
    pub hidden_1_size: usize,
    pub hidden_2_size: usize,
    // The capacity of the replay buffer used for sampling training data.
    pub replay_buffer_capacity: usize,
    // No learning happens while the buffer holds fewer transitions than this.
    pub min_replay_size: usize,
    // The training batch size for each training iteration.
    pub training_batch_size: usize,
    // Standard deviation of the Gaussian exploration noise.
    pub exploration_noise: f64,
    // Number of learning steps between two soft updates of the target networks.
    pub replace_target: usize,
    // Exponent applied to priorities before sampling (0 samples uniformly).
    pub priority_scale: f64,
    // Added to the absolute TD error when refreshing priorities.
    pub priority_offset: f64,
    // Whether actions are stored one-hot in the replay buffer.
    pub discrete_actions: bool,
    // Seed for exploration noise and replay sampling.
    pub seed: Option<u64>,
}
impl Default for DDPGConfig {
    fn default() -> Self {
        Self {
            actor_learning_rate: 0.001,
            critic_learning_rate: 0.002,
            gamma: 0.99,
            tau: 0.005,
            hidden_1_size: 400,
            hidden_2_size: 300,
            replay_buffer_capacity: 50_000,
            min_replay_size: 100,
            training_batch_size: 64,
            exploration_noise: 0.1,
            replace_target: 100,
            priority_scale: 0.7,
            priority_offset: 0.1,
            discrete_actions: false,
            seed: None,
        }
    }
}
impl DDPGConfig {
    pub fn pendulum() -> Self {
        Self {
            actor_learning_rate: 1e-4,
            critic_learning_rate: 1e-3,
            hidden_1_size: 256,
            hidden_2_size: 256,
            replay_buffer_capacity: 100_000,
            min_replay_size: 1_000,
            training_batch_size: 100,
            replace_target: 1,
            ..Default::default()
        }
    }
}
