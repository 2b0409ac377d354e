//! # Components
//!
//! This module contains the components that can be used to build an agent.
//!
//! ## Noise
//!
//! [`GaussianNoise`] adds zero-mean Gaussian noise to the actions of the
//! [`crate::agents::DDPG`] agent while it explores.
//!
//! ## Replay Buffer
//!
//! The [`PrioritizedReplayBuffer`] stores transitions in a fixed-size ring and
//! samples them in proportion to their (scaled) priorities. The indices of a
//! sample come back as a [`SampledIndices`] token that is used to refresh the
//! priorities once the TD errors of the batch are known.
//!
//! ## Networks
//!
//! The [`Approximator`], [`Actor`] and [`Critic`] traits describe what the
//! agent needs from its function approximators. [`MlpActor`] and
//! [`MlpCritic`] are the default implementations.

mod noise;
mod network;
mod replay_buffer;

pub use noise::GaussianNoise;
pub use network::{
    Actor,
    Approximator,
    Critic,
    MlpActor,
    MlpCritic,
    Snapshot,
};
pub use replay_buffer::{
    Action,
    Batch,
    PrioritizedReplayBuffer,
    ReplayBufferConfig,
    ReplayBufferData,
    ReplayBufferError,
    Sample,
    SampledIndices,
    StoredTransition,
    TensorBatch,
};
