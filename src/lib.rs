//! DDPG with prioritized experience replay, built on `candle`.
//!
//! The [`agents::DDPG`] agent samples its training batches from a
//! [`components::PrioritizedReplayBuffer`], weighs the critic loss by the
//! importance weights of the batch and feeds the fresh TD errors back as
//! priorities.

pub mod logging;
pub mod util;

pub mod agents;
pub mod components;
pub mod configs;
pub mod engines;
pub mod envs;

use {
    serde::{
        Deserialize,
        Serialize,
    },
    std::fmt,
};


#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunMode {
    Train,
    Test,
}
impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunMode::Train => write!(f, "train"),
            RunMode::Test => write!(f, "test"),
        }
    }
}
