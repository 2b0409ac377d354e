use {
    crate::{
        agents::{
            Algorithm,
            LearnStep,
            OffPolicyAlgorithm,
        },
        components::Action,
        configs::TrainConfig,
        envs::{
            sample_action,
            Environment,
        },
        RunMode,
    },
    anyhow::Result,
    rand::{
        rngs::StdRng,
        Rng,
    },
    tracing::{
        info,
        warn,
    },
};


/// Per-episode results of a single run.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RunStats {
    /// The undiscounted return of every episode.
    pub mc_returns: Vec<f64>,
    /// Whether an episode ended by termination rather than truncation.
    pub successes: Vec<bool>,
    /// Number of learning steps that updated the networks.
    pub learn_steps: usize,
}

/// Train (or evaluate) a single run on an environment with an off-policy algorithm.
///
/// Every environment step is stored in the replay buffer. In train mode the
/// agent explores and calls `learn` `training_iterations` times after every
/// step, the first `initial_random_actions` steps act uniformly at random.
/// In test mode actions are greedy and nothing is stored or learned.
///
/// # Arguments
///
/// * `env` - The environment to train on.
/// * `alg` - The agent to train with.
/// * `config` - The configuration for the training loop.
/// * `rng` - Source of episode seeds and random actions.
pub fn loop_off_policy<Alg, Env>(
    env: &mut Env,
    alg: &mut Alg,
    config: &TrainConfig,
    rng: &mut StdRng,
) -> Result<RunStats>
where
    Env: Environment,
    Alg: Algorithm + OffPolicyAlgorithm,
{
    warn!("action space: {:?}", env.action_space());
    warn!("observation space: {:?}", env.observation_space());

    let train = config.run_mode() == RunMode::Train;
    let mut steps_taken = 0;
    let mut stats = RunStats::default();

    for episode in 0..config.max_episodes() {
        let mut total_reward = 0.0;
        env.reset(rng.gen::<u64>())?;

        loop {
            let state = env.current_observation();
            let aux = env.current_aux();

            // select an action, or randomly sample one
            let action = if train && steps_taken < config.initial_random_actions() {
                sample_action(rng, &env.action_domain())
            } else {
                alg.choose_action(&state, &aux, !train)?
            };

            let step = env.step(&action)?;
            total_reward += step.reward;
            steps_taken += 1;

            if train {
                alg.remember(
                    &state,
                    &aux,
                    Action::Continuous(&action),
                    step.reward,
                    &step.observation,
                    &step.aux,
                    step.terminated,
                )?;

                for _ in 0..config.training_iterations() {
                    if let LearnStep::Trained { .. } = alg.learn()? {
                        stats.learn_steps += 1;
                    }
                }
            }

            if step.terminated || step.truncated {
                stats.successes.push(step.terminated);
                break;
            }
        }

        warn!("episode {episode} with total reward of {total_reward}");
        info!(episode, steps_taken, stored = alg.replay_buffer().len(), "episode finished");
        stats.mc_returns.push(total_reward);
    }
    Ok(stats)
}
