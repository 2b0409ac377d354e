use {
    super::run::loop_off_policy,
    crate::{
        agents::{
            ConfigurableAlgorithm,
            OffPolicyAlgorithm,
            SaveableAlgorithm,
        },
        configs::TrainConfig,
        envs::Environment,
        util::write_config,
    },
    anyhow::{
        anyhow,
        Result,
    },
    candle_core::Device,
    polars::prelude::{
        DataFrame,
        NamedFrom,
        ParquetWriter,
        Series,
    },
    rand::{
        rngs::StdRng,
        SeedableRng,
    },
    serde::Serialize,
    std::{
        fs::{
            create_dir_all,
            File,
        },
        path::Path,
    },
    tracing::warn,
};

// An empty space has no features at all.
fn flat_size(space: &[usize]) -> usize {
    if space.is_empty() {
        0
    } else {
        space.iter().product()
    }
}

/// Run an experiment with an off-policy algorithm.
///
/// Every repetition trains a fresh agent on a fresh environment. The configs,
/// the per-episode returns, the final network weights and the replay buffer
/// of every run are written to `path`.
///
/// # Arguments
///
/// * `path` - The directory where the collected data will be stored.
/// * `n_repetitions` - The number of repeated, identical runs to perform.
/// * `env_config` - The configuration for the environment.
/// * `alg_config` - The configuration for the algorithm.
/// * `train_config` - The configuration for the training loop.
/// * `load_model` - Optional `(directory, name)` of weights to start from.
/// * `seed` - Seed for episode resets and random actions.
/// * `device` - The device to run the experiment on.
#[allow(clippy::too_many_arguments)]
pub fn run_experiment_off_policy<Alg, Env>(
    path: &dyn AsRef<Path>,
    n_repetitions: usize,
    env_config: Env::Config,
    alg_config: Alg::Config,
    train_config: TrainConfig,
    load_model: Option<(String, String)>,
    seed: u64,
    device: &Device,
) -> Result<()>
where
    Env: Environment,
    Env::Config: Clone + Serialize,
    Alg: ConfigurableAlgorithm + OffPolicyAlgorithm + SaveableAlgorithm,
    Alg::Config: Clone + Serialize,
{
    let path = path.as_ref();

    let alg_config_exists = path.join("config_algorithm.ron").try_exists()?;
    let env_config_exists = path.join("config_environment.ron").try_exists()?;
    if alg_config_exists || env_config_exists {
        Err(anyhow!(concat!(
            "Config files already exist in this directory!\n",
            "I am assuming I would be overwriting existing data!",
        )))?
    }

    create_dir_all(path)?;
    write_config(&alg_config, path.join("config_algorithm.ron"))?;
    write_config(&env_config, path.join("config_environment.ron"))?;
    write_config(&train_config, path.join("config_training.ron"))?;

    let mut rng = StdRng::seed_from_u64(seed);

    for n in 0..n_repetitions {
        warn!("Collecting data, run {n}/{n_repetitions}");

        // Create the Agent and the Environment

        let mut env = *Env::new(env_config.clone())?;
        let mut alg = *Alg::from_config(
            device,
            &alg_config,
            flat_size(&env.observation_space()),
            flat_size(&env.aux_space()),
            flat_size(&env.action_space()),
        )?;

        // Maybe load model weights

        if let Some((model_path, model_name)) = &load_model {
            warn!("Loading model weights from {model_path} with name {model_name}");
            alg.load(Path::new(model_path), model_name)?;
        }

        // Train the Agent on the Environment

        let stats = loop_off_policy(&mut env, &mut alg, &train_config, &mut rng)?;

        // Write collected data to file

        let mut df = DataFrame::new(vec![
            Series::new(
                &format!("run_{n}_total_rewards"),
                &stats.mc_returns,
            ),
            Series::new(
                &format!("run_{n}_successes"),
                &stats.successes,
            ),
        ])?;

        ParquetWriter::new(
            File::create(path.join(format!("run_{n}_data.parquet")))?
        ).finish(&mut df)?;

        alg.save(path, &format!("run_{n}"))?;
        alg.replay_buffer().save(&path.join(format!("run_{n}_buffer.parquet")))?;
        warn!("Run {n} finished after {} learning steps", stats.learn_steps);
    }
    Ok(())
}
