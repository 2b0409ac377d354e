use {
    anyhow::Result,
    candle_core::Device,
    clap::{
        Parser,
        ValueEnum,
    },
    per_ddpg::{
        agents::DDPG,
        configs::{
            DDPGConfig,
            TrainConfig,
        },
        engines::{
            run_experiment_off_policy,
            setup_logging,
        },
        envs::{
            PendulumConfig,
            PendulumEnv,
        },
        util::read_config,
        RunMode,
    },
    std::path::Path,
    tracing::Level,
};

#[derive(ValueEnum, Debug, Clone)]
enum Loglevel {
    Error, // put these only during active debugging and then downgrade later
    Warn,  // main events in the program
    Info,  // all the little details
    Debug, // losses and TD errors of every learning step
    None,  // don't log anything
}
impl Loglevel {
    fn level(&self) -> Option<Level> {
        match self {
            Loglevel::Error => Some(Level::ERROR),
            Loglevel::Warn => Some(Level::WARN),
            Loglevel::Info => Some(Level::INFO),
            Loglevel::Debug => Some(Level::DEBUG),
            Loglevel::None => None,
        }
    }
}

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Setup logging
    #[arg(long, value_enum, default_value_t=Loglevel::None)]
    log: Loglevel,

    /// RON file with the DDPG config, the pendulum preset otherwise.
    #[arg(long)]
    config: Option<String>,

    /// Directory under data/ to write the results to.
    #[arg(long, default_value = "pendulum")]
    output: String,

    /// Number of independent runs.
    #[arg(long, default_value_t = 1)]
    runs: usize,

    /// Number of episodes per run.
    #[arg(long)]
    episodes: Option<usize>,

    /// Seed for the environment and the agent.
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Only act greedily with loaded weights, do not explore or learn.
    #[arg(long)]
    test: bool,

    /// Start from saved weights: <directory> <name>.
    #[arg(long, num_args = 2, value_names = ["PATH", "NAME"])]
    load_model: Option<Vec<String>>,
}


fn main() -> Result<()> {
    let args = Args::parse();

    let path = Path::new("data").join(&args.output);
    if let Some(level) = args.log.level() {
        std::fs::create_dir_all(&path)?;
        setup_logging(&path.join("debug.log"), Some(level), Some(level))?;
    }

    let mut alg_config = match &args.config {
        Some(file) => read_config::<DDPGConfig, _>(file)?,
        None => DDPGConfig::pendulum(),
    };
    if alg_config.seed.is_none() {
        alg_config.seed = Some(args.seed);
    }

    let mut train_config = TrainConfig::pendulum();
    if let Some(episodes) = args.episodes {
        train_config.set_max_episodes(episodes);
    }
    if args.test {
        train_config.set_run_mode(RunMode::Test);
        train_config.set_initial_random_actions(0);
    }

    let load_model = args
        .load_model
        .map(|values| (values[0].clone(), values[1].clone()));

    run_experiment_off_policy::<DDPG, PendulumEnv>(
        &path,
        args.runs,
        PendulumConfig::default(),
        alg_config,
        train_config,
        load_model,
        args.seed,
        &Device::Cpu,
    )
}
