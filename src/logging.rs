use {
    anyhow::Result,
    std::{
        fs::File,
        path::Path,
        sync::Arc,
    },
    tracing::Level,
    tracing_subscriber::{
        filter::Targets,
        fmt::layer,
        layer::SubscriberExt,
        util::SubscriberInitExt,
        Layer,
    },
};

/// Events of this crate pass at `level`, events of dependencies such as candle
/// and polars only up to WARN.
fn targets(level: Level) -> Targets {
    Targets::new()
        .with_target(env!("CARGO_CRATE_NAME"), level)
        .with_default(level.min(Level::WARN))
}

/// Install a global subscriber that logs to `path` and to stdout.
///
/// Each writer gets its own maximum level, `None` falls back to INFO.
pub fn setup_logging(
    path: &dyn AsRef<Path>,
    min_level_file: Option<Level>,
    min_level_stdout: Option<Level>,
) -> Result<()> {
    let log_file = Arc::new(File::create(path)?);

    tracing_subscriber::registry()
        // File writer
        .with(
            layer()
                .with_writer(log_file)
                .with_ansi(false)
                .with_filter(targets(min_level_file.unwrap_or(Level::INFO))),
        )
        // Stdout writer
        .with(
            layer()
                .with_writer(std::io::stdout)
                .compact()
                .pretty()
                .with_line_number(true)
                .with_thread_ids(false)
                .with_target(false)
                .with_filter(targets(min_level_stdout.unwrap_or(Level::INFO))),
        )
        // Create and set Subscriber
        .try_init()?;

    Ok(())
}
