use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

/// The level used for `-v` repeated `count` times.
pub(crate) fn verbosity_level(count: u8) -> LevelFilter {
    match count {
        0 => LevelFilter::INFO,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}

/// Install the global fmt subscriber.
///
/// `RUST_LOG` directives take precedence over the verbosity default.
pub(crate) fn init_tracing(verbosity: u8) -> eyre::Result<()> {
    let env_filter = EnvFilter::builder()
        .with_default_directive(verbosity_level(verbosity).into())
        .from_env_lossy();
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .try_init()
        .map_err(|e| eyre::eyre!("failed to install tracing subscriber: {e}"))
}
