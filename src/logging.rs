//! Logger setup for the binary and for tests that want to see pass statistics.

use std::sync::Once;

/// `filter` uses the `env_logger` syntax, e.g. "debug" or "tiny_raster::scene=debug".
/// Without one, RUST_LOG is read, then `verbose` picks debug over info.
#[derive(Debug, Clone, Default)]
pub struct LoggingConfig {
    pub filter: Option<String>,
    pub verbose: bool,
}

static INIT: Once = Once::new();

/// Installs the global logger. Only the first call has an effect.
pub fn init_logging(config: LoggingConfig) {
    INIT.call_once(|| {
        let mut builder = env_logger::Builder::new();
        if let Some(filter) = config.filter {
            builder.parse_filters(&filter);
        } else if let Ok(filter) = std::env::var("RUST_LOG") {
            builder.parse_filters(&filter);
        } else if config.verbose {
            builder.filter_level(log::LevelFilter::Debug);
        } else {
            builder.filter_level(log::LevelFilter::Info);
        }
        builder.format_timestamp_millis();
        // A logger installed by someone else is fine.
        if builder.try_init().is_err() {
            return;
        }
        log::debug!("logging initialized");
    });
}
