/// Tracing subscriber setup shared by the binaries
use tracing_subscriber::EnvFilter;

use crate::types::LoggingConfig;

/// `RUST_LOG` wins over the configured level; `format = "json"` switches to JSON lines
pub fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("candlesync={},info", config.level)));

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);

    // A second init (tests, embedded use) keeps the first subscriber
    let _ = match config.format.as_str() {
        "json" => builder.json().try_init(),
        _ => builder.try_init(),
    };
}
