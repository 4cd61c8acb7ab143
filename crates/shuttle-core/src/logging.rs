//! tracing subscriber の初期化
//!
//! Logs go to stderr. `RUST_LOG` wins over the configured level.

use std::sync::OnceLock;

use tracing_subscriber::{EnvFilter, fmt as tracing_fmt};

static INIT: OnceLock<()> = OnceLock::new();

/// Install the global subscriber once. Later calls are no-ops, and so is a
/// call made after some other subscriber was installed.
pub fn init_with_level(level: &str) {
    INIT.get_or_init(|| {
        let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
        let _ = tracing_fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .try_init();
    });
}

pub fn init() {
    init_with_level("info");
}
