use tracing_subscriber::{fmt, EnvFilter};

use crate::util::env::env_flag;

/// Default filter for the worker and CLI when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "info,sqlx=warn,hyper=warn,reqwest=warn";

/// Sets up the global tracing subscriber with a fmt formatter and env filter.
///
/// `RUST_LOG` wins over `default_filter`. `LOG_COMPACT=1` switches to the
/// single-line compact format without file/line info.
pub fn init_tracing(default_filter: &str) -> Result<(), anyhow::Error> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let builder = fmt().with_env_filter(filter).with_target(true);
    let res = if env_flag("LOG_COMPACT", false) {
        builder.compact().try_init()
    } else {
        builder.with_line_number(true).with_file(true).try_init()
    };
    res.map_err(|e| anyhow::anyhow!("failed to initialize tracing: {}", e))
}
