//! Logging setup for the command line tool.
//!
//! Events go to stderr so they never mix with program output. The filter
//! comes from `AWK_VM_LOG` in `EnvFilter` syntax, for example
//! `AWK_VM_LOG=awk::io=debug,awk::vm=trace`.

use std::io;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Environment variable holding the log filter
pub const LOG_ENV: &str = "AWK_VM_LOG";

const DEFAULT_FILTER: &str = "warn";

/// Install the stderr logger
pub fn init() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let stderr_layer = fmt::layer()
        .compact()
        .with_target(true)
        .without_time()
        .with_writer(io::stderr)
        .with_filter(filter);

    // Fails only if a subscriber is already installed
    let _ = tracing_subscriber::registry().with(stderr_layer).try_init();
}
