//! Diagnostic logging setup.
//!
//! Events go to stderr so stdout stays clean for `--json` output. The
//! level comes from `RUST_LOG` when set; otherwise `warn`, or `debug` for
//! this crate with `-v`.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn default_directive(verbose: bool) -> &'static str {
    if verbose {
        "warn,context_vectors=debug"
    } else {
        "warn"
    }
}

/// Install the global subscriber. Safe to call more than once.
pub fn init(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(filter)
        .try_init()
        .ok();
}
