//! Tracing setup. Log lines go to stderr so command output on stdout stays
//! clean for piping.

use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "kennel=info";
const VERBOSE_FILTER: &str = "kennel=debug";

/// Build the filter: `RUST_LOG` wins, otherwise `--verbose` picks debug.
pub fn env_filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if verbose { VERBOSE_FILTER } else { DEFAULT_FILTER })
    })
}

/// Install the global subscriber. Call once at startup.
pub fn init(verbose: bool, json: bool) {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter(verbose))
        .with_writer(std::io::stderr)
        .with_target(false);

    // A second init (e.g. from tests) is not an error worth surfacing.
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}
