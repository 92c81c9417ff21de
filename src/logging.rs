//! Logging setup. Diagnostics go to stderr so stdout stays usable for listings.

use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::EnvFilter;

/// Filter directive for a `-v` count; `quiet` wins over verbosity.
pub fn default_directive(verbosity: u8, quiet: bool) -> &'static str {
    if quiet {
        return "mdpack=error";
    }
    match verbosity {
        0 => "mdpack=warn",
        1 => "mdpack=info",
        _ => "mdpack=debug",
    }
}

/// Install the global subscriber. `RUST_LOG`, when set, replaces the verbosity-derived filter.
pub fn init(verbosity: u8, quiet: bool) -> Result<(), TryInitError> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbosity, quiet)));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .without_time(),
        )
        .try_init()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_maps_to_levels() {
        assert_eq!(default_directive(0, false), "mdpack=warn");
        assert_eq!(default_directive(1, false), "mdpack=info");
        assert_eq!(default_directive(5, false), "mdpack=debug");
        assert_eq!(default_directive(2, true), "mdpack=error");
    }
}
