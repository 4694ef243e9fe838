//! Log output for the command-line tool, through `tracing`.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default filter for a verbosity level: `-q` → warn, none → info,
/// `-v` → debug, `-vv` and up → trace. `RUST_LOG` wins when set.
pub fn default_filter(verbose: u8, quiet: bool) -> &'static str {
    if quiet {
        return "warn";
    }
    match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    }
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init(verbose: u8, quiet: bool) -> Result<(), String> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(verbose, quiet)));

    let fmt_layer = fmt::layer()
        .with_target(verbose > 0)
        .with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| e.to_string())
}
