//! Tracing setup for the engine.
//!
//! Level filtering comes from the `[logging]` config block unless `RUST_LOG`
//! is set, which always wins:
//!
//! ```bash
//! RUST_LOG=debug ctxgraph index
//! RUST_LOG=ctxgraph::retrieve=trace ctxgraph query "explain foo"
//! ```

use crate::config::LoggingConfig;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::ChronoLocal;

/// Initialize logging with configuration.
///
/// Repeated calls are harmless; only the first subscriber wins.
pub fn init_with_config(config: &LoggingConfig) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter_from(config))
        .with_timer(ChronoLocal::new("%H:%M:%S%.3f".to_owned()))
        .with_target(true)
        .try_init();
}

/// Initialize logging with default configuration (`warn`, quiet operation).
pub fn init() {
    init_with_config(&LoggingConfig::default());
}

/// Level filter from config, unless `RUST_LOG` overrides it. The config's
/// per-module entries become individual filter directives; entries that do
/// not parse are dropped with a note on stderr.
fn filter_from(config: &LoggingConfig) -> EnvFilter {
    if std::env::var_os("RUST_LOG").is_some() {
        return EnvFilter::from_default_env();
    }

    let mut filter =
        EnvFilter::try_new(&config.default).unwrap_or_else(|_| EnvFilter::new("warn"));
    for (module, level) in &config.modules {
        match format!("{module}={level}").parse() {
            Ok(directive) => filter = filter.add_directive(directive),
            Err(err) => eprintln!("Warning: bad log directive '{module}={level}': {err}"),
        }
    }
    filter
}
