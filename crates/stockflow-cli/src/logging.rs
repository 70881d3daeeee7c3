//! Tracing subscriber setup for the `stockflow` binary.

use tracing_subscriber::EnvFilter;

/// Crates whose events follow the `--log-level` flag; everything else
/// stays at `warn` unless `RUST_LOG` overrides the whole filter.
const OWN_CRATES: [&str; 4] = [
    "stockflow_cli",
    "stockflow_engine",
    "stockflow_checkpoint",
    "stockflow_types",
];

/// Install the global subscriber.
///
/// `RUST_LOG` takes precedence when set; otherwise `level` is applied
/// to the stockflow crates and dependencies are kept at `warn`.
pub fn init(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let mut directives = String::from("warn");
        for krate in OWN_CRATES {
            directives.push_str(&format!(",{krate}={level}"));
        }
        EnvFilter::new(directives)
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
