//! Tracing subscriber setup.

use tracing::Level;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" | "warning" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// `RUST_LOG` directives when they are set and valid, otherwise the
/// configured level for everything.
fn build_filter(rust_log: Option<&str>, level: &str) -> EnvFilter {
    let configured = || EnvFilter::default().add_directive(parse_level(level).into());

    match rust_log.map(str::trim).filter(|d| !d.is_empty()) {
        Some(directives) => EnvFilter::try_new(directives).unwrap_or_else(|e| {
            eprintln!("Ignoring invalid RUST_LOG ({e}), using level {level}");
            configured()
        }),
        None => configured(),
    }
}

/// Install a console subscriber. `RUST_LOG` wins over the configured level.
/// Calling this twice is harmless.
pub fn init(level: &str) {
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let filter = build_filter(rust_log.as_deref(), level);

    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stdout)
                .with_target(true),
        )
        .with(filter)
        .try_init();
}
