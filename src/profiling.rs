//! # Profiling Guide
//!
//! With the `profiling` feature enabled, registry hot paths (insert,
//! erase) open `tracing` spans carrying entity and archetype counts.
//!
//! ## Basic Usage
//!
//! Enable the feature in your Cargo.toml:
//!
//! ```toml
//! [dependencies]
//! strata_ecs = { version = "0.3", features = ["profiling"] }
//! ```
//!
//! Install a collector once at startup, then drive the registry normally:
//!
//! ```ignore
//! strata_ecs::profiling::init_profiling();
//!
//! let mut registry = Registry::new();
//! let handle = registry.insert((Position { x: 0.0, y: 0.0 },));
//! ```
//!
//! ## Performance Tips
//!
//! 1. Profile in release mode for accurate metrics
//! 2. Use `RUST_LOG=debug` to see all spans

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;

/// Install a console subscriber for registry spans.
///
/// Does nothing if a global subscriber is already set.
pub fn init_profiling() {
    let subscriber = tracing_subscriber::registry().with(tracing_subscriber::fmt::layer());
    let _ = tracing::subscriber::set_global_default(subscriber);
}

/// Install a JSON-lines subscriber writing into daily-rolled files under
/// `directory`. Keep the returned guard alive for the duration of the
/// program; dropping it flushes and stops the writer thread.
pub fn init_profiling_to_file(directory: &str, prefix: &str) -> WorkerGuard {
    let appender = tracing_appender::rolling::daily(directory, prefix);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let subscriber = tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().json().with_writer(writer));
    let _ = tracing::subscriber::set_global_default(subscriber);
    guard
}
