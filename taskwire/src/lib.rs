#![doc = include_str!("../README.md")]
#![deny(missing_docs)]
#![cfg_attr(test, deny(warnings))]

/// Implements the [`App`] facade, the process entry point.
mod app;
pub use self::app::App;

/// Implements command-line argument parsing for the `taskwire` binary.
pub mod cli;
pub use self::cli::{Cli, CliError, Mode, TransportKind};

/// Built-in demo scenarios exercising the task-invocation machinery end to
/// end, selected with the CLI's `--scenario` flag.
#[path = "../demos/scenarios.rs"]
pub mod demos;

/// Re-exports the public API of `taskwire-tasks` for convenience.
pub use taskwire_tasks as tasks;

/// Re-exports the public API of `taskwire-amqp` for convenience.
pub use taskwire_amqp as amqp;

/// Re-exports the public API of `taskwire-runtime` for convenience.
pub use taskwire_runtime::*;

/// Re-exports the public API of `taskwire-tracing` for convenience.
pub use taskwire_tracing as tracing_layer;

/// Re-exports the public API of `tokio` for convenience.
pub use tokio;
