#![doc = include_str!("../README.md")]
#![deny(missing_docs)]
#![cfg_attr(test, deny(warnings))]

/// Exposes an application configuration section.
mod config;
pub use self::config::AmqpTopologyConfig;

/// Exposes a handle for defining a set of connection credentials.
mod handle;
pub use self::handle::{DsnChunks, Handle, InvalidDsn};

/// Exposes machinery for maintaining a connection to a RabbitMQ cluster.
mod connector;
pub use self::connector::{Connector, Gateway};

/// Exposes the AMQP-backed `Transport` implementation.
mod transport;
pub use self::transport::AmqpTransport;

/// Re-exports the [`app_shutdown`](taskwire_runtime::app_shutdown) function to
/// facilitate stand-alone usage of this crate.
///
/// When using this crate without the `taskwire` binary itself, await on this
/// function as a last thing before completing the main application logic.
pub use taskwire_runtime::app_shutdown;
