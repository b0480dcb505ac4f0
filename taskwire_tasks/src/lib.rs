#![doc = include_str!("../README.md")]
#![deny(missing_docs)]
#![cfg_attr(test, deny(warnings))]

/// Exposes the error types raised across codec, transport, and router
/// boundaries.
mod error;
pub use self::error::{CodecError, DispatchError, DuplicateRegistration, RemoteError, RouterError, TransportError};

/// Exposes the [`Codec`] trait and the bundled [`JsonCodec`].
mod codec;
pub use self::codec::{Codec, JsonCodec};

/// Exposes the [`Transport`] trait and its supporting types.
mod transport;
pub use self::transport::{BoxFuture, RequestCallback, Transport};

/// Exposes [`LoopbackTransport`], an in-process [`Transport`].
mod loopback;
pub use self::loopback::LoopbackTransport;

/// Exposes [`Router`], the per-namespace dispatch and call machinery.
mod router;
pub use self::router::{Router, TaskHandler};

/// Exposes [`Namespaces`], the process-wide namespace registry facade.
mod namespaces;
pub use self::namespaces::Namespaces;

/// Exposes [`Stub`], a typed client-side handle to one remote task.
mod stub;
pub use self::stub::Stub;
