use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{DispatchError, TransportError};

/// A boxed, type-erased future, the shape `async-trait` desugars `async fn` to.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// The single inbound hook a [`Transport`] calls to dispatch an incoming request
/// into application code: task name, encoded arguments in, encoded response (or
/// a local dispatch failure) out.
///
/// A transport holds at most one of these at a time — see
/// [`Transport::register_callback`].
pub type RequestCallback =
    Arc<dyn Fn(String, Vec<u8>) -> BoxFuture<'static, Result<Vec<u8>, DispatchError>> + Send + Sync>;

/// The wire-level half of a namespace: carries encoded requests to wherever
/// tasks are registered, and carries encoded requests from wherever tasks were
/// sent back to this process.
///
/// A transport does not know about task names, codecs, or the task table — it
/// only moves bytes, tagged with a task name, to a reply destination and back.
/// The [`crate::Router`] is the only caller.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Establishes whatever connection or subscription this transport needs
    /// before it can send or receive requests. Idempotent.
    async fn connect(&self) -> Result<(), TransportError>;

    /// Tears the transport down. Any request awaiting a reply through
    /// [`Transport::send_request`] fails with [`TransportError::Disconnected`].
    async fn disconnect(&self) -> Result<(), TransportError>;

    /// Sends an encoded request for `task_name` and awaits its encoded response.
    async fn send_request(&self, task_name: &str, payload: Vec<u8>) -> Result<Vec<u8>, TransportError>;

    /// Installs the callback invoked for every request this transport receives
    /// on behalf of the local namespace. Replaces any previously registered
    /// callback.
    async fn register_callback(&self, callback: RequestCallback);

    /// Removes whatever callback is currently registered, if any.
    async fn unregister_callback(&self);
}
