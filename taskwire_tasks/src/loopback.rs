use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::{DispatchError, TransportError};
use crate::transport::{RequestCallback, Transport};

/// An in-process [`Transport`] that calls straight into whatever callback is
/// registered, with no broker, no encoding round-trip through a socket, and no
/// concurrency beyond the caller's own task.
///
/// Useful for tests and for single-process deployments where client and server
/// live in the same namespace.
#[derive(Default)]
pub struct LoopbackTransport {
    callback: Mutex<Option<RequestCallback>>,
    connected: Mutex<bool>,
}

impl LoopbackTransport {
    /// Creates a disconnected loopback transport.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        *self.connected.lock() = true;
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        *self.connected.lock() = false;
        *self.callback.lock() = None;
        Ok(())
    }

    async fn send_request(&self, task_name: &str, payload: Vec<u8>) -> Result<Vec<u8>, TransportError> {
        if !*self.connected.lock() {
            return Err(TransportError::NotConnected);
        }

        let callback = self
            .callback
            .lock()
            .clone()
            .ok_or(TransportError::NoCallbackRegistered)?;

        callback(task_name.to_string(), payload)
            .await
            .map_err(|error| match error {
                DispatchError::NoCodecRegistered(namespace) => {
                    tracing::warn!(namespace, "loopback dispatch found no codec registered");
                    TransportError::NoCallbackRegistered
                }
                DispatchError::Codec(error) => {
                    tracing::warn!(%error, "loopback dispatch failed to decode request");
                    TransportError::NoCallbackRegistered
                }
            })
    }

    async fn register_callback(&self, callback: RequestCallback) {
        *self.callback.lock() = Some(callback);
    }

    async fn unregister_callback(&self) {
        *self.callback.lock() = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn fails_before_connect() {
        let transport = LoopbackTransport::new();

        let result = transport.send_request("task_one", vec![1, 2, 3]).await;

        assert!(matches!(result, Err(TransportError::NotConnected)));
    }

    #[tokio::test]
    async fn fails_without_registered_callback() {
        let transport = LoopbackTransport::new();
        transport.connect().await.unwrap();

        let result = transport.send_request("task_one", vec![1, 2, 3]).await;

        assert!(matches!(result, Err(TransportError::NoCallbackRegistered)));
    }

    #[tokio::test]
    async fn round_trips_through_registered_callback() {
        let transport = LoopbackTransport::new();
        transport.connect().await.unwrap();
        transport
            .register_callback(Arc::new(|name, payload| {
                Box::pin(async move {
                    assert_eq!(name, "task_one");
                    Ok(payload)
                })
            }))
            .await;

        let result = transport.send_request("task_one", vec![9, 9]).await.unwrap();

        assert_eq!(result, vec![9, 9]);
    }

    #[tokio::test]
    async fn disconnect_clears_callback() {
        let transport = LoopbackTransport::new();
        transport.connect().await.unwrap();
        transport
            .register_callback(Arc::new(|_, payload| Box::pin(async move { Ok(payload) })))
            .await;

        transport.disconnect().await.unwrap();
        let result = transport.send_request("task_one", vec![]).await;

        assert!(matches!(result, Err(TransportError::NotConnected)));
    }
}
