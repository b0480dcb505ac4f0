use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::RouterError;
use crate::namespaces::Namespaces;
use crate::router::Router;

/// A typed client-side handle to one remote task.
///
/// A stub holds its namespace's [`Router`] and the task name it calls — never
/// a transport directly, so the same stub keeps working across a transport
/// being swapped out or reconnected underneath it.
pub struct Stub {
    router: Arc<Router>,
    task_name: String,
}

impl Stub {
    /// Looks up (or lazily creates) the router for `namespace` and returns a
    /// stub bound to `task_name` within it.
    pub fn new(namespace: &str, task_name: impl Into<String>) -> Self {
        Self {
            router: Namespaces::router(namespace, false),
            task_name: task_name.into(),
        }
    }

    /// Builds a stub directly from an already-resolved router, bypassing the
    /// global namespace table. Mainly useful in tests.
    pub fn from_router(router: Arc<Router>, task_name: impl Into<String>) -> Self {
        Self {
            router,
            task_name: task_name.into(),
        }
    }

    /// The task name this stub calls.
    pub fn task_name(&self) -> &str {
        &self.task_name
    }

    /// Encodes `arguments`, sends the request, and decodes the reply as `R`.
    ///
    /// Fails with [`RouterError::Remote`] if the remote task raised an error
    /// (including when it was not found at all), or with one of the other
    /// [`RouterError`] variants for a local codec or transport failure.
    pub async fn call<A, R>(&self, arguments: &A) -> Result<R, RouterError>
    where
        A: Serialize,
        R: DeserializeOwned,
    {
        let arguments = serde_json::to_value(arguments).map_err(|error| {
            RouterError::Codec(crate::error::CodecError::new("failed to encode call arguments", error))
        })?;

        let value = self.call_value(arguments).await?;

        serde_json::from_value(value).map_err(|error| {
            RouterError::Codec(crate::error::CodecError::new("failed to decode call result", error))
        })
    }

    /// The untyped form of [`Stub::call`], operating directly on
    /// [`serde_json::Value`].
    pub async fn call_value(&self, arguments: Value) -> Result<Value, RouterError> {
        self.router.send_request(&self.task_name, arguments).await
    }
}

/// Formats as `ref[<task_name>/<namespace>]`, the stub's debug identity.
impl fmt::Debug for Stub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ref[{}/{}]", self.task_name, self.router.namespace())
    }
}

impl fmt::Display for Stub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
