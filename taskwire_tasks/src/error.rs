use thiserror::Error;

/// Raised when registering a task name that is already registered in the same
/// namespace's non-*unite* task table.
#[derive(Debug, Error)]
#[error("task '{name}' is already registered in namespace '{namespace}'")]
pub struct DuplicateRegistration {
    pub(crate) name: String,
    pub(crate) namespace: String,
}

/// A local, non-remotable failure to encode or decode a value.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct CodecError {
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl CodecError {
    pub fn new(message: impl Into<String>, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

/// A failure originating from the transport layer: connection loss, an
/// unencodable outgoing request, a correlation-ID collision, or a response
/// that never showed up because `disconnect()` tore down the transport first.
#[derive(Debug, Error)]
pub enum TransportError {
    /// `send_request`/`register_callback` were called before `connect`.
    #[error("transport is not connected")]
    NotConnected,
    /// An inbound request arrived with no callback registered to serve it.
    #[error("no callback is registered to receive requests")]
    NoCallbackRegistered,
    /// A freshly generated correlation ID collided with one already in flight.
    #[error("correlation id '{0}' is already in flight")]
    CorrelationCollision(String),
    /// `disconnect()` tore the transport down while this request was pending.
    #[error("transport was disconnected while a request was still in flight")]
    Disconnected,
    /// The underlying broker connection was lost.
    #[error("the broker connection was lost")]
    ConnectionLost,
}

/// The interop exception envelope carried over the wire in place of a Python-style
/// traceback: the originating error's type name, its display message, and an
/// optional debug-formatted detail string.
///
/// Reconstructed client-side from a `(false, envelope)` response and surfaced to
/// the caller of [`crate::Stub::call`] as this very type.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize, Error)]
#[error("{kind}: {message}")]
pub struct RemoteError {
    /// The originating error's type name (e.g. `"JobNotFound"`, `"ValueError"`).
    pub kind: String,
    /// The originating error's display message.
    pub message: String,
    /// An optional debug-formatted detail string.
    pub details: Option<String>,
}

impl RemoteError {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// Everything that can go wrong calling [`crate::Stub::call`] or serving a
/// dispatched request.
#[derive(Debug, Error)]
pub enum RouterError {
    /// No [`crate::Codec`] has been activated for this namespace yet.
    #[error("no codec registered for namespace '{0}'")]
    NoCodecRegistered(String),
    /// No [`crate::Transport`] has been activated for this namespace yet.
    #[error("no client transport registered for namespace '{0}'")]
    NoClientTransportRegistered(String),
    /// A local codec failure while encoding the call or decoding the reply.
    #[error(transparent)]
    Codec(#[from] CodecError),
    /// A local transport failure.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// The remote task (or the server's dispatch) raised an error.
    #[error("remote task raised an error")]
    Remote(#[source] RemoteError),
}

/// The narrow error a [`crate::Transport`] callback may fail with — strictly the
/// local conditions that prevent a response from being encoded at all. Anything
/// the task itself raises is instead carried as a `(false, envelope)` response,
/// never as this error.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// No [`crate::Codec`] has been activated for this namespace yet.
    #[error("no codec registered for namespace '{0}'")]
    NoCodecRegistered(String),
    /// A local codec failure while decoding the request or encoding the reply.
    #[error(transparent)]
    Codec(#[from] CodecError),
}
