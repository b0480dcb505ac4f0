use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::Mutex;
use serde_json::Value;

use crate::codec::Codec;
use crate::error::{DispatchError, DuplicateRegistration, RemoteError, RouterError, TransportError};
use crate::transport::Transport;

/// A boxed, type-erased future, the shape `async-trait` desugars `async fn` to.
type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A registered task body: decoded arguments in, a value to encode as the
/// success payload out, or a [`RemoteError`] to carry back as a failure
/// envelope instead of propagating synchronously.
pub type TaskHandler = Arc<dyn Fn(Value) -> BoxFuture<'static, Result<Value, RemoteError>> + Send + Sync>;

/// A registered task's handler alongside the free-form options it was
/// registered with.
#[derive(Clone)]
struct TaskEntry {
    handler: TaskHandler,
    options: HashMap<String, String>,
}

/// Tracks which [`Codec`] and [`Transport`] a [`Router`] is currently serving
/// requests through, so a repeated [`Router::activate`] call with the same pair
/// is a no-op rather than a double subscription.
struct Active {
    codec: Arc<dyn Codec>,
    transport: Arc<dyn Transport>,
}

/// Dispatches incoming requests to registered task handlers, and encodes
/// outgoing requests for registered client calls, all within one namespace.
///
/// A `Router` is oblivious to *how* its namespace is reached — reaching it is
/// a [`Transport`] concern — and oblivious to wire representation, which is a
/// [`Codec`] concern. It only owns the task table and the dispatch/call logic
/// that sits between them.
pub struct Router {
    namespace: String,
    unite: bool,
    tasks: DashMap<String, TaskEntry>,
    active: Mutex<Option<Active>>,
}

impl Router {
    /// Creates a router for `namespace`. When `unite` is set, registering a
    /// task name that already exists replaces the previous handler instead of
    /// failing with [`DuplicateRegistration`] — the behavior of a Python
    /// `Manager` operating in *unite* mode, where re-importing a module is
    /// expected to redefine its tasks.
    pub fn new(namespace: impl Into<String>, unite: bool) -> Self {
        Self {
            namespace: namespace.into(),
            unite,
            tasks: DashMap::new(),
            active: Mutex::new(None),
        }
    }

    /// The namespace this router serves.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Registers a task handler under `name`, along with free-form `options`
    /// forwarded alongside it in the task table (e.g. scheduling hints),
    /// mirroring the `{name, task, options}` task entry.
    ///
    /// Outside *unite* mode, registering an already-registered name fails with
    /// [`DuplicateRegistration`] rather than silently overwriting it.
    pub fn register_task(
        &self,
        name: impl Into<String>,
        handler: TaskHandler,
        options: HashMap<String, String>,
    ) -> Result<(), DuplicateRegistration> {
        let name = name.into();
        let entry = TaskEntry { handler, options };

        if self.unite {
            self.tasks.insert(name, entry);
            return Ok(());
        }

        match self.tasks.entry(name) {
            Entry::Occupied(occupied) => Err(DuplicateRegistration {
                name: occupied.key().clone(),
                namespace: self.namespace.clone(),
            }),
            Entry::Vacant(vacant) => {
                vacant.insert(entry);
                Ok(())
            }
        }
    }

    /// Returns whether a task by this name is registered.
    pub fn has_task(&self, name: &str) -> bool {
        self.tasks.contains_key(name)
    }

    /// Returns the options a task was registered with, if it exists.
    pub fn task_options(&self, name: &str) -> Option<HashMap<String, String>> {
        self.tasks.get(name).map(|entry| entry.options.clone())
    }

    /// Begins serving this namespace's task table over `transport`, encoding
    /// and decoding payloads with `codec`. Connects the transport and installs
    /// the dispatch callback.
    ///
    /// Calling this again with the same codec and transport (by pointer
    /// identity) is a no-op; calling it with a different pair replaces the
    /// previous activation.
    pub async fn activate(self: &Arc<Self>, codec: Arc<dyn Codec>, transport: Arc<dyn Transport>) -> Result<(), TransportError> {
        let previous = {
            let active = self.active.lock();
            match active.as_ref() {
                Some(active) if Arc::ptr_eq(&active.codec, &codec) && Arc::ptr_eq(&active.transport, &transport) => {
                    return Ok(());
                }
                Some(active) => Some(Arc::clone(&active.transport)),
                None => None,
            }
        };

        if let Some(previous) = previous {
            previous.unregister_callback().await;
        }

        transport.connect().await?;

        let router = Arc::clone(self);
        transport
            .register_callback(Arc::new(move |task_name, payload| {
                let router = Arc::clone(&router);
                Box::pin(async move { router.dispatch(&task_name, payload).await })
            }))
            .await;

        *self.active.lock() = Some(Active { codec, transport });

        Ok(())
    }

    /// Stops serving this namespace: unregisters the dispatch callback and
    /// disconnects the transport. A no-op if never activated.
    pub async fn deactivate(&self) -> Result<(), TransportError> {
        let active = self.active.lock().take();

        if let Some(active) = active {
            active.transport.unregister_callback().await;
            active.transport.disconnect().await?;
        }

        Ok(())
    }

    /// Invoked by a [`Transport`] for every inbound request. Decodes the
    /// payload, runs the named task if registered, and encodes a
    /// `(is_success, value)` envelope as the response — never lets a missing
    /// task or a task-raised error propagate past this boundary, so that a
    /// single bad request can never take down the surrounding message loop.
    pub async fn dispatch(&self, task_name: &str, payload: Vec<u8>) -> Result<Vec<u8>, DispatchError> {
        let codec = {
            let active = self.active.lock();
            active
                .as_ref()
                .map(|active| Arc::clone(&active.codec))
                .ok_or_else(|| DispatchError::NoCodecRegistered(self.namespace.clone()))?
        };

        let handler = self.tasks.get(task_name).map(|entry| Arc::clone(&entry.value().handler));

        let envelope = match handler {
            None => {
                let error = RemoteError::new("JobNotFound", format!("no task named '{task_name}' in namespace '{}'", self.namespace));
                encode_failure(error)
            }
            Some(handler) => {
                let arguments = codec.decode(&payload)?;

                match handler(arguments).await {
                    Ok(value) => serde_json::json!([true, value]),
                    Err(error) => encode_failure(error),
                }
            }
        };

        codec.encode(&envelope).map_err(DispatchError::from)
    }

    /// Encodes and sends `arguments` to `task_name` over the active transport,
    /// awaits the reply, and decodes it back into either a success value or a
    /// [`RouterError::Remote`] carrying the remote failure.
    pub async fn send_request(&self, task_name: &str, arguments: Value) -> Result<Value, RouterError> {
        let (codec, transport) = {
            let active = self.active.lock();
            let active = active
                .as_ref()
                .ok_or_else(|| RouterError::NoClientTransportRegistered(self.namespace.clone()))?;
            (Arc::clone(&active.codec), Arc::clone(&active.transport))
        };

        let payload = codec.encode(&arguments)?;
        let response = transport.send_request(task_name, payload).await?;
        let envelope = codec.decode(&response)?;

        decode_envelope(envelope)
    }
}

fn encode_failure(error: RemoteError) -> Value {
    serde_json::json!([false, serde_json::to_value(error).unwrap_or(Value::Null)])
}

fn decode_envelope(envelope: Value) -> Result<Value, RouterError> {
    let Value::Array(mut pair) = envelope else {
        return Err(RouterError::Remote(RemoteError::new(
            "MalformedEnvelope",
            "response envelope was not a two-element array",
        )));
    };

    if pair.len() != 2 {
        return Err(RouterError::Remote(RemoteError::new(
            "MalformedEnvelope",
            "response envelope did not carry exactly two elements",
        )));
    }

    let value = pair.pop().unwrap();
    let is_success = pair.pop().unwrap().as_bool().unwrap_or(false);

    if is_success {
        Ok(value)
    } else {
        let error = serde_json::from_value(value).unwrap_or_else(|_| {
            RemoteError::new("UnknownError", "task raised an error that could not be decoded")
        });
        Err(RouterError::Remote(error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::JsonCodec;
    use crate::loopback::LoopbackTransport;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn handler(f: impl Fn(Value) -> Result<Value, RemoteError> + Send + Sync + 'static) -> TaskHandler {
        Arc::new(move |value| {
            let result = f(value);
            Box::pin(async move { result })
        })
    }

    async fn wired(unite: bool) -> Arc<Router> {
        let router = Arc::new(Router::new("demo", unite));
        let transport: Arc<dyn Transport> = Arc::new(LoopbackTransport::new());
        router
            .activate(Arc::new(JsonCodec), Arc::clone(&transport))
            .await
            .unwrap();
        router
    }

    #[tokio::test]
    async fn registers_and_rejects_duplicate_task_names() {
        let router = Router::new("demo", false);
        router.register_task("task_one", handler(Ok), HashMap::new()).unwrap();

        let result = router.register_task("task_one", handler(Ok), HashMap::new());

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn unite_mode_replaces_existing_task() {
        let router = Router::new("demo", true);
        router.register_task("task_one", handler(|_| Ok(json!(1))), HashMap::new()).unwrap();
        router.register_task("task_one", handler(|_| Ok(json!(2))), HashMap::new()).unwrap();

        assert!(router.has_task("task_one"));
    }

    #[tokio::test]
    async fn register_task_retains_its_options() {
        let router = Router::new("demo", false);
        let options = HashMap::from([("retries".to_string(), "3".to_string())]);
        router.register_task("task_one", handler(Ok), options.clone()).unwrap();

        assert_eq!(router.task_options("task_one"), Some(options));
        assert_eq!(router.task_options("no_such_task"), None);
    }

    #[tokio::test]
    async fn dispatch_runs_registered_task() {
        let router = wired(false).await;
        router
            .register_task("task_one", handler(|value| Ok(json!({"sum": value["a"].as_i64().unwrap_or(0) + 1}))), HashMap::new())
            .unwrap();

        let request = JsonCodec.encode(&json!({"a": 41})).unwrap();
        let response = router.dispatch("task_one", request).await.unwrap();
        let envelope = JsonCodec.decode(&response).unwrap();

        assert_eq!(envelope, json!([true, {"sum": 42}]));
    }

    #[tokio::test]
    async fn dispatch_reports_missing_task_as_failure_envelope_not_error() {
        let router = wired(false).await;

        let request = JsonCodec.encode(&json!({})).unwrap();
        let response = router.dispatch("no_such_task", request).await.unwrap();
        let envelope = JsonCodec.decode(&response).unwrap();

        let Value::Array(pair) = envelope else { panic!("expected array envelope") };
        assert_eq!(pair[0], json!(false));
        assert_eq!(pair[1]["kind"], json!("JobNotFound"));
    }

    #[tokio::test]
    async fn dispatch_reports_task_error_as_failure_envelope_not_error() {
        let router = wired(false).await;
        router
            .register_task("task_one", handler(|_| Err(RemoteError::new("ValueError", "bad input"))), HashMap::new())
            .unwrap();

        let request = JsonCodec.encode(&json!({})).unwrap();
        let response = router.dispatch("task_one", request).await.unwrap();
        let envelope = JsonCodec.decode(&response).unwrap();

        let Value::Array(pair) = envelope else { panic!("expected array envelope") };
        assert_eq!(pair[0], json!(false));
        assert_eq!(pair[1]["kind"], json!("ValueError"));
    }

    #[tokio::test]
    async fn send_request_round_trips_through_dispatch() {
        let router = wired(false).await;
        router
            .register_task("task_one", handler(|value| Ok(json!(value["a"].as_i64().unwrap_or(0) * 2))), HashMap::new())
            .unwrap();

        let result = router.send_request("task_one", json!({"a": 21})).await.unwrap();

        assert_eq!(result, json!(42));
    }

    #[tokio::test]
    async fn send_request_surfaces_remote_error() {
        let router = wired(false).await;
        router
            .register_task("task_one", handler(|_| Err(RemoteError::new("JobNotFound", "gone"))), HashMap::new())
            .unwrap();

        let result = router.send_request("task_one", json!({})).await;

        match result {
            Err(RouterError::Remote(error)) => assert_eq!(error.kind, "JobNotFound"),
            other => panic!("expected RouterError::Remote, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn activate_is_idempotent_for_the_same_pair() {
        let router = Arc::new(Router::new("demo", false));
        let codec: Arc<dyn Codec> = Arc::new(JsonCodec);
        let transport: Arc<dyn Transport> = Arc::new(LoopbackTransport::new());

        router.activate(Arc::clone(&codec), Arc::clone(&transport)).await.unwrap();
        router.activate(Arc::clone(&codec), Arc::clone(&transport)).await.unwrap();

        router.deactivate().await.unwrap();
    }

    #[tokio::test]
    async fn activate_unregisters_the_previous_transport_when_switching() {
        let router = Arc::new(Router::new("demo", false));
        let codec: Arc<dyn Codec> = Arc::new(JsonCodec);
        let first: Arc<dyn Transport> = Arc::new(LoopbackTransport::new());
        let second: Arc<dyn Transport> = Arc::new(LoopbackTransport::new());

        router.activate(Arc::clone(&codec), Arc::clone(&first)).await.unwrap();
        router.activate(codec, Arc::clone(&second)).await.unwrap();

        // The previous transport's callback must have been unregistered, even
        // though it is still connected.
        let result = first.send_request("task_one", vec![]).await;
        assert!(matches!(result, Err(TransportError::NoCallbackRegistered)));

        router.deactivate().await.unwrap();
    }
}
