use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use taskwire_tasks::{RemoteError, Router, Stub, TaskHandler};

/// A built-in demo scenario: registers some fixed set of tasks against a
/// router, standing in for the module-discovery mechanism the original host
/// command surface relied on (see `--scenario` on the `taskwire` binary).
pub struct Scenario {
    /// The name passed to `--scenario` to select this scenario.
    pub name: &'static str,
    /// Registers this scenario's tasks against the given router.
    pub register: fn(&Arc<Router>, &HashMap<String, String>),
}

/// Every scenario the `taskwire` binary knows how to run.
pub const SCENARIOS: &[Scenario] = &[Scenario {
    name: "basic",
    register: register_basic,
}];

/// Looks up a scenario by name.
pub fn find(name: &str) -> Option<&'static Scenario> {
    SCENARIOS.iter().find(|scenario| scenario.name == name)
}

fn task(f: impl Fn(Value) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Value, RemoteError>> + Send>> + Send + Sync + 'static) -> TaskHandler {
    Arc::new(f)
}

fn as_i64(value: &Value) -> i64 {
    value
        .get("a")
        .or(Some(value))
        .and_then(Value::as_i64)
        .unwrap_or(0)
}

/// `task_one(a) -> a`, after a delay, matching scenario S1's single-call demo.
fn task_one() -> TaskHandler {
    task(|value| {
        Box::pin(async move {
            tokio::time::sleep(Duration::from_millis(1_000)).await;
            Ok(json!(as_i64(&value)))
        })
    })
}

/// `task_two(a) -> a`, after a longer delay, matching scenario S3/S4.
fn task_two() -> TaskHandler {
    task(|value| {
        Box::pin(async move {
            tokio::time::sleep(Duration::from_millis(2_000)).await;
            Ok(json!(as_i64(&value)))
        })
    })
}

/// `task_three(a) -> a`, with no delay, matching scenario S2's immediate call.
fn task_three() -> TaskHandler {
    task(|value| Box::pin(async move { Ok(json!(as_i64(&value))) }))
}

/// `request_sequence() -> [1, 3]`, calling `task_one(1)` then `task_two(3)` in
/// turn and asserting each result, matching scenario S3.
fn request_sequence(router: Arc<Router>) -> TaskHandler {
    task(move |_value| {
        let router = Arc::clone(&router);
        Box::pin(async move {
            let one = Stub::from_router(Arc::clone(&router), "task_one")
                .call::<_, i64>(&json!({"a": 1}))
                .await
                .map_err(|error| RemoteError::new("RequestSequenceError", error.to_string()))?;
            assert_eq!(one, 1);

            let two = Stub::from_router(router, "task_two")
                .call::<_, i64>(&json!({"a": 3}))
                .await
                .map_err(|error| RemoteError::new("RequestSequenceError", error.to_string()))?;
            assert_eq!(two, 3);

            Ok(json!([one, two]))
        })
    })
}

/// `request_parallel() -> [0,1,2,3,4,0,1,2,3,4]`, calling `task_one(a)` and
/// `task_two(a)` for `a` in `0..5` concurrently, matching scenario S4.
fn request_parallel(router: Arc<Router>) -> TaskHandler {
    task(move |_value| {
        let router = Arc::clone(&router);
        Box::pin(async move {
            let ones = (0..5).map(|a| {
                let stub = Stub::from_router(Arc::clone(&router), "task_one");
                async move { stub.call::<_, i64>(&json!({"a": a})).await }
            });
            let twos = (0..5).map(|a| {
                let stub = Stub::from_router(Arc::clone(&router), "task_two");
                async move { stub.call::<_, i64>(&json!({"a": a})).await }
            });

            let mut results = futures::future::join_all(ones).await;
            results.extend(futures::future::join_all(twos).await);

            let values = results
                .into_iter()
                .collect::<Result<Vec<i64>, _>>()
                .map_err(|error| RemoteError::new("RequestParallelError", error.to_string()))?;

            Ok(json!(values))
        })
    })
}

fn register_basic(router: &Arc<Router>, options: &HashMap<String, String>) {
    router.register_task("task_one", task_one(), options.clone()).ok();
    router.register_task("task_two", task_two(), options.clone()).ok();
    router.register_task("task_three", task_three(), options.clone()).ok();
    router
        .register_task("request_sequence", request_sequence(Arc::clone(router)), options.clone())
        .ok();
    router
        .register_task("request_parallel", request_parallel(Arc::clone(router)), options.clone())
        .ok();
}
