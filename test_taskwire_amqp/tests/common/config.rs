use taskwire_amqp::AmqpTopologyConfig;

use crate::common::names::mangle;

/// Builds a topology config pointed at a broker reachable via
/// `RABBITMQ_HOST`/`RABBITMQ_PORT` (defaulting to `localhost:5672`), with a
/// freshly mangled exchange/queue/prefix so concurrent test runs don't step
/// on each other's topology.
pub fn make_topology_config() -> AmqpTopologyConfig {
    let host = std::env::var("RABBITMQ_HOST").unwrap_or_else(|_| "localhost".to_string());
    let port = std::env::var("RABBITMQ_PORT")
        .ok()
        .and_then(|s| s.parse::<u16>().ok())
        .unwrap_or(5672);

    let exchange = mangle("taskwire-amqp-test-exchange");
    let queue = mangle("taskwire-amqp-test-queue");

    let yaml = format!(
        "host: {host}\nport: {port}\nuser: guest\npassword: guest\nvhost: /\nexchange: {exchange}\nqueue: {queue}\n",
    );

    serde_yml::from_str(&yaml).expect("well-formed topology config fixture")
}
