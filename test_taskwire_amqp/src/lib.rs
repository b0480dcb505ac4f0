//! System tests for `taskwire-amqp` against a real RabbitMQ broker.
//!
//! These tests are `#[ignore]`d by default since they need a broker reachable
//! at `RABBITMQ_HOST`/`RABBITMQ_PORT` (defaulting to `localhost:5672`); run
//! them explicitly with `cargo test -- --ignored` once one is up.
//!
//! This crate has no public API of its own; it only hosts integration tests
//! under `tests/`.
