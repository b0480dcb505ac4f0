//! System tests for `taskwire-tasks`, exercising its public API the way a
//! consumer would rather than reaching into its internals.
//!
//! This crate has no public API of its own; it only hosts integration tests
//! under `tests/`.
