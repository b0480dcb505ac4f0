//! Shared, non-public test-support utilities for the Taskwire workspace's
//! system tests. Has no stability guarantees of its own.

mod harness;
pub use self::harness::Harness;
