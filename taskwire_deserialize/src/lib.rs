#![doc = include_str!("../README.md")]
#![deny(missing_docs)]
#![cfg_attr(test, deny(warnings))]

/// Slug-related utilities
mod slug;
pub use self::slug::Slug;
