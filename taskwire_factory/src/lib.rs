//! Procedural macros supporting the rest of the Taskwire family of crates.

use proc_macro::TokenStream;

mod config;

/// Generates a field-matching enum used by custom `Deserialize` implementations that need
/// human-friendly field aliasing (e.g. accepting both `host` and `hostname`).
///
/// ```ignore
/// impl_deserialize_field!(
///     HandleField,
///     taskwire_deserialize::Slug::eq_as_slugs,
///     name,
///     host | hostname,
///     port,
/// );
/// ```
#[proc_macro]
pub fn impl_deserialize_field(input: TokenStream) -> TokenStream {
    self::config::field::impl_deserialize_field(input)
}
