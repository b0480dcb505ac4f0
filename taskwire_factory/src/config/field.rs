mod generator;
mod input;

pub use self::generator::impl_deserialize_field;
