//! Domain errors

mod entity_error;

pub use entity_error::EntityError;
