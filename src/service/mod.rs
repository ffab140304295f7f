//! Services shared by the repository and handlers.

mod validation;
pub use validation::{RequestValidator, ValidationMode};
