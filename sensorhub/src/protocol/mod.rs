//! Protocol implementations.

pub mod hex;
pub mod register;

// Re-export common types
pub use register::{Direction, RegisterCommand, RegisterHeader};
