//! Endpoint handlers.

pub mod generate;
pub mod health;
