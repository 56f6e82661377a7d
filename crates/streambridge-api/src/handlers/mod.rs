//! Request handlers.

pub mod consumers;
pub mod health;
