//! Shared types and utilities for the aeiouly client and harness.

pub mod error;
pub mod models;
pub mod protocol;

pub use error::*;
pub use models::*;
pub use protocol::*;
