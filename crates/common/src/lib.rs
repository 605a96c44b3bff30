//! Shared error plumbing and time helpers used across all envio crates.

pub mod error;
pub mod time;

pub use {
    error::{Error, FromMessage, Result},
    time::now_ms,
};
