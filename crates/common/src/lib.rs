//! Shared error definitions and helpers used across all courier crates.

pub mod error;

pub use error::{BoxedSource, Error, FromSource, Result};
