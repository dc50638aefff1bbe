//! litrag-common: Shared error type and HTTP plumbing used across all litrag crates.

pub mod error;
pub mod http;

pub use error::{LitragError, Result};
