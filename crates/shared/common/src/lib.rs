//! Common utilities shared across the mapper crates.
//!
//! This crate provides:
//! - The unified mapping error taxonomy
//! - Environment-driven mapper settings

pub mod config;
pub mod error;

pub use config::*;
pub use error::{MapperError, MapperResult, OptionExt};
