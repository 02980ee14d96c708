//! Domain layer - Backing store vocabulary.
//!
//! This crate contains the store-native types every other crate speaks:
//! item identities, raw items and their field values. It has no knowledge of
//! mapping, caching or any concrete store implementation.

pub mod constants;
pub mod error;
pub mod item;

pub use constants::*;
pub use error::{DomainError, DomainResult};
pub use item::{Item, ItemId};
