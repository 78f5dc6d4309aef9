//! `fleamarket-core`: marketplace foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod entity;
pub mod error;
pub mod id;
pub mod patch;

pub use entity::Entity;
pub use error::{BusinessRule, DomainError, DomainResult};
pub use id::{CategoryId, ItemId, UserId};
pub use patch::Patch;
