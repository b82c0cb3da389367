//! Unit definitions and the scene-wide default-unit mapping.
//!
//! # Responsibility
//! - Seed and expose the built-in unit catalog.
//! - Keep the quantity → default-unit mapping consistent across destructive
//!   scene operations.
//!
//! # See also
//! - `crate::model::unit` and `crate::model::selection` for the payloads.

pub mod catalog;
pub mod default_cache;
pub mod registry;
