//! Typed node payloads held by a scene.
//!
//! # Responsibility
//! - Define node identity, class tags and the closed set of node payloads.
//! - Keep payloads free of scene mechanics (events, IDs assignment, undo).
//!
//! # Invariants
//! - Every payload maps to exactly one `NodeClass`.
//! - Payloads reference other nodes by `NodeId` only, never by handle.
//!
//! # See also
//! - `crate::scene` for the container that owns these payloads.

pub mod color;
pub mod node;
pub mod selection;
pub mod storage;
pub mod unit;
pub mod volume;
