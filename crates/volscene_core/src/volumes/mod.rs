//! Volume node sets: loading, comparing, deriving and transforming.
//!
//! # Responsibility
//! - Turn files into typed volume node sets through an ordered list of
//!   factories (`factory`, `ingest`).
//! - Report geometry mismatches as text (`geometry`, `precision`).
//! - Derive label maps and clones, center and save volumes (`ops`).
//! - Bridge legacy registration matrices into world space (`transform`).
//!
//! # Invariants
//! - Everything here is single-threaded and operates on a caller-owned
//!   `Scene`.
//!
//! # See also
//! - `crate::service::volumes_service` for the facade host code holds.

pub mod colors;
pub mod factory;
pub mod geometry;
pub mod ingest;
pub mod ops;
pub mod precision;
pub mod transform;
