//! Core use-case services.
//!
//! # Responsibility
//! - Bundle the volume operations into a stateful facade host code holds.
//! - Keep host layers decoupled from codec and scene details.

pub mod volumes_service;
