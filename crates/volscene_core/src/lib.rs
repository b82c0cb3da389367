//! Core logic for volscene: a node scene with unit defaults and volume
//! node sets.
//! This crate is the single source of truth for scene invariants.

pub mod io;
pub mod logging;
pub mod model;
pub mod scene;
pub mod service;
pub mod units;
pub mod volumes;

pub use io::nrrd::{NrrdError, NrrdVolumeIo};
pub use logging::{default_log_level, init_logging, logging_status, LogConfig, LogLevel, LoggingError};
pub use model::node::{NodeClass, NodeData, NodeId, SceneNode};
pub use model::volume::{ImageData, ScalarType, VolumeKind, VolumeNode};
pub use scene::{Scene, SceneError, SceneResult};
pub use service::volumes_service::{LogicObserver, VolumesService};
pub use units::registry::UnitRegistry;
pub use volumes::factory::{LoadOptions, NodeSetFactory, VolumeNodeSet};
pub use volumes::ingest::{IngestError, IngestRequest};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
