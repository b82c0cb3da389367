//! Coordinate transforms between independently oriented volumes.
//!
//! # Responsibility
//! - Build the legacy neuroimaging tool's voxel-to-world matrix
//!   ("tkregister" convention) from a volume's spacing and dimensions.
//! - Turn a registration matrix expressed in that convention into a
//!   world-to-world matrix between two scene volumes.
//!
//! # Invariants
//! - Matrices are `DMat4` in column-major storage; products read right to
//!   left like the formulas in the docs below.
//! - A volume without voxels has no legacy matrix (`MissingGeometry`).

use crate::model::node::NodeId;
use crate::model::volume::{matrix_from_rows, VolumeNode};
use crate::scene::{Scene, SceneError};
use glam::DMat4;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type TransformResult<T> = Result<T, TransformError>;

#[derive(Debug)]
pub enum TransformError {
    /// The volume has no voxel payload to size the matrix from.
    MissingGeometry { node: NodeId },
    Scene(SceneError),
}

impl Display for TransformError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingGeometry { node } => write!(f, "volume {node} has no image data"),
            Self::Scene(err) => write!(f, "{err}"),
        }
    }
}

impl Error for TransformError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Scene(err) => Some(err),
            Self::MissingGeometry { .. } => None,
        }
    }
}

impl From<SceneError> for TransformError {
    fn from(value: SceneError) -> Self {
        Self::Scene(value)
    }
}

/// Legacy voxel-to-world matrix of one volume.
///
/// With column/row/slice spacings `dc, dr, ds` and extents
/// `nc = dim0 * dc`, `nr = dim1 * dr`, `ns = dim2 * ds`:
///
/// ```text
/// | -dc   0    0   nc/2 |
/// |  0    0   ds  -ns/2 |
/// |  0  -dr    0   nr/2 |
/// |  0    0    0    1   |
/// ```
pub fn legacy_voxel_to_canonical_matrix(volume: &VolumeNode) -> Option<DMat4> {
    let dims = volume.dimensions()?;
    let [dc, dr, ds] = volume.spacing;
    let nc = dims[0] as f64 * dc;
    let nr = dims[1] as f64 * dr;
    let ns = dims[2] as f64 * ds;
    Some(matrix_from_rows([
        [-dc, 0.0, 0.0, nc / 2.0],
        [0.0, 0.0, ds, -ns / 2.0],
        [0.0, -dr, 0.0, nr / 2.0],
        [0.0, 0.0, 0.0, 1.0],
    ]))
}

/// World-to-world matrix from a legacy registration between two volumes.
///
/// `inverse(N) * inverse(S) * R * T * inverse(M)` where `T`/`S` are the
/// legacy matrices of `a`/`b`, `M` is `a`'s IJK-to-RAS, `N` is `b`'s
/// RAS-to-IJK and `R` is `registration`.
pub fn registration_to_world(
    a: &VolumeNode,
    b: &VolumeNode,
    registration: &DMat4,
) -> Option<DMat4> {
    let t = legacy_voxel_to_canonical_matrix(a)?;
    let s = legacy_voxel_to_canonical_matrix(b)?;
    let m = a.ijk_to_ras();
    let n = b.ras_to_ijk();
    Some(n.inverse() * s.inverse() * *registration * t * m.inverse())
}

/// Scene-level `legacy_voxel_to_canonical_matrix`.
pub fn legacy_voxel_to_canonical(scene: &Scene, volume_id: &NodeId) -> TransformResult<DMat4> {
    let volume = scene.volume(volume_id)?;
    legacy_voxel_to_canonical_matrix(volume).ok_or_else(|| {
        log::warn!("event=legacy_voxel_to_ras module=volumes status=error volume={volume_id}");
        TransformError::MissingGeometry {
            node: volume_id.clone(),
        }
    })
}

/// Scene-level `registration_to_world`.
pub fn resolve_cross_tool_registration(
    scene: &Scene,
    a_id: &NodeId,
    b_id: &NodeId,
    registration: &DMat4,
) -> TransformResult<DMat4> {
    let a = scene.volume(a_id)?;
    let b = scene.volume(b_id)?;
    for (id, volume) in [(a_id, a), (b_id, b)] {
        if volume.image.is_none() {
            return Err(TransformError::MissingGeometry { node: id.clone() });
        }
    }
    registration_to_world(a, b, registration).ok_or_else(|| TransformError::MissingGeometry {
        node: a_id.clone(),
    })
}
