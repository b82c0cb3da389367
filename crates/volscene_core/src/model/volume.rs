//! Volume and volume display payloads.
//!
//! # Responsibility
//! - Describe a volumetric dataset: voxel payload plus the geometry that maps
//!   voxel indices (IJK) to the canonical patient frame (RAS).
//! - Describe per-kind display defaults.
//!
//! # Invariants
//! - `ijk_to_ras()[row][col] = directions[row][col] * spacing[col]` for the
//!   3x3 block and `origin[row]` in the translation column.
//! - Image payloads are owned; cloning a node deep-copies its voxels.

use crate::model::node::{NodeClass, NodeId};
use glam::{DMat4, DVec4};
use serde::{Deserialize, Serialize};

/// Volume flavor. Selects node class, display class and reader expectations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolumeKind {
    Scalar,
    LabelMap,
    Vector,
    DiffusionWeighted,
    DiffusionTensor,
}

impl VolumeKind {
    pub fn node_class(self) -> NodeClass {
        match self {
            Self::Scalar => NodeClass::ScalarVolume,
            Self::LabelMap => NodeClass::LabelMapVolume,
            Self::Vector => NodeClass::VectorVolume,
            Self::DiffusionWeighted => NodeClass::DiffusionWeightedVolume,
            Self::DiffusionTensor => NodeClass::DiffusionTensorVolume,
        }
    }

    pub fn display_class(self) -> NodeClass {
        match self {
            Self::Scalar => NodeClass::ScalarVolumeDisplay,
            Self::LabelMap => NodeClass::LabelMapVolumeDisplay,
            Self::Vector => NodeClass::VectorVolumeDisplay,
            Self::DiffusionWeighted => NodeClass::DiffusionWeightedVolumeDisplay,
            Self::DiffusionTensor => NodeClass::DiffusionTensorVolumeDisplay,
        }
    }

    pub fn is_label_map(self) -> bool {
        self == Self::LabelMap
    }

    /// Scalar-typed kinds share one payload layout (single component).
    pub fn is_scalar_like(self) -> bool {
        matches!(self, Self::Scalar | Self::LabelMap)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Scalar => "scalar",
            Self::LabelMap => "label_map",
            Self::Vector => "vector",
            Self::DiffusionWeighted => "diffusion_weighted",
            Self::DiffusionTensor => "diffusion_tensor",
        }
    }
}

/// Voxel scalar type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalarType {
    UnsignedChar,
    Short,
    UnsignedShort,
    Int,
    Float,
    Double,
}

impl ScalarType {
    pub fn byte_size(self) -> usize {
        match self {
            Self::UnsignedChar => 1,
            Self::Short | Self::UnsignedShort => 2,
            Self::Int | Self::Float => 4,
            Self::Double => 8,
        }
    }
}

/// Owned voxel payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageData {
    pub dimensions: [usize; 3],
    pub scalar_type: ScalarType,
    /// Components per voxel (1 for scalar data).
    pub components: usize,
    /// Voxel values, component-fastest then i, j, k.
    pub scalars: Vec<f64>,
}

impl ImageData {
    /// Creates a zero-filled payload.
    pub fn zeroed(dimensions: [usize; 3], scalar_type: ScalarType, components: usize) -> Self {
        let len = dimensions.iter().product::<usize>() * components;
        Self {
            dimensions,
            scalar_type,
            components,
            scalars: vec![0.0; len],
        }
    }

    pub fn voxel_count(&self) -> usize {
        self.dimensions.iter().product()
    }

    /// Zero-filled single-component payload with the same dimensions.
    pub fn zeroed_like(&self, scalar_type: ScalarType) -> Self {
        Self::zeroed(self.dimensions, scalar_type, 1)
    }

    pub fn scalar_range(&self) -> Option<(f64, f64)> {
        self.scalars.iter().fold(None, |range, &value| match range {
            None => Some((value, value)),
            Some((low, high)) => Some((low.min(value), high.max(value))),
        })
    }
}

pub const IDENTITY_DIRECTIONS: [[f64; 3]; 3] = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];

/// Primary node of a volume node set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeNode {
    pub kind: VolumeKind,
    pub spacing: [f64; 3],
    pub origin: [f64; 3],
    /// Column `j` is the RAS direction of voxel axis `j`.
    pub directions: [[f64; 3]; 3],
    /// Voxels live in storage files, never in scene documents.
    #[serde(skip)]
    pub image: Option<ImageData>,
    pub display_node_id: Option<NodeId>,
    pub storage_node_id: Option<NodeId>,
    pub transform_node_id: Option<NodeId>,
}

impl VolumeNode {
    pub fn new(kind: VolumeKind) -> Self {
        Self {
            kind,
            spacing: [1.0; 3],
            origin: [0.0; 3],
            directions: IDENTITY_DIRECTIONS,
            image: None,
            display_node_id: None,
            storage_node_id: None,
            transform_node_id: None,
        }
    }

    pub fn with_image(mut self, image: ImageData) -> Self {
        self.image = Some(image);
        self
    }

    pub fn dimensions(&self) -> Option<[usize; 3]> {
        self.image.as_ref().map(|image| image.dimensions)
    }

    /// Voxel-to-world matrix.
    pub fn ijk_to_ras(&self) -> DMat4 {
        let d = &self.directions;
        let s = &self.spacing;
        let o = &self.origin;
        matrix_from_rows([
            [d[0][0] * s[0], d[0][1] * s[1], d[0][2] * s[2], o[0]],
            [d[1][0] * s[0], d[1][1] * s[1], d[1][2] * s[2], o[1]],
            [d[2][0] * s[0], d[2][1] * s[1], d[2][2] * s[2], o[2]],
            [0.0, 0.0, 0.0, 1.0],
        ])
    }

    /// World-to-voxel matrix.
    pub fn ras_to_ijk(&self) -> DMat4 {
        self.ijk_to_ras().inverse()
    }

    /// Copies spacing, origin and directions from another volume.
    pub fn copy_orientation(&mut self, other: &VolumeNode) {
        self.spacing = other.spacing;
        self.origin = other.origin;
        self.directions = other.directions;
    }

    /// Copies geometry and voxels but none of the node references.
    pub fn copy_content(&mut self, other: &VolumeNode) {
        self.copy_orientation(other);
        self.image = other.image.clone();
    }

    /// Origin that puts the image center at RAS (0, 0, 0).
    pub fn centered_origin(&self) -> Option<[f64; 3]> {
        let dims = self.dimensions()?;
        Some(centered_origin(self.spacing, self.directions, dims))
    }
}

/// `-0.5 * IJKToRAS * (dims - 1, w = 0)` for the given geometry.
pub fn centered_origin(
    spacing: [f64; 3],
    directions: [[f64; 3]; 3],
    dimensions: [usize; 3],
) -> [f64; 3] {
    let mut probe = VolumeNode::new(VolumeKind::Scalar);
    probe.spacing = spacing;
    probe.directions = directions;
    let extent = probe.ijk_to_ras()
        * DVec4::new(
            dimensions[0] as f64 - 1.0,
            dimensions[1] as f64 - 1.0,
            dimensions[2] as f64 - 1.0,
            0.0,
        );
    [-0.5 * extent.x, -0.5 * extent.y, -0.5 * extent.z]
}

impl VolumeNode {
    /// Label-map volume with the same geometry, no image and no references.
    pub fn label_map_like(&self) -> Self {
        let mut label = VolumeNode::new(VolumeKind::LabelMap);
        label.copy_orientation(self);
        label
    }
}

/// Display node of a volume node set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeDisplayNode {
    pub kind: VolumeKind,
    pub color_node_id: Option<NodeId>,
    pub window: f64,
    pub level: f64,
    pub upper_threshold: f64,
    pub lower_threshold: f64,
    pub auto_window_level: bool,
}

impl VolumeDisplayNode {
    pub fn new(kind: VolumeKind) -> Self {
        Self {
            kind,
            color_node_id: None,
            window: 256.0,
            level: 128.0,
            upper_threshold: 32767.0,
            lower_threshold: -32768.0,
            auto_window_level: true,
        }
    }
}

/// Builds a matrix from row-major values.
pub fn matrix_from_rows(rows: [[f64; 4]; 4]) -> DMat4 {
    DMat4::from_cols_array_2d(&rows).transpose()
}

/// Reads one element by `(row, column)`.
pub fn matrix_element(matrix: &DMat4, row: usize, column: usize) -> f64 {
    matrix.col(column)[row]
}

#[cfg(test)]
mod tests {
    use super::{matrix_element, ImageData, ScalarType, VolumeKind, VolumeNode};

    #[test]
    fn ijk_to_ras_combines_directions_spacing_and_origin() {
        let mut volume = VolumeNode::new(VolumeKind::Scalar);
        volume.spacing = [2.0, 3.0, 4.0];
        volume.origin = [10.0, 20.0, 30.0];
        volume.directions = [[-1.0, 0.0, 0.0], [0.0, -1.0, 0.0], [0.0, 0.0, 1.0]];

        let m = volume.ijk_to_ras();
        assert_eq!(matrix_element(&m, 0, 0), -2.0);
        assert_eq!(matrix_element(&m, 1, 1), -3.0);
        assert_eq!(matrix_element(&m, 2, 2), 4.0);
        assert_eq!(matrix_element(&m, 0, 3), 10.0);
        assert_eq!(matrix_element(&m, 2, 3), 30.0);
        assert_eq!(matrix_element(&m, 3, 3), 1.0);

        let roundtrip = volume.ras_to_ijk() * m;
        for row in 0..4 {
            for column in 0..4 {
                let expected = if row == column { 1.0 } else { 0.0 };
                assert!((matrix_element(&roundtrip, row, column) - expected).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn zeroed_like_keeps_dimensions_with_one_component() {
        let image = ImageData::zeroed([2, 3, 4], ScalarType::Float, 3);
        assert_eq!(image.scalars.len(), 72);
        let label = image.zeroed_like(ScalarType::Short);
        assert_eq!(label.dimensions, [2, 3, 4]);
        assert_eq!(label.components, 1);
        assert_eq!(label.scalars.len(), 24);
        assert_eq!(label.scalar_range(), Some((0.0, 0.0)));
    }
}
