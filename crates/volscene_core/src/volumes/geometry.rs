//! Fuzzy comparison of volume geometries.
//!
//! # Responsibility
//! - Compare dimensions, spacing, origin and the IJK-to-RAS matrix of two
//!   volumes and describe every mismatch as one report line.
//! - Keep the comparison epsilon and its display precision in sync.
//!
//! # Invariants
//! - Reports are advisory text; an empty report means "geometries match".
//! - Dimensions, spacing and origin compare exactly; only matrix cells use
//!   the epsilon.
//! - Numbers in reports are printed with `precision()` significant digits.

use crate::model::volume::{matrix_element, VolumeKind, VolumeNode};
use crate::volumes::precision::{format_general, order_of_magnitude, significant_decimals};
use std::fmt::Write;

/// Default matrix tolerance, suited to ~1 mm voxels.
pub const DEFAULT_GEOMETRY_EPSILON: f64 = 0.000001;

/// Accepted gap, in decades, between the smallest spacing and the epsilon.
const MIN_SPACING_EPSILON_DECADES: i64 = 3;
const MAX_SPACING_EPSILON_DECADES: i64 = 10;

/// Epsilon/precision pair used for geometry reports.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeometryComparator {
    epsilon: f64,
    precision: i32,
}

impl Default for GeometryComparator {
    fn default() -> Self {
        Self::new(DEFAULT_GEOMETRY_EPSILON)
    }
}

impl GeometryComparator {
    pub fn new(epsilon: f64) -> Self {
        let epsilon = epsilon.abs();
        Self {
            epsilon,
            precision: significant_decimals(epsilon, -1),
        }
    }

    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    /// Significant digits used when printing report values.
    pub fn precision(&self) -> i32 {
        self.precision
    }

    /// Stores `|epsilon|` and recomputes the report precision.
    ///
    /// Returns whether the epsilon changed.
    pub fn set_epsilon(&mut self, epsilon: f64) -> bool {
        let epsilon = epsilon.abs();
        if self.epsilon == epsilon {
            return false;
        }
        self.epsilon = epsilon;
        self.precision = significant_decimals(epsilon, -1);
        log::debug!(
            "event=geometry_epsilon module=volumes status=ok epsilon={epsilon} precision={}",
            self.precision
        );
        true
    }

    fn number(&self, value: f64) -> String {
        format_general(value, self.precision)
    }

    /// Line-per-mismatch report comparing two volumes.
    ///
    /// Missing volumes or voxel payloads produce descriptive lines instead
    /// of failing.
    pub fn compare(&self, first: Option<&VolumeNode>, second: Option<&VolumeNode>) -> String {
        let mut report = String::new();
        let (first, second) = match (first, second) {
            (Some(first), Some(second)) => (first, second),
            (None, _) => {
                report.push_str("Null first volume node pointer\n");
                return report;
            }
            (_, None) => {
                report.push_str("Null second volume node pointer\n");
                return report;
            }
        };
        let (first_image, second_image) = match (&first.image, &second.image) {
            (Some(first_image), Some(second_image)) => (first_image, second_image),
            (first_image, second_image) => {
                if first_image.is_none() {
                    report.push_str("Null first image data pointer\n");
                }
                if second_image.is_none() {
                    report.push_str("Null second image data pointer\n");
                }
                return report;
            }
        };

        let min_spacing = first
            .spacing
            .iter()
            .chain(second.spacing.iter())
            .copied()
            .fold(f64::INFINITY, f64::min);
        let decades =
            i64::from(order_of_magnitude(min_spacing)) - i64::from(order_of_magnitude(self.epsilon));
        if !(MIN_SPACING_EPSILON_DECADES..=MAX_SPACING_EPSILON_DECADES).contains(&decades) {
            let _ = write!(
                report,
                "(Minimum spacing for volumes of {} mismatched with epsilon {},\n\
                 geometry comparison may not be useful.\n\
                 Try resetting the compare volume geometry epsilon.)\n",
                self.number(min_spacing),
                self.number(self.epsilon)
            );
        }

        for row in 0..3 {
            let (a, b) = (
                first_image.dimensions[row] as f64,
                second_image.dimensions[row] as f64,
            );
            if a != b {
                self.mismatch(&mut report, "Dimension", row, a, b);
            }
            let (a, b) = (first.spacing[row], second.spacing[row]);
            if a != b {
                self.mismatch(&mut report, "Spacing", row, a, b);
            }
            let (a, b) = (first.origin[row], second.origin[row]);
            if a != b {
                self.mismatch(&mut report, "Origin", row, a, b);
            }
        }

        let first_matrix = first.ijk_to_ras();
        let second_matrix = second.ijk_to_ras();
        for row in 0..4 {
            for column in 0..4 {
                let a = matrix_element(&first_matrix, row, column);
                let b = matrix_element(&second_matrix, row, column);
                if (a - b).abs() > self.epsilon {
                    let _ = writeln!(
                        report,
                        "IJKToRAS mismatch at [{row}, {column}] ({} != {})",
                        self.number(a),
                        self.number(b)
                    );
                }
            }
        }
        report
    }

    fn mismatch(&self, report: &mut String, what: &str, row: usize, a: f64, b: f64) {
        let _ = writeln!(
            report,
            "{what} mismatch at row [{row}] ({} != {})",
            self.number(a),
            self.number(b)
        );
    }

    /// Checks that `label` is a label map sharing `volume`'s geometry.
    pub fn label_validity(&self, volume: Option<&VolumeNode>, label: Option<&VolumeNode>) -> String {
        match (volume, label) {
            (Some(volume), Some(label)) => {
                if label.kind != VolumeKind::LabelMap {
                    return "Label node is not a label map volume\n".to_string();
                }
                self.compare(Some(volume), Some(label))
            }
            (volume, label) => {
                let mut report = String::new();
                if volume.is_none() {
                    report.push_str("Null volume node pointer\n");
                }
                if label.is_none() {
                    report.push_str("Null label volume node pointer\n");
                }
                report
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{GeometryComparator, DEFAULT_GEOMETRY_EPSILON};
    use crate::model::volume::{ImageData, ScalarType, VolumeKind, VolumeNode};

    fn volume(kind: VolumeKind) -> VolumeNode {
        VolumeNode::new(kind).with_image(ImageData::zeroed([4, 4, 2], ScalarType::Short, 1))
    }

    #[test]
    fn default_precision_follows_epsilon() {
        let comparator = GeometryComparator::default();
        assert_eq!(comparator.epsilon(), DEFAULT_GEOMETRY_EPSILON);
        assert_eq!(comparator.precision(), 6);
    }

    #[test]
    fn set_epsilon_stores_absolute_value_once() {
        let mut comparator = GeometryComparator::default();
        assert!(comparator.set_epsilon(-0.001));
        assert_eq!(comparator.epsilon(), 0.001);
        assert_eq!(comparator.precision(), 3);
        assert!(!comparator.set_epsilon(0.001));
    }

    #[test]
    fn missing_inputs_are_reported() {
        let comparator = GeometryComparator::default();
        let first = volume(VolumeKind::Scalar);
        assert_eq!(
            comparator.compare(None, Some(&first)),
            "Null first volume node pointer\n"
        );
        let empty = VolumeNode::new(VolumeKind::Scalar);
        assert_eq!(
            comparator.compare(Some(&empty), Some(&empty)),
            "Null first image data pointer\nNull second image data pointer\n"
        );
    }

    #[test]
    fn identical_geometry_yields_empty_report() {
        let comparator = GeometryComparator::default();
        let first = volume(VolumeKind::Scalar);
        let second = first.label_map_like().with_image(ImageData::zeroed(
            [4, 4, 2],
            ScalarType::Short,
            1,
        ));
        assert_eq!(comparator.label_validity(Some(&first), Some(&second)), "");
    }

    #[test]
    fn label_validity_rejects_non_label_volumes() {
        let comparator = GeometryComparator::default();
        let first = volume(VolumeKind::Scalar);
        let report = comparator.label_validity(Some(&first), Some(&first));
        assert!(report.contains("not a label map"));
        assert_eq!(
            comparator.label_validity(None, None),
            "Null volume node pointer\nNull label volume node pointer\n"
        );
    }

    #[test]
    fn dimension_mismatch_names_the_row() {
        let comparator = GeometryComparator::default();
        let first = volume(VolumeKind::Scalar);
        let second =
            VolumeNode::new(VolumeKind::Scalar).with_image(ImageData::zeroed([4, 8, 2], ScalarType::Short, 1));
        assert_eq!(
            comparator.compare(Some(&first), Some(&second)),
            "Dimension mismatch at row [1] (4 != 8)\n"
        );
    }
}
