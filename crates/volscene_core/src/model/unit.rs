//! Unit definition payload.
//!
//! # Responsibility
//! - Describe how a canonical value of one quantity is converted and
//!   formatted for display.
//!
//! # Invariants
//! - `quantity` is never empty for definitions created by the unit registry.
//! - `display = display_coefficient * canonical + display_offset`.

use serde::{Deserialize, Serialize};

pub const DEFAULT_UNIT_PRECISION: u32 = 3;
pub const DEFAULT_UNIT_MINIMUM: f64 = -10000.0;
pub const DEFAULT_UNIT_MAXIMUM: f64 = 10000.0;

/// Named, typed description of how values of one quantity are displayed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitDefinition {
    pub name: String,
    /// Grouping key such as `length` or `time`.
    pub quantity: String,
    pub prefix: String,
    pub suffix: String,
    /// Number of decimals shown when formatting.
    pub precision: u32,
    pub minimum: f64,
    pub maximum: f64,
    pub display_coefficient: f64,
    pub display_offset: f64,
}

impl Default for UnitDefinition {
    fn default() -> Self {
        Self::new("", "")
    }
}

impl UnitDefinition {
    /// Creates a definition with an identity display transform and the
    /// default precision and range.
    pub fn new(name: impl Into<String>, quantity: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            quantity: quantity.into(),
            prefix: String::new(),
            suffix: String::new(),
            precision: DEFAULT_UNIT_PRECISION,
            minimum: DEFAULT_UNIT_MINIMUM,
            maximum: DEFAULT_UNIT_MAXIMUM,
            display_coefficient: 1.0,
            display_offset: 0.0,
        }
    }

    pub fn with_affixes(mut self, prefix: impl Into<String>, suffix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self.suffix = suffix.into();
        self
    }

    pub fn with_precision(mut self, precision: u32) -> Self {
        self.precision = precision;
        self
    }

    pub fn with_range(mut self, minimum: f64, maximum: f64) -> Self {
        self.minimum = minimum;
        self.maximum = maximum;
        self
    }

    pub fn with_display_transform(mut self, coefficient: f64, offset: f64) -> Self {
        self.display_coefficient = coefficient;
        self.display_offset = offset;
        self
    }

    /// Converts a canonical value into the displayed value.
    pub fn display_value(&self, canonical: f64) -> f64 {
        self.display_coefficient * canonical + self.display_offset
    }

    /// Converts a displayed value back into the canonical value.
    ///
    /// Returns `None` when the display coefficient is zero.
    pub fn canonical_value(&self, displayed: f64) -> Option<f64> {
        if self.display_coefficient == 0.0 {
            return None;
        }
        Some((displayed - self.display_offset) / self.display_coefficient)
    }

    /// Formats a canonical value as `<prefix><value><suffix>`.
    pub fn format_display(&self, canonical: f64) -> String {
        let precision = self.precision as usize;
        format!(
            "{}{:.*}{}",
            self.prefix,
            precision,
            self.display_value(canonical),
            self.suffix
        )
    }

    /// Whether a canonical value converts to a displayed value in range.
    pub fn is_in_range(&self, canonical: f64) -> bool {
        let displayed = self.display_value(canonical);
        displayed >= self.minimum && displayed <= self.maximum
    }
}

#[cfg(test)]
mod tests {
    use super::UnitDefinition;

    #[test]
    fn display_transform_roundtrips() {
        let centimeter = UnitDefinition::new("Centimeter", "length")
            .with_affixes("", "cm")
            .with_display_transform(0.1, 0.0);
        assert!((centimeter.display_value(25.0) - 2.5).abs() < 1e-12);
        let canonical = centimeter.canonical_value(2.5).expect("non-zero coefficient");
        assert!((canonical - 25.0).abs() < 1e-12);
    }

    #[test]
    fn zero_coefficient_has_no_inverse() {
        let unit = UnitDefinition::new("Flat", "length").with_display_transform(0.0, 1.0);
        assert!(unit.canonical_value(3.0).is_none());
    }

    #[test]
    fn format_display_applies_affixes_and_precision() {
        let unit = UnitDefinition::new("Second", "time")
            .with_affixes("t=", "s")
            .with_precision(2);
        assert_eq!(unit.format_display(1.23456), "t=1.23s");
    }
}
