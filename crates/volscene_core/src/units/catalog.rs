//! Built-in unit catalog and application default units.
//!
//! Display coefficients convert from the canonical unit of each quantity
//! (millimeter, second, hertz, metre per second, W/m²). Values are data:
//! downstream display code depends on them as written, including the
//! calendar expressions, which are evaluated left to right.

use crate::model::unit::{UnitDefinition, DEFAULT_UNIT_MAXIMUM, DEFAULT_UNIT_MINIMUM};

/// One catalog row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BuiltinUnit {
    pub name: &'static str,
    pub quantity: &'static str,
    pub suffix: &'static str,
    pub precision: u32,
    pub display_coefficient: f64,
}

impl BuiltinUnit {
    pub fn definition(&self) -> UnitDefinition {
        UnitDefinition::new(self.name, self.quantity)
            .with_affixes("", self.suffix)
            .with_precision(self.precision)
            .with_range(DEFAULT_UNIT_MINIMUM, DEFAULT_UNIT_MAXIMUM)
            .with_display_transform(self.display_coefficient, 0.0)
    }
}

const fn unit(
    name: &'static str,
    quantity: &'static str,
    suffix: &'static str,
    precision: u32,
    display_coefficient: f64,
) -> BuiltinUnit {
    BuiltinUnit {
        name,
        quantity,
        suffix,
        precision,
        display_coefficient,
    }
}

/// Average number of days in a month.
pub const DAYS_PER_MONTH: f64 = 30.436875;

pub const BUILTIN_UNITS: [BuiltinUnit; 23] = [
    unit("Meter", "length", "m", 3, 0.001),
    unit("Centimeter", "length", "cm", 3, 0.1),
    unit("Millimeter", "length", "mm", 3, 1.0),
    unit("Micrometer", "length", "µm", 3, 1000.0),
    unit("Nanometer", "length", "nm", 3, 1000000.0),
    unit("Year", "time", "year", 2, 1.0 / 12.0 * DAYS_PER_MONTH * 24.0 * 60.0 * 60.0),
    unit("Month", "time", "month", 2, 1.0 / DAYS_PER_MONTH * 24.0 * 60.0 * 60.0),
    unit("Day", "time", "day", 2, 1.0 / 24.0 * 60.0 * 60.0),
    unit("Hour", "time", "h", 2, 1.0 / 60.0 * 60.0),
    unit("Minute", "time", "min", 2, 1.0 / 60.0),
    unit("Second", "time", "s", 3, 1.0),
    unit("Millisecond", "time", "ms", 3, 1000.0),
    unit("Microsecond", "time", "µs", 3, 1000.0),
    unit("Herz", "frequency", "Hz", 3, 1.0),
    unit("decahertz", "frequency", "daHz", 3, 0.1),
    unit("HectoHerz", "frequency", "hHz", 3, 0.01),
    unit("KiloHerz", "frequency", "kHz", 3, 0.001),
    unit("MegaHerz", "frequency", "MHz", 3, 0.000001),
    unit("GigaHerz", "frequency", "GHz", 3, 0.000000001),
    unit("TeraHerz", "frequency", "THz", 3, 0.000000000001),
    unit("Metre per second", "velocity", "m/s", 3, 1.0),
    unit("Kilometre per second", "velocity", "km/s", 3, 0.01),
    unit("Intensity", "intensity", "W/m²", 3, 1.0),
];

/// Application default unit: created per attached scene, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApplicationDefault {
    pub name: &'static str,
    pub quantity: &'static str,
    pub suffix: &'static str,
}

impl ApplicationDefault {
    pub fn definition(&self) -> UnitDefinition {
        UnitDefinition::new(self.name, self.quantity).with_affixes("", self.suffix)
    }
}

pub const APPLICATION_DEFAULTS: [ApplicationDefault; 5] = [
    ApplicationDefault {
        name: "ApplicationLength",
        quantity: "length",
        suffix: "mm",
    },
    ApplicationDefault {
        name: "ApplicationTime",
        quantity: "time",
        suffix: "s",
    },
    ApplicationDefault {
        name: "ApplicationFrequency",
        quantity: "frequency",
        suffix: "Hz",
    },
    ApplicationDefault {
        name: "ApplicationVelocity",
        quantity: "velocity",
        suffix: "m/s",
    },
    ApplicationDefault {
        name: "ApplicationIntensity",
        quantity: "intensity",
        suffix: "W/m²",
    },
];

pub fn builtin(name: &str) -> Option<&'static BuiltinUnit> {
    BUILTIN_UNITS.iter().find(|unit| unit.name == name)
}
