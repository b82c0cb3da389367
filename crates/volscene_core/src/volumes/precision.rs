//! Numeric precision heuristics used by geometry reports.
//!
//! # Responsibility
//! - Estimate how many decimals of a value are meaningful for display.
//! - Compute decimal orders of magnitude without `log10` rounding error.
//! - Format numbers the way geometry reports print them (`%g` style).
//!
//! # Invariants
//! - `significant_decimals` is a heuristic. Its run-length tie-breaks are
//!   stable and tested; callers must not treat it as exact arithmetic.
//! - `order_of_magnitude` returns `i32::MIN` for values it cannot size.

/// Fixed decimals used to inspect a value's fractional digits.
const FIXED_DECIMALS: usize = 16;

/// Number of "meaningful" decimals of `value`.
///
/// The value is printed with 16 fixed decimals and scanned left to right.
/// A third repetition of a digit (once a non-zero digit was seen) closes
/// the significant region; runs of `0` or `9` are excluded from it since
/// they are rounding residue. When no run closes the region the result is
/// `default_decimals` if non-negative, otherwise 16.
///
/// Returns `0` for zero and infinite values and `-1` for NaN.
pub fn significant_decimals(value: f64, default_decimals: i32) -> i32 {
    if value == 0.0 || value.is_infinite() {
        return 0;
    }
    if value.is_nan() {
        return -1;
    }
    let number = format!("{value:.FIXED_DECIMALS$}");
    let fractional = match number.rfind('.') {
        Some(position) => &number[position + 1..],
        None => return -1,
    };
    if fractional.len() != FIXED_DECIMALS {
        return -1;
    }

    let digits = fractional.as_bytes();
    let is_unit = value > -1.0 && value < 1.0;
    let mut previous = b' ';
    let mut previous_repeat = 0i32;
    let mut only_zeros = true;
    for (index, &digit) in digits.iter().enumerate() {
        let index = index as i32;
        if digit != b'0' {
            only_zeros = false;
        }
        if digit == previous && previous_repeat == 2 && !only_zeros {
            if digit == b'0' || digit == b'9' {
                return index - previous_repeat;
            }
            return index;
        }
        if index == FIXED_DECIMALS as i32 - 1 {
            if previous_repeat > 2 && !(only_zeros && is_unit) {
                return index - previous_repeat;
            }
            if default_decimals >= 0 {
                return default_decimals;
            }
            return FIXED_DECIMALS as i32;
        }
        if previous != digit {
            previous = digit;
            previous_repeat = 1;
        } else {
            previous_repeat += 1;
        }
    }
    -1
}

/// Base-10 exponent `e` with `10^e <= |value| < 10^(e+1)`.
///
/// Walks powers of ten by repeated multiplication. Returns `i32::MIN` for
/// zero, infinite, NaN and sub-epsilon values.
pub fn order_of_magnitude(value: f64) -> i32 {
    let value = value.abs();
    if value == 0.0 || value.is_infinite() || value.is_nan() || value < f64::EPSILON {
        return i32::MIN;
    }

    let mut magnitude = 1.0f64;
    let mut order = 0i32;
    let mut step = 1i32;
    let mut factor = 10.0f64;
    if value < 1.0 {
        order = -1;
        step = -1;
        factor = 0.1;
    }

    while (step > 0 && value >= magnitude) || (step < 0 && value < magnitude - f64::EPSILON) {
        magnitude *= factor;
        order += step;
    }
    // one step past the bound
    order - step
}

/// Formats `value` like a C++ stream in default float mode with
/// `precision` significant digits (`%g`).
///
/// A negative precision falls back to 6 and zero is treated as 1.
pub fn format_general(value: f64, precision: i32) -> String {
    if value.is_nan() {
        return "nan".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    let precision = match precision {
        p if p < 0 => 6usize,
        0 => 1,
        p => p as usize,
    };
    if value == 0.0 {
        return if value.is_sign_negative() { "-0" } else { "0" }.to_string();
    }

    let scientific = format!("{:.*e}", precision - 1, value);
    let (mantissa, exponent) = match scientific.split_once('e') {
        Some((mantissa, exponent)) => (mantissa, exponent.parse::<i32>().unwrap_or(0)),
        None => (scientific.as_str(), 0),
    };

    if exponent < -4 || exponent >= precision as i32 {
        let sign = if exponent < 0 { '-' } else { '+' };
        return format!(
            "{}e{sign}{:02}",
            trim_fraction_zeros(mantissa),
            exponent.unsigned_abs()
        );
    }

    let decimals = (precision as i32 - 1 - exponent).max(0) as usize;
    trim_fraction_zeros(&format!("{value:.decimals$}")).to_string()
}

fn trim_fraction_zeros(number: &str) -> &str {
    if !number.contains('.') {
        return number;
    }
    number.trim_end_matches('0').trim_end_matches('.')
}

#[cfg(test)]
mod tests {
    use super::{format_general, order_of_magnitude, significant_decimals};

    #[test]
    fn significant_decimals_handles_special_values() {
        assert_eq!(significant_decimals(0.0, -1), 0);
        assert_eq!(significant_decimals(f64::INFINITY, -1), 0);
        assert_eq!(significant_decimals(f64::NEG_INFINITY, 3), 0);
        assert_eq!(significant_decimals(f64::NAN, -1), -1);
    }

    #[test]
    fn significant_decimals_stops_at_repeated_digits() {
        assert_eq!(significant_decimals(1.0 / 3.0, -1), 2);
        assert_eq!(significant_decimals(0.000001, -1), 6);
        assert_eq!(significant_decimals(0.5, -1), 1);
        assert_eq!(significant_decimals(12.125, -1), 3);
    }

    #[test]
    fn significant_decimals_uses_default_without_a_run() {
        assert_eq!(significant_decimals(0.1234567890123456, 4), 4);
        assert_eq!(significant_decimals(0.1234567890123456, -1), 16);
    }

    #[test]
    fn whole_numbers_have_no_significant_decimals() {
        assert_eq!(significant_decimals(1.0, 4), 0);
        assert_eq!(significant_decimals(-25.0, -1), 0);
    }

    #[test]
    fn order_of_magnitude_walks_powers_of_ten() {
        assert_eq!(order_of_magnitude(0.0), i32::MIN);
        assert_eq!(order_of_magnitude(f64::NAN), i32::MIN);
        assert_eq!(order_of_magnitude(1e-17), i32::MIN);
        assert_eq!(order_of_magnitude(999.0), 2);
        assert_eq!(order_of_magnitude(1000.0), 3);
        assert_eq!(order_of_magnitude(-1000.0), 3);
        assert_eq!(order_of_magnitude(1.0), 0);
        assert_eq!(order_of_magnitude(0.05), -2);
        assert_eq!(order_of_magnitude(0.000001), -6);
    }

    #[test]
    fn format_general_matches_stream_output() {
        assert_eq!(format_general(256.0, 6), "256");
        assert_eq!(format_general(0.5, 6), "0.5");
        assert_eq!(format_general(1.0 / 3.0, 3), "0.333");
        assert_eq!(format_general(1e-6, 6), "1e-06");
        assert_eq!(format_general(1234567.0, 6), "1.23457e+06");
        assert_eq!(format_general(-2.0, 0), "-2");
        assert_eq!(format_general(0.0, 6), "0");
    }
}
