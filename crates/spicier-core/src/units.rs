//! Engineering units and SI prefix handling.

/// SI suffixes used when writing values into generated netlists, largest first.
const ENGINEERING_SUFFIXES: [(f64, &str); 10] = [
    (1e12, "T"),
    (1e9, "G"),
    (1e6, "Meg"),
    (1e3, "k"),
    (1.0, ""),
    (1e-3, "m"),
    (1e-6, "u"),
    (1e-9, "n"),
    (1e-12, "p"),
    (1e-15, "f"),
];

/// Significant digits kept by [`format_engineering`].
pub const SIGNIFICANT_DIGITS: usize = 4;

/// Parse a SPICE-style value with optional SI suffix.
///
/// Supported suffixes (case-insensitive):
/// - T (tera, 1e12)
/// - G (giga, 1e9)
/// - MEG (mega, 1e6)
/// - K (kilo, 1e3)
/// - M (milli, 1e-3)
/// - MIL (1/1000 inch)
/// - U (micro, 1e-6)
/// - N (nano, 1e-9)
/// - P (pico, 1e-12)
/// - F (femto, 1e-15)
///
/// Trailing unit letters after the suffix are ignored, as in SPICE (`10uF`).
pub fn parse_value(s: &str) -> Option<f64> {
    let s = s.trim().to_uppercase();
    if s.is_empty() {
        return None;
    }

    if let Ok(v) = s.parse::<f64>() {
        return Some(v);
    }

    let num_end = numeric_prefix_len(&s);
    if num_end == 0 {
        return None;
    }

    let (num_str, suffix) = s.split_at(num_end);
    let value: f64 = num_str.parse().ok()?;

    let multiplier = if suffix.starts_with("MEG") {
        1e6
    } else if suffix.starts_with("MIL") {
        25.4e-6
    } else {
        match suffix.chars().next() {
            Some('T') => 1e12,
            Some('G') => 1e9,
            Some('K') => 1e3,
            Some('M') => 1e-3,
            Some('U') => 1e-6,
            Some('N') => 1e-9,
            Some('P') => 1e-12,
            Some('F') => 1e-15,
            Some(c) if c.is_ascii_alphabetic() => 1.0,
            _ => return None,
        }
    };

    Some(value * multiplier)
}

/// Length of the leading floating-point literal in an upper-cased token.
fn numeric_prefix_len(s: &str) -> usize {
    let bytes = s.as_bytes();
    let mut i = 0;
    if i < bytes.len() && (bytes[i] == b'+' || bytes[i] == b'-') {
        i += 1;
    }
    while i < bytes.len() && (bytes[i].is_ascii_digit() || bytes[i] == b'.') {
        i += 1;
    }
    // Exponent only counts when followed by digits, so "1E" stays numeric "1".
    if i < bytes.len() && bytes[i] == b'E' {
        let mut j = i + 1;
        if j < bytes.len() && (bytes[j] == b'+' || bytes[j] == b'-') {
            j += 1;
        }
        let digits_start = j;
        while j < bytes.len() && bytes[j].is_ascii_digit() {
            j += 1;
        }
        if j > digits_start {
            i = j;
        }
    }
    let has_digit = s[..i].bytes().any(|b| b.is_ascii_digit());
    if has_digit { i } else { 0 }
}

/// Format a value in SI engineering notation for generated netlists.
///
/// Picks the largest suffix whose threshold the magnitude meets, keeps
/// [`SIGNIFICANT_DIGITS`] significant digits and trims trailing zeros.
/// Zero is written as `"0"`; magnitudes below the femto threshold still use `f`.
///
/// ```
/// use spicier_core::units::format_engineering;
///
/// assert_eq!(format_engineering(1500.0), "1.5k");
/// assert_eq!(format_engineering(1e-6), "1u");
/// assert_eq!(format_engineering(2.2e6), "2.2Meg");
/// ```
pub fn format_engineering(value: f64) -> String {
    if value == 0.0 {
        return "0".to_string();
    }
    if !value.is_finite() {
        return value.to_string();
    }

    let abs_value = value.abs();
    let mut idx = ENGINEERING_SUFFIXES
        .iter()
        .position(|&(threshold, _)| abs_value >= threshold)
        .unwrap_or(ENGINEERING_SUFFIXES.len() - 1);

    loop {
        let (multiplier, suffix) = ENGINEERING_SUFFIXES[idx];
        let scaled = value / multiplier;
        let mantissa = round_significant(scaled);

        // Rounding can carry into the next decade (999.96 -> 1000); move up a suffix.
        if mantissa.abs() >= 1000.0 && idx > 0 {
            idx -= 1;
            continue;
        }
        return format!("{}{}", trim_zeros(mantissa, scaled), suffix);
    }
}

/// Round to [`SIGNIFICANT_DIGITS`] significant digits.
fn round_significant(value: f64) -> f64 {
    if value == 0.0 {
        return 0.0;
    }
    let digits = value.abs().log10().floor() as i32 + 1;
    let decimals = SIGNIFICANT_DIGITS as i32 - digits;
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

fn trim_zeros(mantissa: f64, scaled: f64) -> String {
    let digits = if scaled == 0.0 {
        1
    } else {
        (mantissa.abs().log10().floor() as i32 + 1).max(1)
    };
    let decimals = (SIGNIFICANT_DIGITS as i32 - digits).max(0) as usize;
    let text = format!("{:.*}", decimals, mantissa);
    if text.contains('.') {
        text.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        text
    }
}
