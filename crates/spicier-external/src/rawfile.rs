//! Parser for simulator rawfile output.
//!
//! A rawfile starts with a header of `key: value` lines, followed by a
//! `Variables:` list of `index name type` entries and then either an ASCII
//! `Values:` section or a little-endian `Binary:` section.
//!
//! Header fields:
//! - Title: simulation title
//! - Plotname: type of analysis
//! - Flags: real or complex
//! - No. Variables: number of data columns
//! - No. Points: number of data rows
//!
//! In ASCII data each point is an index token followed by one token per
//! variable. Complex values are written either as a single `re,im` token or
//! as two whitespace-separated tokens; both are accepted. Files holding more
//! than one plot are read up to the end of the first one.

use std::path::Path;

use spicier_core::{
    AnalysisKind, CanonicalWaveform, Complex64, QuantityKind, SweepDescriptor,
    VariableDescriptor, WaveformData,
};

use crate::error::{RawParseError, Result};

/// One entry of the `Variables:` list.
#[derive(Debug, Clone, PartialEq)]
pub struct RawVariable {
    pub index: usize,
    pub name: String,
    /// Type column as written (`voltage`, `current`, `time`, ...).
    pub var_type: String,
}

/// Parsed rawfile header.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawHeader {
    pub title: String,
    pub plot_name: String,
    pub flags: String,
    pub variable_count: usize,
    pub point_count: usize,
    pub variables: Vec<RawVariable>,
    pub is_complex: bool,
}

/// Data section located after the header.
enum DataSection {
    /// ASCII values start at this byte offset on this 1-based line.
    Ascii { offset: usize, line: usize },
    /// Binary values start at this byte offset.
    Binary { offset: usize },
}

/// Row-major values of every variable, sweep column included.
enum RawRows {
    Real(Vec<Vec<f64>>),
    Complex(Vec<Vec<Complex64>>),
}

/// Read and parse a rawfile from disk.
///
/// `known` is the analysis the run was prepared for; it takes precedence
/// over the kind inferred from the plot name.
pub fn parse_raw_file(path: &Path, known: Option<AnalysisKind>) -> Result<CanonicalWaveform> {
    let bytes = std::fs::read(path)?;
    Ok(parse_raw(&bytes, known)?)
}

/// Parse rawfile bytes into a canonical waveform.
pub fn parse_raw(
    bytes: &[u8],
    known: Option<AnalysisKind>,
) -> std::result::Result<CanonicalWaveform, RawParseError> {
    let (header, section) = parse_header(bytes)?;

    let rows = match section {
        DataSection::Ascii { offset, line } => parse_ascii(&bytes[offset..], line, &header)?,
        DataSection::Binary { offset } => parse_binary(&bytes[offset..], &header)?,
    };

    Ok(to_waveform(&header, rows, known))
}

/// Parse the header and locate the data section.
pub fn parse_header_only(bytes: &[u8]) -> std::result::Result<RawHeader, RawParseError> {
    parse_header(bytes).map(|(header, _)| header)
}

fn parse_header(bytes: &[u8]) -> std::result::Result<(RawHeader, DataSection), RawParseError> {
    let mut header = RawHeader::default();
    let mut in_variables = false;
    let mut section = None;
    let mut offset = 0;
    let mut line_no = 0;

    while offset < bytes.len() {
        let end = bytes[offset..]
            .iter()
            .position(|&b| b == b'\n')
            .map(|p| offset + p + 1)
            .unwrap_or(bytes.len());
        line_no += 1;
        let raw = String::from_utf8_lossy(&bytes[offset..end]);
        let line = raw.trim();
        offset = end;

        if line.is_empty() {
            continue;
        }
        if line.starts_with("Values:") {
            section = Some(DataSection::Ascii {
                offset,
                line: line_no + 1,
            });
            break;
        }
        if line.starts_with("Binary:") {
            section = Some(DataSection::Binary { offset });
            break;
        }

        if in_variables && line.starts_with(|c: char| c.is_ascii_digit()) {
            header.variables.push(parse_variable(line, line_no)?);
            continue;
        }

        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        in_variables = false;
        match key.trim() {
            "Title" => header.title = value.to_string(),
            "Plotname" => header.plot_name = value.to_string(),
            "Flags" => {
                header.flags = value.to_string();
                header.is_complex = value.to_ascii_lowercase().contains("complex");
            }
            "No. Variables" => {
                header.variable_count = parse_count(value, "No. Variables", line_no)?;
            }
            "No. Points" => header.point_count = parse_count(value, "No. Points", line_no)?,
            "Variables" => {
                in_variables = true;
                if !value.is_empty() {
                    header.variables.push(parse_variable(value, line_no)?);
                }
            }
            _ => {}
        }
    }

    if header.variable_count == 0 {
        return Err(RawParseError::MissingCount("No. Variables"));
    }
    if header.point_count == 0 {
        return Err(RawParseError::MissingCount("No. Points"));
    }
    if header.variables.len() != header.variable_count {
        return Err(RawParseError::VariableCount {
            declared: header.variable_count,
            listed: header.variables.len(),
        });
    }
    let section = section.ok_or(RawParseError::MissingData)?;

    Ok((header, section))
}

fn parse_count(
    value: &str,
    field: &'static str,
    line: usize,
) -> std::result::Result<usize, RawParseError> {
    value.parse().map_err(|_| RawParseError::InvalidCount {
        line,
        field,
        value: value.to_string(),
    })
}

fn parse_variable(text: &str, line: usize) -> std::result::Result<RawVariable, RawParseError> {
    let invalid = || RawParseError::InvalidVariable {
        line,
        text: text.to_string(),
    };
    let mut parts = text.split_whitespace();
    let index = parts
        .next()
        .and_then(|p| p.parse().ok())
        .ok_or_else(invalid)?;
    let name = parts.next().ok_or_else(invalid)?.to_string();
    let var_type = parts.next().ok_or_else(invalid)?.to_string();
    Ok(RawVariable {
        index,
        name,
        var_type,
    })
}

fn parse_ascii(
    data: &[u8],
    first_line: usize,
    header: &RawHeader,
) -> std::result::Result<RawRows, RawParseError> {
    let text = String::from_utf8_lossy(data);
    let mut tokens = text
        .lines()
        .enumerate()
        .flat_map(|(i, line)| line.split_whitespace().map(move |t| (first_line + i, t)));

    let points = header.point_count;
    let vars = header.variable_count;
    let truncated = |point| RawParseError::Truncated {
        point,
        expected: points,
    };
    // The header count is untrusted; every value takes at least two bytes.
    let capacity = points.min(data.len() / 2);

    if header.is_complex {
        let mut rows = Vec::with_capacity(capacity);
        for point in 0..points {
            let (line, index) = tokens.next().ok_or_else(|| truncated(point))?;
            parse_number(index, line)?;
            let mut row = Vec::with_capacity(vars);
            for _ in 0..vars {
                let (line, token) = tokens.next().ok_or_else(|| truncated(point))?;
                let value = match token.split_once(',') {
                    Some((re, im)) => Complex64::new(parse_number(re, line)?, parse_number(im, line)?),
                    None => {
                        let re = parse_number(token, line)?;
                        let (line, im) = tokens.next().ok_or_else(|| truncated(point))?;
                        Complex64::new(re, parse_number(im, line)?)
                    }
                };
                row.push(value);
            }
            rows.push(row);
        }
        Ok(RawRows::Complex(rows))
    } else {
        let mut rows = Vec::with_capacity(capacity);
        for point in 0..points {
            let (line, index) = tokens.next().ok_or_else(|| truncated(point))?;
            parse_number(index, line)?;
            let mut row = Vec::with_capacity(vars);
            for _ in 0..vars {
                let (line, token) = tokens.next().ok_or_else(|| truncated(point))?;
                row.push(parse_number(token, line)?);
            }
            rows.push(row);
        }
        Ok(RawRows::Real(rows))
    }
}

fn parse_number(token: &str, line: usize) -> std::result::Result<f64, RawParseError> {
    token
        .trim()
        .parse::<f64>()
        .map_err(|_| RawParseError::InvalidNumber {
            line,
            token: token.to_string(),
        })
}

fn parse_binary(data: &[u8], header: &RawHeader) -> std::result::Result<RawRows, RawParseError> {
    let points = header.point_count;
    let vars = header.variable_count;
    let values_per_var = if header.is_complex { 2 } else { 1 };
    let bytes_per_point = vars * values_per_var * 8;

    let available = data.len() / bytes_per_point;
    if available < points {
        return Err(RawParseError::Truncated {
            point: available,
            expected: points,
        });
    }

    let point_values = data
        .chunks_exact(bytes_per_point)
        .take(points)
        .map(|chunk| chunk.chunks_exact(8).map(read_f64).collect::<Vec<_>>());

    if header.is_complex {
        Ok(RawRows::Complex(
            point_values
                .map(|values| {
                    values
                        .chunks_exact(2)
                        .map(|pair| Complex64::new(pair[0], pair[1]))
                        .collect()
                })
                .collect(),
        ))
    } else {
        Ok(RawRows::Real(point_values.collect()))
    }
}

fn read_f64(chunk: &[u8]) -> f64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(chunk);
    f64::from_le_bytes(buf)
}

/// Whether results of this kind carry no sweep column.
fn is_sweepless(kind: Option<AnalysisKind>) -> bool {
    matches!(
        kind,
        Some(AnalysisKind::OperatingPoint | AnalysisKind::TransferFunction | AnalysisKind::PoleZero)
    )
}

fn to_waveform(header: &RawHeader, rows: RawRows, known: Option<AnalysisKind>) -> CanonicalWaveform {
    let analysis = known.or_else(|| AnalysisKind::from_plot_name(&header.plot_name));
    let sweepless = is_sweepless(analysis);
    let first_data = usize::from(!sweepless);

    let sweep = if sweepless {
        SweepDescriptor::point()
    } else {
        sweep_descriptor(&header.variables[0])
    };
    let variables: Vec<VariableDescriptor> = header.variables[first_data..]
        .iter()
        .enumerate()
        .map(|(index, v)| variable_descriptor(v, index))
        .collect();

    let (sweep_values, data) = match rows {
        RawRows::Real(rows) => {
            let sweep_values = sweep_column(rows.len(), sweepless, |p| rows[p][0]);
            let data = rows.into_iter().map(|row| row[first_data..].to_vec()).collect();
            (sweep_values, WaveformData::Real(data))
        }
        RawRows::Complex(rows) => {
            let sweep_values = sweep_column(rows.len(), sweepless, |p| rows[p][0].re);
            let data = rows.into_iter().map(|row| row[first_data..].to_vec()).collect();
            (sweep_values, WaveformData::Complex(data))
        }
    };

    CanonicalWaveform {
        analysis,
        sweep,
        sweep_values,
        variables,
        data,
    }
}

fn sweep_column(len: usize, sweepless: bool, value: impl Fn(usize) -> f64) -> Vec<f64> {
    if sweepless {
        (0..len).map(|p| p as f64).collect()
    } else {
        (0..len).map(value).collect()
    }
}

fn sweep_descriptor(var: &RawVariable) -> SweepDescriptor {
    let name = var.name.to_ascii_lowercase();
    if name.contains("frequency") {
        SweepDescriptor::new(&var.name, QuantityKind::Frequency)
    } else if name.contains("time") {
        SweepDescriptor::new(&var.name, QuantityKind::Time)
    } else {
        // DC sweeps name the axis after the source (`v-sweep`); keep its unit.
        let unit = kind_from_type(&var.var_type)
            .map(QuantityKind::default_unit)
            .unwrap_or("");
        SweepDescriptor::new(&var.name, QuantityKind::Parameter).with_unit(unit)
    }
}

fn variable_descriptor(var: &RawVariable, index: usize) -> VariableDescriptor {
    VariableDescriptor::new(&var.name, variable_kind(var), index)
}

fn variable_kind(var: &RawVariable) -> QuantityKind {
    let name = var.name.to_ascii_lowercase();
    if name.starts_with("v(") {
        return QuantityKind::Voltage;
    }
    if name.starts_with("i(") || name.contains("#branch") {
        return QuantityKind::Current;
    }
    if let Some(kind) = kind_from_type(&var.var_type) {
        return kind;
    }
    if name.contains("frequency") {
        QuantityKind::Frequency
    } else if name.contains("time") {
        QuantityKind::Time
    } else {
        QuantityKind::Parameter
    }
}

fn kind_from_type(var_type: &str) -> Option<QuantityKind> {
    match var_type.to_ascii_lowercase().as_str() {
        "voltage" => Some(QuantityKind::Voltage),
        "current" => Some(QuantityKind::Current),
        "frequency" => Some(QuantityKind::Frequency),
        "time" => Some(QuantityKind::Time),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRAN_RAW: &str = "\
Title: rc test
Date: Thu Jan  1 00:00:00 2026
Plotname: Transient Analysis
Flags: real
No. Variables: 2
No. Points: 3
Variables:
\t0\ttime\ttime
\t1\tv(out)\tvoltage
Values:
 0\t0.000000000000000e+00
\t0.000000000000000e+00
 1\t1.000000000000000e-06
\t2.500000000000000e+00
 2\t2.000000000000000e-06
\t5.000000000000000e+00
";

    #[test]
    fn test_parse_transient() {
        let w = parse_raw(TRAN_RAW.as_bytes(), None).unwrap();
        assert_eq!(w.analysis, Some(AnalysisKind::Transient));
        assert_eq!(w.sweep.kind, QuantityKind::Time);
        assert_eq!(w.sweep.unit, "s");
        assert_eq!(w.sweep_values, vec![0.0, 1e-6, 2e-6]);
        assert_eq!(w.variables.len(), 1);
        assert_eq!(w.variables[0].name, "v(out)");
        assert_eq!(w.variables[0].kind, QuantityKind::Voltage);
        assert_eq!(w.real_column(0), Some(vec![0.0, 2.5, 5.0]));
        w.check_shape().unwrap();
    }

    #[test]
    fn test_parse_complex_both_encodings() {
        let raw = "\
Plotname: AC Analysis
Flags: complex
No. Variables: 2
No. Points: 2
Variables:
\t0\tfrequency\tfrequency
\t1\tv(out)\tvoltage
Values:
 0\t1.0,0.0
\t0.5,-0.5
 1\t1.0e3 0.0
\t0.25 -0.75
";
        let w = parse_raw(raw.as_bytes(), None).unwrap();
        assert_eq!(w.analysis, Some(AnalysisKind::Ac));
        assert_eq!(w.sweep.kind, QuantityKind::Frequency);
        assert_eq!(w.sweep_values, vec![1.0, 1e3]);
        assert_eq!(
            w.complex_column(0),
            Some(vec![Complex64::new(0.5, -0.5), Complex64::new(0.25, -0.75)])
        );
    }

    #[test]
    fn test_non_numeric_token_is_an_error() {
        let raw = TRAN_RAW.replace("2.500000000000000e+00", "2.5oops");
        let err = parse_raw(raw.as_bytes(), None).unwrap_err();
        assert_eq!(
            err,
            RawParseError::InvalidNumber {
                line: 14,
                token: "2.5oops".to_string()
            }
        );
    }

    #[test]
    fn test_truncated_stream() {
        let cut = TRAN_RAW.find(" 2\t2.0").unwrap();
        let err = parse_raw(&TRAN_RAW.as_bytes()[..cut], None).unwrap_err();
        assert_eq!(
            err,
            RawParseError::Truncated {
                point: 2,
                expected: 3
            }
        );
    }

    #[test]
    fn test_huge_point_count_is_truncated() {
        let raw = "\
Plotname: Transient Analysis
Flags: real
No. Variables: 2
No. Points: 1000000000000000
Variables:
\t0\ttime\ttime
\t1\tv(out)\tvoltage
Values:
 0 0.0 1.0
";
        let err = parse_raw(raw.as_bytes(), None).unwrap_err();
        assert_eq!(
            err,
            RawParseError::Truncated {
                point: 1,
                expected: 1_000_000_000_000_000
            }
        );

        let complex = raw.replace("Flags: real", "Flags: complex");
        assert!(matches!(
            parse_raw(complex.as_bytes(), None).unwrap_err(),
            RawParseError::Truncated { .. }
        ));
    }

    #[test]
    fn test_missing_counts_and_sections() {
        let raw = TRAN_RAW.replace("No. Points: 3", "No. Points: 0");
        assert_eq!(
            parse_raw(raw.as_bytes(), None).unwrap_err(),
            RawParseError::MissingCount("No. Points")
        );

        let raw = TRAN_RAW.replace("No. Variables: 2\n", "");
        assert_eq!(
            parse_raw(raw.as_bytes(), None).unwrap_err(),
            RawParseError::MissingCount("No. Variables")
        );

        let raw = TRAN_RAW.replace("No. Variables: 2", "No. Variables: 3");
        assert_eq!(
            parse_raw(raw.as_bytes(), None).unwrap_err(),
            RawParseError::VariableCount {
                declared: 3,
                listed: 2
            }
        );

        let raw = TRAN_RAW.replace("Values:", "Stuff:");
        assert_eq!(
            parse_raw(raw.as_bytes(), None).unwrap_err(),
            RawParseError::MissingData
        );

        let raw = TRAN_RAW.replace("No. Points: 3", "No. Points: many");
        assert!(matches!(
            parse_raw(raw.as_bytes(), None).unwrap_err(),
            RawParseError::InvalidCount {
                field: "No. Points",
                ..
            }
        ));
    }

    #[test]
    fn test_known_kind_wins_over_plot_name() {
        let raw = TRAN_RAW.replace("Transient Analysis", "Operating Point");
        let w = parse_raw(raw.as_bytes(), Some(AnalysisKind::Transient)).unwrap();
        assert_eq!(w.analysis, Some(AnalysisKind::Transient));
        assert_eq!(w.sweep_values, vec![0.0, 1e-6, 2e-6]);
    }

    #[test]
    fn test_operating_point_has_no_sweep_column() {
        let raw = "\
Plotname: Operating Point
Flags: real
No. Variables: 3
No. Points: 1
Variables:
\t0\tv(in)\tvoltage
\t1\tv(out)\tvoltage
\t2\tv1#branch\tcurrent
Values:
 0\t5.0
\t2.5
\t-2.5e-3
";
        let w = parse_raw(raw.as_bytes(), None).unwrap();
        assert_eq!(w.analysis, Some(AnalysisKind::OperatingPoint));
        assert_eq!(w.sweep, SweepDescriptor::point());
        assert_eq!(w.sweep_values, vec![0.0]);
        assert_eq!(w.variables.len(), 3);
        assert_eq!(w.variables[2].kind, QuantityKind::Current);
        assert_eq!(w.real_column(1), Some(vec![2.5]));
    }

    #[test]
    fn test_binary_section() {
        let mut bytes = b"Plotname: DC transfer characteristic\n\
Flags: real\n\
No. Variables: 2\n\
No. Points: 2\n\
Variables:\n\
\t0\tv-sweep\tvoltage\n\
\t1\tv(out)\tvoltage\n\
Binary:\n"
            .to_vec();
        for v in [0.0f64, 0.0, 1.0, 0.5] {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        let w = parse_raw(&bytes, None).unwrap();
        assert_eq!(w.analysis, Some(AnalysisKind::DcSweep));
        assert_eq!(w.sweep.kind, QuantityKind::Parameter);
        assert_eq!(w.sweep.unit, "V");
        assert_eq!(w.sweep_values, vec![0.0, 1.0]);
        assert_eq!(w.real_column(0), Some(vec![0.0, 0.5]));

        let short = &bytes[..bytes.len() - 8];
        assert_eq!(
            parse_raw(short, None).unwrap_err(),
            RawParseError::Truncated {
                point: 1,
                expected: 2
            }
        );
    }

    #[test]
    fn test_header_only() {
        let header = parse_header_only(TRAN_RAW.as_bytes()).unwrap();
        assert_eq!(header.title, "rc test");
        assert_eq!(header.variables[1].var_type, "voltage");
        assert!(!header.is_complex);
    }
}
