//! Canonical waveform results.
//!
//! Every analysis result, whether it came from the in-process engine or was
//! read back from the external simulator, ends up as a [`CanonicalWaveform`]:
//! one sweep axis, a list of named variables and a row-major data matrix that
//! is either entirely real or entirely complex.

use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::analysis::AnalysisKind;
use crate::error::{Error, Result};

/// Physical meaning of a sweep axis or variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuantityKind {
    Voltage,
    Current,
    Frequency,
    Time,
    Parameter,
}

impl QuantityKind {
    /// SI unit symbol for the kind; empty for dimensionless parameters.
    pub fn default_unit(self) -> &'static str {
        match self {
            QuantityKind::Voltage => "V",
            QuantityKind::Current => "A",
            QuantityKind::Frequency => "Hz",
            QuantityKind::Time => "s",
            QuantityKind::Parameter => "",
        }
    }
}

/// Descriptor of the sweep axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepDescriptor {
    pub name: String,
    pub unit: String,
    pub kind: QuantityKind,
}

impl SweepDescriptor {
    pub fn new(name: impl Into<String>, kind: QuantityKind) -> Self {
        Self {
            name: name.into(),
            unit: kind.default_unit().to_string(),
            kind,
        }
    }

    /// Sweep axis of a transient result.
    pub fn time() -> Self {
        Self::new("time", QuantityKind::Time)
    }

    /// Sweep axis of a frequency-domain result.
    pub fn frequency() -> Self {
        Self::new("frequency", QuantityKind::Frequency)
    }

    /// Placeholder axis for single-point results.
    pub fn point() -> Self {
        Self::new("point", QuantityKind::Parameter)
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }
}

/// Descriptor of one output variable (one data column).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableDescriptor {
    pub name: String,
    pub unit: String,
    pub kind: QuantityKind,
    /// Column index in the data rows.
    pub index: usize,
}

impl VariableDescriptor {
    pub fn new(name: impl Into<String>, kind: QuantityKind, index: usize) -> Self {
        Self {
            name: name.into(),
            unit: kind.default_unit().to_string(),
            kind,
            index,
        }
    }
}

/// Data matrix, indexed `[point][variable]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "domain", content = "rows", rename_all = "snake_case")]
pub enum WaveformData {
    Real(Vec<Vec<f64>>),
    Complex(Vec<Vec<Complex64>>),
}

impl WaveformData {
    pub fn len(&self) -> usize {
        match self {
            WaveformData::Real(rows) => rows.len(),
            WaveformData::Complex(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_complex(&self) -> bool {
        matches!(self, WaveformData::Complex(_))
    }

    fn row_len(&self, row: usize) -> Option<usize> {
        match self {
            WaveformData::Real(rows) => rows.get(row).map(Vec::len),
            WaveformData::Complex(rows) => rows.get(row).map(Vec::len),
        }
    }
}

/// The unified in-memory form of any analysis result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalWaveform {
    /// Analysis that produced the data, when known.
    pub analysis: Option<AnalysisKind>,
    pub sweep: SweepDescriptor,
    /// One value per data row.
    pub sweep_values: Vec<f64>,
    pub variables: Vec<VariableDescriptor>,
    pub data: WaveformData,
}

impl CanonicalWaveform {
    /// Build a waveform, checking that every row matches the variable count
    /// and that the sweep axis has one value per row.
    pub fn new(
        analysis: Option<AnalysisKind>,
        sweep: SweepDescriptor,
        sweep_values: Vec<f64>,
        variables: Vec<VariableDescriptor>,
        data: WaveformData,
    ) -> Result<Self> {
        let waveform = Self {
            analysis,
            sweep,
            sweep_values,
            variables,
            data,
        };
        waveform.check_shape()?;
        Ok(waveform)
    }

    /// An empty real-valued waveform with the given columns.
    pub fn empty_real(
        analysis: Option<AnalysisKind>,
        sweep: SweepDescriptor,
        variables: Vec<VariableDescriptor>,
    ) -> Self {
        Self {
            analysis,
            sweep,
            sweep_values: Vec::new(),
            variables,
            data: WaveformData::Real(Vec::new()),
        }
    }

    /// Verify the row/column invariants.
    pub fn check_shape(&self) -> Result<()> {
        let rows = self.data.len();
        if self.sweep_values.len() != rows {
            return Err(Error::SweepLength {
                sweep: self.sweep_values.len(),
                rows,
            });
        }
        let expected = self.variables.len();
        for row in 0..rows {
            let actual = self.data.row_len(row).unwrap_or(0);
            if actual != expected {
                return Err(Error::RowWidth {
                    row,
                    expected,
                    actual,
                });
            }
        }
        Ok(())
    }

    /// Number of sample points.
    pub fn point_count(&self) -> usize {
        self.sweep_values.len()
    }

    pub fn is_complex(&self) -> bool {
        self.data.is_complex()
    }

    /// Append one real sample.
    pub fn push_real(&mut self, sweep_value: f64, row: Vec<f64>) -> Result<()> {
        if row.len() != self.variables.len() {
            return Err(Error::RowWidth {
                row: self.sweep_values.len(),
                expected: self.variables.len(),
                actual: row.len(),
            });
        }
        match &mut self.data {
            WaveformData::Real(rows) => rows.push(row),
            WaveformData::Complex(_) => return Err(Error::DomainMismatch("real")),
        }
        self.sweep_values.push(sweep_value);
        Ok(())
    }

    /// Find a variable by name (case-insensitive).
    pub fn find_variable(&self, name: &str) -> Option<&VariableDescriptor> {
        self.variables
            .iter()
            .find(|v| v.name.eq_ignore_ascii_case(name))
    }

    /// Real column of a variable. `None` for complex data or a bad index.
    pub fn real_column(&self, var_index: usize) -> Option<Vec<f64>> {
        match &self.data {
            WaveformData::Real(rows) if var_index < self.variables.len() => {
                Some(rows.iter().map(|row| row[var_index]).collect())
            }
            _ => None,
        }
    }

    /// Complex column of a variable. `None` for real data or a bad index.
    pub fn complex_column(&self, var_index: usize) -> Option<Vec<Complex64>> {
        match &self.data {
            WaveformData::Complex(rows) if var_index < self.variables.len() => {
                Some(rows.iter().map(|row| row[var_index]).collect())
            }
            _ => None,
        }
    }

    /// Real value, or magnitude for complex data, at one point.
    pub fn magnitude_at(&self, point: usize, var_index: usize) -> Option<f64> {
        match &self.data {
            WaveformData::Real(rows) => rows.get(point)?.get(var_index).copied(),
            WaveformData::Complex(rows) => rows.get(point)?.get(var_index).map(|c| c.norm()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_vars() -> Vec<VariableDescriptor> {
        vec![
            VariableDescriptor::new("v(out)", QuantityKind::Voltage, 0),
            VariableDescriptor::new("i(v1)", QuantityKind::Current, 1),
        ]
    }

    #[test]
    fn test_new_checks_row_width() {
        let err = CanonicalWaveform::new(
            None,
            SweepDescriptor::time(),
            vec![0.0, 1.0],
            two_vars(),
            WaveformData::Real(vec![vec![1.0, 2.0], vec![3.0]]),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            Error::RowWidth {
                row: 1,
                expected: 2,
                actual: 1
            }
        ));
    }

    #[test]
    fn test_new_checks_sweep_length() {
        let err = CanonicalWaveform::new(
            None,
            SweepDescriptor::time(),
            vec![0.0],
            two_vars(),
            WaveformData::Real(vec![vec![1.0, 2.0], vec![3.0, 4.0]]),
        )
        .unwrap_err();
        assert!(matches!(err, Error::SweepLength { sweep: 1, rows: 2 }));
    }

    #[test]
    fn test_push_and_columns() {
        let mut w = CanonicalWaveform::empty_real(
            Some(AnalysisKind::Transient),
            SweepDescriptor::time(),
            two_vars(),
        );
        w.push_real(0.0, vec![0.0, -1e-3]).unwrap();
        w.push_real(1e-6, vec![2.5, -2e-3]).unwrap();
        assert!(w.push_real(2e-6, vec![1.0]).is_err());

        assert_eq!(w.point_count(), 2);
        assert_eq!(w.real_column(0), Some(vec![0.0, 2.5]));
        assert_eq!(w.find_variable("V(OUT)").map(|v| v.index), Some(0));
        assert!(w.complex_column(0).is_none());
        w.check_shape().unwrap();
    }

    #[test]
    fn test_complex_magnitude() {
        let w = CanonicalWaveform::new(
            Some(AnalysisKind::Ac),
            SweepDescriptor::frequency(),
            vec![1.0],
            vec![VariableDescriptor::new("v(out)", QuantityKind::Voltage, 0)],
            WaveformData::Complex(vec![vec![Complex64::new(3.0, 4.0)]]),
        )
        .unwrap();
        assert_eq!(w.magnitude_at(0, 0), Some(5.0));
        assert!(w.real_column(0).is_none());
    }

    #[test]
    fn test_serializes_with_domain_tag() {
        let w = CanonicalWaveform::new(
            None,
            SweepDescriptor::point(),
            vec![0.0],
            vec![VariableDescriptor::new("v(1)", QuantityKind::Voltage, 0)],
            WaveformData::Real(vec![vec![5.0]]),
        )
        .unwrap();
        let json = serde_json::to_value(&w).unwrap();
        assert_eq!(json["data"]["domain"], "real");
        assert_eq!(json["variables"][0]["unit"], "V");
    }
}
