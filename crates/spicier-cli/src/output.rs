//! Waveform printing and column selection.

use anyhow::{Result, bail};
use spicier::{CanonicalWaveform, WaveformData, decimate};

/// How a waveform is shaped before printing.
#[derive(Debug, Default)]
pub struct View {
    /// Variables to print. Empty means all of them.
    pub variables: Vec<String>,
    /// Reduce to at most this many points with min/max decimation.
    pub max_points: Option<usize>,
    /// Restrict decimation to sweep values in `[from, to]`.
    pub from: Option<f64>,
    pub to: Option<f64>,
    pub json: bool,
}

/// Indices of the named variables, or every variable when `names` is empty.
pub fn select_columns(waveform: &CanonicalWaveform, names: &[String]) -> Result<Vec<usize>> {
    if names.is_empty() {
        return Ok((0..waveform.variables.len()).collect());
    }
    names
        .iter()
        .map(|name| match waveform.find_variable(name) {
            Some(v) => Ok(v.index),
            None => bail!(
                "no variable named `{}` (available: {})",
                name,
                waveform
                    .variables
                    .iter()
                    .map(|v| v.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        })
        .collect()
}

/// Apply the view and print to stdout.
pub fn emit(waveform: CanonicalWaveform, view: &View) -> Result<()> {
    let selected = select_columns(&waveform, &view.variables)?;
    let visible = match (view.from, view.to) {
        (Some(from), Some(to)) => Some(from..=to),
        (Some(from), None) => Some(from..=f64::INFINITY),
        (None, Some(to)) => Some(f64::NEG_INFINITY..=to),
        (None, None) => None,
    };

    let (waveform, columns) = match view.max_points {
        Some(max_points) => {
            let reduced = decimate(&waveform, &selected, visible, max_points);
            // Decimation keeps only the selected variables, under their own names.
            let columns = select_columns(&reduced, &view.variables)?;
            (reduced, columns)
        }
        None => (waveform, selected),
    };

    if view.json {
        println!("{}", serde_json::to_string_pretty(&waveform)?);
    } else {
        print_table(&waveform, &columns);
    }
    Ok(())
}

fn print_table(waveform: &CanonicalWaveform, columns: &[usize]) {
    let sweep = &waveform.sweep;
    let mut header = vec![label(&sweep.name, &sweep.unit)];
    header.extend(
        columns
            .iter()
            .map(|&i| label(&waveform.variables[i].name, &waveform.variables[i].unit)),
    );
    println!("{}", header.join("\t"));

    for (point, sweep_value) in waveform.sweep_values.iter().enumerate() {
        let mut row = vec![format!("{:.6e}", sweep_value)];
        match &waveform.data {
            WaveformData::Real(rows) => {
                row.extend(columns.iter().map(|&i| format!("{:.6e}", rows[point][i])));
            }
            WaveformData::Complex(rows) => {
                row.extend(columns.iter().map(|&i| {
                    let c = rows[point][i];
                    format!("{:.6e}{:+.6e}j", c.re, c.im)
                }));
            }
        }
        println!("{}", row.join("\t"));
    }
}

fn label(name: &str, unit: &str) -> String {
    if unit.is_empty() {
        name.to_string()
    } else {
        format!("{} [{}]", name, unit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spicier::{QuantityKind, SweepDescriptor, VariableDescriptor};

    fn waveform() -> CanonicalWaveform {
        let mut w = CanonicalWaveform::empty_real(
            None,
            SweepDescriptor::time(),
            vec![
                VariableDescriptor::new("v(in)", QuantityKind::Voltage, 0),
                VariableDescriptor::new("v(out)", QuantityKind::Voltage, 1),
            ],
        );
        for k in 0..4 {
            w.push_real(k as f64, vec![1.0, k as f64]).unwrap();
        }
        w
    }

    #[test]
    fn test_select_columns() {
        let w = waveform();
        assert_eq!(select_columns(&w, &[]).unwrap(), vec![0, 1]);
        assert_eq!(
            select_columns(&w, &["V(OUT)".to_string()]).unwrap(),
            vec![1]
        );
        let err = select_columns(&w, &["v(x)".to_string()]).unwrap_err();
        assert!(err.to_string().contains("v(in), v(out)"));
    }

    #[test]
    fn test_label() {
        assert_eq!(label("time", "s"), "time [s]");
        assert_eq!(label("gain", ""), "gain");
    }
}
