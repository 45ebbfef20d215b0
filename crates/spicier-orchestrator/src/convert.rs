//! Conversion of native engine results into canonical waveforms.

use num_complex::Complex64;
use spicier_core::{
    AnalysisKind, CanonicalWaveform, QuantityKind, SweepDescriptor, VariableDescriptor,
    WaveformData,
};

use crate::engine::{EngineOutput, Unknown};
use crate::error::{Error, Result};

fn unknown_columns(unknowns: &[Unknown], width: usize) -> Vec<VariableDescriptor> {
    (0..width)
        .map(|i| match unknowns.get(i) {
            Some(u) => VariableDescriptor::new(&u.name, u.kind, i),
            None => VariableDescriptor::new(format!("x{}", i), QuantityKind::Parameter, i),
        })
        .collect()
}

fn shaped(
    analysis: AnalysisKind,
    sweep: SweepDescriptor,
    sweep_values: Vec<f64>,
    variables: Vec<VariableDescriptor>,
    data: WaveformData,
) -> Result<CanonicalWaveform> {
    CanonicalWaveform::new(Some(analysis), sweep, sweep_values, variables, data)
        .map_err(|e| Error::Analysis(format!("solver returned a malformed {analysis} result: {e}")))
}

/// Convert one engine result.
pub fn to_waveform(output: EngineOutput, unknowns: &[Unknown]) -> Result<CanonicalWaveform> {
    match output {
        EngineOutput::OperatingPoint { solution } => shaped(
            AnalysisKind::OperatingPoint,
            SweepDescriptor::point(),
            vec![0.0],
            unknown_columns(unknowns, solution.len()),
            WaveformData::Real(vec![solution]),
        ),
        EngineOutput::Transient { times, solutions } => {
            let width = solutions.first().map_or(unknowns.len(), Vec::len);
            shaped(
                AnalysisKind::Transient,
                SweepDescriptor::time(),
                times,
                unknown_columns(unknowns, width),
                WaveformData::Real(solutions),
            )
        }
        EngineOutput::Ac {
            frequencies,
            solutions,
        } => {
            let width = solutions.first().map_or(unknowns.len(), Vec::len);
            shaped(
                AnalysisKind::Ac,
                SweepDescriptor::frequency(),
                frequencies,
                unknown_columns(unknowns, width),
                WaveformData::Complex(solutions),
            )
        }
        EngineOutput::Noise {
            frequencies,
            output_noise,
            input_noise,
        } => {
            if output_noise.len() != input_noise.len() {
                return Err(Error::Analysis(format!(
                    "noise result has {} output and {} input points",
                    output_noise.len(),
                    input_noise.len()
                )));
            }
            let variables = vec![
                noise_density("onoise_spectrum", "V/sqrt(Hz)", 0),
                noise_density("inoise_spectrum", "V/sqrt(Hz)", 1),
            ];
            let rows = output_noise
                .into_iter()
                .zip(input_noise)
                .map(|(o, i)| vec![o, i])
                .collect();
            shaped(
                AnalysisKind::Noise,
                SweepDescriptor::frequency(),
                frequencies,
                variables,
                WaveformData::Real(rows),
            )
        }
        EngineOutput::TransferFunction {
            gain,
            input_impedance,
            output_impedance,
        } => {
            let mut zin = VariableDescriptor::new("input_impedance", QuantityKind::Parameter, 1);
            zin.unit = "Ohm".to_string();
            let mut zout = VariableDescriptor::new("output_impedance", QuantityKind::Parameter, 2);
            zout.unit = "Ohm".to_string();
            shaped(
                AnalysisKind::TransferFunction,
                SweepDescriptor::point(),
                vec![0.0],
                vec![
                    VariableDescriptor::new("transfer_function", QuantityKind::Parameter, 0),
                    zin,
                    zout,
                ],
                WaveformData::Real(vec![vec![gain, input_impedance, output_impedance]]),
            )
        }
        EngineOutput::PoleZero { poles, zeros } => {
            let names = (1..=poles.len())
                .map(|k| format!("pole({k})"))
                .chain((1..=zeros.len()).map(|k| format!("zero({k})")));
            let variables = names
                .enumerate()
                .map(|(i, name)| {
                    let mut v = VariableDescriptor::new(name, QuantityKind::Frequency, i);
                    v.unit = "rad/s".to_string();
                    v
                })
                .collect();
            let row: Vec<Complex64> = poles.into_iter().chain(zeros).collect();
            shaped(
                AnalysisKind::PoleZero,
                SweepDescriptor::point(),
                vec![0.0],
                variables,
                WaveformData::Complex(vec![row]),
            )
        }
    }
}

fn noise_density(name: &str, unit: &str, index: usize) -> VariableDescriptor {
    let mut v = VariableDescriptor::new(name, QuantityKind::Voltage, index);
    v.unit = unit.to_string();
    v
}

/// Collects operating points of a DC source sweep into one series.
#[derive(Debug)]
pub struct DcSweepCollector {
    sweep: SweepDescriptor,
    values: Vec<f64>,
    rows: Vec<Vec<f64>>,
}

impl DcSweepCollector {
    /// The sweep axis is named after the source; `V…` sources sweep volts
    /// and `I…` sources sweep amperes.
    pub fn new(source: &str) -> Self {
        let kind_unit = match source.chars().next().map(|c| c.to_ascii_lowercase()) {
            Some('v') => "V",
            Some('i') => "A",
            _ => "",
        };
        Self {
            sweep: SweepDescriptor::new(source, QuantityKind::Parameter).with_unit(kind_unit),
            values: Vec::new(),
            rows: Vec::new(),
        }
    }

    /// Record the operating point reached at `value`.
    pub fn push(&mut self, value: f64, output: EngineOutput) -> Result<()> {
        match output {
            EngineOutput::OperatingPoint { solution } => {
                self.values.push(value);
                self.rows.push(solution);
                Ok(())
            }
            other => Err(Error::Analysis(format!(
                "expected an operating point during DC sweep, solver returned {}",
                output_kind(&other)
            ))),
        }
    }

    pub fn finish(self, unknowns: &[Unknown]) -> Result<CanonicalWaveform> {
        let width = self.rows.first().map_or(unknowns.len(), Vec::len);
        shaped(
            AnalysisKind::DcSweep,
            self.sweep,
            self.values,
            unknown_columns(unknowns, width),
            WaveformData::Real(self.rows),
        )
    }
}

fn output_kind(output: &EngineOutput) -> AnalysisKind {
    match output {
        EngineOutput::OperatingPoint { .. } => AnalysisKind::OperatingPoint,
        EngineOutput::Transient { .. } => AnalysisKind::Transient,
        EngineOutput::Ac { .. } => AnalysisKind::Ac,
        EngineOutput::Noise { .. } => AnalysisKind::Noise,
        EngineOutput::TransferFunction { .. } => AnalysisKind::TransferFunction,
        EngineOutput::PoleZero { .. } => AnalysisKind::PoleZero,
    }
}
