//! Analysis requests and their SPICE directive forms.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::netlist::split_tokens;
use crate::units::{format_engineering, parse_value};

/// Frequency spacing for AC-style sweeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcScale {
    /// Logarithmic, points per decade.
    Decade,
    /// Logarithmic, points per octave.
    Octave,
    /// Linear, total point count.
    Linear,
}

impl AcScale {
    /// Keyword used in `.ac` / `.noise` directives.
    pub fn keyword(self) -> &'static str {
        match self {
            AcScale::Decade => "dec",
            AcScale::Octave => "oct",
            AcScale::Linear => "lin",
        }
    }

    fn from_keyword(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "dec" => Some(AcScale::Decade),
            "oct" => Some(AcScale::Octave),
            "lin" => Some(AcScale::Linear),
            _ => None,
        }
    }
}

/// A frequency sweep shared by AC and noise analyses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrequencySweep {
    pub scale: AcScale,
    /// Points per decade/octave, or total points for a linear sweep.
    pub points: usize,
    pub start: f64,
    pub stop: f64,
}

impl FrequencySweep {
    fn directive_tail(&self) -> String {
        format!(
            "{} {} {} {}",
            self.scale.keyword(),
            self.points,
            format_engineering(self.start),
            format_engineering(self.stop)
        )
    }

    fn validate(&self) -> Result<()> {
        if !(self.start.is_finite() && self.stop.is_finite()) {
            return Err(Error::InvalidRequest(
                "frequency sweep bounds must be finite".to_string(),
            ));
        }
        if self.points == 0 {
            return Err(Error::InvalidRequest(
                "frequency sweep needs at least one point".to_string(),
            ));
        }
        if self.start <= 0.0 && self.scale != AcScale::Linear {
            return Err(Error::InvalidRequest(format!(
                "logarithmic sweep start frequency must be positive, got {}",
                self.start
            )));
        }
        if self.stop < self.start {
            return Err(Error::InvalidRequest(format!(
                "stop frequency {} is below start frequency {}",
                self.stop, self.start
            )));
        }
        Ok(())
    }
}

/// The kind of an analysis, without its parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisKind {
    OperatingPoint,
    Transient,
    Ac,
    DcSweep,
    Noise,
    TransferFunction,
    PoleZero,
}

impl AnalysisKind {
    /// Infer the analysis kind from a result plot name.
    pub fn from_plot_name(plot_name: &str) -> Option<Self> {
        let p = plot_name.to_lowercase();
        if p.contains("operating point") {
            Some(AnalysisKind::OperatingPoint)
        } else if p.contains("transient") {
            Some(AnalysisKind::Transient)
        } else if p.contains("ac analysis") {
            Some(AnalysisKind::Ac)
        } else if p.contains("dc transfer") || p.contains("dc analysis") {
            Some(AnalysisKind::DcSweep)
        } else if p.contains("noise") {
            Some(AnalysisKind::Noise)
        } else if p.contains("transfer function") {
            Some(AnalysisKind::TransferFunction)
        } else if p.contains("pole") || p.contains("zero") {
            Some(AnalysisKind::PoleZero)
        } else {
            None
        }
    }
}

impl fmt::Display for AnalysisKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AnalysisKind::OperatingPoint => "operating point",
            AnalysisKind::Transient => "transient",
            AnalysisKind::Ac => "AC sweep",
            AnalysisKind::DcSweep => "DC sweep",
            AnalysisKind::Noise => "noise",
            AnalysisKind::TransferFunction => "transfer function",
            AnalysisKind::PoleZero => "pole-zero",
        };
        f.write_str(name)
    }
}

/// A requested analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnalysisRequest {
    /// DC operating point (`.op`).
    OperatingPoint,
    /// Transient analysis (`.tran tstep tstop [tstart [tmax]]`).
    Transient {
        stop_time: f64,
        step_time: Option<f64>,
        start_time: Option<f64>,
        max_step: Option<f64>,
    },
    /// Small-signal AC sweep (`.ac dec|oct|lin n fstart fstop`).
    Ac(FrequencySweep),
    /// DC source sweep (`.dc src start stop step`).
    DcSweep {
        source: String,
        start: f64,
        stop: f64,
        step: f64,
    },
    /// Noise analysis (`.noise v(out[,ref]) src dec n fstart fstop`).
    Noise {
        output_node: String,
        reference_node: Option<String>,
        input_source: String,
        sweep: FrequencySweep,
    },
    /// DC small-signal transfer function (`.tf outexpr src`).
    TransferFunction {
        output: String,
        input_source: String,
    },
    /// Pole-zero analysis (`.pz in inref out outref vol pz`).
    PoleZero {
        input_node: String,
        input_reference: String,
        output_node: String,
        output_reference: String,
    },
}

/// Fraction of the stop time used as print step when a transient request leaves it out.
const DEFAULT_TRAN_STEP_DIVISOR: f64 = 1000.0;

/// Largest DC sweep accepted, in points.
pub const MAX_DC_SWEEP_POINTS: usize = 10_000_000;

/// Number of points of a DC sweep, or `None` if it is invalid or too large.
fn dc_point_count(start: f64, stop: f64, step: f64) -> Option<usize> {
    if !(start.is_finite() && stop.is_finite() && step.is_finite()) {
        return None;
    }
    if step == 0.0 || (stop - start) * step < 0.0 {
        return None;
    }
    let intervals = ((stop - start) / step + 1e-9).floor();
    (intervals.is_finite() && intervals < MAX_DC_SWEEP_POINTS as f64)
        .then(|| intervals as usize + 1)
}

impl AnalysisRequest {
    pub fn kind(&self) -> AnalysisKind {
        match self {
            AnalysisRequest::OperatingPoint => AnalysisKind::OperatingPoint,
            AnalysisRequest::Transient { .. } => AnalysisKind::Transient,
            AnalysisRequest::Ac(_) => AnalysisKind::Ac,
            AnalysisRequest::DcSweep { .. } => AnalysisKind::DcSweep,
            AnalysisRequest::Noise { .. } => AnalysisKind::Noise,
            AnalysisRequest::TransferFunction { .. } => AnalysisKind::TransferFunction,
            AnalysisRequest::PoleZero { .. } => AnalysisKind::PoleZero,
        }
    }

    /// Check request invariants before any solver or tool is involved.
    pub fn validate(&self) -> Result<()> {
        match self {
            AnalysisRequest::OperatingPoint => Ok(()),
            AnalysisRequest::Transient {
                stop_time,
                step_time,
                start_time,
                max_step,
            } => {
                if !(stop_time.is_finite() && *stop_time > 0.0) {
                    return Err(Error::InvalidRequest(format!(
                        "transient stop time must be positive, got {}",
                        stop_time
                    )));
                }
                let bad_step = |s: f64| !(s.is_finite() && s > 0.0);
                if step_time.is_some_and(bad_step) || max_step.is_some_and(bad_step) {
                    return Err(Error::InvalidRequest(
                        "transient step sizes must be positive and finite".to_string(),
                    ));
                }
                if start_time.is_some_and(|t| t < 0.0 || t >= *stop_time) {
                    return Err(Error::InvalidRequest(
                        "transient start time must lie in [0, stop)".to_string(),
                    ));
                }
                Ok(())
            }
            AnalysisRequest::Ac(sweep) => sweep.validate(),
            AnalysisRequest::DcSweep {
                source,
                start,
                stop,
                step,
            } => {
                if !(start.is_finite() && stop.is_finite() && step.is_finite()) {
                    return Err(Error::InvalidRequest(format!(
                        "DC sweep of {} needs finite start, stop and step",
                        source
                    )));
                }
                if *step == 0.0 {
                    return Err(Error::InvalidRequest(format!(
                        "DC sweep of {} has zero step",
                        source
                    )));
                }
                if (stop - start) * step < 0.0 {
                    return Err(Error::InvalidRequest(format!(
                        "DC sweep step {} moves away from stop value {}",
                        step, stop
                    )));
                }
                if dc_point_count(*start, *stop, *step).is_none() {
                    return Err(Error::InvalidRequest(format!(
                        "DC sweep of {} exceeds {} points",
                        source, MAX_DC_SWEEP_POINTS
                    )));
                }
                Ok(())
            }
            AnalysisRequest::Noise { sweep, .. } => sweep.validate(),
            AnalysisRequest::TransferFunction { .. } | AnalysisRequest::PoleZero { .. } => Ok(()),
        }
    }

    /// Swept values of a DC sweep, inclusive of both ends.
    ///
    /// Returns an empty vector for other request kinds or an invalid step.
    pub fn dc_sweep_values(&self) -> Vec<f64> {
        let AnalysisRequest::DcSweep {
            start, stop, step, ..
        } = self
        else {
            return Vec::new();
        };
        match dc_point_count(*start, *stop, *step) {
            Some(count) => (0..count).map(|i| start + step * i as f64).collect(),
            None => Vec::new(),
        }
    }

    /// Render the request as a single SPICE directive line.
    pub fn to_directive(&self) -> String {
        match self {
            AnalysisRequest::OperatingPoint => ".op".to_string(),
            AnalysisRequest::Transient {
                stop_time,
                step_time,
                start_time,
                max_step,
            } => {
                let step = step_time.unwrap_or(stop_time / DEFAULT_TRAN_STEP_DIVISOR);
                let mut line = format!(
                    ".tran {} {}",
                    format_engineering(step),
                    format_engineering(*stop_time)
                );
                if start_time.is_some() || max_step.is_some() {
                    line.push(' ');
                    line.push_str(&format_engineering(start_time.unwrap_or(0.0)));
                }
                if let Some(max) = max_step {
                    line.push(' ');
                    line.push_str(&format_engineering(*max));
                }
                line
            }
            AnalysisRequest::Ac(sweep) => format!(".ac {}", sweep.directive_tail()),
            AnalysisRequest::DcSweep {
                source,
                start,
                stop,
                step,
            } => format!(
                ".dc {} {} {} {}",
                source,
                format_engineering(*start),
                format_engineering(*stop),
                format_engineering(*step)
            ),
            AnalysisRequest::Noise {
                output_node,
                reference_node,
                input_source,
                sweep,
            } => {
                let output = match reference_node {
                    Some(r) => format!("v({},{})", output_node, r),
                    None => format!("v({})", output_node),
                };
                format!(
                    ".noise {} {} {}",
                    output,
                    input_source,
                    sweep.directive_tail()
                )
            }
            AnalysisRequest::TransferFunction {
                output,
                input_source,
            } => format!(".tf {} {}", output, input_source),
            AnalysisRequest::PoleZero {
                input_node,
                input_reference,
                output_node,
                output_reference,
            } => format!(
                ".pz {} {} {} {} vol pz",
                input_node, input_reference, output_node, output_reference
            ),
        }
    }

    /// Whether a line is one of the analysis directives this module understands.
    pub fn is_analysis_directive(line: &str) -> bool {
        matches!(
            crate::netlist::directive_name(line).as_deref(),
            Some(".op" | ".tran" | ".ac" | ".dc" | ".noise" | ".tf" | ".pz")
        )
    }

    /// Parse an analysis directive line.
    ///
    /// Returns `Ok(None)` when the line is not an analysis directive and an
    /// error when it is one but its arguments cannot be interpreted.
    pub fn parse_directive(line: &str) -> Result<Option<Self>> {
        let Some(name) = crate::netlist::directive_name(line) else {
            return Ok(None);
        };
        let tokens = split_tokens(line);
        let args = &tokens[1..];
        let bad = |reason: &str| Error::InvalidDirective {
            line: line.to_string(),
            reason: reason.to_string(),
        };
        let value = |idx: usize| -> Result<f64> {
            let tok = args
                .get(idx)
                .ok_or_else(|| bad(&format!("missing argument {}", idx + 1)))?;
            parse_value(tok).ok_or_else(|| bad(&format!("`{}` is not a number", tok)))
        };

        let request = match name.as_str() {
            ".op" => AnalysisRequest::OperatingPoint,
            ".tran" => {
                // Trailing UIC and friends are flags, not values.
                let numeric: Vec<&String> = args
                    .iter()
                    .take_while(|t| parse_value(t).is_some())
                    .collect();
                if numeric.len() < 2 {
                    return Err(bad("expected tstep and tstop"));
                }
                AnalysisRequest::Transient {
                    step_time: Some(value(0)?),
                    stop_time: value(1)?,
                    start_time: if numeric.len() > 2 { Some(value(2)?) } else { None },
                    max_step: if numeric.len() > 3 { Some(value(3)?) } else { None },
                }
            }
            ".ac" => AnalysisRequest::Ac(parse_sweep(args, 0).map_err(|r| bad(&r))?),
            ".dc" => {
                let source = args.first().ok_or_else(|| bad("missing source name"))?;
                AnalysisRequest::DcSweep {
                    source: source.clone(),
                    start: value(1)?,
                    stop: value(2)?,
                    step: value(3)?,
                }
            }
            ".noise" => {
                let output = args.first().ok_or_else(|| bad("missing output"))?;
                let (output_node, reference_node) =
                    parse_voltage_probe(output).ok_or_else(|| bad("output must be v(node)"))?;
                let input_source = args.get(1).ok_or_else(|| bad("missing input source"))?;
                AnalysisRequest::Noise {
                    output_node,
                    reference_node,
                    input_source: input_source.clone(),
                    sweep: parse_sweep(args, 2).map_err(|r| bad(&r))?,
                }
            }
            ".tf" => {
                if args.len() < 2 {
                    return Err(bad("expected output and input source"));
                }
                AnalysisRequest::TransferFunction {
                    output: args[0].clone(),
                    input_source: args[1].clone(),
                }
            }
            ".pz" => {
                if args.len() < 4 {
                    return Err(bad("expected four nodes"));
                }
                AnalysisRequest::PoleZero {
                    input_node: args[0].clone(),
                    input_reference: args[1].clone(),
                    output_node: args[2].clone(),
                    output_reference: args[3].clone(),
                }
            }
            _ => return Ok(None),
        };
        Ok(Some(request))
    }

    /// First analysis directive of a netlist in file order.
    ///
    /// Directives that fail to parse are skipped, matching how the first
    /// *recognized* directive is selected.
    pub fn first_in_netlist(netlist: &str) -> Option<Self> {
        crate::netlist::logical_lines(netlist)
            .iter()
            .filter(|l| Self::is_analysis_directive(&l.text))
            .find_map(|l| Self::parse_directive(&l.text).ok().flatten())
    }
}

fn parse_sweep(args: &[String], offset: usize) -> std::result::Result<FrequencySweep, String> {
    let get = |i: usize| {
        args.get(offset + i)
            .ok_or_else(|| format!("missing sweep argument {}", i + 1))
    };
    let scale = AcScale::from_keyword(get(0)?)
        .ok_or_else(|| format!("unknown sweep scale `{}`", args[offset]))?;
    let points_tok = get(1)?;
    let points = parse_value(points_tok)
        .filter(|p| *p >= 1.0)
        .ok_or_else(|| format!("invalid point count `{}`", points_tok))?
        .round() as usize;
    let start_tok = get(2)?;
    let stop_tok = get(3)?;
    let start = parse_value(start_tok).ok_or_else(|| format!("`{}` is not a number", start_tok))?;
    let stop = parse_value(stop_tok).ok_or_else(|| format!("`{}` is not a number", stop_tok))?;
    Ok(FrequencySweep {
        scale,
        points,
        start,
        stop,
    })
}

/// Split `v(out)` / `v(out,ref)` into node names.
fn parse_voltage_probe(token: &str) -> Option<(String, Option<String>)> {
    let lower = token.to_ascii_lowercase();
    let inner = lower.strip_prefix("v(")?.strip_suffix(')')?;
    let start = 2;
    let inner_orig = &token[start..start + inner.len()];
    let mut parts = inner_orig.splitn(2, ',');
    let node = parts.next()?.trim().to_string();
    let reference = parts.next().map(|r| r.trim().to_string());
    Some((node, reference))
}
