//! Min/max envelope decimation for display.
//!
//! Large results (long transients, dense sweeps) are reduced to a bounded
//! number of points before plotting. Uniform subsampling drops narrow spikes;
//! instead each bucket of samples contributes the samples holding its minimum
//! and maximum, so the visual envelope is preserved.

use std::ops::RangeInclusive;

use crate::waveform::{CanonicalWaveform, VariableDescriptor, WaveformData};

/// Downsample `waveform` to roughly `max_points` samples.
///
/// - `selected` lists the variable indices to carry; the first valid one is
///   the reference variable whose extrema pick the kept samples (magnitude
///   for complex data).
/// - `visible` restricts decimation to sweep values inside the range.
///
/// The input is returned unchanged when it already fits in `max_points`,
/// when the visible range is degenerate, or when no valid variable is
/// selected. Otherwise the result holds only the selected variables.
pub fn decimate(
    waveform: &CanonicalWaveform,
    selected: &[usize],
    visible: Option<RangeInclusive<f64>>,
    max_points: usize,
) -> CanonicalWaveform {
    let total = waveform.point_count();
    if total <= max_points {
        return waveform.clone();
    }

    let (lo, hi) = match visible {
        Some(range) => match visible_span(&waveform.sweep_values, &range) {
            Some(span) => span,
            None => return waveform.clone(),
        },
        None => (0, total),
    };

    let columns: Vec<usize> = selected
        .iter()
        .copied()
        .filter(|&i| i < waveform.variables.len())
        .collect();
    let Some(&reference) = columns.first() else {
        return waveform.clone();
    };

    let span = hi - lo;
    let indices: Vec<usize> = if span <= max_points {
        (lo..hi).collect()
    } else {
        let buckets = (max_points / 2).max(1);
        let bucket_size = span.div_ceil(buckets);
        envelope_indices(waveform, reference, lo, hi, bucket_size)
    };

    select_points(waveform, &columns, &indices)
}

/// Index span `[lo, hi)` of sweep values inside `range`, or `None` if degenerate.
fn visible_span(sweep: &[f64], range: &RangeInclusive<f64>) -> Option<(usize, usize)> {
    let (start, end) = (*range.start(), *range.end());
    if !(start < end) {
        return None;
    }
    let lo = sweep.iter().position(|v| *v >= start && *v <= end)?;
    let hi = sweep.iter().rposition(|v| *v >= start && *v <= end)? + 1;
    if hi - lo < 2 { None } else { Some((lo, hi)) }
}

fn envelope_indices(
    waveform: &CanonicalWaveform,
    reference: usize,
    lo: usize,
    hi: usize,
    bucket_size: usize,
) -> Vec<usize> {
    let mut indices = Vec::with_capacity(2 * (hi - lo).div_ceil(bucket_size));
    let mut start = lo;
    while start < hi {
        let end = (start + bucket_size).min(hi);
        let mut min_idx = start;
        let mut max_idx = start;
        let mut min_val = f64::INFINITY;
        let mut max_val = f64::NEG_INFINITY;
        for i in start..end {
            let v = waveform.magnitude_at(i, reference).unwrap_or(f64::NAN);
            if v < min_val {
                min_val = v;
                min_idx = i;
            }
            if v > max_val {
                max_val = v;
                max_idx = i;
            }
        }
        // Keep sweep order. A flat bucket holds its extremum at every sample,
        // so its first and last samples stand for the min and the max.
        let (first, second) = if min_idx == max_idx {
            (start, end - 1)
        } else {
            (min_idx.min(max_idx), min_idx.max(max_idx))
        };
        indices.push(first);
        if second != first {
            indices.push(second);
        }
        start = end;
    }
    indices
}

fn select_points(
    waveform: &CanonicalWaveform,
    columns: &[usize],
    indices: &[usize],
) -> CanonicalWaveform {
    let variables: Vec<VariableDescriptor> = columns
        .iter()
        .enumerate()
        .map(|(new_idx, &old)| VariableDescriptor {
            index: new_idx,
            ..waveform.variables[old].clone()
        })
        .collect();

    let sweep_values = indices.iter().map(|&i| waveform.sweep_values[i]).collect();
    let data = match &waveform.data {
        WaveformData::Real(rows) => WaveformData::Real(
            indices
                .iter()
                .map(|&i| columns.iter().map(|&c| rows[i][c]).collect())
                .collect(),
        ),
        WaveformData::Complex(rows) => WaveformData::Complex(
            indices
                .iter()
                .map(|&i| columns.iter().map(|&c| rows[i][c]).collect())
                .collect(),
        ),
    };

    CanonicalWaveform {
        analysis: waveform.analysis,
        sweep: waveform.sweep.clone(),
        sweep_values,
        variables,
        data,
    }
}
