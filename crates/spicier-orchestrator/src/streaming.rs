//! Streaming of transient timesteps from the solver to subscribers.
//!
//! The solver thread appends every accepted step to a [`StreamingChannel`].
//! A poller task periodically drains the channel and feeds the batches to an
//! [`IncrementalResultBuilder`], which keeps the growing result.

use std::sync::{Mutex, PoisonError};

use spicier_core::{
    AnalysisKind, CanonicalWaveform, QuantityKind, SweepDescriptor, VariableDescriptor,
    WaveformData,
};

use crate::engine::Unknown;

/// Steps accumulated between two drains.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Batch {
    pub times: Vec<f64>,
    pub solutions: Vec<Vec<f64>>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }
}

/// Mutex-guarded FIFO between the solver and the poller.
#[derive(Debug, Default)]
pub struct StreamingChannel {
    pending: Mutex<Batch>,
}

impl StreamingChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one accepted step. The lock is held only for the push.
    pub fn append(&self, time: f64, solution: &[f64]) {
        let solution = solution.to_vec();
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        pending.times.push(time);
        pending.solutions.push(solution);
    }

    /// Detach everything appended since the previous drain.
    ///
    /// The pending storage is swapped for empty vectors; nothing is copied.
    pub fn drain(&self) -> Option<Batch> {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if pending.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut *pending))
        }
    }

    /// Steps waiting to be drained.
    pub fn pending(&self) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Assembles drained batches into a transient [`CanonicalWaveform`].
///
/// The column mapping from solution index to output variable is derived
/// from the first batch and reused for every later one.
#[derive(Debug)]
pub struct IncrementalResultBuilder {
    unknowns: Vec<Unknown>,
    /// Solution index of each output column.
    columns: Option<Vec<usize>>,
    waveform: CanonicalWaveform,
}

impl IncrementalResultBuilder {
    pub fn new(unknowns: Vec<Unknown>) -> Self {
        Self {
            unknowns,
            columns: None,
            waveform: CanonicalWaveform::empty_real(
                Some(AnalysisKind::Transient),
                SweepDescriptor::time(),
                Vec::new(),
            ),
        }
    }

    /// Append a batch; returns the number of new points.
    pub fn extend(&mut self, batch: Batch) -> usize {
        let Some(width) = batch.solutions.first().map(Vec::len) else {
            return 0;
        };
        if self.columns.is_none() {
            let (variables, columns) = self.map_columns(width);
            self.waveform.variables = variables;
            self.columns = Some(columns);
        }

        let added = batch.len();
        let (Some(columns), WaveformData::Real(rows)) = (&self.columns, &mut self.waveform.data)
        else {
            return 0;
        };
        rows.reserve(added);
        for solution in batch.solutions {
            rows.push(
                columns
                    .iter()
                    .map(|&i| solution.get(i).copied().unwrap_or(f64::NAN))
                    .collect(),
            );
        }
        self.waveform.sweep_values.extend(batch.times);
        added
    }

    fn map_columns(&self, width: usize) -> (Vec<VariableDescriptor>, Vec<usize>) {
        let variables = (0..width)
            .map(|i| match self.unknowns.get(i) {
                Some(u) => VariableDescriptor::new(&u.name, u.kind, i),
                None => VariableDescriptor::new(format!("x{}", i), QuantityKind::Parameter, i),
            })
            .collect();
        (variables, (0..width).collect())
    }

    pub fn point_count(&self) -> usize {
        self.waveform.point_count()
    }

    /// Time of the newest point.
    pub fn last_time(&self) -> Option<f64> {
        self.waveform.sweep_values.last().copied()
    }

    /// The full result so far.
    pub fn snapshot(&self) -> CanonicalWaveform {
        self.waveform.clone()
    }

    pub fn finish(self) -> CanonicalWaveform {
        self.waveform
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unknowns() -> Vec<Unknown> {
        vec![Unknown::voltage("in"), Unknown::voltage("out"), Unknown::current("v1")]
    }

    #[test]
    fn test_drain_detaches_pending_steps() {
        let channel = StreamingChannel::new();
        assert!(channel.drain().is_none());

        channel.append(0.0, &[1.0, 0.0, 0.0]);
        channel.append(1e-9, &[1.0, 0.1, -1e-3]);
        assert_eq!(channel.pending(), 2);

        let batch = channel.drain().unwrap();
        assert_eq!(batch.times, vec![0.0, 1e-9]);
        assert_eq!(batch.solutions[1], vec![1.0, 0.1, -1e-3]);
        assert_eq!(channel.pending(), 0);
        assert!(channel.drain().is_none());
    }

    #[test]
    fn test_builder_accumulates_batches() {
        let channel = StreamingChannel::new();
        let mut builder = IncrementalResultBuilder::new(unknowns());

        channel.append(0.0, &[1.0, 0.0, 0.0]);
        assert_eq!(builder.extend(channel.drain().unwrap()), 1);

        channel.append(1e-9, &[1.0, 0.5, -1e-3]);
        channel.append(2e-9, &[1.0, 0.75, -5e-4]);
        assert_eq!(builder.extend(channel.drain().unwrap()), 2);

        let w = builder.snapshot();
        w.check_shape().unwrap();
        assert_eq!(w.analysis, Some(AnalysisKind::Transient));
        assert_eq!(w.sweep_values, vec![0.0, 1e-9, 2e-9]);
        assert_eq!(w.variables.len(), 3);
        assert_eq!(w.variables[1].name, "v(out)");
        assert_eq!(w.variables[2].kind, QuantityKind::Current);
        assert_eq!(w.real_column(1), Some(vec![0.0, 0.5, 0.75]));
        assert_eq!(builder.last_time(), Some(2e-9));
    }

    #[test]
    fn test_mapping_is_fixed_by_first_batch() {
        let mut builder = IncrementalResultBuilder::new(vec![Unknown::voltage("a")]);
        builder.extend(Batch {
            times: vec![0.0],
            solutions: vec![vec![1.0, 2.0]],
        });
        builder.extend(Batch {
            times: vec![1.0],
            solutions: vec![vec![3.0]],
        });

        let w = builder.finish();
        assert_eq!(w.variables[0].name, "v(a)");
        assert_eq!(w.variables[1].name, "x1");
        assert_eq!(w.real_column(0), Some(vec![1.0, 3.0]));
        assert!(w.real_column(1).unwrap()[1].is_nan());
    }

    #[test]
    fn test_empty_batch_is_ignored() {
        let mut builder = IncrementalResultBuilder::new(unknowns());
        assert_eq!(builder.extend(Batch::default()), 0);
        assert_eq!(builder.point_count(), 0);
        assert!(builder.snapshot().variables.is_empty());
    }
}
