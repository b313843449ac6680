// Streaming Algorithms - Single-Pass Mergeable Accumulators
// Each accumulator holds only the state needed to add one value in O(1) and
// to combine with another accumulator of the same type, so partial results
// computed by independent workers fold into one final result without
// re-reading raw data.

use anyhow::{bail, Result};

use crate::contracts::StreamingAlgorithm;
use crate::types::ValidatedPercentile;
use crate::validation::ensure_finite;
use crate::zipper::GraphZipper;

/// Running arithmetic mean.
#[derive(Debug, Clone, Default)]
pub struct MeanComputation {
    count: u64,
    total: f64,
}

impl MeanComputation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> u64 {
        self.count
    }
}

impl StreamingAlgorithm for MeanComputation {
    fn add(&mut self, value: f64) -> Result<()> {
        ensure_finite("value", value)?;
        self.count += 1;
        self.total += value;
        Ok(())
    }

    fn merge(&mut self, other: &Self) -> Result<()> {
        self.count += other.count;
        self.total += other.total;
        Ok(())
    }

    fn result(&self) -> Option<f64> {
        if self.count == 0 {
            return None;
        }
        Some(self.total / self.count as f64)
    }
}

/// Running sample standard deviation (Welford's incremental update).
#[derive(Debug, Clone, Default)]
pub struct StdDevComputation {
    count: u64,
    dev_sum: f64,
    mean_computation: MeanComputation,
}

impl StdDevComputation {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StreamingAlgorithm for StdDevComputation {
    fn add(&mut self, value: f64) -> Result<()> {
        ensure_finite("value", value)?;
        let mean_prev = self.mean_computation.result().unwrap_or(0.0);
        self.mean_computation.add(value)?;
        self.count += 1;
        // result() is Some here: the inner mean has just seen a value.
        let mean = self.mean_computation.result().unwrap_or(value);
        self.dev_sum += (value - mean_prev) * (value - mean);
        Ok(())
    }

    fn merge(&mut self, other: &Self) -> Result<()> {
        if other.count == 0 {
            return Ok(());
        }
        if self.count == 0 {
            *self = other.clone();
            return Ok(());
        }
        // Parallel variance combination (Chan et al.): exact up to floating
        // point, so merged partials match a single-pass computation.
        let n1 = self.count as f64;
        let n2 = other.count as f64;
        let mean1 = self.mean_computation.result().unwrap_or(0.0);
        let mean2 = other.mean_computation.result().unwrap_or(0.0);
        let delta = mean2 - mean1;
        self.dev_sum += other.dev_sum + delta * delta * n1 * n2 / (n1 + n2);
        self.mean_computation.merge(&other.mean_computation)?;
        self.count += other.count;
        Ok(())
    }

    fn result(&self) -> Option<f64> {
        if self.count < 2 {
            return None;
        }
        Some((self.dev_sum / (self.count - 1) as f64).sqrt())
    }
}

/// Running minimum.
#[derive(Debug, Clone, Default)]
pub struct MinComputation {
    value: Option<f64>,
}

impl MinComputation {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StreamingAlgorithm for MinComputation {
    fn add(&mut self, value: f64) -> Result<()> {
        ensure_finite("value", value)?;
        self.value = Some(match self.value {
            Some(current) => current.min(value),
            None => value,
        });
        Ok(())
    }

    fn merge(&mut self, other: &Self) -> Result<()> {
        if let Some(value) = other.value {
            self.add(value)?;
        }
        Ok(())
    }

    fn result(&self) -> Option<f64> {
        self.value
    }
}

/// Running maximum.
#[derive(Debug, Clone, Default)]
pub struct MaxComputation {
    value: Option<f64>,
}

impl MaxComputation {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StreamingAlgorithm for MaxComputation {
    fn add(&mut self, value: f64) -> Result<()> {
        ensure_finite("value", value)?;
        self.value = Some(match self.value {
            Some(current) => current.max(value),
            None => value,
        });
        Ok(())
    }

    fn merge(&mut self, other: &Self) -> Result<()> {
        if let Some(value) = other.value {
            self.add(value)?;
        }
        Ok(())
    }

    fn result(&self) -> Option<f64> {
        self.value
    }
}

/// Pure counter; `add` ignores its argument.
#[derive(Debug, Clone, Default)]
pub struct IncrementComputation {
    count: u64,
}

impl IncrementComputation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one occurrence without pretending there is a value.
    pub fn increment(&mut self) {
        self.count += 1;
    }

    pub fn count(&self) -> u64 {
        self.count
    }
}

impl StreamingAlgorithm for IncrementComputation {
    fn add(&mut self, _value: f64) -> Result<()> {
        self.increment();
        Ok(())
    }

    fn merge(&mut self, other: &Self) -> Result<()> {
        self.count += other.count;
        Ok(())
    }

    fn result(&self) -> Option<f64> {
        Some(self.count as f64)
    }
}

/// Percentage increase from the minimum to the maximum observed duration.
///
/// Only positive durations are meaningful here; a non-positive value is an
/// input error. With no data the result is `Some(0.0)`, meaning no
/// degradation observed: a deliberate departure from the `None` convention.
#[derive(Debug, Clone, Default)]
pub struct DegradationComputation {
    min_value: MinComputation,
    max_value: MaxComputation,
}

impl DegradationComputation {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StreamingAlgorithm for DegradationComputation {
    fn add(&mut self, value: f64) -> Result<()> {
        ensure_finite("value", value)?;
        if value <= 0.0 {
            bail!("Unexpected value: {value}; degradation needs positive durations");
        }
        self.min_value.add(value)?;
        self.max_value.add(value)?;
        Ok(())
    }

    fn merge(&mut self, other: &Self) -> Result<()> {
        self.min_value.merge(&other.min_value)?;
        self.max_value.merge(&other.max_value)?;
        Ok(())
    }

    fn result(&self) -> Option<f64> {
        match (self.min_value.result(), self.max_value.result()) {
            (Some(min), Some(max)) => Some((max - min) / min * 100.0),
            _ => Some(0.0),
        }
    }
}

/// Streaming percentile over a bounded, lossily-compressed sample buffer.
///
/// Storage is delegated to a [`GraphZipper`] sized for the expected stream
/// length, so memory stays bounded no matter how many values arrive. When
/// the stream fits without compression the result is exact.
#[derive(Debug, Clone)]
pub struct PercentileComputation {
    percent: ValidatedPercentile,
    graph_zipper: GraphZipper,
}

impl PercentileComputation {
    /// `percent` must be in the open range (0, 1); `length` is the expected
    /// number of `add` calls.
    pub fn new(percent: f64, length: usize) -> Result<Self> {
        Ok(Self {
            percent: ValidatedPercentile::new(percent)?,
            graph_zipper: GraphZipper::new(length, 1000)?,
        })
    }

    pub fn percent(&self) -> f64 {
        self.percent.get()
    }
}

impl StreamingAlgorithm for PercentileComputation {
    fn add(&mut self, value: f64) -> Result<()> {
        ensure_finite("value", value)?;
        self.graph_zipper.add_point(value)
    }

    /// Not supported: a percentile is bound to one sample stream, and two
    /// compressed buffers cannot be recombined without the raw data.
    fn merge(&mut self, _other: &Self) -> Result<()> {
        bail!("Merging percentile computations is not supported");
    }

    fn result(&self) -> Option<f64> {
        let mut values: Vec<f64> = self
            .graph_zipper
            .get_zipped_graph()
            .iter()
            .map(|(_, value)| *value)
            .collect();
        if values.is_empty() {
            return None;
        }
        values.sort_by(|a, b| a.total_cmp(b));
        Some(interpolated_percentile(&values, self.percent.get()))
    }
}

/// p-th percentile of a sorted slice by linear interpolation between the two
/// nearest ranks.
fn interpolated_percentile(sorted: &[f64], percent: f64) -> f64 {
    let k = (sorted.len() - 1) as f64 * percent;
    let floor = k.floor();
    let ceil = k.ceil();
    if floor == ceil {
        return sorted[k as usize];
    }
    sorted[floor as usize] * (ceil - k) + sorted[ceil as usize] * (k - floor)
}
