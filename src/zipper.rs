// Graph Zipper - Bounded-Memory Time Series Compression
// Accepts an a-priori-sized stream of points and emits at most `zipped_size`
// piecewise-weighted-average points, keeping memory at O(zipped_size)
// regardless of how many raw points flow through.

use anyhow::{bail, ensure, Result};
use tracing::trace;

/// Lossy compressor for an ordered stream of scalar samples.
///
/// Every input point carries weight 1, split fractionally across the
/// compression windows its position touches, so no point is dropped or
/// double-counted: the weights behind all emitted points sum to `base_size`
/// once the stream completes.
///
/// The caller must know the total point count up front; feeding more than
/// `base_size` points is a usage error, not a data error, and fails loudly.
#[derive(Debug, Clone)]
pub struct GraphZipper {
    base_size: usize,
    zipped_size: usize,
    compression_ratio: f64,
    point_order: usize,
    cached_ratios_sum: f64,
    ratio_value_points: Vec<(f64, f64)>,
    zipped_graph: Vec<(usize, f64)>,
}

impl GraphZipper {
    /// Create a zipper for a stream of exactly `base_size` points,
    /// compressed down to at most `zipped_size` output points.
    pub fn new(base_size: usize, zipped_size: usize) -> Result<Self> {
        ensure!(zipped_size > 0, "Zipped size must be at least 1");
        let compression_ratio = if base_size >= zipped_size {
            base_size as f64 / zipped_size as f64
        } else {
            1.0
        };
        Ok(Self {
            base_size,
            zipped_size,
            compression_ratio,
            point_order: 0,
            cached_ratios_sum: 0.0,
            ratio_value_points: Vec::new(),
            zipped_graph: Vec::new(),
        })
    }

    pub fn base_size(&self) -> usize {
        self.base_size
    }

    pub fn zipped_size(&self) -> usize {
        self.zipped_size
    }

    pub fn compression_ratio(&self) -> f64 {
        self.compression_ratio
    }

    /// Add the next point of the stream, in arrival order.
    ///
    /// Non-finite values are treated as 0: chart series tolerate missing
    /// samples and this is where that coercion happens.
    pub fn add_point(&mut self, value: f64) -> Result<()> {
        self.point_order += 1;
        if self.point_order > self.base_size {
            bail!(
                "GraphZipper is already full: declared {} points, got more",
                self.base_size
            );
        }

        let value = if value.is_finite() { value } else { 0.0 };

        if self.compression_ratio <= 1.0 {
            // Fewer points than the target size: emit verbatim.
            self.zipped_graph.push((self.point_order, value));
        } else if self.cached_ratios_sum + 1.0 < self.compression_ratio {
            self.cached_ratios_sum += 1.0;
            self.ratio_value_points.push((1.0, value));
        } else {
            // The window closes inside this point: split its weight across
            // the boundary and carry the remainder forward.
            let rest = self.compression_ratio - self.cached_ratios_sum;
            self.ratio_value_points.push((rest, value));
            let zipped = self.zipped_point();
            trace!(order = zipped.0, value = zipped.1, "emitting zipped point");
            self.zipped_graph.push(zipped);

            self.ratio_value_points.clear();
            self.ratio_value_points.push((1.0 - rest, value));
            self.cached_ratios_sum = 1.0 - rest;
        }
        Ok(())
    }

    /// The compressed series accumulated so far, partial or final.
    pub fn get_zipped_graph(&self) -> &[(usize, f64)] {
        &self.zipped_graph
    }

    fn zipped_point(&self) -> (usize, f64) {
        let order = if (self.point_order as f64) < 2.0 * self.compression_ratio {
            // Window still overlaps the head of the stream.
            1
        } else if self.point_order == self.base_size {
            self.base_size
        } else {
            self.point_order - (self.compression_ratio / 2.0) as usize
        };

        let value = self
            .ratio_value_points
            .iter()
            .map(|(weight, value)| weight * value)
            .sum::<f64>()
            / self.compression_ratio;

        (order, value)
    }
}
