// Builder Patterns
// Fluent construction of iteration records and the workload summary that
// parameterizes charts, with validation at build time.

use anyhow::{ensure, Result};
use indexmap::IndexMap;

use crate::atomic::flatten_actions;
use crate::contracts::{
    ActionBounds, AtomicAction, ErrorInfo, Iteration, IterationOutput, OutputItem,
    StreamingAlgorithm, WorkloadSummary,
};
use crate::streaming::{MaxComputation, MinComputation};

/// Fluent builder for [`Iteration`] records.
pub struct IterationBuilder {
    timestamp: f64,
    duration: Option<f64>,
    idle_duration: f64,
    error: Option<ErrorInfo>,
    atomic_actions: Vec<AtomicAction>,
    output: IterationOutput,
}

impl IterationBuilder {
    pub fn new() -> Self {
        Self {
            timestamp: 0.0,
            duration: None,
            idle_duration: 0.0,
            error: None,
            atomic_actions: Vec::new(),
            output: IterationOutput::default(),
        }
    }

    /// Set the start time, seconds since epoch.
    pub fn timestamp(mut self, timestamp: f64) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Set the iteration duration in seconds.
    pub fn duration(mut self, duration: f64) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn idle_duration(mut self, idle_duration: f64) -> Self {
        self.idle_duration = idle_duration;
        self
    }

    /// Mark the iteration as failed.
    pub fn error(mut self, error_type: &str, message: &str) -> Self {
        self.error = Some(ErrorInfo::new(error_type, message));
        self
    }

    /// Append a finished top-level atomic action lasting `duration` seconds,
    /// starting where the previous one finished (or at the iteration start).
    pub fn atomic_action(mut self, name: &str, duration: f64) -> Self {
        let started_at = self
            .atomic_actions
            .last()
            .and_then(|action| action.finished_at)
            .unwrap_or(self.timestamp);
        self.atomic_actions.push(AtomicAction {
            name: name.to_string(),
            started_at,
            finished_at: Some(started_at + duration),
            children: Vec::new(),
            failed: false,
        });
        self
    }

    /// Append an already-built atomic action tree.
    pub fn atomic_action_tree(mut self, action: AtomicAction) -> Self {
        self.atomic_actions.push(action);
        self
    }

    pub fn additive_output(mut self, item: OutputItem) -> Self {
        self.output.additive.push(item);
        self
    }

    pub fn complete_output(mut self, item: OutputItem) -> Self {
        self.output.complete.push(item);
        self
    }

    pub fn build(self) -> Result<Iteration> {
        let duration = self
            .duration
            .ok_or_else(|| anyhow::anyhow!("Iteration duration is required"))?;
        ensure!(duration.is_finite(), "Iteration duration must be finite");
        ensure!(
            self.idle_duration.is_finite(),
            "Iteration idle duration must be finite"
        );
        Ok(Iteration {
            timestamp: self.timestamp,
            duration,
            idle_duration: self.idle_duration,
            error: self.error,
            atomic_actions: self.atomic_actions,
            output: self.output,
        })
    }
}

impl Default for IterationBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Scan pass over a finished (or known) set of iterations that derives the
/// [`WorkloadSummary`] charts are parameterized with: totals, global and
/// per-action duration bounds, and the load phase extent.
pub struct WorkloadSummaryBuilder {
    iterations_count: usize,
    iterations_failed: usize,
    min_duration: MinComputation,
    max_duration: MaxComputation,
    tstamp_start: MinComputation,
    tstamp_end: MaxComputation,
    atomic: IndexMap<String, (MinComputation, MaxComputation)>,
}

impl WorkloadSummaryBuilder {
    pub fn new() -> Self {
        Self {
            iterations_count: 0,
            iterations_failed: 0,
            min_duration: MinComputation::new(),
            max_duration: MaxComputation::new(),
            tstamp_start: MinComputation::new(),
            tstamp_end: MaxComputation::new(),
            atomic: IndexMap::new(),
        }
    }

    /// Account one iteration. Failed iterations count toward the totals but
    /// not toward duration bounds.
    pub fn scan_iteration(&mut self, iteration: &Iteration) -> Result<()> {
        self.iterations_count += 1;
        self.tstamp_start.add(iteration.timestamp)?;
        self.tstamp_end
            .add(iteration.timestamp + iteration.duration)?;
        if iteration.succeeded() {
            self.min_duration.add(iteration.duration)?;
            self.max_duration.add(iteration.duration)?;
            for (name, duration) in flatten_actions(&iteration.atomic_actions) {
                let (min, max) = self
                    .atomic
                    .entry(name)
                    .or_insert_with(|| (MinComputation::new(), MaxComputation::new()));
                min.add(duration)?;
                max.add(duration)?;
            }
        } else {
            self.iterations_failed += 1;
        }
        Ok(())
    }

    pub fn build(self) -> WorkloadSummary {
        let tstamp_start = self.tstamp_start.result().unwrap_or(0.0);
        let load_duration = self.tstamp_end.result().unwrap_or(tstamp_start) - tstamp_start;
        WorkloadSummary {
            iterations_count: self.iterations_count,
            iterations_failed: self.iterations_failed,
            min_duration: self.min_duration.result(),
            max_duration: self.max_duration.result(),
            load_duration,
            tstamp_start,
            atomic: self
                .atomic
                .into_iter()
                .map(|(name, (min, max))| {
                    (
                        name,
                        ActionBounds {
                            min_duration: min.result(),
                            max_duration: max.result(),
                        },
                    )
                })
                .collect(),
        }
    }
}

impl Default for WorkloadSummaryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iteration_builder_requires_duration() {
        assert!(IterationBuilder::new().build().is_err());
        assert!(IterationBuilder::new().duration(1.0).build().is_ok());
        assert!(IterationBuilder::new().duration(f64::NAN).build().is_err());
    }

    #[test]
    fn test_atomic_actions_chain_start_times() {
        let iteration = IterationBuilder::new()
            .timestamp(100.0)
            .duration(3.0)
            .atomic_action("boot", 1.0)
            .atomic_action("ping", 0.5)
            .build()
            .unwrap();
        assert_eq!(iteration.atomic_actions[0].started_at, 100.0);
        assert_eq!(iteration.atomic_actions[0].finished_at, Some(101.0));
        assert_eq!(iteration.atomic_actions[1].started_at, 101.0);
        assert_eq!(iteration.atomic_actions[1].finished_at, Some(101.5));
    }

    #[test]
    fn test_summary_builder_counts_and_bounds() {
        let mut builder = WorkloadSummaryBuilder::new();
        builder
            .scan_iteration(
                &IterationBuilder::new()
                    .timestamp(10.0)
                    .duration(2.0)
                    .atomic_action("boot", 1.5)
                    .build()
                    .unwrap(),
            )
            .unwrap();
        builder
            .scan_iteration(
                &IterationBuilder::new()
                    .timestamp(12.0)
                    .duration(4.0)
                    .atomic_action("boot", 3.5)
                    .build()
                    .unwrap(),
            )
            .unwrap();
        builder
            .scan_iteration(
                &IterationBuilder::new()
                    .timestamp(16.0)
                    .duration(1.0)
                    .error("Crash", "boom")
                    .build()
                    .unwrap(),
            )
            .unwrap();

        let summary = builder.build();
        assert_eq!(summary.iterations_count, 3);
        assert_eq!(summary.iterations_failed, 1);
        assert_eq!(summary.min_duration, Some(2.0));
        assert_eq!(summary.max_duration, Some(4.0));
        assert_eq!(summary.tstamp_start, 10.0);
        assert_eq!(summary.load_duration, 7.0);
        let boot = &summary.atomic["boot"];
        assert_eq!(boot.min_duration, Some(1.5));
        assert_eq!(boot.max_duration, Some(3.5));
    }

    #[test]
    fn test_empty_summary() {
        let summary = WorkloadSummaryBuilder::new().build();
        assert_eq!(summary.iterations_count, 0);
        assert_eq!(summary.min_duration, None);
        assert_eq!(summary.load_duration, 0.0);
    }
}
