// Contracts Module - Core Data Model and Capability Traits
// Defines the iteration record shape consumed by every aggregator in this
// crate, plus the contracts (streaming algorithm, SLA criterion, chart)
// that concrete implementations satisfy.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::any::Any;

use indexmap::IndexMap;

/// One execution of the benchmarked workload.
///
/// This is the sole data contract required from the upstream runner layer;
/// any producer emitting conforming records is interchangeable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Iteration {
    /// Start time, seconds since epoch.
    pub timestamp: f64,
    /// Wall-clock duration in seconds; 0 if the iteration failed before start.
    pub duration: f64,
    /// Seconds spent waiting rather than doing useful work.
    pub idle_duration: f64,
    /// Present iff the iteration failed. When set, `duration`/`idle_duration`
    /// are not representative of successful work.
    pub error: Option<ErrorInfo>,
    /// Top-level timed spans, insertion order = execution order.
    #[serde(default)]
    pub atomic_actions: Vec<AtomicAction>,
    /// Scenario-defined extra output.
    #[serde(default)]
    pub output: IterationOutput,
}

impl Iteration {
    /// Whether the iteration completed without error.
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Failure details of one iteration. Iteration errors are data, not faults
/// of this engine: they are counted and excluded from duration aggregates,
/// never propagated as `Err`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub error_type: String,
    pub message: String,
    #[serde(default)]
    pub details: String,
}

impl ErrorInfo {
    pub fn new(error_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error_type: error_type.into(),
            message: message.into(),
            details: String::new(),
        }
    }
}

/// A named timed span, possibly nested.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AtomicAction {
    pub name: String,
    /// Seconds since epoch.
    pub started_at: f64,
    /// Seconds since epoch; `None` while the span is still open (only
    /// observable inside the action timer). Finished spans satisfy
    /// `finished_at >= started_at`.
    pub finished_at: Option<f64>,
    #[serde(default)]
    pub children: Vec<AtomicAction>,
    /// Set on at most the chronologically last action of a failed iteration.
    #[serde(default)]
    pub failed: bool,
}

impl AtomicAction {
    /// Span duration in seconds; 0 for a span that never finished.
    pub fn duration(&self) -> f64 {
        match self.finished_at {
            Some(finished_at) => finished_at - self.started_at,
            None => 0.0,
        }
    }
}

/// Scenario-defined output attached to one iteration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct IterationOutput {
    /// Per-iteration additive values, aggregated across iterations.
    #[serde(default)]
    pub additive: Vec<OutputItem>,
    /// Complete, self-contained data blobs, rendered as-is.
    #[serde(default)]
    pub complete: Vec<OutputItem>,
}

/// A single scenario output item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputItem {
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Name of the chart plugin that should render this item.
    pub chart_plugin: String,
    pub data: OutputData,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub axis_label: String,
}

/// Payload of an output item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OutputData {
    /// `(name, value)` pairs added up across iterations.
    Additive(Vec<(String, f64)>),
    /// Opaque, already-rendered data.
    Complete(serde_json::Value),
}

/// Min/max duration bounds observed for one atomic action across a run.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ActionBounds {
    pub min_duration: Option<f64>,
    pub max_duration: Option<f64>,
}

/// Benchmark-level summary supplied to charts at construction.
///
/// `iterations_count` must be the exact number of iterations that will be
/// fed: chart series size their compression buffers from it, and feeding
/// more iterations than declared is a usage error.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WorkloadSummary {
    pub iterations_count: usize,
    pub iterations_failed: usize,
    pub min_duration: Option<f64>,
    pub max_duration: Option<f64>,
    /// Total wall-clock span of the load phase, seconds.
    pub load_duration: f64,
    /// Start of the load phase, seconds since epoch.
    pub tstamp_start: f64,
    /// Known atomic action names (display names, duplicates disambiguated)
    /// with their observed duration bounds, in first-seen order.
    pub atomic: IndexMap<String, ActionBounds>,
}

/// Single-pass, mergeable statistical accumulator.
///
/// `merge` must be associative: partial states accumulated by independent
/// workers over disjoint sub-streams fold into the same result as a single
/// instance fed the whole stream, within floating-point tolerance.
pub trait StreamingAlgorithm {
    /// Add one value in O(1) amortized time and O(1) additional memory.
    fn add(&mut self, value: f64) -> Result<()>;

    /// Fold another accumulator of the same concrete type into self.
    /// Incompatible configurations fail fast.
    fn merge(&mut self, other: &Self) -> Result<()>
    where
        Self: Sized;

    /// Current result, `None` while too few samples were observed.
    /// A pure read: callable at any time, never fabricates a value.
    fn result(&self) -> Option<f64>;
}

/// Verdict of one SLA criterion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlaResult {
    pub criterion: String,
    pub success: bool,
    pub detail: String,
}

/// A pass/fail rule evaluated incrementally over iterations.
pub trait Sla {
    /// Configuration key this criterion is registered under.
    fn name(&self) -> &'static str;

    /// Process one iteration and return the current verdict.
    fn add_iteration(&mut self, iteration: &Iteration) -> bool;

    /// Fold aggregated data from another criterion instance into self and
    /// return the combined verdict. Merging criteria of different concrete
    /// types fails fast.
    fn merge_box(&mut self, other: &dyn Sla) -> Result<bool>;

    /// Human-readable description of the current state.
    fn details(&self) -> String;

    /// Current verdict.
    fn success(&self) -> bool;

    fn status(&self) -> &'static str {
        if self.success() {
            "Passed"
        } else {
            "Failed"
        }
    }

    fn result(&self) -> SlaResult {
        SlaResult {
            criterion: self.name().to_string(),
            success: self.success(),
            detail: self.details(),
        }
    }

    /// Downcast support for `merge_box`.
    fn as_any(&self) -> &dyn Any;
}

/// Incremental aggregator producing renderable chart or table data.
///
/// `render` is a pure read of current state: callable at any time, including
/// before the first iteration, and idempotent between `add_iteration` calls.
pub trait Chart {
    fn add_iteration(&mut self, iteration: &Iteration) -> Result<()>;

    fn render(&self) -> ChartRender;
}

/// A named ordered series of `(order, value)` points.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Series {
    pub name: String,
    pub points: Vec<(f64, f64)>,
}

/// Table data: column names plus rows of cells.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableData {
    pub cols: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
}

/// A single rendered table cell.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CellValue {
    Text(String),
    Num(f64),
    Int(u64),
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::Text(value.to_string())
    }
}

/// One histogram series under a specific binning policy.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistogramSeries {
    pub key: String,
    pub view: String,
    pub disabled: Option<usize>,
    /// `(bin upper bound, count)` pairs.
    pub values: Vec<(f64, u64)>,
}

/// Rendered histogram chart: one data group per binning policy.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistogramRender {
    pub data: Vec<Vec<HistogramSeries>>,
    pub views: Vec<HistogramView>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistogramView {
    pub id: usize,
    pub name: String,
}

/// Scenario-output render envelope.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputRender {
    pub title: String,
    pub description: String,
    pub widget: String,
    pub data: Box<ChartRender>,
    pub label: String,
    pub axis_label: String,
}

/// Data ready for drawing, consumed by reporting collaborators as opaque
/// structured data.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ChartRender {
    Series(Vec<Series>),
    /// Name/value pairs (average charts); `None` renders as "no data".
    Pairs(Vec<(String, Option<f64>)>),
    Histogram(HistogramRender),
    Table(TableData),
    Output(OutputRender),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iteration_succeeded() {
        let ok = Iteration {
            timestamp: 1.0,
            duration: 2.0,
            idle_duration: 0.0,
            error: None,
            atomic_actions: vec![],
            output: IterationOutput::default(),
        };
        assert!(ok.succeeded());

        let failed = Iteration {
            error: Some(ErrorInfo::new("Timeout", "deadline exceeded")),
            ..ok.clone()
        };
        assert!(!failed.succeeded());
    }

    #[test]
    fn test_atomic_action_duration() {
        let action = AtomicAction {
            name: "create".to_string(),
            started_at: 10.0,
            finished_at: Some(12.5),
            children: vec![],
            failed: false,
        };
        assert_eq!(action.duration(), 2.5);

        let open = AtomicAction {
            finished_at: None,
            ..action
        };
        assert_eq!(open.duration(), 0.0);
    }

    #[test]
    fn test_iteration_round_trips_through_json() {
        let iteration = Iteration {
            timestamp: 1_700_000_000.0,
            duration: 1.25,
            idle_duration: 0.5,
            error: None,
            atomic_actions: vec![AtomicAction {
                name: "boot".to_string(),
                started_at: 1_700_000_000.0,
                finished_at: Some(1_700_000_001.0),
                children: vec![],
                failed: false,
            }],
            output: IterationOutput::default(),
        };
        let json = serde_json::to_string(&iteration).unwrap();
        let back: Iteration = serde_json::from_str(&json).unwrap();
        assert_eq!(back, iteration);
    }

    #[test]
    fn test_cell_value_serializes_untagged() {
        let row = vec![
            CellValue::from("total"),
            CellValue::Num(1.5),
            CellValue::Int(3),
        ];
        let json = serde_json::to_string(&row).unwrap();
        assert_eq!(json, r#"["total",1.5,3]"#);
    }
}
