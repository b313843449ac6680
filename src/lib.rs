// loadstats - Streaming Statistics and SLA Evaluation for Load Testing
// Root library module

pub mod atomic;
pub mod builders;
pub mod charts;
pub mod contracts;
pub mod observability;
pub mod sla;
pub mod streaming;
pub mod types;
pub mod validation;
pub mod zipper;

// Re-export the data model and capability traits
pub use contracts::{
    ActionBounds, AtomicAction, CellValue, Chart, ChartRender, ErrorInfo, HistogramRender,
    HistogramSeries, HistogramView, Iteration, IterationOutput, OutputData, OutputItem,
    OutputRender, Series, Sla, SlaResult, StreamingAlgorithm, TableData, WorkloadSummary,
};

// Re-export the streaming algorithm family
pub use streaming::{
    DegradationComputation, IncrementComputation, MaxComputation, MeanComputation, MinComputation,
    PercentileComputation, StdDevComputation,
};

// Re-export time-series compression
pub use zipper::GraphZipper;

// Re-export atomic action timing and aggregation
pub use atomic::{
    flatten_actions, mark_last_failed, merge_atomic_actions, merge_atomic_actions_to_depth,
    ActionTimer, MergedAction, DEFAULT_MERGE_DEPTH,
};

// Re-export the SLA criteria engine
pub use sla::{
    sla_by_name, FailureRate, IterationTime, MaxAverageDuration, MaxAverageDurationPerAtomic,
    Outliers, SlaChecker, SLA_CRITERIA,
};

// Re-export charts and tables
pub use charts::{
    validate_output, AtomicAvgChart, AtomicHistogramChart, AtomicStackedAreaChart,
    LoadProfileChart, MainHistogramChart, MainStackedAreaChart, MainStatsTable, OutputAvgChart,
    OutputKind, OutputMeta, OutputStackedAreaChart, OutputStatsTable, DEFAULT_ZIPPED_SIZE,
};

// Re-export validated types and builders
pub use builders::{IterationBuilder, WorkloadSummaryBuilder};
pub use types::{ValidatedPercentile, ValidatedThreshold};
pub use validation::ValidationError;

// Re-export observability bootstrap
pub use observability::{init_logging, init_logging_with_level};
