// Chart and Table Aggregators
// Streaming consumers of the iteration stream that produce renderable series
// and tables for reports. Time-series charts bound their memory with one
// GraphZipper per series; aggregate charts and tables are built from the
// streaming algorithm family.

use anyhow::{bail, ensure, Result};
use indexmap::IndexMap;

use crate::atomic::flatten_actions;
use crate::contracts::{
    CellValue, Chart, ChartRender, HistogramRender, HistogramSeries, HistogramView, Iteration,
    OutputData, OutputItem, OutputRender, Series, TableData, WorkloadSummary,
};
use crate::contracts::StreamingAlgorithm;
use crate::streaming::{
    IncrementComputation, MaxComputation, MeanComputation, MinComputation, PercentileComputation,
};
use crate::zipper::GraphZipper;

/// Default maximum number of points per rendered series.
pub const DEFAULT_ZIPPED_SIZE: usize = 1000;

/// Missing samples in chart series are deliberately coerced to 0 so that all
/// series stay aligned to the same iteration index. This is a per-chart
/// choice, not a blanket fallback: the streaming algorithms themselves
/// reject non-finite input.
fn or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

/// Top-level atomic action durations with every action known to the workload
/// present, defaulted to 0. Actions can be absent from an iteration when an
/// earlier failure prevented them from running.
fn fix_atomic_actions(summary: &WorkloadSummary, iteration: &Iteration) -> Vec<(String, f64)> {
    let mut durations: IndexMap<String, f64> =
        flatten_actions(&iteration.atomic_actions).into_iter().collect();
    for name in summary.atomic.keys() {
        durations.entry(name.clone()).or_insert(0.0);
    }
    durations.into_iter().collect()
}

/// One GraphZipper per named series, all sized for the same stream length.
#[derive(Debug)]
struct SeriesZippers {
    base_size: usize,
    zipped_size: usize,
    data: IndexMap<String, GraphZipper>,
}

impl SeriesZippers {
    fn new(base_size: usize, zipped_size: usize) -> Self {
        Self {
            base_size,
            zipped_size,
            data: IndexMap::new(),
        }
    }

    fn add(&mut self, name: &str, value: f64) -> Result<()> {
        if !self.data.contains_key(name) {
            self.data.insert(
                name.to_string(),
                GraphZipper::new(self.base_size, self.zipped_size)?,
            );
        }
        if let Some(zipper) = self.data.get_mut(name) {
            zipper.add_point(or_zero(value))?;
        }
        Ok(())
    }

    fn render(&self) -> ChartRender {
        ChartRender::Series(
            self.data
                .iter()
                .map(|(name, zipper)| Series {
                    name: name.clone(),
                    points: zipper
                        .get_zipped_graph()
                        .iter()
                        .map(|(order, value)| (*order as f64, *value))
                        .collect(),
                })
                .collect(),
        )
    }
}

/// Stacked area of total, idle and (when the run has failures) failed
/// duration per iteration.
#[derive(Debug)]
pub struct MainStackedAreaChart {
    summary: WorkloadSummary,
    series: SeriesZippers,
}

impl MainStackedAreaChart {
    pub fn new(summary: &WorkloadSummary) -> Self {
        Self::new_sized(summary, DEFAULT_ZIPPED_SIZE)
    }

    pub fn new_sized(summary: &WorkloadSummary, zipped_size: usize) -> Self {
        Self {
            summary: summary.clone(),
            series: SeriesZippers::new(summary.iterations_count, zipped_size),
        }
    }
}

impl Chart for MainStackedAreaChart {
    fn add_iteration(&mut self, iteration: &Iteration) -> Result<()> {
        let has_failures = self.summary.iterations_failed > 0;
        if iteration.succeeded() {
            self.series.add("duration", iteration.duration)?;
            self.series.add("idle_duration", iteration.idle_duration)?;
            if has_failures {
                self.series.add("failed_duration", 0.0)?;
            }
        } else {
            // A failed iteration's duration is not useful work.
            self.series.add("duration", 0.0)?;
            self.series.add("idle_duration", 0.0)?;
            if has_failures {
                self.series
                    .add("failed_duration", iteration.duration + iteration.idle_duration)?;
            }
        }
        Ok(())
    }

    fn render(&self) -> ChartRender {
        self.series.render()
    }
}

/// Stacked area of per-atomic-action durations per iteration.
#[derive(Debug)]
pub struct AtomicStackedAreaChart {
    summary: WorkloadSummary,
    series: SeriesZippers,
}

impl AtomicStackedAreaChart {
    pub fn new(summary: &WorkloadSummary) -> Self {
        Self::new_sized(summary, DEFAULT_ZIPPED_SIZE)
    }

    pub fn new_sized(summary: &WorkloadSummary, zipped_size: usize) -> Self {
        Self {
            summary: summary.clone(),
            series: SeriesZippers::new(summary.iterations_count, zipped_size),
        }
    }
}

impl Chart for AtomicStackedAreaChart {
    fn add_iteration(&mut self, iteration: &Iteration) -> Result<()> {
        let actions = fix_atomic_actions(&self.summary, iteration);
        let actions_total: f64 = actions.iter().map(|(_, duration)| or_zero(*duration)).sum();
        for (name, duration) in &actions {
            self.series.add(name, *duration)?;
        }
        if self.summary.iterations_failed > 0 {
            let failed_duration = if iteration.succeeded() {
                0.0
            } else {
                iteration.duration + iteration.idle_duration - actions_total
            };
            self.series.add("failed_duration", failed_duration)?;
        }
        Ok(())
    }

    fn render(&self) -> ChartRender {
        self.series.render()
    }
}

/// Average duration per atomic action across the whole run.
#[derive(Debug, Default)]
pub struct AtomicAvgChart {
    summary: WorkloadSummary,
    data: IndexMap<String, MeanComputation>,
}

impl AtomicAvgChart {
    pub fn new(summary: &WorkloadSummary) -> Self {
        Self {
            summary: summary.clone(),
            data: IndexMap::new(),
        }
    }
}

impl Chart for AtomicAvgChart {
    fn add_iteration(&mut self, iteration: &Iteration) -> Result<()> {
        for (name, duration) in fix_atomic_actions(&self.summary, iteration) {
            let avg = self.data.entry(name).or_default();
            avg.add(or_zero(duration))?;
        }
        Ok(())
    }

    fn render(&self) -> ChartRender {
        ChartRender::Pairs(
            self.data
                .iter()
                .map(|(name, avg)| (name.clone(), avg.result()))
                .collect(),
        )
    }
}

/// Bin layout for one histogram view.
#[derive(Debug, Clone)]
struct HistogramBins {
    view: &'static str,
    x: Vec<f64>,
    y: Vec<u64>,
}

/// Three simultaneous binning policies over the observed duration range.
fn init_views(base_size: usize, min_value: Option<f64>, max_value: Option<f64>) -> Vec<HistogramBins> {
    if base_size == 0 {
        return Vec::new();
    }
    let min_value = min_value.unwrap_or(0.0);
    let max_value = max_value.unwrap_or(0.0);
    let policies: [(&'static str, usize); 3] = [
        ("Square Root Choice", (base_size as f64).sqrt().ceil() as usize),
        ("Sturges Formula", ((base_size as f64).log2() + 1.0).ceil() as usize),
        ("Rice Rule", (2.0 * (base_size as f64).cbrt()).ceil() as usize),
    ];
    policies
        .iter()
        .map(|&(view, bins)| {
            let bin_width = (max_value - min_value) / bins as f64;
            let x: Vec<f64> = (1..=bins).map(|i| min_value + bin_width * i as f64).collect();
            let y = vec![0; x.len()];
            HistogramBins { view, x, y }
        })
        .collect()
}

#[derive(Debug)]
struct HistogramEntry {
    views: Vec<HistogramBins>,
    disabled: Option<usize>,
}

impl HistogramEntry {
    fn count(&mut self, value: f64) {
        let value = or_zero(value);
        for view in &mut self.views {
            for (bin, upper_bound) in view.x.iter().enumerate() {
                if value <= *upper_bound {
                    view.y[bin] += 1;
                    break;
                }
            }
        }
    }
}

fn render_histograms(entries: &IndexMap<String, HistogramEntry>) -> ChartRender {
    let mut data: Vec<Vec<HistogramSeries>> = Vec::new();
    for (name, entry) in entries {
        for (index, view) in entry.views.iter().enumerate() {
            let series = HistogramSeries {
                key: name.clone(),
                view: view.view.to_string(),
                disabled: entry.disabled,
                values: view.x.iter().copied().zip(view.y.iter().copied()).collect(),
            };
            if index < data.len() {
                data[index].push(series);
            } else {
                data.push(vec![series]);
            }
        }
    }
    let views = data
        .iter()
        .enumerate()
        .filter_map(|(id, group)| {
            group.first().map(|series| HistogramView {
                id,
                name: series.view.clone(),
            })
        })
        .collect();
    ChartRender::Histogram(HistogramRender { data, views })
}

/// Histogram of successful-iteration durations.
#[derive(Debug)]
pub struct MainHistogramChart {
    entries: IndexMap<String, HistogramEntry>,
}

impl MainHistogramChart {
    pub fn new(summary: &WorkloadSummary) -> Self {
        let mut entries = IndexMap::new();
        entries.insert(
            "task".to_string(),
            HistogramEntry {
                views: init_views(
                    summary.iterations_count,
                    summary.min_duration,
                    summary.max_duration,
                ),
                disabled: None,
            },
        );
        Self { entries }
    }
}

impl Chart for MainHistogramChart {
    fn add_iteration(&mut self, iteration: &Iteration) -> Result<()> {
        let value = if iteration.succeeded() {
            iteration.duration
        } else {
            0.0
        };
        if let Some(entry) = self.entries.get_mut("task") {
            entry.count(value);
        }
        Ok(())
    }

    fn render(&self) -> ChartRender {
        render_histograms(&self.entries)
    }
}

/// One histogram per atomic action, bounded by each action's observed range.
#[derive(Debug)]
pub struct AtomicHistogramChart {
    summary: WorkloadSummary,
    entries: IndexMap<String, HistogramEntry>,
}

impl AtomicHistogramChart {
    pub fn new(summary: &WorkloadSummary) -> Self {
        let mut entries = IndexMap::new();
        for (index, (name, bounds)) in summary.atomic.iter().enumerate() {
            entries.insert(
                name.clone(),
                HistogramEntry {
                    views: init_views(
                        summary.iterations_count,
                        bounds.min_duration,
                        bounds.max_duration,
                    ),
                    disabled: Some(index),
                },
            );
        }
        Self {
            summary: summary.clone(),
            entries,
        }
    }
}

impl Chart for AtomicHistogramChart {
    fn add_iteration(&mut self, iteration: &Iteration) -> Result<()> {
        for (name, duration) in fix_atomic_actions(&self.summary, iteration) {
            match self.entries.get_mut(&name) {
                Some(entry) => entry.count(duration),
                None => bail!("Unexpected histogram name: {name}"),
            }
        }
        Ok(())
    }

    fn render(&self) -> ChartRender {
        render_histograms(&self.entries)
    }
}

/// One summary-table row built from the streaming family.
#[derive(Debug)]
struct StatsRow {
    min: MinComputation,
    median: PercentileComputation,
    p90: PercentileComputation,
    p95: PercentileComputation,
    max: MaxComputation,
    avg: MeanComputation,
    success_rate: MeanComputation,
    count: IncrementComputation,
}

impl StatsRow {
    fn new(iterations_count: usize) -> Result<Self> {
        Ok(Self {
            min: MinComputation::new(),
            median: PercentileComputation::new(0.5, iterations_count)?,
            p90: PercentileComputation::new(0.9, iterations_count)?,
            p95: PercentileComputation::new(0.95, iterations_count)?,
            max: MaxComputation::new(),
            avg: MeanComputation::new(),
            success_rate: MeanComputation::new(),
            count: IncrementComputation::new(),
        })
    }

    fn add_success(&mut self, value: f64) -> Result<()> {
        let value = or_zero(value);
        self.count.increment();
        self.success_rate.add(1.0)?;
        self.min.add(value)?;
        self.median.add(value)?;
        self.p90.add(value)?;
        self.p95.add(value)?;
        self.max.add(value)?;
        self.avg.add(value)?;
        Ok(())
    }

    fn add_failure(&mut self) -> Result<()> {
        self.count.increment();
        self.success_rate.add(0.0)
    }

    fn cells(&self, name: &str, with_success: bool) -> Vec<CellValue> {
        // A row that never saw a successful sample renders "n/a", never a
        // fabricated zero.
        let has_result = self.min.result().is_some();
        let stat = |result: Option<f64>| match (has_result, result) {
            (true, Some(value)) => CellValue::Num(round3(value)),
            _ => CellValue::from("n/a"),
        };
        let mut row = vec![
            CellValue::from(name),
            stat(self.min.result()),
            stat(self.median.result()),
            stat(self.p90.result()),
            stat(self.p95.result()),
            stat(self.max.result()),
            stat(self.avg.result()),
        ];
        if with_success {
            row.push(match (has_result, self.success_rate.result()) {
                (true, Some(rate)) => CellValue::Text(format!("{:.1}%", rate * 100.0)),
                _ => CellValue::from("n/a"),
            });
        }
        row.push(CellValue::Int(self.count.count()));
        row
    }
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

/// Min/percentile/max/avg/success/count per atomic action and for the whole
/// iteration (`total` row).
#[derive(Debug)]
pub struct MainStatsTable {
    iterations_count: usize,
    rows: IndexMap<String, StatsRow>,
}

impl MainStatsTable {
    pub const COLUMNS: [&'static str; 9] = [
        "Action",
        "Min (sec)",
        "Median (sec)",
        "90%ile (sec)",
        "95%ile (sec)",
        "Max (sec)",
        "Avg (sec)",
        "Success",
        "Count",
    ];

    pub fn new(summary: &WorkloadSummary) -> Result<Self> {
        let mut rows = IndexMap::new();
        for name in summary.atomic.keys() {
            rows.insert(name.clone(), StatsRow::new(summary.iterations_count)?);
        }
        rows.insert("total".to_string(), StatsRow::new(summary.iterations_count)?);
        Ok(Self {
            iterations_count: summary.iterations_count,
            rows,
        })
    }
}

impl Chart for MainStatsTable {
    fn add_iteration(&mut self, iteration: &Iteration) -> Result<()> {
        let mut values = flatten_actions(&iteration.atomic_actions);
        values.push(("total".to_string(), iteration.duration));
        for (name, value) in values {
            if !self.rows.contains_key(&name) {
                self.rows
                    .insert(name.clone(), StatsRow::new(self.iterations_count)?);
            }
            if let Some(row) = self.rows.get_mut(&name) {
                if iteration.succeeded() {
                    row.add_success(value)?;
                } else {
                    row.add_failure()?;
                }
            }
        }
        Ok(())
    }

    fn render(&self) -> ChartRender {
        ChartRender::Table(TableData {
            cols: Self::COLUMNS.iter().map(|col| col.to_string()).collect(),
            rows: self
                .rows
                .iter()
                .map(|(name, row)| row.cells(name, true))
                .collect(),
        })
    }
}

/// Number of iterations running in parallel over the load phase, on a fixed
/// time axis with fractional attribution at the edge buckets.
#[derive(Debug)]
pub struct LoadProfileChart {
    name: String,
    tstamp_start: f64,
    step: f64,
    time_axis: Vec<f64>,
    running: Vec<f64>,
}

impl LoadProfileChart {
    pub fn new(summary: &WorkloadSummary) -> Result<Self> {
        Self::with_scale(summary, "parallel iterations", 100)
    }

    pub fn with_scale(summary: &WorkloadSummary, name: &str, scale: usize) -> Result<Self> {
        ensure!(scale > 0, "Load profile scale must be positive");
        // Two extra steps past the end so the profile settles back to zero.
        let duration = summary.load_duration * (1.0 + 2.0 / scale as f64);
        let step = duration / scale as f64;
        let mut time_axis: Vec<f64> = (0..scale)
            .map(|index| step * index as f64)
            .filter(|tick| *tick < duration)
            .collect();
        time_axis.push(duration);
        let running = vec![0.0; time_axis.len()];
        Ok(Self {
            name: name.to_string(),
            tstamp_start: summary.tstamp_start,
            step,
            time_axis,
            running,
        })
    }
}

impl Chart for LoadProfileChart {
    fn add_iteration(&mut self, iteration: &Iteration) -> Result<()> {
        if self.step <= 0.0 {
            return Ok(());
        }
        let ts_start = iteration.timestamp - self.tstamp_start;
        let ts_end = ts_start + iteration.duration;
        let started_idx = self.time_axis.partition_point(|tick| *tick <= ts_start);
        let mut ended_idx = self.time_axis.partition_point(|tick| *tick <= ts_end);
        if ended_idx > 0 && self.time_axis[ended_idx - 1] == ts_end {
            ended_idx -= 1;
        }
        // Float drift can push a timestamp past the padded axis.
        let started_idx = started_idx.min(self.time_axis.len() - 1);
        let ended_idx = ended_idx.min(self.time_axis.len() - 1);

        for index in (started_idx + 1)..ended_idx {
            self.running[index] += 1.0;
        }
        if started_idx == ended_idx {
            self.running[ended_idx] += iteration.duration / self.step;
        } else {
            self.running[started_idx] += (self.time_axis[started_idx] - ts_start) / self.step;
            self.running[ended_idx] += (ts_end - self.time_axis[ended_idx - 1]) / self.step;
        }
        Ok(())
    }

    fn render(&self) -> ChartRender {
        ChartRender::Series(vec![Series {
            name: self.name.clone(),
            points: self
                .time_axis
                .iter()
                .copied()
                .zip(self.running.iter().copied())
                .collect(),
        }])
    }
}

/// Presentation metadata shared by scenario-output charts.
#[derive(Debug, Clone, Default)]
pub struct OutputMeta {
    pub title: String,
    pub description: String,
    pub label: String,
    pub axis_label: String,
}

impl OutputMeta {
    pub fn from_item(item: &OutputItem) -> Self {
        Self {
            title: item.title.clone(),
            description: item.description.clone(),
            label: item.label.clone(),
            axis_label: item.axis_label.clone(),
        }
    }

    fn render(&self, widget: &str, data: ChartRender) -> ChartRender {
        ChartRender::Output(OutputRender {
            title: self.title.clone(),
            description: self.description.clone(),
            widget: widget.to_string(),
            data: Box::new(data),
            label: self.label.clone(),
            axis_label: self.axis_label.clone(),
        })
    }
}

/// Additive scenario output as a stacked area bound to iteration number.
/// Degrades to a table when the run had a single iteration.
#[derive(Debug)]
pub struct OutputStackedAreaChart {
    meta: OutputMeta,
    series: SeriesZippers,
}

impl OutputStackedAreaChart {
    pub fn new(summary: &WorkloadSummary, meta: OutputMeta) -> Self {
        Self::new_sized(summary, meta, DEFAULT_ZIPPED_SIZE)
    }

    pub fn new_sized(summary: &WorkloadSummary, meta: OutputMeta, zipped_size: usize) -> Self {
        Self {
            meta,
            series: SeriesZippers::new(summary.iterations_count, zipped_size),
        }
    }

    /// Feed one iteration's additive `(name, value)` pairs.
    pub fn add_data(&mut self, data: &[(String, f64)]) -> Result<()> {
        for (name, value) in data {
            self.series.add(name, *value)?;
        }
        Ok(())
    }

    pub fn render(&self) -> ChartRender {
        if let ChartRender::Series(series) = self.series.render() {
            if series.iter().all(|entry| entry.points.len() == 1) && !series.is_empty() {
                // One iteration makes a degenerate area; show a table instead.
                let label = if self.meta.label.is_empty() {
                    "Value".to_string()
                } else {
                    self.meta.label.clone()
                };
                let rows = series
                    .iter()
                    .map(|entry| {
                        vec![
                            CellValue::Text(entry.name.clone()),
                            CellValue::Num(entry.points[0].1),
                        ]
                    })
                    .collect();
                return self.meta.render(
                    "Table",
                    ChartRender::Table(TableData {
                        cols: vec!["Name".to_string(), label],
                        rows,
                    }),
                );
            }
            return self.meta.render("StackedArea", ChartRender::Series(series));
        }
        self.meta.render("StackedArea", self.series.render())
    }
}

/// Additive scenario output averaged across iterations, rendered as a pie.
#[derive(Debug)]
pub struct OutputAvgChart {
    meta: OutputMeta,
    data: IndexMap<String, MeanComputation>,
}

impl OutputAvgChart {
    pub fn new(meta: OutputMeta) -> Self {
        Self {
            meta,
            data: IndexMap::new(),
        }
    }

    pub fn add_data(&mut self, data: &[(String, f64)]) -> Result<()> {
        for (name, value) in data {
            let avg = self.data.entry(name.clone()).or_default();
            avg.add(or_zero(*value))?;
        }
        Ok(())
    }

    pub fn render(&self) -> ChartRender {
        self.meta.render(
            "Pie",
            ChartRender::Pairs(
                self.data
                    .iter()
                    .map(|(name, avg)| (name.clone(), avg.result()))
                    .collect(),
            ),
        )
    }
}

/// Statistics table over additive scenario output values.
#[derive(Debug)]
pub struct OutputStatsTable {
    meta: OutputMeta,
    iterations_count: usize,
    rows: IndexMap<String, StatsRow>,
}

impl OutputStatsTable {
    pub const COLUMNS: [&'static str; 8] = [
        "Action",
        "Min (sec)",
        "Median (sec)",
        "90%ile (sec)",
        "95%ile (sec)",
        "Max (sec)",
        "Avg (sec)",
        "Count",
    ];

    pub fn new(summary: &WorkloadSummary, meta: OutputMeta) -> Self {
        Self {
            meta,
            iterations_count: summary.iterations_count,
            rows: IndexMap::new(),
        }
    }

    pub fn add_data(&mut self, data: &[(String, f64)]) -> Result<()> {
        for (name, value) in data {
            if !self.rows.contains_key(name) {
                self.rows
                    .insert(name.clone(), StatsRow::new(self.iterations_count)?);
            }
            if let Some(row) = self.rows.get_mut(name) {
                row.add_success(*value)?;
            }
        }
        Ok(())
    }

    pub fn render(&self) -> ChartRender {
        self.meta.render(
            "Table",
            ChartRender::Table(TableData {
                cols: Self::COLUMNS.iter().map(|col| col.to_string()).collect(),
                rows: self
                    .rows
                    .iter()
                    .map(|(name, row)| row.cells(name, false))
                    .collect(),
            }),
        )
    }
}

/// Scenario output kind at the configuration boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    Additive,
    Complete,
}

/// Check a scenario output item before it reaches any chart. Failures here
/// are configuration errors, surfaced at setup time.
pub fn validate_output(kind: OutputKind, item: &OutputItem) -> Result<()> {
    ensure!(!item.title.is_empty(), "Output item is missing a title");
    ensure!(
        !item.chart_plugin.is_empty(),
        "Output item '{}' is missing a chart plugin",
        item.title
    );
    match (kind, &item.data) {
        (OutputKind::Additive, OutputData::Additive(_)) => Ok(()),
        (OutputKind::Complete, OutputData::Complete(_)) => Ok(()),
        (OutputKind::Additive, OutputData::Complete(_)) => bail!(
            "additive output item '{}' carries complete data",
            item.title
        ),
        (OutputKind::Complete, OutputData::Additive(_)) => bail!(
            "complete output item '{}' carries additive data",
            item.title
        ),
    }
}
