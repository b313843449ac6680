// SLA Criteria Engine
// Service-level agreement criteria: pass/fail rules evaluated incrementally
// over iterations, mergeable across partial results computed by independent
// workers. Criteria are configured from schema-validated JSON values before
// any iteration is processed.

use anyhow::{anyhow, ensure, Result};
use serde::Deserialize;
use serde_json::Value;
use std::any::Any;

use indexmap::IndexMap;
use tracing::warn;

use crate::atomic::flatten_actions;
use crate::contracts::{Iteration, Sla, SlaResult, StreamingAlgorithm};
use crate::streaming::{MeanComputation, StdDevComputation};
use crate::types::ValidatedThreshold;
use crate::validation::{ensure_in_range, ValidationError};

type SlaConstructor = fn(&Value) -> Result<Box<dyn Sla>>;

/// Static criterion registry: configuration key to constructor. Built at
/// compile time so each criterion stays independently testable and there is
/// no mutable registration side effect.
pub const SLA_CRITERIA: &[(&str, SlaConstructor)] = &[
    (FailureRate::NAME, |config| {
        Ok(Box::new(FailureRate::from_config(config)?))
    }),
    (IterationTime::NAME, |config| {
        Ok(Box::new(IterationTime::from_config(config)?))
    }),
    (MaxAverageDuration::NAME, |config| {
        Ok(Box::new(MaxAverageDuration::from_config(config)?))
    }),
    (MaxAverageDurationPerAtomic::NAME, |config| {
        Ok(Box::new(MaxAverageDurationPerAtomic::from_config(config)?))
    }),
    (Outliers::NAME, |config| {
        Ok(Box::new(Outliers::from_config(config)?))
    }),
];

/// Look up a criterion constructor by its configuration key.
pub fn sla_by_name(name: &str) -> Option<SlaConstructor> {
    SLA_CRITERIA
        .iter()
        .find(|(key, _)| *key == name)
        .map(|(_, constructor)| *constructor)
}

fn warn_on_flip(name: &str, was_success: bool, success: bool) {
    if was_success && !success {
        warn!(criterion = name, "SLA criterion failed");
    }
}

fn feed(name: &'static str, algorithm: &mut impl StreamingAlgorithm, value: f64) {
    // The data contract promises finite durations; a producer that breaks it
    // gets its sample skipped loudly instead of poisoning the aggregate.
    if let Err(error) = algorithm.add(value) {
        warn!(criterion = name, error = %error, "skipping bad sample");
    }
}

/// Downcast `other` for a merge, failing fast on a concrete-type mismatch.
fn downcast_for_merge<'a, T: Sla + 'static>(this: &T, other: &'a dyn Sla) -> Result<&'a T> {
    other.as_any().downcast_ref::<T>().ok_or_else(|| {
        anyhow!(
            "Error merging SLAs of types {}, {}. Only SLAs of the same type could be merged.",
            this.name(),
            other.name()
        )
    })
}

/// Failure rate bounds, in percents.
#[derive(Debug)]
pub struct FailureRate {
    min_percent: f64,
    max_percent: f64,
    errors: u64,
    total: u64,
    error_rate: f64,
    success: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct FailureRateConfig {
    #[serde(default)]
    min: f64,
    #[serde(default = "FailureRateConfig::default_max")]
    max: f64,
}

impl FailureRateConfig {
    fn default_max() -> f64 {
        100.0
    }
}

impl FailureRate {
    pub const NAME: &'static str = "failure_rate";

    pub fn from_config(config: &Value) -> Result<Self> {
        let parsed: FailureRateConfig =
            serde_json::from_value(config.clone()).map_err(|err| {
                ValidationError::InvalidConfig {
                    criterion: Self::NAME.to_string(),
                    reason: err.to_string(),
                }
            })?;
        ensure_in_range("min", parsed.min, 0.0, 100.0)?;
        ensure_in_range("max", parsed.max, 0.0, 100.0)?;
        ensure!(
            parsed.min <= parsed.max,
            ValidationError::InvalidConfig {
                criterion: Self::NAME.to_string(),
                reason: format!("min ({}) exceeds max ({})", parsed.min, parsed.max),
            }
        );
        Ok(Self {
            min_percent: parsed.min,
            max_percent: parsed.max,
            errors: 0,
            total: 0,
            error_rate: 0.0,
            success: true,
        })
    }

    fn update(&mut self) -> bool {
        let was_success = self.success;
        if self.total > 0 {
            self.error_rate = self.errors as f64 * 100.0 / self.total as f64;
        }
        self.success = self.min_percent <= self.error_rate && self.error_rate <= self.max_percent;
        warn_on_flip(Self::NAME, was_success, self.success);
        self.success
    }
}

impl Sla for FailureRate {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn add_iteration(&mut self, iteration: &Iteration) -> bool {
        self.total += 1;
        if !iteration.succeeded() {
            self.errors += 1;
        }
        self.update()
    }

    fn merge_box(&mut self, other: &dyn Sla) -> Result<bool> {
        let other = downcast_for_merge(self, other)?;
        ensure!(
            self.min_percent == other.min_percent && self.max_percent == other.max_percent,
            "Error merging failure_rate criteria with different bounds"
        );
        self.errors += other.errors;
        self.total += other.total;
        Ok(self.update())
    }

    fn details(&self) -> String {
        format!(
            "Failure rate criteria {:.2}% <= {:.2}% <= {:.2}% - {}",
            self.min_percent,
            self.error_rate,
            self.max_percent,
            self.status()
        )
    }

    fn success(&self) -> bool {
        self.success
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Maximum time for one iteration, in seconds.
#[derive(Debug)]
pub struct IterationTime {
    criterion_value: ValidatedThreshold,
    max_iteration_time: f64,
    success: bool,
}

impl IterationTime {
    pub const NAME: &'static str = "max_seconds_per_iteration";

    pub fn from_config(config: &Value) -> Result<Self> {
        let seconds = config.as_f64().ok_or_else(|| ValidationError::InvalidConfig {
            criterion: Self::NAME.to_string(),
            reason: format!("expected a number, got {config}"),
        })?;
        Ok(Self {
            criterion_value: ValidatedThreshold::new(seconds)?,
            max_iteration_time: 0.0,
            success: true,
        })
    }

    fn update(&mut self) -> bool {
        let was_success = self.success;
        self.success = self.max_iteration_time <= self.criterion_value.get();
        warn_on_flip(Self::NAME, was_success, self.success);
        self.success
    }
}

impl Sla for IterationTime {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn add_iteration(&mut self, iteration: &Iteration) -> bool {
        if iteration.duration > self.max_iteration_time {
            self.max_iteration_time = iteration.duration;
        }
        self.update()
    }

    fn merge_box(&mut self, other: &dyn Sla) -> Result<bool> {
        let other = downcast_for_merge(self, other)?;
        ensure!(
            self.criterion_value == other.criterion_value,
            "Error merging max_seconds_per_iteration criteria with different thresholds"
        );
        if other.max_iteration_time > self.max_iteration_time {
            self.max_iteration_time = other.max_iteration_time;
        }
        Ok(self.update())
    }

    fn details(&self) -> String {
        format!(
            "Maximum seconds per iteration {:.2}s <= {:.2}s - {}",
            self.max_iteration_time,
            self.criterion_value.get(),
            self.status()
        )
    }

    fn success(&self) -> bool {
        self.success
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Maximum average duration of one iteration, in seconds. Failed iterations
/// are skipped, not counted.
#[derive(Debug)]
pub struct MaxAverageDuration {
    criterion_value: ValidatedThreshold,
    avg_comp: MeanComputation,
    success: bool,
}

impl MaxAverageDuration {
    pub const NAME: &'static str = "max_avg_duration";

    pub fn from_config(config: &Value) -> Result<Self> {
        let seconds = config.as_f64().ok_or_else(|| ValidationError::InvalidConfig {
            criterion: Self::NAME.to_string(),
            reason: format!("expected a number, got {config}"),
        })?;
        Ok(Self {
            criterion_value: ValidatedThreshold::new(seconds)?,
            avg_comp: MeanComputation::new(),
            success: true,
        })
    }

    fn update(&mut self) -> bool {
        let was_success = self.success;
        self.success = match self.avg_comp.result() {
            Some(avg) => avg <= self.criterion_value.get(),
            None => true,
        };
        warn_on_flip(Self::NAME, was_success, self.success);
        self.success
    }
}

impl Sla for MaxAverageDuration {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn add_iteration(&mut self, iteration: &Iteration) -> bool {
        if iteration.succeeded() {
            feed(Self::NAME, &mut self.avg_comp, iteration.duration);
        }
        self.update()
    }

    fn merge_box(&mut self, other: &dyn Sla) -> Result<bool> {
        let other = downcast_for_merge(self, other)?;
        ensure!(
            self.criterion_value == other.criterion_value,
            "Error merging max_avg_duration criteria with different thresholds"
        );
        self.avg_comp.merge(&other.avg_comp)?;
        Ok(self.update())
    }

    fn details(&self) -> String {
        format!(
            "Average duration of one iteration {:.2}s <= {:.2}s - {}",
            self.avg_comp.result().unwrap_or(0.0),
            self.criterion_value.get(),
            self.status()
        )
    }

    fn success(&self) -> bool {
        self.success
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Maximum average duration per named atomic action, in seconds.
#[derive(Debug)]
pub struct MaxAverageDurationPerAtomic {
    thresholds: IndexMap<String, f64>,
    avg_by_action: IndexMap<String, MeanComputation>,
    success: bool,
}

impl MaxAverageDurationPerAtomic {
    pub const NAME: &'static str = "max_avg_duration_per_atomic";

    pub fn from_config(config: &Value) -> Result<Self> {
        let object = config.as_object().ok_or_else(|| ValidationError::InvalidConfig {
            criterion: Self::NAME.to_string(),
            reason: format!("expected an object of action thresholds, got {config}"),
        })?;
        ensure!(
            !object.is_empty(),
            ValidationError::InvalidConfig {
                criterion: Self::NAME.to_string(),
                reason: "at least one action threshold is required".to_string(),
            }
        );
        let mut thresholds = IndexMap::new();
        for (name, threshold) in object {
            let seconds = threshold.as_f64().ok_or_else(|| ValidationError::InvalidConfig {
                criterion: Self::NAME.to_string(),
                reason: format!("threshold for '{name}' must be a number, got {threshold}"),
            })?;
            thresholds.insert(name.clone(), ValidatedThreshold::new(seconds)?.get());
        }
        Ok(Self {
            thresholds,
            avg_by_action: IndexMap::new(),
            success: true,
        })
    }

    fn update(&mut self) -> bool {
        let was_success = self.success;
        self.success = self.thresholds.iter().all(|(name, threshold)| {
            match self.avg_by_action.get(name).and_then(|avg| avg.result()) {
                Some(avg) => avg <= *threshold,
                None => true,
            }
        });
        warn_on_flip(Self::NAME, was_success, self.success);
        self.success
    }
}

impl Sla for MaxAverageDurationPerAtomic {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn add_iteration(&mut self, iteration: &Iteration) -> bool {
        if iteration.succeeded() {
            for (name, duration) in flatten_actions(&iteration.atomic_actions) {
                let avg = self.avg_by_action.entry(name).or_default();
                feed(Self::NAME, avg, duration);
            }
        }
        self.update()
    }

    /// Per-action means present on both sides are merged; action names seen
    /// by only one side are left unmerged, a known limitation of the
    /// partial-result protocol.
    fn merge_box(&mut self, other: &dyn Sla) -> Result<bool> {
        let other = downcast_for_merge(self, other)?;
        ensure!(
            self.thresholds == other.thresholds,
            "Error merging max_avg_duration_per_atomic criteria with different thresholds"
        );
        for (name, theirs) in &other.avg_by_action {
            if let Some(mine) = self.avg_by_action.get_mut(name) {
                mine.merge(theirs)?;
            }
        }
        Ok(self.update())
    }

    fn details(&self) -> String {
        let mut parts = Vec::with_capacity(self.thresholds.len());
        for (name, threshold) in &self.thresholds {
            let avg = self
                .avg_by_action
                .get(name)
                .and_then(|computation| computation.result())
                .unwrap_or(0.0);
            parts.push(format!("{name} {avg:.2}s <= {threshold:.2}s"));
        }
        format!(
            "Average duration of atomic actions: {} - {}",
            parts.join(", "),
            self.status()
        )
    }

    fn success(&self) -> bool {
        self.success
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Limit on the number of outliers: iterations whose duration exceeds
/// `mean + sigmas * stddev` of all prior successful iterations.
///
/// Only the running mean/stddev are kept, so each iteration is classified
/// against the threshold as of the time it was added, not the final
/// threshold. This is an intentional memory/accuracy trade-off inherited by
/// `merge`; do not "fix" it, the frozen-threshold verdicts are the contract.
#[derive(Debug)]
pub struct Outliers {
    max_outliers: u64,
    min_iterations: u64,
    sigmas: f64,
    iterations: u64,
    outliers: u64,
    threshold: Option<f64>,
    mean_comp: MeanComputation,
    std_comp: StdDevComputation,
    success: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct OutliersConfig {
    #[serde(default)]
    max: u64,
    #[serde(default = "OutliersConfig::default_min_iterations")]
    min_iterations: u64,
    #[serde(default = "OutliersConfig::default_sigmas")]
    sigmas: f64,
}

impl OutliersConfig {
    fn default_min_iterations() -> u64 {
        3
    }

    fn default_sigmas() -> f64 {
        3.0
    }
}

impl Outliers {
    pub const NAME: &'static str = "outliers";

    pub fn from_config(config: &Value) -> Result<Self> {
        let parsed: OutliersConfig =
            serde_json::from_value(config.clone()).map_err(|err| {
                ValidationError::InvalidConfig {
                    criterion: Self::NAME.to_string(),
                    reason: err.to_string(),
                }
            })?;
        ensure!(
            parsed.min_iterations >= 3,
            ValidationError::InvalidConfig {
                criterion: Self::NAME.to_string(),
                reason: format!(
                    "min_iterations must be at least 3, got {}",
                    parsed.min_iterations
                ),
            }
        );
        ensure!(
            parsed.sigmas.is_finite() && parsed.sigmas > 0.0,
            ValidationError::InvalidConfig {
                criterion: Self::NAME.to_string(),
                reason: format!("sigmas must be positive, got {}", parsed.sigmas),
            }
        );
        Ok(Self {
            max_outliers: parsed.max,
            min_iterations: parsed.min_iterations,
            sigmas: parsed.sigmas,
            iterations: 0,
            outliers: 0,
            threshold: None,
            mean_comp: MeanComputation::new(),
            std_comp: StdDevComputation::new(),
            success: true,
        })
    }

    fn refresh_threshold(&mut self) {
        if self.iterations >= 2 {
            if let (Some(mean), Some(std)) = (self.mean_comp.result(), self.std_comp.result()) {
                self.threshold = Some(mean + self.sigmas * std);
            }
        }
    }

    fn update(&mut self) -> bool {
        let was_success = self.success;
        self.success = self.outliers <= self.max_outliers;
        warn_on_flip(Self::NAME, was_success, self.success);
        self.success
    }
}

impl Sla for Outliers {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn add_iteration(&mut self, iteration: &Iteration) -> bool {
        if iteration.succeeded() {
            let duration = iteration.duration;
            self.iterations += 1;

            // Classify against the threshold as of now, then update it.
            if self.iterations >= self.min_iterations
                && self.threshold.is_some_and(|threshold| duration > threshold)
            {
                self.outliers += 1;
            }

            feed(Self::NAME, &mut self.mean_comp, duration);
            feed(Self::NAME, &mut self.std_comp, duration);
            self.refresh_threshold();
        }
        self.update()
    }

    fn merge_box(&mut self, other: &dyn Sla) -> Result<bool> {
        let other = downcast_for_merge(self, other)?;
        ensure!(
            self.max_outliers == other.max_outliers
                && self.min_iterations == other.min_iterations
                && self.sigmas == other.sigmas,
            "Error merging outliers criteria with different configurations"
        );
        self.iterations += other.iterations;
        self.outliers += other.outliers;
        self.mean_comp.merge(&other.mean_comp)?;
        self.std_comp.merge(&other.std_comp)?;
        self.refresh_threshold();
        Ok(self.update())
    }

    fn details(&self) -> String {
        format!(
            "Maximum number of outliers {} <= {} - {}",
            self.outliers,
            self.max_outliers,
            self.status()
        )
    }

    fn success(&self) -> bool {
        self.success
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Drives every configured criterion over the iteration stream and folds
/// partial checkers computed by independent workers into one verdict set.
pub struct SlaChecker {
    config: Value,
    criteria: Vec<Box<dyn Sla>>,
    unexpected_failure: Option<String>,
    aborted_on_sla: bool,
    aborted_manually: bool,
}

impl SlaChecker {
    /// Build criteria from the `"sla"` object of a task configuration.
    /// Unknown criterion names and schema-invalid values are rejected here,
    /// before any iteration is processed.
    pub fn new(config: &Value) -> Result<Self> {
        let sla_config = config.get("sla").cloned().unwrap_or_else(|| Value::Object(Default::default()));
        let entries = sla_config
            .as_object()
            .ok_or_else(|| ValidationError::InvalidInput {
                field: "sla".to_string(),
                reason: format!("expected an object, got {sla_config}"),
            })?
            .clone();

        let mut criteria: Vec<Box<dyn Sla>> = Vec::with_capacity(entries.len());
        for (name, criterion_value) in &entries {
            let constructor = sla_by_name(name).ok_or_else(|| ValidationError::UnknownCriterion {
                name: name.clone(),
            })?;
            criteria.push(constructor(criterion_value)?);
        }
        Ok(Self {
            config: sla_config,
            criteria,
            unexpected_failure: None,
            aborted_on_sla: false,
            aborted_manually: false,
        })
    }

    /// Feed one iteration to every criterion; true iff all checks pass.
    pub fn add_iteration(&mut self, iteration: &Iteration) -> bool {
        let mut all_passed = true;
        for sla in &mut self.criteria {
            all_passed &= sla.add_iteration(iteration);
        }
        all_passed
    }

    /// Fold another checker computed over a disjoint sub-stream into self.
    /// Only checkers built from the same configuration can be merged.
    pub fn merge(&mut self, other: &SlaChecker) -> Result<bool> {
        ensure!(
            self.config == other.config,
            "Error merging SLACheckers with configs {}, {}. \
             Only SLACheckers with the same config could be merged.",
            self.config,
            other.config
        );
        ensure!(
            self.criteria.len() == other.criteria.len(),
            "Error merging SLACheckers with different criteria sets"
        );
        let mut all_passed = true;
        for (mine, theirs) in self.criteria.iter_mut().zip(&other.criteria) {
            all_passed &= mine.merge_box(theirs.as_ref())?;
        }
        Ok(all_passed)
    }

    /// The verdict of every criterion, plus synthetic entries for abort and
    /// unexpected-failure conditions raised by the runner.
    pub fn results(&self) -> Vec<SlaResult> {
        let mut results: Vec<SlaResult> = self.criteria.iter().map(|sla| sla.result()).collect();
        if self.aborted_on_sla {
            results.push(SlaResult {
                criterion: "aborted_on_sla".to_string(),
                success: false,
                detail: "Task was aborted due to SLA failure(s).".to_string(),
            });
        }
        if self.aborted_manually {
            results.push(SlaResult {
                criterion: "aborted_manually".to_string(),
                success: false,
                detail: "Task was aborted due to abort signal.".to_string(),
            });
        }
        if let Some(failure) = &self.unexpected_failure {
            results.push(SlaResult {
                criterion: "something_went_wrong".to_string(),
                success: false,
                detail: format!("Unexpected error: {failure}"),
            });
        }
        results
    }

    pub fn criteria(&self) -> &[Box<dyn Sla>] {
        &self.criteria
    }

    pub fn set_aborted_on_sla(&mut self) {
        self.aborted_on_sla = true;
    }

    pub fn set_aborted_manually(&mut self) {
        self.aborted_manually = true;
    }

    pub fn set_unexpected_failure(&mut self, error: &anyhow::Error) {
        self.unexpected_failure = Some(error.to_string());
    }
}

impl std::fmt::Debug for SlaChecker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlaChecker")
            .field("config", &self.config)
            .field("criteria", &self.criteria.len())
            .field("aborted_on_sla", &self.aborted_on_sla)
            .field("aborted_manually", &self.aborted_manually)
            .field("unexpected_failure", &self.unexpected_failure)
            .finish()
    }
}
