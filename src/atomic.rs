// Atomic Action Timer - Hierarchical Interval Timing
// Builds the per-iteration tree of named timed spans, including spans nested
// inside other spans, and owns the tree until it is handed off immutably to
// the reporting layer.

use anyhow::{bail, Result};
use chrono::Utc;
use indexmap::IndexMap;
use tracing::debug;

use crate::contracts::AtomicAction;

fn now_epoch_secs() -> f64 {
    let now = Utc::now();
    now.timestamp() as f64 + f64::from(now.timestamp_subsec_micros()) / 1e6
}

/// Measures named sections of one workload iteration.
///
/// Entering a section opens a span; leaving it closes the span and attaches
/// it to the innermost still-open section, which yields the `children`
/// nesting. The raw tree keeps repeated sibling names as-is; disambiguation
/// for aggregated reporting happens in [`flatten_actions`].
#[derive(Debug, Default)]
pub struct ActionTimer {
    actions: Vec<AtomicAction>,
}

impl ActionTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a span named `name`, nested under the deepest open span.
    pub fn start_action(&mut self, name: &str) {
        self.start_action_at(name, now_epoch_secs());
    }

    /// Open a span with an explicit start timestamp (seconds since epoch).
    pub fn start_action_at(&mut self, name: &str, started_at: f64) {
        debug!(action = name, "starting atomic action");
        let parent = open_slot(&mut self.actions);
        parent.push(AtomicAction {
            name: name.to_string(),
            started_at,
            finished_at: None,
            children: Vec::new(),
            failed: false,
        });
    }

    /// Close the deepest open span.
    pub fn finish_action(&mut self) -> Result<()> {
        self.finish_action_at(now_epoch_secs(), false)
    }

    /// Close the deepest open span, marking it failed.
    pub fn finish_action_failed(&mut self) -> Result<()> {
        self.finish_action_at(now_epoch_secs(), true)
    }

    /// Close the deepest open span with an explicit finish timestamp.
    pub fn finish_action_at(&mut self, finished_at: f64, failed: bool) -> Result<()> {
        if !finish_deepest_open(&mut self.actions, finished_at, failed) {
            bail!("No open atomic action to finish");
        }
        Ok(())
    }

    /// Run `body` inside a span named `name`. The span closes when the body
    /// returns and is marked failed when the body errors. The timer is
    /// re-borrowed into the body, so sections nest naturally.
    pub fn in_action<R>(
        &mut self,
        name: &str,
        body: impl FnOnce(&mut Self) -> Result<R>,
    ) -> Result<R> {
        self.start_action(name);
        let result = body(self);
        self.finish_action_at(now_epoch_secs(), result.is_err())?;
        result
    }

    /// Close any spans left open, deepest first. Used on the abort path so
    /// the handed-off tree is always fully closed.
    pub fn finish_all(&mut self) {
        let finished_at = now_epoch_secs();
        while finish_deepest_open(&mut self.actions, finished_at, false) {}
    }

    pub fn actions(&self) -> &[AtomicAction] {
        &self.actions
    }

    /// Hand the finished tree off immutably.
    pub fn into_actions(self) -> Vec<AtomicAction> {
        self.actions
    }

    pub fn reset(&mut self) {
        self.actions.clear();
    }
}

/// Descend the chain of open last children to the list where a new span
/// belongs: the children of the deepest open span, or the top level.
fn open_slot(mut actions: &mut Vec<AtomicAction>) -> &mut Vec<AtomicAction> {
    while matches!(actions.last(), Some(last) if last.finished_at.is_none()) {
        let index = actions.len() - 1;
        actions = &mut actions[index].children;
    }
    actions
}

/// Close the deepest open span along the last-child chain. Returns false
/// when nothing was open at this level.
fn finish_deepest_open(actions: &mut [AtomicAction], finished_at: f64, failed: bool) -> bool {
    let Some(last) = actions.last_mut() else {
        return false;
    };
    if last.finished_at.is_some() {
        return false;
    }
    if !finish_deepest_open(&mut last.children, finished_at, failed) {
        last.finished_at = Some(finished_at);
        if failed {
            last.failed = true;
        }
    }
    true
}

/// Mark the chronologically last action of a failed iteration.
///
/// Walks the last child of the last action repeatedly until no further
/// children exist and marks exactly that one leaf, never more than one mark
/// per iteration.
pub fn mark_last_failed(actions: &mut [AtomicAction]) {
    if let Some(last) = actions.last_mut() {
        if last.children.is_empty() {
            last.failed = true;
        } else {
            mark_last_failed(&mut last.children);
        }
    }
}

/// Top-level spans as `(display name, duration)` pairs in execution order.
///
/// Repeated names at the same level are disambiguated for aggregated
/// reporting as `"name (2)"`, `"name (3)"`, ... while the raw tree keeps the
/// original names.
pub fn flatten_actions(actions: &[AtomicAction]) -> Vec<(String, f64)> {
    let mut occurrences: IndexMap<&str, usize> = IndexMap::new();
    actions
        .iter()
        .map(|action| {
            let seen = occurrences.entry(action.name.as_str()).or_insert(0);
            *seen += 1;
            let display = if *seen == 1 {
                action.name.clone()
            } else {
                format!("{} ({})", action.name, seen)
            };
            (display, action.duration())
        })
        .collect()
}

/// Roll-up of same-named actions across one or more trees.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MergedAction {
    pub duration: f64,
    pub count: u64,
    pub failed: bool,
    pub children: IndexMap<String, MergedAction>,
}

/// Merge duplicates of atomic actions into one entry per name, summing
/// durations and counts. Call repeatedly with the same `root` to accumulate
/// a whole run. Children are merged down to `DEFAULT_MERGE_DEPTH` levels.
pub fn merge_atomic_actions(actions: &[AtomicAction], root: &mut IndexMap<String, MergedAction>) {
    merge_atomic_actions_to_depth(actions, root, 0, DEFAULT_MERGE_DEPTH);
}

pub const DEFAULT_MERGE_DEPTH: usize = 2;

pub fn merge_atomic_actions_to_depth(
    actions: &[AtomicAction],
    root: &mut IndexMap<String, MergedAction>,
    depth: usize,
    depth_limit: usize,
) {
    for action in actions {
        let merged = root.entry(action.name.clone()).or_default();
        merged.duration += action.duration();
        merged.count += 1;
        if action.failed {
            merged.failed = true;
        }
        if !action.children.is_empty() && depth < depth_limit {
            merge_atomic_actions_to_depth(
                &action.children,
                &mut merged.children,
                depth + 1,
                depth_limit,
            );
        }
    }
}
