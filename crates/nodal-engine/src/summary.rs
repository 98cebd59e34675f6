//! Per-run evaluation reporting.
//!
//! Every node the evaluator touches records a [`NodeOutcome`]; the run rolls
//! them up into an [`EvaluationSummary`] with counts, latency percentiles, a
//! slow-node list, and a per-category timing breakdown. None of this is part
//! of the graph's persisted state -- it exists for observability.
//!
//! Cancelled nodes get their own bucket and never count as failures. Nodes
//! blocked by an upstream failure are likewise counted separately from the
//! failure itself.

use std::collections::BTreeMap;

use nodal_core::NodeId;
use serde::Serialize;

/// What happened to one node during a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Outcome {
    /// Evaluated fresh via its node definition.
    Computed,
    /// Satisfied from the compute cache.
    Cached,
    /// The node's evaluation failed.
    Failed { error: String },
    /// Skipped because an upstream node failed; inputs would be undefined.
    Blocked { upstream: NodeId },
    /// Skipped because the run was cancelled first.
    Cancelled,
}

/// One recorded sample: a node, what happened, and how long it took.
#[derive(Debug, Clone, Serialize)]
pub struct NodeOutcome {
    pub node: NodeId,
    pub type_name: String,
    pub outcome: Outcome,
    pub duration_ms: f64,
}

/// A node that crossed the slow threshold, for the summary's slow list.
#[derive(Debug, Clone, Serialize)]
pub struct SlowNode {
    pub node: NodeId,
    pub type_name: String,
    pub duration_ms: f64,
}

/// Aggregate timing for one node category (the `Solid` in `Solid::Box`).
#[derive(Debug, Clone, Default, Serialize)]
pub struct CategoryStats {
    pub count: usize,
    pub total_ms: f64,
    pub average_ms: f64,
}

/// Roll-up of one evaluation run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EvaluationSummary {
    pub sample_count: usize,
    pub computed_count: usize,
    pub cached_count: usize,
    pub failed_count: usize,
    pub blocked_count: usize,
    pub cancelled_count: usize,
    pub average_ms: f64,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub max_ms: f64,
    /// Slowest nodes above the threshold, slowest first.
    pub slow_nodes: Vec<SlowNode>,
    /// Timing per node category, in category order.
    pub category_breakdown: BTreeMap<String, CategoryStats>,
}

impl EvaluationSummary {
    /// Builds the summary from recorded outcomes.
    ///
    /// Latency statistics cover computed and cached samples (the work the run
    /// actually did); failed, blocked, and cancelled nodes contribute only to
    /// their counts.
    pub fn from_outcomes(
        outcomes: &[NodeOutcome],
        slow_threshold_ms: f64,
        slow_limit: usize,
    ) -> Self {
        let mut summary = EvaluationSummary {
            sample_count: outcomes.len(),
            ..Default::default()
        };

        let mut durations: Vec<f64> = Vec::new();
        for sample in outcomes {
            match &sample.outcome {
                Outcome::Computed => summary.computed_count += 1,
                Outcome::Cached => summary.cached_count += 1,
                Outcome::Failed { .. } => summary.failed_count += 1,
                Outcome::Blocked { .. } => summary.blocked_count += 1,
                Outcome::Cancelled => summary.cancelled_count += 1,
            }

            if matches!(sample.outcome, Outcome::Computed | Outcome::Cached) {
                durations.push(sample.duration_ms);

                let category = category_of(&sample.type_name).to_string();
                let stats = summary.category_breakdown.entry(category).or_default();
                stats.count += 1;
                stats.total_ms += sample.duration_ms;
            }
        }

        for stats in summary.category_breakdown.values_mut() {
            stats.average_ms = stats.total_ms / stats.count as f64;
        }

        if !durations.is_empty() {
            let total: f64 = durations.iter().sum();
            summary.average_ms = total / durations.len() as f64;
            durations.sort_by(|a, b| a.total_cmp(b));
            summary.p50_ms = percentile(&durations, 0.50);
            summary.p95_ms = percentile(&durations, 0.95);
            summary.max_ms = *durations.last().unwrap_or(&0.0);
        }

        let mut slow: Vec<SlowNode> = outcomes
            .iter()
            .filter(|s| {
                matches!(s.outcome, Outcome::Computed) && s.duration_ms >= slow_threshold_ms
            })
            .map(|s| SlowNode {
                node: s.node,
                type_name: s.type_name.clone(),
                duration_ms: s.duration_ms,
            })
            .collect();
        slow.sort_by(|a, b| b.duration_ms.total_cmp(&a.duration_ms));
        slow.truncate(slow_limit);
        summary.slow_nodes = slow;

        summary
    }

    /// Nodes whose outputs are now current: computed plus cached.
    pub fn succeeded_count(&self) -> usize {
        self.computed_count + self.cached_count
    }

    /// Fraction of touched nodes that completed, as a 0-100 percentage.
    /// 100 for an empty run (nothing needed doing).
    pub fn progress_percent(&self) -> f64 {
        if self.sample_count == 0 {
            return 100.0;
        }
        self.succeeded_count() as f64 / self.sample_count as f64 * 100.0
    }
}

/// Nearest-rank percentile over an ascending-sorted slice.
fn percentile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = ((sorted.len() - 1) as f64 * q).round() as usize;
    sorted[idx]
}

fn category_of(type_name: &str) -> &str {
    type_name
        .split_once("::")
        .map(|(head, _)| head)
        .unwrap_or(type_name)
}
