//! The DAG engine: dependency-ordered, cache-aware, cancellable evaluation.
//!
//! [`DagEngine::evaluate`] takes the graph manager's dirty set (already
//! expanded to the downstream closure), topologically layers it, and runs
//! each layer's nodes -- concurrently up to a bound, since nodes in one layer
//! never depend on each other. Per node it resolves live inputs, consults the
//! compute cache by fingerprint, and only on a miss invokes the node
//! definition, which may await the compute backend.
//!
//! Failure scopes:
//! - A cycle among the pending nodes fails the run before anything executes.
//! - A single node failing (or panicking) poisons only its transitive
//!   dependents; sibling branches keep evaluating.
//! - Cancellation stops further dispatch; results already written stay.
//!
//! The engine holds `&mut GraphManager` for the whole run, so nothing else
//! can touch node outputs mid-evaluation; concurrent edits belong to the
//! next run.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use nodal_core::{ModelGraph, NodeId, Value, ValueMap};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use uuid::Uuid;

use crate::backend::ComputeBackend;
use crate::cache::ComputeCache;
use crate::cancel::CancelToken;
use crate::error::{EngineError, EvalError};
use crate::fingerprint::{fingerprint_node, Fingerprint};
use crate::manager::GraphManager;
use crate::metrics::MetricsSink;
use crate::registry::{EvalContext, NodeRegistry};
use crate::summary::{EvaluationSummary, NodeOutcome, Outcome};

/// Evaluator tuning knobs.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Upper bound on concurrently evaluating siblings. 0 means "use the
    /// backend's pool size".
    pub max_concurrency: usize,
    /// Minimum duration for a node to appear in the slow-node list.
    pub slow_node_threshold_ms: f64,
    /// Maximum entries in the slow-node list.
    pub slow_node_limit: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            max_concurrency: 0,
            slow_node_threshold_ms: 100.0,
            slow_node_limit: 5,
        }
    }
}

/// Result of one evaluation run.
#[derive(Debug, Clone, serde::Serialize)]
pub struct EvaluationReport {
    pub run_id: Uuid,
    /// One entry per node the run touched, in completion order.
    pub outcomes: Vec<NodeOutcome>,
    pub summary: EvaluationSummary,
}

impl EvaluationReport {
    pub fn progress_percent(&self) -> f64 {
        self.summary.progress_percent()
    }
}

/// The evaluation engine. All collaborators are injected; there are no
/// process-wide singletons, so isolated instances coexist freely.
pub struct DagEngine {
    registry: Arc<NodeRegistry>,
    cache: Arc<dyn ComputeCache>,
    backend: Arc<dyn ComputeBackend>,
    metrics: Arc<dyn MetricsSink>,
    config: EngineConfig,
    /// Token for the run currently in flight (or the last one).
    current_cancel: Mutex<CancelToken>,
    evaluating: AtomicBool,
}

impl DagEngine {
    pub fn new(
        registry: Arc<NodeRegistry>,
        cache: Arc<dyn ComputeCache>,
        backend: Arc<dyn ComputeBackend>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        DagEngine {
            registry,
            cache,
            backend,
            metrics,
            config: EngineConfig::default(),
            current_cancel: Mutex::new(CancelToken::new()),
            evaluating: AtomicBool::new(false),
        }
    }

    /// Builder: overrides the default configuration.
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// `true` while a run is in flight.
    pub fn is_evaluating(&self) -> bool {
        self.evaluating.load(Ordering::SeqCst)
    }

    /// Requests cancellation of the in-flight run: no further nodes are
    /// dispatched, and the backend is asked to abort outstanding requests.
    /// A request, not a guarantee of instant stop.
    pub fn cancel_all(&self) {
        let token = self
            .current_cancel
            .lock()
            .expect("cancel token lock poisoned")
            .clone();
        token.cancel();
        self.backend.abort_all();
        tracing::info!("evaluation cancellation requested");
    }

    /// Evaluates every dirty node (and its downstream closure) in dependency
    /// order.
    ///
    /// Returns `Err` only for structural failures found before dispatch --
    /// currently a dependency cycle, which mutates nothing. Per-node failures
    /// never reject the run; they are recorded in the report and on the nodes
    /// themselves.
    pub async fn evaluate(
        &self,
        manager: &mut GraphManager,
    ) -> Result<EvaluationReport, EngineError> {
        let run_id = Uuid::new_v4();
        let affected = manager.dirty_nodes();

        if affected.is_empty() {
            return Ok(EvaluationReport {
                run_id,
                outcomes: Vec::new(),
                summary: EvaluationSummary::from_outcomes(
                    &[],
                    self.config.slow_node_threshold_ms,
                    self.config.slow_node_limit,
                ),
            });
        }

        // Structural check first: a cycle aborts the run with no mutation.
        let layers = topo_layers(manager.graph(), &affected)?;

        let cancel = CancelToken::new();
        *self
            .current_cancel
            .lock()
            .expect("cancel token lock poisoned") = cancel.clone();
        let _run_guard = RunGuard::arm(&self.evaluating);

        let run_start = Instant::now();
        tracing::debug!(%run_id, nodes = affected.len(), layers = layers.len(), "evaluation started");

        let ctx = EvalContext::new(
            manager.graph().units,
            manager.graph().tolerance,
            Arc::clone(&self.backend),
            cancel.clone(),
        );
        let limit = if self.config.max_concurrency == 0 {
            self.backend.pool_size().max(1)
        } else {
            self.config.max_concurrency
        };
        let semaphore = Arc::new(Semaphore::new(limit));

        let mut outcomes: Vec<NodeOutcome> = Vec::with_capacity(affected.len());
        // Node -> root failed ancestor; membership means "do not evaluate".
        let mut poisoned: HashMap<NodeId, NodeId> = HashMap::new();
        let mut recorded: HashSet<NodeId> = HashSet::new();

        'layers: for layer in &layers {
            if cancel.is_cancelled() {
                break 'layers;
            }

            let mut join_set: JoinSet<(NodeId, Fingerprint, Result<ValueMap, EvalError>, f64)> =
                JoinSet::new();
            let mut task_nodes: HashMap<tokio::task::Id, NodeId> = HashMap::new();

            for &id in layer {
                if cancel.is_cancelled() {
                    break;
                }

                let type_name = match manager.graph().node(id) {
                    Some(node) => node.type_name.clone(),
                    None => continue, // removed mid-snapshot; nothing to do
                };

                // Poisoned by an upstream failure in this run?
                if let Some(root) = self.poison_root(manager.graph(), &poisoned, id) {
                    poisoned.insert(id, root);
                    manager.record_failure(id, format!("upstream node {root} failed"));
                    outcomes.push(NodeOutcome {
                        node: id,
                        type_name,
                        outcome: Outcome::Blocked { upstream: root },
                        duration_ms: 0.0,
                    });
                    recorded.insert(id);
                    continue;
                }

                // Resolve live inputs from upstream outputs.
                let lookup_start = Instant::now();
                let inputs = match resolve_inputs(manager.graph(), id) {
                    Ok(inputs) => inputs,
                    Err(err) => {
                        self.fail_node(manager, &mut poisoned, &mut outcomes, id, type_name, &err);
                        recorded.insert(id);
                        continue;
                    }
                };
                let params = manager
                    .graph()
                    .node(id)
                    .map(|n| n.params.clone())
                    .unwrap_or_default();

                let fingerprint = fingerprint_node(&type_name, &params, &inputs);

                // Cache hit: adopt the memoized outputs, no dispatch.
                if let Some(cached) = self.cache.get(&fingerprint) {
                    let lookup_ms = lookup_start.elapsed().as_secs_f64() * 1000.0;
                    tracing::debug!(node = %id, %fingerprint, "cache hit");
                    self.metrics.increment_counter("engine.cache_hit");
                    manager.apply_outputs(id, cached);
                    outcomes.push(NodeOutcome {
                        node: id,
                        type_name,
                        outcome: Outcome::Cached,
                        duration_ms: lookup_ms,
                    });
                    recorded.insert(id);
                    continue;
                }
                self.metrics.increment_counter("engine.cache_miss");

                // Cache miss: the registry is consulted only now.
                let Some(definition) = self.registry.get(&type_name) else {
                    self.fail_node(
                        manager,
                        &mut poisoned,
                        &mut outcomes,
                        id,
                        type_name.clone(),
                        &EvalError::UnknownType(type_name),
                    );
                    recorded.insert(id);
                    continue;
                };

                let task_ctx = ctx.clone();
                let task_sem = Arc::clone(&semaphore);
                let handle = join_set.spawn(async move {
                    let Ok(_permit) = task_sem.acquire_owned().await else {
                        return (id, fingerprint, Err(EvalError::Cancelled), 0.0);
                    };
                    if task_ctx.cancel().is_cancelled() {
                        return (id, fingerprint, Err(EvalError::Cancelled), 0.0);
                    }
                    let start = Instant::now();
                    let result = definition.evaluate(&task_ctx, &inputs, &params).await;
                    let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
                    (id, fingerprint, result, elapsed_ms)
                });
                task_nodes.insert(handle.id(), id);
            }

            // Drain the layer before the next one starts: downstream input
            // resolution reads the outputs written here.
            while let Some(joined) = join_set.join_next().await {
                match joined {
                    Ok((id, fingerprint, Ok(outputs), elapsed_ms)) => {
                        let type_name = manager
                            .graph()
                            .node(id)
                            .map(|n| n.type_name.clone())
                            .unwrap_or_default();
                        manager.apply_outputs(id, outputs.clone());
                        self.cache.insert(fingerprint, outputs);
                        self.metrics.record_timing("engine.node_ms", elapsed_ms);
                        outcomes.push(NodeOutcome {
                            node: id,
                            type_name,
                            outcome: Outcome::Computed,
                            duration_ms: elapsed_ms,
                        });
                        recorded.insert(id);
                    }
                    Ok((id, _, Err(err), elapsed_ms)) => {
                        let type_name = manager
                            .graph()
                            .node(id)
                            .map(|n| n.type_name.clone())
                            .unwrap_or_default();
                        if err.is_cancellation() {
                            outcomes.push(NodeOutcome {
                                node: id,
                                type_name,
                                outcome: Outcome::Cancelled,
                                duration_ms: elapsed_ms,
                            });
                        } else {
                            self.fail_node(
                                manager,
                                &mut poisoned,
                                &mut outcomes,
                                id,
                                type_name,
                                &err,
                            );
                        }
                        recorded.insert(id);
                    }
                    Err(join_err) => {
                        // A panicking definition counts as that node failing,
                        // not as an engine fault.
                        if let Some(&id) = task_nodes.get(&join_err.id()) {
                            let type_name = manager
                                .graph()
                                .node(id)
                                .map(|n| n.type_name.clone())
                                .unwrap_or_default();
                            self.fail_node(
                                manager,
                                &mut poisoned,
                                &mut outcomes,
                                id,
                                type_name,
                                &EvalError::Failed(format!("evaluation panicked: {join_err}")),
                            );
                            recorded.insert(id);
                        }
                    }
                }
            }
        }

        // Anything never reached was cancelled; it stays dirty and untouched.
        for layer in &layers {
            for &id in layer {
                if !recorded.contains(&id) {
                    let type_name = manager
                        .graph()
                        .node(id)
                        .map(|n| n.type_name.clone())
                        .unwrap_or_default();
                    self.metrics.increment_counter("engine.node_cancelled");
                    outcomes.push(NodeOutcome {
                        node: id,
                        type_name,
                        outcome: Outcome::Cancelled,
                        duration_ms: 0.0,
                    });
                }
            }
        }

        let total_ms = run_start.elapsed().as_secs_f64() * 1000.0;
        self.metrics.record_timing("engine.run_ms", total_ms);
        self.metrics.increment_counter("engine.runs");

        let summary = EvaluationSummary::from_outcomes(
            &outcomes,
            self.config.slow_node_threshold_ms,
            self.config.slow_node_limit,
        );
        tracing::info!(
            %run_id,
            computed = summary.computed_count,
            cached = summary.cached_count,
            failed = summary.failed_count,
            blocked = summary.blocked_count,
            cancelled = summary.cancelled_count,
            total_ms,
            "evaluation finished"
        );

        Ok(EvaluationReport {
            run_id,
            outcomes,
            summary,
        })
    }

    /// Returns the root failed ancestor if any direct dependency of `id` is
    /// poisoned in this run.
    fn poison_root(
        &self,
        graph: &ModelGraph,
        poisoned: &HashMap<NodeId, NodeId>,
        id: NodeId,
    ) -> Option<NodeId> {
        graph
            .dependencies(id)
            .find_map(|dep| poisoned.get(&dep).copied())
    }

    /// Records one node's failure: last_error set, dirty kept, dependents
    /// poisoned for the rest of the run.
    fn fail_node(
        &self,
        manager: &mut GraphManager,
        poisoned: &mut HashMap<NodeId, NodeId>,
        outcomes: &mut Vec<NodeOutcome>,
        id: NodeId,
        type_name: String,
        err: &EvalError,
    ) {
        tracing::warn!(node = %id, %type_name, error = %err, "node evaluation failed");
        self.metrics.increment_counter("engine.node_failure");
        manager.record_failure(id, err.to_string());
        poisoned.insert(id, id);
        outcomes.push(NodeOutcome {
            node: id,
            type_name,
            outcome: Outcome::Failed {
                error: err.to_string(),
            },
            duration_ms: 0.0,
        });
    }
}

/// Clears the evaluating flag on every exit path, including early returns
/// and panics.
struct RunGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> RunGuard<'a> {
    fn arm(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        RunGuard { flag }
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// Resolves a node's live input values.
///
/// Starts from the node's literal socket values; each connected socket is
/// overridden by the upstream output it is wired to. A socket fed by several
/// edges collects a `Value::List` in edge-ID order, which is deterministic.
fn resolve_inputs(graph: &ModelGraph, id: NodeId) -> Result<ValueMap, EvalError> {
    let node = graph.node(id).ok_or_else(|| EvalError::Failed(format!(
        "node {id} disappeared during evaluation"
    )))?;
    let mut inputs = node.inputs.clone();

    // Group incoming connections by target socket, ordered by edge ID.
    let mut by_socket: HashMap<&str, Vec<(u32, NodeId, &str)>> = HashMap::new();
    for (edge_id, source, edge) in graph.incoming(id) {
        by_socket
            .entry(edge.target_socket.as_str())
            .or_default()
            .push((edge_id.0, source, edge.source_socket.as_str()));
    }

    let mut sockets: Vec<&str> = by_socket.keys().copied().collect();
    sockets.sort_unstable();

    for socket in sockets {
        let mut connections = by_socket.remove(socket).unwrap_or_default();
        connections.sort_unstable_by_key(|(edge_id, _, _)| *edge_id);

        let mut values = Vec::with_capacity(connections.len());
        for (_, source, source_socket) in &connections {
            let upstream = graph.node(*source).ok_or_else(|| EvalError::Failed(
                format!("upstream node {source} disappeared during evaluation"),
            ))?;
            let value = upstream.outputs.get(*source_socket).cloned().ok_or_else(|| {
                EvalError::MissingInput {
                    socket: format!("{socket} (from {source}:{source_socket})"),
                }
            })?;
            values.push(value);
        }

        let resolved = if values.len() == 1 {
            values.into_iter().next().expect("length checked")
        } else {
            Value::List(values)
        };
        inputs.insert(socket.to_string(), resolved);
    }

    Ok(inputs)
}

/// Kahn-layers the subgraph induced by `affected`.
///
/// Each returned layer contains nodes with no remaining dependencies inside
/// the affected set; layers are sorted by node ID for determinism. Leftover
/// nodes mean a cycle: the run must fail before anything executes.
fn topo_layers(
    graph: &ModelGraph,
    affected: &HashSet<NodeId>,
) -> Result<Vec<Vec<NodeId>>, EngineError> {
    let mut in_degree: HashMap<NodeId, usize> = HashMap::new();
    for &id in affected {
        let degree = graph
            .incoming(id)
            .iter()
            .filter(|(_, source, _)| affected.contains(source))
            .count();
        in_degree.insert(id, degree);
    }

    let mut frontier: Vec<NodeId> = in_degree
        .iter()
        .filter(|&(_, deg)| *deg == 0)
        .map(|(&id, _)| id)
        .collect();
    frontier.sort_unstable();

    let mut layers: Vec<Vec<NodeId>> = Vec::new();
    let mut processed = 0usize;

    while !frontier.is_empty() {
        let layer = frontier;
        let mut next: Vec<NodeId> = Vec::new();

        for &id in &layer {
            processed += 1;
            for (_, target, _) in graph.outgoing(id) {
                if let Some(degree) = in_degree.get_mut(&target) {
                    *degree -= 1;
                    if *degree == 0 {
                        next.push(target);
                    }
                }
            }
        }

        next.sort_unstable();
        next.dedup();
        layers.push(layer);
        frontier = next;
    }

    if processed != affected.len() {
        let mut leftover: Vec<NodeId> = affected
            .iter()
            .copied()
            .filter(|id| !layers.iter().flatten().any(|done| done == id))
            .collect();
        leftover.sort_unstable();
        return Err(EngineError::CycleDetected { nodes: leftover });
    }

    Ok(layers)
}
