//! Incremental evaluation engine for nodal parametric graphs.
//!
//! The pieces, leaves first:
//!
//! - [`manager::GraphManager`] -- owns the current graph and its dirty set,
//!   propagating dirtiness downstream on every mutation.
//! - [`fingerprint`] -- blake3 content fingerprints over
//!   (type, params, resolved inputs), the cache key.
//! - [`cache`] -- the memoization contract plus in-memory and LRU stores.
//! - [`registry`] -- the node-definition lookup table and evaluation context.
//! - [`backend`] -- the async request/response boundary to the geometry
//!   computation worker.
//! - [`engine::DagEngine`] -- the evaluator: topological layering, bounded
//!   sibling concurrency, cache consultation, partial-failure isolation,
//!   cooperative cancellation.
//! - [`summary`] -- per-run observability (counts, percentiles, slow nodes).
//!
//! All collaborators are injected at construction; nothing in this crate is
//! a process-wide singleton.

pub mod backend;
pub mod cache;
pub mod cancel;
pub mod engine;
pub mod error;
pub mod fingerprint;
pub mod manager;
pub mod metrics;
pub mod registry;
pub mod summary;

// Re-export commonly used types
pub use backend::{ComputeBackend, NullBackend};
pub use cache::{ComputeCache, InMemoryCache, LruComputeCache};
pub use cancel::CancelToken;
pub use engine::{DagEngine, EngineConfig, EvaluationReport};
pub use error::{BackendError, EngineError, EvalError};
pub use fingerprint::{fingerprint_node, Fingerprint};
pub use manager::{DirtyPolicy, GraphManager};
pub use metrics::{MemoryMetrics, MetricsSink, NullMetrics};
pub use registry::{EvalContext, NodeDefinition, NodeRegistry};
pub use summary::{EvaluationSummary, NodeOutcome, Outcome};
