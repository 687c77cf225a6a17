//! Tracing instrumentation helpers.
//!
//! Enable the `tracing` feature to emit spans and events via the `tracing`
//! crate. These macros no-op when the feature is disabled, so call sites
//! never need `#[cfg]` boilerplate of their own.

/// Emit a debug-level event noting that a model finished building its
/// per-model index (scalar/relation/primary-key lookups memoized).
#[macro_export]
macro_rules! trace_model_resolved {
    ($model:expr) => {
        #[cfg(feature = "tracing")]
        tracing::debug!(model = $model, "qcompiler.model_resolved");
    };
}

/// Emit a trace-level event with the compiled WHERE clause's text and how
/// many parameters it bound.
#[macro_export]
macro_rules! trace_where_compiled {
    ($model:expr, $clause:expr, $param_count:expr) => {
        #[cfg(feature = "tracing")]
        tracing::trace!(model = $model, clause = %$clause, params = $param_count, "qcompiler.where_compiled");
    };
}

/// Emit a debug-level event noting which strategy the planner chose for a
/// relation and the stats (if any) that drove the decision.
#[macro_export]
macro_rules! trace_relation_strategy {
    ($parent:expr, $relation:expr, $strategy:expr) => {
        #[cfg(feature = "tracing")]
        tracing::debug!(parent = $parent, relation = $relation, strategy = ?$strategy, "qcompiler.relation_strategy");
    };
}

/// Emit a debug-level event for each `WHERE-IN` chunk query dispatched.
#[macro_export]
macro_rules! trace_where_in_dispatch {
    ($relation:expr, $chunk_index:expr, $chunk_len:expr) => {
        #[cfg(feature = "tracing")]
        tracing::debug!(
            relation = $relation,
            chunk_index = $chunk_index,
            chunk_len = $chunk_len,
            "qcompiler.where_in_dispatch"
        );
    };
}
