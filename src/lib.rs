//! pearl — exact probabilistic inference over discrete factor graphs.
//!
//! A factor graph is built once through `FactorGraphBuilder`; the inference
//! engines each take an isolated snapshot of it and answer marginal or
//! conditional probability queries:
//!
//! * `BeliefPropagation` — single-variable queries on factor-graph trees,
//!   by log-space message passing with per-evidence message caches.
//! * `BucketElimination` — joint queries and loopy graphs, given an
//!   elimination order.
//! * `GreedyOrdering` — a min-fill / weighted-min-fill heuristic producing
//!   that order.
//! * `GreedyBucketElimination` — the two composed, with order caching.

pub mod factor;
pub mod inference;
pub mod model;
pub mod util;
pub mod variable;

pub use factor::{Factor, FactorId, FactorKind};
pub use inference::{
    BeliefPropagation, BucketElimination, CostKind, FactoredEngine, GreedyBucketElimination,
    GreedyOrdering,
};
pub use model::{FactorGraph, FactorGraphBuilder};
pub use util::{PearlError, Result};
pub use variable::{VarId, Variable};
