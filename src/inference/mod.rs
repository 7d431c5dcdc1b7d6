//! Defines the interface to the factored inference engines.

use crate::util::Result;
use crate::variable::VarId;

pub mod belief_propagation;
pub mod bucket;
pub mod bucket_elimination;
pub mod greedy_bucket_elimination;
pub mod greedy_ordering;
pub mod messages;
pub mod state;

pub use self::belief_propagation::BeliefPropagation;
pub use self::bucket_elimination::BucketElimination;
pub use self::greedy_bucket_elimination::GreedyBucketElimination;
pub use self::greedy_ordering::{CostKind, GreedyOrdering};
pub use self::state::FactoredState;


/// A `FactoredEngine` answers probability queries of the form
/// ```P(Q₁, ..., Qₛ | E₁ = e₁, ..., Eₖ = eₖ)```
/// over a snapshot of a factor graph.
///
/// Engines are stateful: the query and evidence are configured up front,
/// an engine-specific `run` computes the distribution, and `pd` reads it
/// out. The outer model is never touched; every engine owns an isolated
/// inner copy whose variable domains encode the evidence.
pub trait FactoredEngine {

    /// The engine's working state.
    fn state(&self) -> &FactoredState;

    fn state_mut(&mut self) -> &mut FactoredState;

    /// Set the query, replacing any previous one. The query variables are
    /// kept sorted by name; `pd` takes its values in that order. An empty
    /// slice clears the query.
    fn set_query(&mut self, query: &[VarId]) -> Result<()> {
        self.state_mut().set_query(query)
    }

    /// Set the evidence, replacing any previous one. Each pair narrows the
    /// variable's inner domain to the observed value. An empty slice clears
    /// the evidence.
    fn set_evidence(&mut self, evidence: &[(VarId, &str)]) -> Result<()> {
        self.state_mut().set_evidence(evidence)
    }

    /// The probability of a specific joint query assignment, with values
    /// given in the (name-sorted) query order.
    fn pd(&self, values: &[&str]) -> Result<f64> {
        self.state().pd(values)
    }

    /// Print `P(Q = q | E = e) = p` for every joint query assignment.
    fn print_pd(&self) -> Result<()> {
        self.state().print_pd()
    }

}
