//! Defines the `GreedyOrdering` engine: a greedy heuristic producing a
//! near-optimal variable elimination order for bucket elimination.
//!
//! The moralized graph restricted to the non-evidential variables is built
//! from the factor scopes; the candidate with the cheapest elimination cost
//! is removed first, its neighbors are pairwise connected, and the process
//! repeats until every non-query, non-evidential variable is ordered. Ties
//! are broken by the name-sorted candidate order, so the result is
//! reproducible.

use crate::model::FactorGraph;
use crate::util::{PearlError, Result};
use crate::variable::VarId;

use super::state::FactoredState;
use super::FactoredEngine;

use indexmap::{IndexMap, IndexSet};

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// The elimination cost criterion used by the greedy search.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CostKind {
    /// The number of graph edges that eliminating the variable would add
    MinFill,

    /// Added edges weighted by the product of the edge variables' domain
    /// cardinalities
    #[default]
    WeightedMinFill,
}

impl CostKind {

    fn as_cost(&self) -> &'static dyn Cost {
        match self {
            CostKind::MinFill => &MinFill,
            CostKind::WeightedMinFill => &WeightedMinFill,
        }
    }

}

impl FromStr for CostKind {

    type Err = PearlError;

    fn from_str(tag: &str) -> Result<CostKind> {
        match tag {
            "min-fill" => Ok(CostKind::MinFill),
            "weighted-min-fill" => Ok(CostKind::WeightedMinFill),
            _ => Err(PearlError::General(format!("unknown cost criterion {:?}", tag))),
        }
    }

}

impl fmt::Display for CostKind {

    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CostKind::MinFill => write!(f, "min-fill"),
            CostKind::WeightedMinFill => write!(f, "weighted-min-fill"),
        }
    }

}


/// The moralized graph over the non-evidential variables, kept as
/// per-variable adjacency sets with deterministic iteration order.
struct MoralGraph {
    adjacency: IndexMap<VarId, IndexSet<VarId>>,
    cardinality: HashMap<VarId, usize>,
}

impl MoralGraph {

    fn build(state: &FactoredState) -> MoralGraph {
        let mut adjacency: IndexMap<VarId, IndexSet<VarId>> = (0..state.variables().len())
            .map(VarId)
            .filter(|id| !state.var(*id).is_evidential())
            .map(|id| (id, IndexSet::new()))
            .collect();

        for factor in state.factors() {
            let scope: Vec<VarId> = factor
                .variables()
                .iter()
                .copied()
                .filter(|id| !state.var(*id).is_evidential())
                .collect();

            for (i, &a) in scope.iter().enumerate() {
                for &b in &scope[i + 1..] {
                    adjacency[&a].insert(b);
                    adjacency[&b].insert(a);
                }
            }
        }

        let cardinality = adjacency
            .keys()
            .map(|id| (*id, state.var(*id).domain().len()))
            .collect();

        MoralGraph {
            adjacency,
            cardinality,
        }
    }

    fn neighbors(&self, var: VarId) -> &IndexSet<VarId> {
        &self.adjacency[&var]
    }

    fn are_adjacent(&self, a: VarId, b: VarId) -> bool {
        self.adjacency[&a].contains(&b)
    }

    /// Simulate the elimination of `var`: pairwise-connect its neighbors,
    /// then remove it from the graph.
    fn eliminate(&mut self, var: VarId) {
        let neighbors: Vec<VarId> = match self.adjacency.shift_remove(&var) {
            Some(set) => set.into_iter().collect(),
            None => return,
        };

        for (i, &a) in neighbors.iter().enumerate() {
            for &b in &neighbors[i + 1..] {
                self.adjacency[&a].insert(b);
                self.adjacency[&b].insert(a);
            }
        }
        for &neighbor in &neighbors {
            self.adjacency[&neighbor].shift_remove(&var);
        }
    }

}


/// The elimination cost of a variable given the current adjacency.
trait Cost {

    fn cost(&self, graph: &MoralGraph, var: VarId) -> f64;

}

struct MinFill;

impl Cost for MinFill {

    fn cost(&self, graph: &MoralGraph, var: VarId) -> f64 {
        let neighbors: Vec<VarId> = graph.neighbors(var).iter().copied().collect();

        let mut cost = 0.0;
        for (i, &a) in neighbors.iter().enumerate() {
            for &b in &neighbors[i + 1..] {
                if !graph.are_adjacent(a, b) {
                    cost += 1.0;
                }
            }
        }
        cost
    }

}

struct WeightedMinFill;

impl Cost for WeightedMinFill {

    fn cost(&self, graph: &MoralGraph, var: VarId) -> f64 {
        let neighbors: Vec<VarId> = graph.neighbors(var).iter().copied().collect();

        let mut cost = 0.0;
        for (i, &a) in neighbors.iter().enumerate() {
            for &b in &neighbors[i + 1..] {
                if !graph.are_adjacent(a, b) {
                    cost += (graph.cardinality[&a] * graph.cardinality[&b]) as f64;
                }
            }
        }
        cost
    }

}


/// Greedily order the elimination variables of `state` under the given
/// cost criterion. Shared with greedy bucket elimination.
pub(crate) fn greedy_order(
    state: &FactoredState,
    cost: CostKind,
    print_info: bool,
) -> Vec<VarId> {
    let cost_fn = cost.as_cost();
    let mut graph = MoralGraph::build(state);
    let mut candidates = state.elimination_variables();
    let mut order = Vec::with_capacity(candidates.len());

    while !candidates.is_empty() {
        let mut min_index = 0;
        let mut min_cost = cost_fn.cost(&graph, candidates[0]);
        if print_info {
            println!("total_cost({}) = {}", state.var(candidates[0]).name(), min_cost);
        }

        for (index, &candidate) in candidates.iter().enumerate().skip(1) {
            let candidate_cost = cost_fn.cost(&graph, candidate);
            if print_info {
                println!("total_cost({}) = {}", state.var(candidate).name(), candidate_cost);
            }
            if candidate_cost < min_cost {
                min_cost = candidate_cost;
                min_index = index;
            }
        }

        let variable = candidates.remove(min_index);
        if print_info {
            println!("{}: {}\n", order.len(), state.var(variable).name());
        }
        graph.eliminate(variable);
        order.push(variable);
    }

    order
}


/// The greedy ordering algorithm over its own snapshot of a model.
pub struct GreedyOrdering {

    /// The engine's isolated working model
    state: FactoredState,

    /// The last computed order, as inner handles
    elimination_order: Vec<VarId>,

}

impl GreedyOrdering {

    /// Create the engine over a snapshot of `model`.
    pub fn new(model: &FactorGraph) -> GreedyOrdering {
        GreedyOrdering {
            state: FactoredState::snapshot(model),
            elimination_order: Vec::new(),
        }
    }

    /// Compute an elimination order of the non-query, non-evidential
    /// variables under the current query and evidence (both optional).
    pub fn run(&mut self, cost: CostKind, print_info: bool) {
        if print_info {
            println!("{}", "*".repeat(40));
            println!("Greedy Ordering started, cost: {}", cost);
        }

        self.elimination_order = greedy_order(&self.state, cost, print_info);

        if print_info {
            println!("Greedy Ordering stopped");
            println!("{}", "*".repeat(40));
        }
    }

    /// The computed elimination order, as handles of the caller's model.
    pub fn order(&self) -> Vec<VarId> {
        self.elimination_order
            .iter()
            .map(|id| self.state.outer_of(*id))
            .collect()
    }

    /// Print the query, the evidence, and the computed order.
    pub fn print_order(&self) {
        self.state.print_query();
        self.state.print_evidence();
        let names: Vec<&str> = self
            .elimination_order
            .iter()
            .map(|id| self.state.var(*id).name())
            .collect();
        println!("Elimination order: {}", names.join(", "));
    }

}

impl FactoredEngine for GreedyOrdering {

    fn state(&self) -> &FactoredState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut FactoredState {
        &mut self.state
    }

}


// Unit tests. See the parent module for the network definitions.
#[cfg(test)]
mod tests {

    use super::*;
    use crate::inference::tests::{misconception_network, student_network};

    fn order_names(model: &FactorGraph, algorithm: &GreedyOrdering) -> Vec<String> {
        algorithm
            .order()
            .iter()
            .map(|id| model.variable(*id).unwrap().name().to_string())
            .collect()
    }

    #[test]
    fn cost_kind_tags() {
        assert_eq!(CostKind::MinFill, "min-fill".parse().unwrap());
        assert_eq!(CostKind::WeightedMinFill, "weighted-min-fill".parse().unwrap());
        assert_eq!(CostKind::WeightedMinFill, CostKind::default());
        assert!("max-fill".parse::<CostKind>().is_err());
    }

    #[test]
    fn student_order_min_fill() {
        let model = student_network();
        let grade = model.lookup_variable("Grade").unwrap();

        let mut algorithm = GreedyOrdering::new(&model);
        algorithm.set_query(&[grade]).unwrap();
        algorithm.run(CostKind::MinFill, false);

        // Difficulty fills nothing (Intelligence and Grade are moralized
        // neighbors), then the leaves Letter and SAT, then Intelligence
        assert_eq!(
            vec!["Difficulty", "Letter", "SAT", "Intelligence"],
            order_names(&model, &algorithm)
        );
    }

    #[test]
    fn student_order_weighted_min_fill() {
        let model = student_network();
        let grade = model.lookup_variable("Grade").unwrap();

        let mut algorithm = GreedyOrdering::new(&model);
        algorithm.set_query(&[grade]).unwrap();
        algorithm.run(CostKind::WeightedMinFill, false);

        assert_eq!(
            vec!["Difficulty", "Letter", "SAT", "Intelligence"],
            order_names(&model, &algorithm)
        );
    }

    #[test]
    fn evidence_shrinks_the_candidates() {
        let model = student_network();
        let grade = model.lookup_variable("Grade").unwrap();
        let sat = model.lookup_variable("SAT").unwrap();

        let mut algorithm = GreedyOrdering::new(&model);
        algorithm.set_query(&[grade]).unwrap();
        algorithm.set_evidence(&[(sat, "s1")]).unwrap();
        algorithm.run(CostKind::MinFill, false);

        assert_eq!(
            vec!["Difficulty", "Intelligence", "Letter"],
            order_names(&model, &algorithm)
        );
    }

    #[test]
    fn misconception_order() {
        let model = misconception_network();
        let alice = model.lookup_variable("Alice").unwrap();

        let mut algorithm = GreedyOrdering::new(&model);
        algorithm.set_query(&[alice]).unwrap();
        algorithm.run(CostKind::MinFill, false);

        // eliminating Bob adds Alice-Charles; afterwards every candidate
        // is fill-free
        assert_eq!(
            vec!["Bob", "Charles", "Debbie"],
            order_names(&model, &algorithm)
        );
    }

    #[test]
    fn order_partitions_the_elimination_variables() {
        let model = student_network();
        let grade = model.lookup_variable("Grade").unwrap();
        let letter = model.lookup_variable("Letter").unwrap();

        let mut algorithm = GreedyOrdering::new(&model);
        algorithm.set_query(&[grade]).unwrap();
        algorithm.set_evidence(&[(letter, "l0")]).unwrap();
        algorithm.run(CostKind::WeightedMinFill, false);

        let mut names = order_names(&model, &algorithm);
        names.sort();
        assert_eq!(vec!["Difficulty", "Intelligence", "SAT"], names);
    }

}
