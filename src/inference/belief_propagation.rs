//! Defines the `BeliefPropagation` engine: exact single-variable inference
//! on factor-graph trees by log-space message passing.
//!
//! Messages propagate from the leaves towards the query variable; the run
//! stops once the query has received a message from every adjacent factor.
//! Computed messages are memoized per evidence, so a rerun under the same
//! evidence is answered from the cache. A graph with a cycle starves the
//! frontier before the query is reached and is reported as `NotATree`.

use crate::factor::FactorId;
use crate::model::FactorGraph;
use crate::util::{kahan_sum, PearlError, Result};
use crate::variable::VarId;

use super::messages::{Message, MessageStore, Node};
use super::state::{EvidenceKey, FactoredState};
use super::FactoredEngine;

use indexmap::IndexMap;
use log::debug;

use std::collections::HashMap;
use std::mem;

pub struct BeliefPropagation {

    /// The engine's isolated working model
    state: FactoredState,

    /// Factor-to-variable message cache, one store per evidence
    factor_to_variable: HashMap<EvidenceKey, MessageStore>,

    /// Variable-to-factor message cache, one store per evidence
    variable_to_factor: HashMap<EvidenceKey, MessageStore>,

}

/// Per-run bookkeeping of the message propagation front.
struct Propagation {
    passed_variables: Vec<bool>,
    passed_factors: Vec<bool>,
    incoming_variables: Vec<usize>,
    incoming_factors: Vec<usize>,
    next_variables: Vec<VarId>,
    next_factors: Vec<FactorId>,
}

impl Propagation {

    fn new(state: &FactoredState) -> Propagation {
        Propagation {
            passed_variables: vec![false; state.variables().len()],
            passed_factors: vec![false; state.factors().len()],
            incoming_variables: vec![0; state.variables().len()],
            incoming_factors: vec![0; state.factors().len()],
            next_variables: Vec::new(),
            next_factors: Vec::new(),
        }
    }

    /// Record that `from` emitted its message towards `to`. When all of
    /// `to`'s messages except one have arrived, `to` joins the frontier;
    /// the query variable never does, propagation stops there.
    fn factor_passed(&mut self, from: FactorId, to: VarId, state: &FactoredState, query: VarId) {
        self.passed_factors[from.0] = true;
        self.incoming_variables[to.0] += 1;
        if to != query && self.incoming_variables[to.0] + 1 == state.var(to).factors().len() {
            self.next_variables.push(to);
        }
    }

    fn variable_passed(&mut self, from: VarId, to: FactorId, state: &FactoredState) {
        self.passed_variables[from.0] = true;
        self.incoming_factors[to.0] += 1;
        if self.incoming_factors[to.0] + 1 == state.factor(to).variables().len() {
            self.next_factors.push(to);
        }
    }

}

impl BeliefPropagation {

    /// Create the engine over a snapshot of `model`.
    pub fn new(model: &FactorGraph) -> BeliefPropagation {
        BeliefPropagation {
            state: FactoredState::snapshot(model),
            factor_to_variable: HashMap::new(),
            variable_to_factor: HashMap::new(),
        }
    }

    /// Drop all cached messages, for every evidence they were computed
    /// under.
    pub fn clear_cached_messages(&mut self) {
        self.factor_to_variable.clear();
        self.variable_to_factor.clear();
    }

    /// Compute the marginal distribution P(Q) of the query variable, or the
    /// conditional distribution P(Q | E₁ = e₁, ..., Eₖ = eₖ) under the
    /// current evidence.
    ///
    /// # Errors
    /// * `PearlError::QueryNotSet`, `PearlError::NotSingleVariableQuery`,
    ///   `PearlError::QueryEvidenceOverlap` on invalid configuration
    /// * `PearlError::NotATree` if message passing cannot reach the query
    pub fn run(&mut self, print_info: bool) -> Result<()> {
        self.state.check_non_empty_query()?;
        self.state.check_query_and_evidence()?;
        self.state.check_one_variable_query()?;
        let query = self.state.query()[0];

        self.state.clear_distribution();

        let key = self.state.evidence_key();
        debug!(
            "belief propagation run, evidence key of {} entries, cache {}",
            key.len(),
            if self.factor_to_variable.contains_key(&key) { "hit" } else { "miss" }
        );
        let f2v = self.factor_to_variable.entry(key.clone()).or_default();
        let v2f = self.variable_to_factor.entry(key).or_default();
        let state = &self.state;

        if print_info {
            println!("{}", "*".repeat(40));
            println!("Belief Propagation started");
        }

        let mut propagation = Propagation::new(state);

        // messages from factor leaves
        for (idx, factor) in state.factors().iter().enumerate() {
            if !factor.is_leaf() {
                continue;
            }
            let from = FactorId(idx);
            let to = factor.variables()[0];
            if !f2v.contains(Node::Factor(from), Node::Variable(to)) {
                let message = leaf_factor_message(state, from, to)?;
                print_message(state, &message, print_info);
                f2v.cache(message);
            }
            propagation.factor_passed(from, to, state, query);
        }

        // messages from variable leaves; the query keeps its messages
        for (idx, variable) in state.variables().iter().enumerate() {
            let from = VarId(idx);
            if !variable.is_leaf() || from == query {
                continue;
            }
            let to = variable.factors()[0];
            if !v2f.contains(Node::Variable(from), Node::Factor(to)) {
                let message = zero_variable_message(state, from, to);
                print_message(state, &message, print_info);
                v2f.cache(message);
            }
            propagation.variable_passed(from, to, state);
        }

        // propagate towards the query until it has heard from all of its
        // factors
        let mut loop_passing = 0;
        while propagation.incoming_variables[query.0] < state.var(query).factors().len() {
            if propagation.next_factors.is_empty() && propagation.next_variables.is_empty() {
                return Err(PearlError::NotATree);
            }

            loop_passing += 1;
            if print_info {
                println!("\nloop passing: {}\n", loop_passing);
            }

            let from_factors = mem::take(&mut propagation.next_factors);
            let from_variables = mem::take(&mut propagation.next_variables);

            for from in from_factors {
                let to = single_non_passed_variable(state, &propagation, from)?;
                if !f2v.contains(Node::Factor(from), Node::Variable(to)) {
                    let message = factor_to_variable_message(state, v2f, from, to)?;
                    print_message(state, &message, print_info);
                    f2v.cache(message);
                }
                propagation.factor_passed(from, to, state, query);
            }

            for from in from_variables {
                let to = single_non_passed_factor(state, &propagation, from)?;
                if !v2f.contains(Node::Variable(from), Node::Factor(to)) {
                    let message = variable_to_factor_message(state, f2v, from, to)?;
                    print_message(state, &message, print_info);
                    v2f.cache(message);
                }
                propagation.variable_passed(from, to, state);
            }
        }

        // combine the incoming messages into the (normalized) distribution
        let mut nn: IndexMap<Vec<String>, f64> = IndexMap::new();
        for value in state.var(query).domain() {
            let mut terms = Vec::with_capacity(state.var(query).factors().len());
            for factor in state.var(query).factors() {
                let message = f2v.get(Node::Factor(*factor), Node::Variable(query))?;
                terms.push(message.value(value)?);
            }
            nn.insert(vec![value.clone()], kahan_sum(terms).exp());
        }

        self.state.store_normalized(nn);

        if print_info {
            println!("\nBelief Propagation stopped");
            println!("{}", "*".repeat(40));
        }

        Ok(())
    }

}

impl FactoredEngine for BeliefPropagation {

    fn state(&self) -> &FactoredState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut FactoredState {
        &mut self.state
    }

}


/// The frontier invariant on a tree: a node emits towards its single
/// neighbor that has not itself emitted yet. Anything else means a cycle.
fn single_non_passed_variable(
    state: &FactoredState,
    propagation: &Propagation,
    from: FactorId,
) -> Result<VarId> {
    let mut non_passed = state
        .factor(from)
        .variables()
        .iter()
        .copied()
        .filter(|v| !propagation.passed_variables[v.0]);

    match (non_passed.next(), non_passed.next()) {
        (Some(to), None) => Ok(to),
        _ => Err(PearlError::NotATree),
    }
}

fn single_non_passed_factor(
    state: &FactoredState,
    propagation: &Propagation,
    from: VarId,
) -> Result<FactorId> {
    let mut non_passed = state
        .var(from)
        .factors()
        .iter()
        .copied()
        .filter(|f| !propagation.passed_factors[f.0]);

    match (non_passed.next(), non_passed.next()) {
        (Some(to), None) => Ok(to),
        _ => Err(PearlError::NotATree),
    }
}

/// `m_{f→v}(x) = ln φ_f(x)` for a leaf factor.
fn leaf_factor_message(state: &FactoredState, from: FactorId, to: VarId) -> Result<Message> {
    let factor = state.factor(from);

    let mut values = IndexMap::new();
    for value in state.var(to).domain() {
        values.insert(value.clone(), factor.eval(&[(to, value.as_str())])?.ln());
    }

    Ok(Message::new(Node::Factor(from), Node::Variable(to), values))
}

/// `m_{v→f}(x) = 0` for a leaf variable.
fn zero_variable_message(state: &FactoredState, from: VarId, to: FactorId) -> Message {
    let values = state
        .var(from)
        .domain()
        .iter()
        .map(|value| (value.clone(), 0.0))
        .collect();

    Message::new(Node::Variable(from), Node::Factor(to), values)
}

/// The non-leaf factor-to-variable message.
///
/// The evidential neighbors contribute a constant sum of their messages at
/// their bound values. The free neighbors are summed out with the pointwise
/// maximum `M` of their incoming messages factored out as the log-sum-exp
/// stabilizer:
///
/// `m_{f→v}(x) = S_E + M + ln Σ_a φ_f(a, e, v=x) · exp(Σ m_{v'→f}(a[v']) − M)`
fn factor_to_variable_message(
    state: &FactoredState,
    v2f: &MessageStore,
    from: FactorId,
    to: VarId,
) -> Result<Message> {
    let factor = state.factor(from);

    let mut evidential = Vec::new();
    let mut free = Vec::new();
    for &neighbor in factor.variables() {
        if neighbor == to {
            continue;
        }
        if state.var(neighbor).is_evidential() {
            evidential.push(neighbor);
        } else {
            free.push(neighbor);
        }
    }

    // the evidential neighbors are summed out separately
    let mut evidential_terms = Vec::with_capacity(evidential.len());
    let mut evidential_args: Vec<(VarId, &str)> = Vec::with_capacity(evidential.len());
    for &neighbor in &evidential {
        let message = v2f.get(Node::Variable(neighbor), Node::Factor(from))?;
        let value = state.var(neighbor).domain()[0].as_str();
        evidential_terms.push(message.value(value)?);
        evidential_args.push((neighbor, value));
    }
    let evidential_sum = kahan_sum(evidential_terms);

    let free_messages: Vec<&Message> = free
        .iter()
        .map(|&neighbor| v2f.get(Node::Variable(neighbor), Node::Factor(from)))
        .collect::<Result<_>>()?;

    // the stabilizer: the maximum incoming free message value
    let mut max_message = 0.0;
    if !free_messages.is_empty() {
        max_message = f64::NEG_INFINITY;
        for message in &free_messages {
            for value in message.values().values() {
                max_message = max_message.max(*value);
            }
        }
    }

    let mut values = IndexMap::new();
    for value in state.var(to).domain() {
        let mut terms = Vec::new();
        for assignment in state.assignments(&free) {
            let mut args: Vec<(VarId, &str)> = free
                .iter()
                .copied()
                .zip(assignment.iter().copied())
                .collect();
            args.extend(evidential_args.iter().copied());
            args.push((to, value.as_str()));

            let mut message_terms = Vec::with_capacity(free_messages.len());
            for (message, assigned) in free_messages.iter().zip(assignment.iter()) {
                message_terms.push(message.value(assigned)?);
            }

            terms.push(factor.eval(&args)? * (kahan_sum(message_terms) - max_message).exp());
        }
        values.insert(
            value.clone(),
            evidential_sum + max_message + kahan_sum(terms).ln(),
        );
    }

    Ok(Message::new(Node::Factor(from), Node::Variable(to), values))
}

/// The non-leaf variable-to-factor message:
/// `m_{v→f}(x) = Σ_{f' ≠ f} m_{f'→v}(x)`.
fn variable_to_factor_message(
    state: &FactoredState,
    f2v: &MessageStore,
    from: VarId,
    to: FactorId,
) -> Result<Message> {
    let mut values = IndexMap::new();
    for value in state.var(from).domain() {
        let mut terms = Vec::new();
        for &factor in state.var(from).factors() {
            if factor == to {
                continue;
            }
            let message = f2v.get(Node::Factor(factor), Node::Variable(from))?;
            terms.push(message.value(value)?);
        }
        values.insert(value.clone(), kahan_sum(terms));
    }

    Ok(Message::new(Node::Variable(from), Node::Factor(to), values))
}

fn print_message(state: &FactoredState, message: &Message, print_info: bool) {
    if !print_info {
        return;
    }

    let name = |node: Node| match node {
        Node::Variable(v) => state.var(v).name().to_string(),
        Node::Factor(f) => state.factor(f).name().to_string(),
    };
    println!("Message: {} -> {}", name(message.from_node()), name(message.to_node()));
    println!("logarithmic message values: {:?}", message.values());
}


// Unit tests. The expected figures are for the Student Bayesian network;
// see the parent module for the network definition.
#[cfg(test)]
mod tests {

    use super::*;
    use crate::inference::tests::{misconception_network, student_network};

    const EPS: f64 = 1e-10;

    #[test]
    fn marginal_grade() {
        let model = student_network();
        let grade = model.lookup_variable("Grade").unwrap();

        let mut algorithm = BeliefPropagation::new(&model);
        algorithm.set_query(&[grade]).unwrap();
        algorithm.run(false).unwrap();

        assert!((algorithm.pd(&["g0"]).unwrap() - 0.362).abs() < EPS);
        assert!((algorithm.pd(&["g1"]).unwrap() - 0.2884).abs() < EPS);
        assert!((algorithm.pd(&["g2"]).unwrap() - 0.3496).abs() < EPS);
    }

    #[test]
    fn marginal_letter() {
        let model = student_network();
        let letter = model.lookup_variable("Letter").unwrap();

        let mut algorithm = BeliefPropagation::new(&model);
        algorithm.set_query(&[letter]).unwrap();
        algorithm.run(false).unwrap();

        assert!((algorithm.pd(&["l0"]).unwrap() - 0.497664).abs() < EPS);
        assert!((algorithm.pd(&["l1"]).unwrap() - 0.502336).abs() < EPS);
    }

    #[test]
    fn conditional_difficulty() {
        let model = student_network();
        let difficulty = model.lookup_variable("Difficulty").unwrap();
        let letter = model.lookup_variable("Letter").unwrap();
        let sat = model.lookup_variable("SAT").unwrap();

        let mut algorithm = BeliefPropagation::new(&model);
        algorithm.set_query(&[difficulty]).unwrap();
        algorithm.set_evidence(&[(letter, "l0"), (sat, "s0")]).unwrap();
        algorithm.run(false).unwrap();

        assert!((algorithm.pd(&["d0"]).unwrap() - 0.474219640643).abs() < EPS);
        assert!((algorithm.pd(&["d1"]).unwrap() - 0.525780359357).abs() < EPS);
    }

    #[test]
    fn evidence_changes_are_cached_separately() {
        let model = student_network();
        let difficulty = model.lookup_variable("Difficulty").unwrap();
        let letter = model.lookup_variable("Letter").unwrap();
        let sat = model.lookup_variable("SAT").unwrap();

        let mut algorithm = BeliefPropagation::new(&model);
        algorithm.set_query(&[difficulty]).unwrap();

        algorithm.set_evidence(&[(letter, "l0"), (sat, "s0")]).unwrap();
        algorithm.run(false).unwrap();
        let conditioned = algorithm.pd(&["d0"]).unwrap();

        algorithm.set_evidence(&[]).unwrap();
        algorithm.run(false).unwrap();
        assert!((algorithm.pd(&["d0"]).unwrap() - 0.6).abs() < EPS);

        // back to the first evidence: answered from the message cache
        algorithm.set_evidence(&[(letter, "l0"), (sat, "s0")]).unwrap();
        algorithm.run(false).unwrap();
        assert!((algorithm.pd(&["d0"]).unwrap() - conditioned).abs() < EPS);
    }

    #[test]
    fn cache_clearing_preserves_results() {
        let model = student_network();
        let grade = model.lookup_variable("Grade").unwrap();

        let mut algorithm = BeliefPropagation::new(&model);
        algorithm.set_query(&[grade]).unwrap();
        algorithm.run(false).unwrap();
        let before = algorithm.pd(&["g1"]).unwrap();

        algorithm.clear_cached_messages();
        algorithm.run(false).unwrap();
        assert!((algorithm.pd(&["g1"]).unwrap() - before).abs() < EPS);
    }

    #[test]
    fn loopy_graph_is_rejected() {
        let model = misconception_network();
        let alice = model.lookup_variable("Alice").unwrap();

        let mut algorithm = BeliefPropagation::new(&model);
        algorithm.set_query(&[alice]).unwrap();

        assert_eq!(PearlError::NotATree, algorithm.run(false).unwrap_err());
        assert_eq!(
            PearlError::DistributionNotComputed,
            algorithm.pd(&["a0"]).unwrap_err()
        );
    }

    #[test]
    fn configuration_errors() {
        let model = student_network();
        let grade = model.lookup_variable("Grade").unwrap();
        let sat = model.lookup_variable("SAT").unwrap();

        let mut algorithm = BeliefPropagation::new(&model);
        assert_eq!(PearlError::QueryNotSet, algorithm.run(false).unwrap_err());

        algorithm.set_query(&[grade, sat]).unwrap();
        assert_eq!(
            PearlError::NotSingleVariableQuery,
            algorithm.run(false).unwrap_err()
        );

        algorithm.set_query(&[sat]).unwrap();
        algorithm.set_evidence(&[(sat, "s0")]).unwrap();
        assert_eq!(
            PearlError::QueryEvidenceOverlap,
            algorithm.run(false).unwrap_err()
        );
    }

}
