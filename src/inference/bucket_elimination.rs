//! Defines the `BucketElimination` engine: exact inference on arbitrary
//! (loopy) factor graphs and joint multi-variable queries.
//!
//! Every inner factor is replaced by its log-factor once, at construction.
//! A run walks the elimination order, collecting each variable's input
//! log-factors into its bucket and summing the variable out with
//! log-sum-exp; the output log-factors cascade into later buckets until
//! only factors over query variables remain, which are combined into the
//! distribution.

use crate::factor::{sum_at, Factor};
use crate::model::FactorGraph;
use crate::util::{PearlError, Result};
use crate::variable::VarId;

use super::bucket::Bucket;
use super::state::FactoredState;
use super::FactoredEngine;

use indexmap::IndexMap;
use log::debug;

pub struct BucketElimination {

    /// The engine's isolated working model; factors are kept in log space
    state: FactoredState,

    /// The installed elimination order, as inner handles
    elimination_order: Option<Vec<VarId>>,

}

impl BucketElimination {

    /// Create the engine over a snapshot of `model` and take the logarithm
    /// of every inner factor.
    pub fn new(model: &FactorGraph) -> BucketElimination {
        let mut state = FactoredState::snapshot(model);
        state.logarithm_factors();

        BucketElimination {
            state,
            elimination_order: None,
        }
    }

    /// Install the elimination order: the sequence in which the non-query,
    /// non-evidential variables will be summed out.
    ///
    /// # Errors
    /// * `PearlError::UnknownVariable` if a handle is not of this model
    /// * `PearlError::DuplicateOrderVariable` on repeated variables
    pub fn set_elimination_order(&mut self, order: &[VarId]) -> Result<()> {
        let mut inner = Vec::with_capacity(order.len());
        for outer in order {
            let id = self.state.inner_of(*outer)?;
            if inner.contains(&id) {
                return Err(PearlError::DuplicateOrderVariable);
            }
            inner.push(id);
        }

        self.elimination_order = Some(inner);
        Ok(())
    }

    pub(crate) fn install_order(&mut self, order: Vec<VarId>) {
        self.elimination_order = Some(order);
    }

    /// The installed elimination order, as outer handles.
    pub fn elimination_order(&self) -> Option<Vec<VarId>> {
        self.elimination_order
            .as_ref()
            .map(|order| order.iter().map(|id| self.state.outer_of(*id)).collect())
    }

    /// The elimination order, the query, and the evidence must partition
    /// the model variables.
    fn check_variable_partition(&self, order: &[VarId]) -> Result<()> {
        let state = &self.state;

        state.check_query_and_evidence()?;
        if order.iter().any(|id| state.query().contains(id)) {
            return Err(PearlError::OrderCoverageInvalid);
        }
        if order.iter().any(|id| state.evidence().contains(id)) {
            return Err(PearlError::OrderCoverageInvalid);
        }

        let covered = order.len() + state.query().len() + state.evidence().len();
        if covered != state.variables().len() {
            return Err(PearlError::OrderCoverageInvalid);
        }
        // pairwise disjointness plus matching cardinality means the three
        // sets cover every variable exactly once, unless a natural
        // singleton domain made an uncovered variable count as evidential
        let mut seen = vec![false; state.variables().len()];
        for id in order.iter().chain(state.query()).chain(state.evidence()) {
            seen[id.0] = true;
        }
        if seen.iter().any(|covered| !covered) {
            return Err(PearlError::OrderCoverageInvalid);
        }

        Ok(())
    }

    /// Compute the joint distribution P(Q₁, ..., Qₛ) of the query, or the
    /// conditional joint distribution P(Q₁, ..., Qₛ | E₁ = e₁, ..., Eₖ = eₖ)
    /// under the current evidence.
    ///
    /// # Errors
    /// * `PearlError::QueryNotSet`, `PearlError::EliminationOrderNotSet`
    /// * `PearlError::QueryEvidenceOverlap`, `PearlError::OrderCoverageInvalid`
    ///   if the order, query, and evidence do not partition the variables
    pub fn run(&mut self, print_info: bool) -> Result<()> {
        self.state.check_non_empty_query()?;
        let order = self
            .elimination_order
            .clone()
            .ok_or(PearlError::EliminationOrderNotSet)?;
        self.check_variable_partition(&order)?;

        self.state.clear_distribution();

        if print_info {
            println!("{}", "*".repeat(40));
            println!("Bucket Elimination started");
        }
        debug!(
            "bucket elimination run over {} buckets",
            order.len() + self.state.query().len()
        );

        let state = &self.state;
        let query = state.query().to_vec();

        // one bucket per elimination and query variable; each log-factor
        // falls into the bucket of the first variable of the sequence that
        // its scope mentions
        let sequence: Vec<VarId> = order.iter().chain(query.iter()).copied().collect();
        let mut buckets: IndexMap<VarId, Bucket> = sequence
            .iter()
            .map(|id| (*id, Bucket::new(*id)))
            .collect();

        let mut added = vec![false; state.factors().len()];
        for &var in &sequence {
            for &factor in state.var(var).factors() {
                if !added[factor.0] {
                    added[factor.0] = true;
                    buckets[&var].add_model_factor(factor);
                }
            }
        }

        // sum out the elimination variables in order; output log-factors
        // cascade into the first later bucket that mentions them
        let mut computed = Vec::new();
        for &var in &order {
            let bucket = &mut buckets[&var];

            let (matching, remaining) = computed
                .into_iter()
                .partition(|f: &Factor| f.variables().contains(&var));
            computed = remaining;
            for factor in matching {
                bucket.add_computed_factor(factor);
            }

            bucket.set_free_variables(state);
            print_bucket(state, bucket, print_info);

            // a bucket without inputs, or whose inputs mention no other
            // variable, sums to a constant that normalization absorbs
            if bucket.has_inputs() && bucket.has_free_variables() {
                let output = bucket.output_log_factor(state)?;
                if print_info {
                    println!("Output: {}", output.name());
                }
                computed.push(output);
            }
        }

        // whatever remains depends on query variables only
        for &var in &query {
            let bucket = &mut buckets[&var];
            let (matching, remaining) = computed
                .into_iter()
                .partition(|f: &Factor| f.variables().contains(&var));
            computed = remaining;
            for factor in matching {
                bucket.add_computed_factor(factor);
            }
            print_bucket(state, bucket, print_info);
        }

        // combine the query buckets into the (normalized) distribution
        let query_inputs: Vec<&Factor> = query
            .iter()
            .flat_map(|var| {
                let bucket = &buckets[var];
                bucket
                    .inputs()
                    .iter()
                    .map(move |input| bucket.input_factor(state, input))
            })
            .collect();

        let mut nn: IndexMap<Vec<String>, f64> = IndexMap::new();
        for assignment in state.assignments(&query) {
            let args: Vec<(VarId, &str)> = query
                .iter()
                .copied()
                .zip(assignment.iter().copied())
                .collect();

            let key: Vec<String> = assignment.iter().map(|v| String::from(*v)).collect();
            nn.insert(key, sum_at(query_inputs.iter().copied(), &args)?.exp());
        }

        self.state.store_normalized(nn);

        if print_info {
            println!("\nBucket Elimination stopped");
            println!("{}", "*".repeat(40));
        }

        Ok(())
    }

}

impl FactoredEngine for BucketElimination {

    fn state(&self) -> &FactoredState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut FactoredState {
        &mut self.state
    }

}


fn print_bucket(state: &FactoredState, bucket: &Bucket, print_info: bool) {
    if !print_info {
        return;
    }

    println!("\nBucket: {}", state.var(bucket.variable()).name());
    for input in bucket.inputs() {
        println!("Input: {}", bucket.input_factor(state, input).name());
    }
    for &var in bucket.free_variables() {
        println!("Free variable: {}", state.var(var).name());
    }
}


// Unit tests. The expected figures are for the Student Bayesian network and
// the Misconception Markov network; see the parent module for definitions.
#[cfg(test)]
mod tests {

    use super::*;
    use crate::inference::tests::{misconception_network, student_network};

    const EPS: f64 = 1e-10;

    #[test]
    fn joint_letter_sat() {
        let model = student_network();
        let difficulty = model.lookup_variable("Difficulty").unwrap();
        let intelligence = model.lookup_variable("Intelligence").unwrap();
        let grade = model.lookup_variable("Grade").unwrap();
        let sat = model.lookup_variable("SAT").unwrap();
        let letter = model.lookup_variable("Letter").unwrap();

        let mut algorithm = BucketElimination::new(&model);
        algorithm.set_query(&[letter, sat]).unwrap();
        algorithm
            .set_elimination_order(&[difficulty, intelligence, grade])
            .unwrap();
        algorithm.run(false).unwrap();

        assert!((algorithm.pd(&["l0", "s0"]).unwrap() - 0.4205178).abs() < EPS);
        assert!((algorithm.pd(&["l0", "s1"]).unwrap() - 0.0771462).abs() < EPS);
        assert!((algorithm.pd(&["l1", "s0"]).unwrap() - 0.3044822).abs() < EPS);
        assert!((algorithm.pd(&["l1", "s1"]).unwrap() - 0.1978538).abs() < EPS);
    }

    #[test]
    fn conditional_joint_difficulty_intelligence() {
        let model = student_network();
        let difficulty = model.lookup_variable("Difficulty").unwrap();
        let intelligence = model.lookup_variable("Intelligence").unwrap();
        let grade = model.lookup_variable("Grade").unwrap();
        let sat = model.lookup_variable("SAT").unwrap();
        let letter = model.lookup_variable("Letter").unwrap();

        let mut algorithm = BucketElimination::new(&model);
        algorithm.set_query(&[difficulty, intelligence]).unwrap();
        algorithm
            .set_evidence(&[(letter, "l1"), (sat, "s1")])
            .unwrap();
        algorithm.set_elimination_order(&[grade]).unwrap();
        algorithm.run(false).unwrap();

        assert!((algorithm.pd(&["d0", "i0"]).unwrap() - 0.0544492953888174).abs() < EPS);
        assert!((algorithm.pd(&["d0", "i1"]).unwrap() - 0.6246066540041182).abs() < EPS);
        assert!((algorithm.pd(&["d1", "i0"]).unwrap() - 0.014293382285303592).abs() < EPS);
        assert!((algorithm.pd(&["d1", "i1"]).unwrap() - 0.3066506683217608).abs() < EPS);
    }

    #[test]
    fn misconception_conditional_joint() {
        let model = misconception_network();
        let alice = model.lookup_variable("Alice").unwrap();
        let bob = model.lookup_variable("Bob").unwrap();
        let charles = model.lookup_variable("Charles").unwrap();
        let debbie = model.lookup_variable("Debbie").unwrap();

        let mut algorithm = BucketElimination::new(&model);
        algorithm.set_query(&[alice, bob]).unwrap();
        algorithm
            .set_evidence(&[(charles, "c0"), (debbie, "d0")])
            .unwrap();
        // every non-query variable is evidential: nothing to sum out
        algorithm.set_elimination_order(&[]).unwrap();
        algorithm.run(false).unwrap();

        assert!((algorithm.pd(&["a0", "b0"]).unwrap() - 0.9979707927214664).abs() < EPS);
        assert!((algorithm.pd(&["a0", "b1"]).unwrap() - 0.0016632846545357773).abs() < EPS);
        assert!((algorithm.pd(&["a1", "b0"]).unwrap() - 0.0003326569309071555).abs() < EPS);
        assert!((algorithm.pd(&["a1", "b1"]).unwrap() - 3.3265693090715545e-05).abs() < EPS);
    }

    #[test]
    fn rerun_is_idempotent() {
        let model = student_network();
        let difficulty = model.lookup_variable("Difficulty").unwrap();
        let intelligence = model.lookup_variable("Intelligence").unwrap();
        let grade = model.lookup_variable("Grade").unwrap();
        let sat = model.lookup_variable("SAT").unwrap();
        let letter = model.lookup_variable("Letter").unwrap();

        let mut algorithm = BucketElimination::new(&model);
        algorithm.set_query(&[letter, sat]).unwrap();
        algorithm
            .set_elimination_order(&[difficulty, intelligence, grade])
            .unwrap();

        algorithm.run(false).unwrap();
        let first = algorithm.pd(&["l1", "s0"]).unwrap();
        algorithm.run(false).unwrap();
        assert_eq!(first, algorithm.pd(&["l1", "s0"]).unwrap());
    }

    #[test]
    fn partition_is_checked() {
        let model = student_network();
        let difficulty = model.lookup_variable("Difficulty").unwrap();
        let intelligence = model.lookup_variable("Intelligence").unwrap();
        let grade = model.lookup_variable("Grade").unwrap();
        let sat = model.lookup_variable("SAT").unwrap();
        let letter = model.lookup_variable("Letter").unwrap();

        let mut algorithm = BucketElimination::new(&model);

        assert_eq!(PearlError::QueryNotSet, algorithm.run(false).unwrap_err());

        algorithm.set_query(&[letter, sat]).unwrap();
        assert_eq!(
            PearlError::EliminationOrderNotSet,
            algorithm.run(false).unwrap_err()
        );

        // the order misses Grade
        algorithm
            .set_elimination_order(&[difficulty, intelligence])
            .unwrap();
        assert_eq!(
            PearlError::OrderCoverageInvalid,
            algorithm.run(false).unwrap_err()
        );

        // the order contains a query variable
        algorithm
            .set_elimination_order(&[difficulty, intelligence, grade, letter])
            .unwrap();
        assert_eq!(
            PearlError::OrderCoverageInvalid,
            algorithm.run(false).unwrap_err()
        );

        // the order contains an evidential variable
        algorithm.set_query(&[letter]).unwrap();
        algorithm.set_evidence(&[(sat, "s0")]).unwrap();
        algorithm
            .set_elimination_order(&[difficulty, intelligence, grade, sat])
            .unwrap();
        assert_eq!(
            PearlError::OrderCoverageInvalid,
            algorithm.run(false).unwrap_err()
        );

        // repeated order entries are rejected when the order is set
        assert_eq!(
            PearlError::DuplicateOrderVariable,
            algorithm
                .set_elimination_order(&[difficulty, difficulty])
                .unwrap_err()
        );
    }

}
