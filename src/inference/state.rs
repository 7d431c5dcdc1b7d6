//! Defines `FactoredState`, the working state shared by every factored
//! inference engine: an isolated snapshot of the caller's factor graph, the
//! query/evidence controller, and the computed distribution.
//!
//! # Snapshot isolation
//! Evidence is encoded by narrowing a variable's domain to a single value.
//! To keep that mutation away from the caller's model, an engine owns an
//! *inner* copy of every variable and factor; the outer model is read once
//! at construction and never touched again. The full domains are copied at
//! snapshot time as well, so restoring an evidential variable never reads
//! the outer model.

use crate::factor::{Factor, FactorId};
use crate::model::FactorGraph;
use crate::util::{kahan_sum, PearlError, Result};
use crate::variable::{evaluate_variables, VarId, Variable};

use bidir_map::BidirMap;
use indexmap::IndexMap;
use log::debug;

/// The canonical cache key for a set of evidence: the evidential inner
/// variables with their bound values, sorted by variable name.
pub type EvidenceKey = Vec<(VarId, String)>;

/// The inner model and query/evidence state of a factored algorithm.
pub struct FactoredState {

    /// Inner variables, sorted by name
    variables: Vec<Variable>,

    /// Inner factors, sorted by name
    factors: Vec<Factor>,

    /// Each inner variable's full domain as of snapshot time
    full_domains: Vec<Vec<String>>,

    /// Bijection between outer handles and inner handles
    outer_to_inner: BidirMap<VarId, VarId>,

    /// The query, as inner handles sorted by name
    query: Vec<VarId>,

    /// The evidential variables, as inner handles sorted by name
    evidence: Vec<VarId>,

    /// The probability distribution computed by the last successful run
    distribution: Option<IndexMap<Vec<String>, f64>>,

}

impl FactoredState {

    /// Take an isolated snapshot of `model`.
    ///
    /// Inner variables and factors are sorted by name so that every
    /// iteration an engine performs is deterministic.
    pub fn snapshot(model: &FactorGraph) -> FactoredState {
        let mut variable_order: Vec<usize> = (0..model.variables().len()).collect();
        variable_order.sort_by(|&a, &b| {
            model.variables()[a].name().cmp(model.variables()[b].name())
        });

        let mut variables = Vec::with_capacity(variable_order.len());
        let mut outer_to_inner = BidirMap::new();
        for (inner_idx, &outer_idx) in variable_order.iter().enumerate() {
            let outer = &model.variables()[outer_idx];
            let mut inner = Variable::new(
                outer.name(),
                &outer.domain().iter().map(String::as_str).collect::<Vec<_>>(),
            );
            inner.clear_factors();
            variables.push(inner);
            outer_to_inner.insert(VarId(outer_idx), VarId(inner_idx));
        }

        let mut factor_order: Vec<usize> = (0..model.factors().len()).collect();
        factor_order.sort_by(|&a, &b| {
            model.factors()[a].name().cmp(model.factors()[b].name())
        });

        let mut factors = Vec::with_capacity(factor_order.len());
        for (inner_idx, &outer_idx) in factor_order.iter().enumerate() {
            let outer = &model.factors()[outer_idx];
            let scope: Vec<VarId> = outer
                .variables()
                .iter()
                .map(|outer_var| {
                    // every scope variable belongs to the model by construction
                    *outer_to_inner.get_by_first(outer_var).expect("scope variable in model")
                })
                .collect();

            for var in &scope {
                variables[var.0].link_factor(FactorId(inner_idx));
            }

            factors.push(outer.with_scope(scope));
        }

        let full_domains = variables.iter().map(|v| v.domain().to_vec()).collect();

        debug!(
            "snapshot of factor graph: {} variables, {} factors",
            variables.len(),
            factors.len()
        );

        FactoredState {
            variables,
            factors,
            full_domains,
            outer_to_inner,
            query: Vec::new(),
            evidence: Vec::new(),
            distribution: None,
        }
    }

    /// The inner variables, sorted by name.
    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    /// The inner factors, sorted by name.
    pub fn factors(&self) -> &[Factor] {
        &self.factors
    }

    pub(crate) fn var(&self, id: VarId) -> &Variable {
        &self.variables[id.0]
    }

    pub(crate) fn factor(&self, id: FactorId) -> &Factor {
        &self.factors[id.0]
    }

    /// Translate an outer handle to the inner handle of the same variable.
    pub(crate) fn inner_of(&self, outer: VarId) -> Result<VarId> {
        self.outer_to_inner
            .get_by_first(&outer)
            .copied()
            .ok_or_else(|| PearlError::UnknownVariable(outer.to_string()))
    }

    /// Translate an inner handle back to the caller's outer handle.
    pub(crate) fn outer_of(&self, inner: VarId) -> VarId {
        *self
            .outer_to_inner
            .get_by_second(&inner)
            .expect("inner handle created by this snapshot")
    }

    /// The query, as inner handles sorted by name.
    pub fn query(&self) -> &[VarId] {
        &self.query
    }

    /// The evidential variables, as inner handles sorted by name.
    pub fn evidence(&self) -> &[VarId] {
        &self.evidence
    }

    /// Set the query, replacing any previous one. An empty slice clears the
    /// query.
    ///
    /// # Errors
    /// * `PearlError::UnknownVariable` if a handle is not of this model
    /// * `PearlError::DuplicateQueryVariable` on repeated variables
    ///
    /// On error the previous query is left unchanged.
    pub fn set_query(&mut self, query: &[VarId]) -> Result<()> {
        if query.is_empty() {
            self.query.clear();
            return Ok(());
        }

        let mut inner = Vec::with_capacity(query.len());
        for outer in query {
            let id = self.inner_of(*outer)?;
            if inner.contains(&id) {
                return Err(PearlError::DuplicateQueryVariable);
            }
            inner.push(id);
        }
        inner.sort_by(|a, b| self.var(*a).name().cmp(self.var(*b).name()));

        self.query = inner;
        Ok(())
    }

    /// Set the evidence, replacing any previous one. An empty slice clears
    /// the evidence.
    ///
    /// The domains of previously evidential variables are restored first, so
    /// successive calls never accumulate. Each evidential variable's domain
    /// is then narrowed to its observed value and the value is bound on
    /// every factor referencing the variable.
    ///
    /// # Errors
    /// * `PearlError::UnknownVariable` if a handle is not of this model
    /// * `PearlError::DuplicateEvidence` on repeated variables
    /// * `PearlError::ValueOutOfDomain` if a value is not in the variable's
    ///   full domain
    ///
    /// On error the evidence is reset to empty and all domains are restored.
    pub fn set_evidence(&mut self, evidence: &[(VarId, &str)]) -> Result<()> {
        self.clear_evidence();
        if evidence.is_empty() {
            return Ok(());
        }

        // validate before mutating anything
        let mut pairs: Vec<(VarId, &str)> = Vec::with_capacity(evidence.len());
        for (outer, value) in evidence {
            let id = self.inner_of(*outer)?;
            if pairs.iter().any(|(seen, _)| *seen == id) {
                return Err(PearlError::DuplicateEvidence);
            }
            self.var(id).check_value(value)?;
            pairs.push((id, value));
        }
        pairs.sort_by(|a, b| self.var(a.0).name().cmp(self.var(b.0).name()));

        for (id, value) in pairs {
            self.variables[id.0].set_domain(vec![String::from(value)]);
            for factor in self.variables[id.0].factors().to_vec() {
                self.factors[factor.0].add_evidence(id, value);
            }
            self.evidence.push(id);
        }

        Ok(())
    }

    /// Replace every inner factor by its log-factor in place. Bucket
    /// elimination does this once, at construction.
    pub(crate) fn logarithm_factors(&mut self) {
        for factor in &mut self.factors {
            factor.logarithm();
        }
    }

    /// Restore the full domains of all evidential variables, remove their
    /// bindings from the factors, and clear the evidence.
    pub fn clear_evidence(&mut self) {
        for id in std::mem::take(&mut self.evidence) {
            let domain = self.full_domains[id.0].clone();
            self.variables[id.0].set_domain(domain);
            for factor in self.variables[id.0].factors().to_vec() {
                self.factors[factor.0].delete_evidence(id);
            }
        }
    }

    /// The canonical evidence key used by the message and order caches.
    pub fn evidence_key(&self) -> EvidenceKey {
        self.evidence
            .iter()
            .map(|id| (*id, self.var(*id).domain()[0].clone()))
            .collect()
    }

    /// The elimination variables: every variable that is neither in the
    /// query nor evidential.
    pub fn elimination_variables(&self) -> Vec<VarId> {
        (0..self.variables.len())
            .map(VarId)
            .filter(|id| !self.query.contains(id) && !self.variables[id.0].is_evidential())
            .collect()
    }

    pub fn check_non_empty_query(&self) -> Result<()> {
        if self.query.is_empty() {
            Err(PearlError::QueryNotSet)
        } else {
            Ok(())
        }
    }

    pub fn check_one_variable_query(&self) -> Result<()> {
        if self.query.len() != 1 {
            Err(PearlError::NotSingleVariableQuery)
        } else {
            Ok(())
        }
    }

    /// The query and evidence variable sets must be disjoint.
    pub fn check_query_and_evidence(&self) -> Result<()> {
        if self.query.iter().any(|id| self.evidence.contains(id)) {
            Err(PearlError::QueryEvidenceOverlap)
        } else {
            Ok(())
        }
    }

    /// Enumerate the joint assignments of `vars` (inner handles) in order.
    pub(crate) fn assignments(&self, vars: &[VarId]) -> Box<dyn Iterator<Item = Vec<&str>> + '_> {
        let vars: Vec<&Variable> = vars.iter().map(|id| self.var(*id)).collect();
        evaluate_variables(&vars)
    }

    pub(crate) fn set_distribution(&mut self, distribution: IndexMap<Vec<String>, f64>) {
        self.distribution = Some(distribution);
    }

    pub(crate) fn clear_distribution(&mut self) {
        self.distribution = None;
    }

    /// Normalize the non-normalized values `nn` (keyed by query assignment,
    /// in enumeration order) into the stored distribution.
    pub(crate) fn store_normalized(&mut self, nn: IndexMap<Vec<String>, f64>) {
        let norm = kahan_sum(nn.values().copied());
        let distribution = nn.into_iter().map(|(k, v)| (k, v / norm)).collect();
        self.set_distribution(distribution);
    }

    /// The distribution computed by the last successful run, keyed by the
    /// query assignments in enumeration order.
    pub fn distribution(&self) -> Result<&IndexMap<Vec<String>, f64>> {
        self.distribution
            .as_ref()
            .ok_or(PearlError::DistributionNotComputed)
    }

    /// The probability of a specific joint query assignment.
    ///
    /// The order of values must correspond to the order of variables in the
    /// query. For example, if the query was set to (Difficulty,
    /// Intelligence), then `pd(&["d0", "i1"])` returns the probability of
    /// Difficulty = "d0" and Intelligence = "i1".
    pub fn pd(&self, values: &[&str]) -> Result<f64> {
        let distribution = self.distribution()?;

        if values.len() != self.query.len() {
            return Err(PearlError::ArityMismatch {
                expected: self.query.len(),
                actual: values.len(),
            });
        }
        for (id, value) in self.query.iter().zip(values.iter()) {
            self.var(*id).check_value(value)?;
        }

        let key: Vec<String> = values.iter().map(|v| String::from(*v)).collect();
        distribution
            .get(&key)
            .copied()
            .ok_or_else(|| PearlError::General(format!("no entry for {:?}", key)))
    }

    /// Print the complete probability distribution of the query variables.
    pub fn print_pd(&self) -> Result<()> {
        self.distribution()?;

        let evidence_str = if self.evidence.is_empty() {
            String::new()
        } else {
            let pairs: Vec<String> = self
                .evidence
                .iter()
                .map(|id| format!("{} = {:?}", self.var(*id).name(), self.var(*id).domain()[0]))
                .collect();
            format!(" | {}", pairs.join(", "))
        };

        for values in self.assignments(&self.query.clone()) {
            let query_str: Vec<String> = self
                .query
                .iter()
                .zip(values.iter())
                .map(|(id, value)| format!("{} = {:?}", self.var(*id).name(), value))
                .collect();
            let p = self.pd(&values)?;
            println!("P({}{}) = {}", query_str.join(", "), evidence_str, p);
        }

        Ok(())
    }

    /// Print a one-line summary of the query.
    pub fn print_query(&self) {
        if self.query.is_empty() {
            println!("No query");
        } else {
            let names: Vec<&str> = self.query.iter().map(|id| self.var(*id).name()).collect();
            println!("Query: {}", names.join(", "));
        }
    }

    /// Print a one-line summary of the evidence.
    pub fn print_evidence(&self) {
        if self.evidence.is_empty() {
            println!("No evidence");
        } else {
            let pairs: Vec<String> = self
                .evidence
                .iter()
                .map(|id| format!("{} = {:?}", self.var(*id).name(), self.var(*id).domain()[0]))
                .collect();
            println!("Evidence: {}", pairs.join(", "));
        }
    }

}
