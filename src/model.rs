//! Defines a `FactorGraph`, the bipartite model of variables and factors
//! over which the inference engines operate.
//!
//! # Representation
//! The graph does not use an explicit graph data structure. Variables and
//! factors live in two flat containers and reference each other by index:
//! each factor holds the `VarId`s of its scope and each variable holds the
//! `FactorId`s of the factors referencing it. The handles returned by the
//! builder are the caller's way of naming variables in queries and evidence.

use crate::factor::{Factor, FactorId};
use crate::util::{PearlError, Result};
use crate::variable::{evaluate_variables, VarId, Variable};

/// A factor graph: the outer, caller-owned model.
///
/// Inference engines never mutate a `FactorGraph`; they take an isolated
/// snapshot of it at construction time.
#[derive(Debug)]
pub struct FactorGraph {

    /// The `Variable`s of the graph
    variables: Vec<Variable>,

    /// The `Factor`s of the graph
    factors: Vec<Factor>,

}

impl FactorGraph {

    /// Lookup a `Variable` handle by name.
    pub fn lookup_variable(&self, name: &str) -> Option<VarId> {
        self.variables
            .iter()
            .position(|v| v.name() == name)
            .map(VarId)
    }

    /// Lookup a `Factor` handle by name.
    pub fn lookup_factor(&self, name: &str) -> Option<FactorId> {
        self.factors
            .iter()
            .position(|f| f.name() == name)
            .map(FactorId)
    }

    /// Get a `Variable` by handle.
    pub fn variable(&self, id: VarId) -> Option<&Variable> {
        self.variables.get(id.0)
    }

    /// Get a `Factor` by handle.
    pub fn factor(&self, id: FactorId) -> Option<&Factor> {
        self.factors.get(id.0)
    }

    /// All `Variable`s of the graph.
    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    /// All `Factor`s of the graph.
    pub fn factors(&self) -> &[Factor] {
        &self.factors
    }

    /// Get the number of `Variable`s in the graph.
    pub fn num_variables(&self) -> usize {
        self.variables.len()
    }

}


/// An implementation of the [builder pattern] for creating a `FactorGraph`.
///
/// Errors encountered while adding variables and factors are deferred and
/// reported by `build`, so model definitions read as a flat sequence of
/// declarations.
///
/// [builder pattern]: https://en.wikipedia.org/wiki/Builder_pattern
pub struct FactorGraphBuilder {

    /// The `Variable`s added so far
    variables: Vec<Variable>,

    /// The `Factor`s added so far
    factors: Vec<Factor>,

    /// The error state of the builder, if any
    err: Option<PearlError>,

}

impl FactorGraphBuilder {

    /// Construct a new `FactorGraphBuilder`
    pub fn new() -> FactorGraphBuilder {
        FactorGraphBuilder {
            variables: Vec::new(),
            factors: Vec::new(),
            err: None,
        }
    }

    /// Declare a `Variable` with the given name and value domain.
    ///
    /// The domain is sorted and deduplicated. The returned handle names the
    /// variable in factor scopes, queries, and evidence.
    pub fn add_variable(&mut self, name: &str, domain: &[&str]) -> VarId {
        let id = VarId(self.variables.len());

        if self.err.is_none() {
            if self.variables.iter().any(|v| v.name() == name) {
                self.err = Some(PearlError::DuplicateVariable(String::from(name)));
            } else if domain.is_empty() {
                self.err = Some(PearlError::InvalidScope(format!(
                    "variable {:?} must have a non-empty domain",
                    name
                )));
            }
        }

        self.variables.push(Variable::new(name, domain));
        id
    }

    /// Add a `Factor` over `scope` with the given strictly positive function.
    ///
    /// The function receives the values of the scope variables in declared
    /// order. Strict positivity over the full joint domain is verified by
    /// `build`.
    pub fn add_factor<F>(&mut self, name: &str, scope: &[VarId], function: F)
    where
        F: Fn(&[&str]) -> f64 + 'static,
    {
        if self.err.is_none() {
            if scope.is_empty() {
                self.err = Some(PearlError::InvalidScope(format!(
                    "factor {:?} must have a non-empty scope",
                    name
                )));
            } else if scope.iter().any(|id| id.0 >= self.variables.len()) {
                self.err = Some(PearlError::InvalidScope(format!(
                    "factor {:?} references a variable outside the model",
                    name
                )));
            } else if (1..scope.len()).any(|i| scope[i..].contains(&scope[i - 1])) {
                self.err = Some(PearlError::InvalidScope(format!(
                    "factor {:?} must not repeat a variable in its scope",
                    name
                )));
            } else if self.factors.iter().any(|f| f.name() == name) {
                self.err = Some(PearlError::DuplicateVariable(String::from(name)));
            }
        }

        if self.err.is_some() {
            return;
        }

        let id = FactorId(self.factors.len());
        for var in scope {
            self.variables[var.0].link_factor(id);
        }

        self.factors.push(Factor::new(name, scope.to_vec(), function));
    }

    /// Build the `FactorGraph`, ensuring consistency of the `Factor`s and
    /// `Variable`s.
    ///
    /// # Errors
    /// * any error deferred while adding variables and factors
    /// * `PearlError::InvalidScope` if a variable is referenced by no factor
    /// * `PearlError::NonPositiveFactorValue` if a factor function is not
    ///   strictly positive somewhere on its joint domain
    pub fn build(self) -> Result<FactorGraph> {
        if let Some(err) = self.err {
            return Err(err);
        }

        // make sure there are no variables defined but not used in a factor
        for var in &self.variables {
            if var.factors().is_empty() {
                return Err(PearlError::InvalidScope(format!(
                    "variable {:?} is not referenced by any factor",
                    var.name()
                )));
            }
        }

        // logarithms are taken of every factor value, so verify strict
        // positivity once, over each factor's full joint domain
        for factor in &self.factors {
            let scope: Vec<&Variable> =
                factor.variables().iter().map(|v| &self.variables[v.0]).collect();

            for assignment in evaluate_variables(&scope) {
                let args: Vec<(VarId, &str)> = factor
                    .variables()
                    .iter()
                    .copied()
                    .zip(assignment.iter().copied())
                    .collect();

                let value = factor.eval(&args)?;
                if !(value.is_finite() && value > 0.0) {
                    return Err(PearlError::NonPositiveFactorValue(
                        String::from(factor.name()),
                    ));
                }
            }
        }

        Ok(FactorGraph {
            variables: self.variables,
            factors: self.factors,
        })
    }

}

impl Default for FactorGraphBuilder {

    fn default() -> Self {
        FactorGraphBuilder::new()
    }

}
