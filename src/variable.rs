//! Definition of the variable module
//!
//! A `Variable` represents a categorical random variable in a factor graph.
//! Its domain is an ordered, duplicate-free sequence of values; reducing the
//! domain to a single value encodes evidence.

use crate::factor::FactorId;
use crate::util::{PearlError, Result};

use itertools::Itertools;

use std::fmt;

/// A stable handle to a `Variable` inside a `FactorGraph` or an inner model.
///
/// Handles index a flat variable container; factors refer to their variables
/// through these indices rather than through owned references.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VarId(pub(crate) usize);

impl fmt::Display for VarId {

    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "variable #{}", self.0)
    }

}


/// A named categorical random variable.
#[derive(Clone, Debug)]
pub struct Variable {
    /// The name of the `Variable`
    name: String,

    /// The ordered, duplicate-free value domain
    domain: Vec<String>,

    /// Back-references to the factors whose scope contains this `Variable`
    factors: Vec<FactorId>,
}

impl Variable {

    /// Construct a new `Variable`. The domain is sorted and deduplicated.
    pub fn new(name: &str, domain: &[&str]) -> Variable {
        let mut domain: Vec<String> = domain.iter().map(|v| String::from(*v)).collect();
        domain.sort();
        domain.dedup();

        Variable {
            name: String::from(name),
            domain,
            factors: Vec::new(),
        }
    }

    /// Get the name of the `Variable`
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the current value domain
    pub fn domain(&self) -> &[String] {
        &self.domain
    }

    /// Replace the domain. Used to narrow a variable to an evidential value
    /// and to restore the full domain afterwards.
    pub(crate) fn set_domain(&mut self, domain: Vec<String>) {
        let mut domain = domain;
        domain.sort();
        domain.dedup();
        self.domain = domain;
    }

    /// A `Variable` whose domain holds a single value is evidential.
    pub fn is_evidential(&self) -> bool {
        self.domain.len() == 1
    }

    /// A `Variable` referenced by at most one factor is a leaf of the graph.
    pub fn is_leaf(&self) -> bool {
        self.factors.len() <= 1
    }

    /// The factors whose scope contains this `Variable`
    pub fn factors(&self) -> &[FactorId] {
        &self.factors
    }

    pub(crate) fn link_factor(&mut self, factor: FactorId) {
        self.factors.push(factor);
    }

    pub(crate) fn clear_factors(&mut self) {
        self.factors.clear();
    }

    /// Verify that `value` belongs to the current domain.
    pub fn check_value(&self, value: &str) -> Result<()> {
        if self.domain.iter().any(|v| v == value) {
            Ok(())
        } else {
            Err(PearlError::ValueOutOfDomain {
                variable: self.name.clone(),
                value: String::from(value),
            })
        }
    }

}


/// Enumerate the Cartesian product of the domains of `vars`, in the given
/// variable order.
///
/// The sequence is lazy and has length `∏ |domᵢ|`. An evidential variable
/// contributes a single element, so the evidential projection is automatic.
/// An empty variable sequence yields exactly one empty assignment.
pub fn evaluate_variables<'a>(
    vars: &[&'a Variable],
) -> Box<dyn Iterator<Item = Vec<&'a str>> + 'a> {
    if vars.is_empty() {
        return Box::new(std::iter::once(Vec::new()));
    }

    Box::new(
        vars.iter()
            .copied()
            .map(|v| v.domain.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .into_iter()
            .multi_cartesian_product(),
    )
}


// Unit Tests for the Variable struct.
#[cfg(test)]
mod tests {

    use super::*;

    #[test]
    fn domain_is_sorted_and_deduplicated() {
        let var = Variable::new("Grade", &["g2", "g0", "g1", "g0"]);

        assert_eq!(var.name(), "Grade");
        assert_eq!(var.domain(), &["g0", "g1", "g2"]);
        assert!(!var.is_evidential());
    }

    #[test]
    fn evidential() {
        let mut var = Variable::new("Difficulty", &["d0", "d1"]);
        assert!(!var.is_evidential());

        var.set_domain(vec![String::from("d1")]);
        assert!(var.is_evidential());
        assert_eq!(var.domain(), &["d1"]);
    }

    #[test]
    fn check_value() {
        let var = Variable::new("SAT", &["s0", "s1"]);

        assert!(var.check_value("s0").is_ok());
        match var.check_value("s2").expect_err("missing error") {
            PearlError::ValueOutOfDomain { variable, value } => {
                assert_eq!(variable, "SAT");
                assert_eq!(value, "s2");
            },
            _ => panic!("wrong error type")
        };
    }

    #[test]
    fn leaves() {
        let mut var = Variable::new("Letter", &["l0", "l1"]);
        assert!(var.is_leaf());

        var.link_factor(FactorId(0));
        assert!(var.is_leaf());
        assert_eq!(var.factors(), &[FactorId(0)]);

        var.link_factor(FactorId(3));
        assert!(!var.is_leaf());
    }

    #[test]
    fn evaluate() {
        let d = Variable::new("Difficulty", &["d0", "d1"]);
        let g = Variable::new("Grade", &["g0", "g1", "g2"]);

        let assignments: Vec<Vec<&str>> = evaluate_variables(&[&d, &g]).collect();

        assert_eq!(assignments.len(), 6);
        assert_eq!(assignments[0], vec!["d0", "g0"]);
        assert_eq!(assignments[1], vec!["d0", "g1"]);
        assert_eq!(assignments[5], vec!["d1", "g2"]);
    }

    #[test]
    fn evaluate_evidential_projection() {
        let mut d = Variable::new("Difficulty", &["d0", "d1"]);
        d.set_domain(vec![String::from("d1")]);
        let s = Variable::new("SAT", &["s0", "s1"]);

        let assignments: Vec<Vec<&str>> = evaluate_variables(&[&d, &s]).collect();

        assert_eq!(
            assignments,
            vec![vec!["d1", "s0"], vec!["d1", "s1"]]
        );
    }

    #[test]
    fn evaluate_empty() {
        let assignments: Vec<Vec<&str>> = evaluate_variables(&[]).collect();
        assert_eq!(assignments, vec![Vec::<&str>::new()]);
    }

}
