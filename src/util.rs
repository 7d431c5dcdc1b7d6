//! Defines the `Error` type for the pearl library and the numerically-stable
//! summation routines shared by the inference engines.

use std::result;

use thiserror::Error;

pub type Result<T> = result::Result<T, PearlError>;

#[derive(Clone, Debug, PartialEq, Error)]
pub enum PearlError {

    /// A variable handle does not belong to the model it was used with.
    #[error("no model variable corresponds to {0}")]
    UnknownVariable(String),

    /// A variable or factor name was declared twice in a model.
    #[error("the name {0:?} is already taken in the model")]
    DuplicateVariable(String),

    /// The query contained the same variable more than once.
    #[error("the query must not contain duplicates")]
    DuplicateQueryVariable,

    /// The evidence contained the same variable more than once.
    #[error("the evidence must not contain duplicates")]
    DuplicateEvidence,

    /// The elimination order contained the same variable more than once.
    #[error("the elimination order must not contain duplicates")]
    DuplicateOrderVariable,

    /// A value was used with a variable whose domain does not contain it.
    #[error("value {value:?} is not in the domain of variable {variable}")]
    ValueOutOfDomain { variable: String, value: String },

    /// The query and evidence variable sets intersect.
    #[error("the query and evidential variables must be disjoint")]
    QueryEvidenceOverlap,

    /// An algorithm was run before a query was set.
    #[error("query not set")]
    QueryNotSet,

    /// Bucket elimination was run before an elimination order was set.
    #[error("elimination order not set")]
    EliminationOrderNotSet,

    /// Belief propagation accepts exactly one query variable.
    #[error("the query must contain exactly one variable")]
    NotSingleVariableQuery,

    /// The elimination order, query, and evidence do not partition the
    /// model variables.
    #[error("the elimination order, query, and evidence must partition the model variables")]
    OrderCoverageInvalid,

    /// Message passing made no progress: the factor graph contains a cycle.
    #[error("no progress in message passing; the factor graph is not a tree")]
    NotATree,

    /// `pd` or `print_pd` was invoked before a successful `run`.
    #[error("distribution not computed")]
    DistributionNotComputed,

    /// `pd` was called with the wrong number of values.
    #[error("the number {actual} of given values does not match the number {expected} of query variables")]
    ArityMismatch { expected: usize, actual: usize },

    /// A factor was evaluated without a value for one of its variables.
    #[error("incomplete assignment for factor {0}")]
    IncompleteAssignment(String),

    /// Factors must be strictly positive because logarithms are taken.
    #[error("factor {0} is not strictly positive over its domain")]
    NonPositiveFactorValue(String),

    /// A scope constraint was not satisfied.
    #[error("invalid scope: {0}")]
    InvalidScope(String),

    /// A general error with the given description.
    #[error("{0}")]
    General(String),

}


/// Compensated (Kahan) summation.
///
/// Every reduction feeding a probability or a log-sum-exp goes through this
/// routine so that two runs with identical inputs produce identical outputs
/// regardless of how the terms were generated.
pub fn kahan_sum<I>(values: I) -> f64
where
    I: IntoIterator<Item = f64>,
{
    let mut sum = 0.0;
    let mut compensation = 0.0;

    for value in values {
        let y = value - compensation;
        let t = sum + y;
        compensation = (t - sum) - y;
        sum = t;
    }

    sum
}


/// Numerically stable `ln Σ exp(xᵢ)`.
///
/// Factors out the pointwise maximum `M` and computes
/// `M + ln Σ exp(xᵢ − M)` with compensated summation.
pub fn log_sum_exp(values: &[f64]) -> f64 {
    let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);

    if !max.is_finite() {
        // all terms are -inf (or the slice is empty): the sum is zero
        return f64::NEG_INFINITY;
    }

    max + kahan_sum(values.iter().map(|v| (v - max).exp())).ln()
}


// Unit tests for the summation routines.
#[cfg(test)]
mod tests {

    use super::*;

    #[test]
    fn kahan_compensates() {
        // naive summation of 10000 x 0.1 drifts by ~1.6e-10; the
        // compensated sum stays within an ulp of the exact value
        let naive: f64 = (0..10_000).map(|_| 0.1).sum();
        let compensated = kahan_sum((0..10_000).map(|_| 0.1));

        assert!((naive - 1000.0).abs() > 1e-11);
        assert!((compensated - 1000.0).abs() < 1e-12);
    }

    #[test]
    fn kahan_empty() {
        assert_eq!(0.0, kahan_sum(std::iter::empty()));
    }

    #[test]
    fn log_sum_exp_matches_direct() {
        let values = [0.5_f64.ln(), 0.25_f64.ln(), 0.25_f64.ln()];
        assert!(log_sum_exp(&values).abs() < 1e-15);
    }

    #[test]
    fn log_sum_exp_extreme() {
        // direct exponentiation would overflow
        let values = [1000.0, 1000.0];
        let expected = 1000.0 + 2.0_f64.ln();
        assert!((log_sum_exp(&values) - expected).abs() < 1e-12);
    }

    #[test]
    fn log_sum_exp_empty() {
        assert_eq!(f64::NEG_INFINITY, log_sum_exp(&[]));
    }

    #[test]
    fn error_display() {
        let err = PearlError::ValueOutOfDomain {
            variable: String::from("Grade"),
            value: String::from("g9"),
        };
        assert_eq!(
            "value \"g9\" is not in the domain of variable Grade",
            format!("{}", err)
        );
    }

}
