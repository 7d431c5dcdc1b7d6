//! Definition of the factor module
//!
//! A `Factor` represents a strictly positive function over an ordered scope
//! of `Variable`s. A factor is either *raw* (the function value itself) or
//! *log* (the natural logarithm of the function value); the inference
//! engines work on log-factors for computational stability.
//!
//! Factors are called with `(VarId, value)` pairs rather than positional
//! arguments: the pairs are looked up by variable identity, extraneous pairs
//! are ignored, and evidential values bound on the factor are merged in
//! automatically. This is what lets a bucket hand the same free-variable
//! assignment to every factor it owns.

use crate::util::{kahan_sum, PearlError, Result};
use crate::variable::VarId;

use ndarray::prelude as nd;

use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

/// A stable handle to a `Factor` inside a `FactorGraph` or an inner model.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FactorId(pub(crate) usize);

/// The space a factor's values live in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FactorKind {
    /// The function value itself
    Raw,

    /// The natural logarithm of the function value
    Log,
}

/// The representation of a factor's function.
#[derive(Clone)]
pub enum FactorFn {
    /// A pure total closure over the factor's scope, in declared order
    Rule(Rc<dyn Fn(&[&str]) -> f64>),

    /// A dense table over the factor's scope, in declared order
    Table(Table),
}

/// A dense value table with one axis per scope variable.
///
/// Each axis records the domain values it was built over, so a table stays
/// valid even if a variable's domain is later narrowed to encode evidence.
#[derive(Clone, Debug)]
pub struct Table {
    axes: Vec<Vec<String>>,
    values: nd::ArrayD<f64>,
}

impl Table {

    pub(crate) fn new(axes: Vec<Vec<String>>, values: nd::ArrayD<f64>) -> Table {
        debug_assert_eq!(
            axes.iter().map(Vec::len).collect::<Vec<_>>(),
            values.shape().to_vec()
        );
        Table { axes, values }
    }

    /// Look up the entry for a full assignment given in axis order.
    pub(crate) fn value(&self, assignment: &[&str]) -> Result<f64> {
        let mut index = Vec::with_capacity(self.axes.len());
        for (axis, value) in self.axes.iter().zip(assignment.iter()) {
            let position = axis.iter().position(|v| v == value).ok_or_else(|| {
                PearlError::General(format!("value {:?} not on a table axis", value))
            })?;
            index.push(position);
        }

        Ok(self.values[nd::IxDyn(&index)])
    }

    fn map_ln(&mut self) {
        self.values.mapv_inplace(f64::ln);
    }

}


/// A named function over an ordered, duplicate-free scope of variables.
#[derive(Clone)]
pub struct Factor {
    /// The name of the `Factor`
    name: String,

    /// The scope, fixing the argument order of `function`
    variables: Vec<VarId>,

    /// The function over the scope
    function: FactorFn,

    /// Whether values are raw or logarithmic
    kind: FactorKind,

    /// Evidential variables of the scope and their bound values, merged into
    /// every call
    evidence: IndexMap<VarId, String>,
}

impl Factor {

    /// Create a new raw `Factor` from a closure.
    pub(crate) fn new<F>(name: &str, variables: Vec<VarId>, function: F) -> Factor
    where
        F: Fn(&[&str]) -> f64 + 'static,
    {
        Factor {
            name: String::from(name),
            variables,
            function: FactorFn::Rule(Rc::new(function)),
            kind: FactorKind::Raw,
            evidence: IndexMap::new(),
        }
    }

    /// Clone this factor with its scope rewritten to `variables` (the same
    /// variables under another model's handles). The pure function is shared;
    /// kind, name, and evidence state are per-instance.
    pub(crate) fn with_scope(&self, variables: Vec<VarId>) -> Factor {
        debug_assert_eq!(self.variables.len(), variables.len());

        Factor {
            name: self.name.clone(),
            variables,
            function: self.function.clone(),
            kind: self.kind,
            evidence: IndexMap::new(),
        }
    }

    /// Create a log-factor backed by a dense table of log values. Used for
    /// the output factors emitted by bucket elimination.
    pub(crate) fn log_table(name: String, variables: Vec<VarId>, table: Table) -> Factor {
        Factor {
            name,
            variables,
            function: FactorFn::Table(table),
            kind: FactorKind::Log,
            evidence: IndexMap::new(),
        }
    }

    /// Get the name of the `Factor`
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The scope of the `Factor` in declared argument order
    pub fn variables(&self) -> &[VarId] {
        &self.variables
    }

    pub fn kind(&self) -> FactorKind {
        self.kind
    }

    /// A `Factor` over a single variable is a leaf of the factor graph.
    pub fn is_leaf(&self) -> bool {
        self.variables.len() == 1
    }

    /// The scope variables that are not bound to an evidential value
    pub fn free_variables(&self) -> impl Iterator<Item = VarId> + '_ {
        self.variables
            .iter()
            .copied()
            .filter(move |v| !self.evidence.contains_key(v))
    }

    /// The bound evidential variables and their values
    pub fn evidence(&self) -> impl Iterator<Item = (VarId, &str)> {
        self.evidence.iter().map(|(v, val)| (*v, val.as_str()))
    }

    /// Bind an evidential value for `var`, to be merged into every call.
    pub(crate) fn add_evidence(&mut self, var: VarId, value: &str) {
        self.evidence.insert(var, String::from(value));
    }

    /// Remove the evidential binding for `var`, if any.
    pub(crate) fn delete_evidence(&mut self, var: VarId) {
        self.evidence.shift_remove(&var);
    }

    pub(crate) fn clear_evidence(&mut self) {
        self.evidence.clear();
    }

    /// Replace the factor's function by its natural logarithm and rename it
    /// to `log_<name>`. A dense table is mapped in place; a closure is taken
    /// through `ln` at call time.
    pub(crate) fn logarithm(&mut self) {
        if self.kind == FactorKind::Log {
            return;
        }

        if let FactorFn::Table(ref mut table) = self.function {
            table.map_ln();
        }

        self.kind = FactorKind::Log;
        self.name = format!("log_{}", self.name);
    }

    /// Evaluate the `Factor` for the assignment given as `(VarId, value)`
    /// pairs.
    ///
    /// Arguments are looked up by variable identity: pairs for variables
    /// outside the scope are ignored, explicit pairs take precedence over
    /// bound evidence, and a scope variable with neither yields
    /// `IncompleteAssignment`.
    pub fn eval(&self, args: &[(VarId, &str)]) -> Result<f64> {
        let mut ordered = Vec::with_capacity(self.variables.len());

        for var in &self.variables {
            let value = args
                .iter()
                .find(|(v, _)| v == var)
                .map(|(_, val)| *val)
                .or_else(|| self.evidence.get(var).map(String::as_str))
                .ok_or_else(|| PearlError::IncompleteAssignment(self.name.clone()))?;
            ordered.push(value);
        }

        match (&self.function, self.kind) {
            (FactorFn::Rule(f), FactorKind::Raw) => Ok(f(&ordered)),
            (FactorFn::Rule(f), FactorKind::Log) => Ok(f(&ordered).ln()),
            // a table already stores values in the factor's current space
            (FactorFn::Table(t), _) => t.value(&ordered),
        }
    }

}

impl fmt::Debug for Factor {

    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Factor")
            .field("name", &self.name)
            .field("variables", &self.variables)
            .field("kind", &self.kind)
            .field("evidence", &self.evidence)
            .finish()
    }

}


/// Sum the values of `factors` at the given assignment. Shared by the
/// engines when they combine log-factors.
pub(crate) fn sum_at<'a, I>(factors: I, args: &[(VarId, &str)]) -> Result<f64>
where
    I: IntoIterator<Item = &'a Factor>,
{
    let mut terms = Vec::new();
    for factor in factors {
        terms.push(factor.eval(args)?);
    }

    Ok(kahan_sum(terms))
}


// Unit tests
#[cfg(test)]
mod tests {

    use super::*;

    fn coin_pair() -> Factor {
        // f(x, y) over X = {h, t}, Y = {h, t}
        Factor::new("f_xy", vec![VarId(0), VarId(1)], |args: &[&str]| {
            match (args[0], args[1]) {
                ("h", "h") => 9.0,
                ("h", "t") => 1.0,
                ("t", "h") => 4.0,
                ("t", "t") => 6.0,
                _ => unreachable!(),
            }
        })
    }

    #[test]
    fn eval_by_identity() {
        let f = coin_pair();

        // order of the argument pairs does not matter
        let val = f.eval(&[(VarId(1), "t"), (VarId(0), "h")]).unwrap();
        assert_eq!(1.0, val);

        // extraneous pairs are ignored
        let val = f
            .eval(&[(VarId(7), "zzz"), (VarId(0), "t"), (VarId(1), "h")])
            .unwrap();
        assert_eq!(4.0, val);
    }

    #[test]
    fn eval_incomplete() {
        let f = coin_pair();

        match f.eval(&[(VarId(0), "h")]).expect_err("missing error") {
            PearlError::IncompleteAssignment(name) => assert_eq!(name, "f_xy"),
            _ => panic!("wrong error type")
        };
    }

    #[test]
    fn evidence_is_merged() {
        let mut f = coin_pair();
        f.add_evidence(VarId(1), "t");

        assert_eq!(6.0, f.eval(&[(VarId(0), "t")]).unwrap());
        assert_eq!(vec![VarId(0)], f.free_variables().collect::<Vec<_>>());

        // explicit arguments take precedence over the binding
        assert_eq!(4.0, f.eval(&[(VarId(0), "t"), (VarId(1), "h")]).unwrap());

        f.delete_evidence(VarId(1));
        assert!(f.eval(&[(VarId(0), "t")]).is_err());
    }

    #[test]
    fn logarithm() {
        let mut f = coin_pair();
        f.logarithm();

        assert_eq!("log_f_xy", f.name());
        assert_eq!(FactorKind::Log, f.kind());

        let val = f.eval(&[(VarId(0), "h"), (VarId(1), "h")]).unwrap();
        assert!((val - 9.0_f64.ln()).abs() < 1e-15);

        // logarithm is idempotent
        f.logarithm();
        assert_eq!("log_f_xy", f.name());
    }

    #[test]
    fn log_table_factor() {
        let axes = vec![
            vec![String::from("a0"), String::from("a1")],
            vec![String::from("b0"), String::from("b1")],
        ];
        let values = nd::Array::from_shape_vec(
            (2, 2),
            vec![0.1_f64.ln(), 0.2_f64.ln(), 0.3_f64.ln(), 0.4_f64.ln()],
        )
        .unwrap()
        .into_dyn();

        let f = Factor::log_table(
            String::from("log_f_ab"),
            vec![VarId(2), VarId(5)],
            Table::new(axes, values),
        );

        let val = f.eval(&[(VarId(5), "b1"), (VarId(2), "a1")]).unwrap();
        assert!((val - 0.4_f64.ln()).abs() < 1e-15);
    }

    #[test]
    fn sum_at_combines_factors() {
        let mut f = coin_pair();
        let mut g = Factor::new("f_x", vec![VarId(0)], |args: &[&str]| {
            if args[0] == "h" { 2.0 } else { 8.0 }
        });
        f.logarithm();
        g.logarithm();

        let total = sum_at([&f, &g], &[(VarId(0), "t"), (VarId(1), "t")]).unwrap();
        assert!((total - (6.0_f64.ln() + 8.0_f64.ln())).abs() < 1e-12);
    }

}
