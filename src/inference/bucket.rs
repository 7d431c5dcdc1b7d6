//! Defines the `Bucket` workspace used by bucket elimination: the owning
//! variable, the input log-factors collected for it, and the sum-out that
//! produces the bucket's output log-factor.

use crate::factor::{sum_at, Factor, FactorId, Table};
use crate::util::{log_sum_exp, Result};
use crate::variable::VarId;

use super::state::FactoredState;

use itertools::Itertools;
use ndarray::prelude as nd;

/// An input log-factor of a bucket: either one of the model's (logarithmed)
/// factors, or an output log-factor computed by an earlier bucket.
pub(crate) enum BucketInput {
    Model(FactorId),
    Computed(Factor),
}

/// The per-variable workspace of a bucket elimination run.
pub(crate) struct Bucket {

    /// The variable this bucket sums out
    variable: VarId,

    /// The input log-factors
    inputs: Vec<BucketInput>,

    /// The variables mentioned by the inputs, except the bucket variable,
    /// sorted by name
    free_variables: Vec<VarId>,

}

impl Bucket {

    pub(crate) fn new(variable: VarId) -> Bucket {
        Bucket {
            variable,
            inputs: Vec::new(),
            free_variables: Vec::new(),
        }
    }

    pub(crate) fn variable(&self) -> VarId {
        self.variable
    }

    pub(crate) fn add_model_factor(&mut self, factor: FactorId) {
        self.inputs.push(BucketInput::Model(factor));
    }

    pub(crate) fn add_computed_factor(&mut self, factor: Factor) {
        self.inputs.push(BucketInput::Computed(factor));
    }

    pub(crate) fn inputs(&self) -> &[BucketInput] {
        &self.inputs
    }

    pub(crate) fn has_inputs(&self) -> bool {
        !self.inputs.is_empty()
    }

    pub(crate) fn has_free_variables(&self) -> bool {
        !self.free_variables.is_empty()
    }

    pub(crate) fn free_variables(&self) -> &[VarId] {
        &self.free_variables
    }

    /// Resolve an input to the factor it denotes.
    pub(crate) fn input_factor<'a>(&'a self, state: &'a FactoredState, input: &'a BucketInput) -> &'a Factor {
        match input {
            BucketInput::Model(id) => state.factor(*id),
            BucketInput::Computed(factor) => factor,
        }
    }

    /// Determine the free variables: everything the inputs mention except
    /// the bucket variable and the evidential variables (those are bound on
    /// their factors), sorted by name for reproducibility.
    pub(crate) fn set_free_variables(&mut self, state: &FactoredState) {
        let mut free: Vec<VarId> = Vec::new();
        for input in &self.inputs {
            let factor = self.input_factor(state, input);
            for var in factor.free_variables() {
                if var != self.variable && !free.contains(&var) {
                    free.push(var);
                }
            }
        }
        free.sort_by(|a, b| state.var(*a).name().cmp(state.var(*b).name()));

        self.free_variables = free;
    }

    /// Sum the bucket variable out of the product of the input log-factors:
    ///
    /// `ψ(a) = M(a) + ln Σ_x exp(L(a, x) − M(a))`
    ///
    /// with `L(a, x) = Σ_g g(a, v = x)` and `M(a) = max_x L(a, x)`, for
    /// every assignment `a` of the free variables. The result is a new
    /// log-factor named `log_f_<variable>` over the free variables, backed
    /// by a dense table.
    pub(crate) fn output_log_factor(&self, state: &FactoredState) -> Result<Factor> {
        let axes: Vec<Vec<String>> = self
            .free_variables
            .iter()
            .map(|id| state.var(*id).domain().to_vec())
            .collect();
        let shape: Vec<usize> = axes.iter().map(Vec::len).collect();
        let mut values = nd::ArrayD::zeros(nd::IxDyn(&shape));

        let domain = state.var(self.variable).domain();

        let indices: Vec<Vec<usize>> = shape
            .iter()
            .map(|&n| 0..n)
            .multi_cartesian_product()
            .collect();

        for index in indices {
            let mut args: Vec<(VarId, &str)> = self
                .free_variables
                .iter()
                .enumerate()
                .map(|(axis, id)| (*id, axes[axis][index[axis]].as_str()))
                .collect();

            let mut summed = Vec::with_capacity(domain.len());
            for value in domain {
                args.push((self.variable, value.as_str()));
                summed.push(sum_at(
                    self.inputs.iter().map(|input| self.input_factor(state, input)),
                    &args,
                )?);
                args.pop();
            }

            values[nd::IxDyn(&index)] = log_sum_exp(&summed);
        }

        Ok(Factor::log_table(
            format!("log_f_{}", state.var(self.variable).name()),
            self.free_variables.clone(),
            Table::new(axes, values),
        ))
    }

}
