//! Defines the `GreedyBucketElimination` engine: greedy ordering and bucket
//! elimination composed into one unit.
//!
//! A run first looks the elimination order up in an evidence-keyed cache;
//! on a miss the greedy ordering runs under the current query and evidence
//! and the result is cached. The order is then installed on the embedded
//! bucket elimination engine, which computes the distribution. Changing the
//! query invalidates every cached order, since an order excludes the query
//! variables it was computed for.

use crate::model::FactorGraph;
use crate::util::Result;
use crate::variable::VarId;

use super::bucket_elimination::BucketElimination;
use super::greedy_ordering::{greedy_order, CostKind};
use super::state::{EvidenceKey, FactoredState};
use super::FactoredEngine;

use log::debug;

use std::collections::HashMap;

pub struct GreedyBucketElimination {

    /// The embedded bucket elimination engine owning the working model
    bucket_elimination: BucketElimination,

    /// Elimination orders computed so far, keyed by evidence
    order_cache: HashMap<EvidenceKey, Vec<VarId>>,

}

impl GreedyBucketElimination {

    /// Create the engine over a snapshot of `model`.
    pub fn new(model: &FactorGraph) -> GreedyBucketElimination {
        GreedyBucketElimination {
            bucket_elimination: BucketElimination::new(model),
            order_cache: HashMap::new(),
        }
    }

    /// Drop all cached elimination orders.
    pub fn clear_order_cache(&mut self) {
        self.order_cache.clear();
    }

    /// Compute the (joint) distribution of the query under the current
    /// evidence: greedy ordering followed by bucket elimination.
    ///
    /// # Errors
    /// The failure modes of `BucketElimination::run`, except those of an
    /// ill-formed elimination order, which this composition constructs
    /// itself.
    pub fn run(&mut self, cost: CostKind, print_info: bool) -> Result<()> {
        let key = self.bucket_elimination.state().evidence_key();

        let order = match self.order_cache.get(&key) {
            Some(order) => {
                debug!("order cache hit for evidence key of {} entries", key.len());
                order.clone()
            },
            None => {
                if print_info {
                    println!("{}", "*".repeat(40));
                    println!("Greedy Ordering started, cost: {}", cost);
                }
                let order = greedy_order(self.bucket_elimination.state(), cost, print_info);
                if print_info {
                    println!("Greedy Ordering stopped");
                    println!("{}", "*".repeat(40));
                }
                self.order_cache.insert(key, order.clone());
                order
            },
        };

        self.bucket_elimination.install_order(order);
        self.bucket_elimination.run(print_info)
    }

}

impl FactoredEngine for GreedyBucketElimination {

    fn state(&self) -> &FactoredState {
        self.bucket_elimination.state()
    }

    fn state_mut(&mut self) -> &mut FactoredState {
        self.bucket_elimination.state_mut()
    }

    /// Setting a new query invalidates the cached orders: an order excludes
    /// the query variables it was computed for.
    fn set_query(&mut self, query: &[VarId]) -> Result<()> {
        self.bucket_elimination.set_query(query)?;
        self.order_cache.clear();
        Ok(())
    }

}
