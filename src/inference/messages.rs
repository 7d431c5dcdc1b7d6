//! Defines the node-to-node messages propagated by belief propagation and
//! the store that memoizes them.

use crate::factor::FactorId;
use crate::util::{PearlError, Result};
use crate::variable::VarId;

use indexmap::IndexMap;

use std::collections::HashMap;

/// A node of the bipartite factor graph: either a variable or a factor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Node {
    Variable(VarId),
    Factor(FactorId),
}

/// A directed message between two adjacent nodes.
///
/// The values map each domain value of the recipient's variable (for
/// factor-to-variable messages) or the sender's variable (for
/// variable-to-factor messages) to a log-space belief. Strict positivity of
/// the factors keeps every value finite.
#[derive(Clone, Debug)]
pub struct Message {
    from: Node,
    to: Node,
    values: IndexMap<String, f64>,
}

impl Message {

    pub fn new(from: Node, to: Node, values: IndexMap<String, f64>) -> Message {
        Message { from, to, values }
    }

    pub fn from_node(&self) -> Node {
        self.from
    }

    pub fn to_node(&self) -> Node {
        self.to
    }

    /// The log-space belief for a single domain value.
    pub fn value(&self, value: &str) -> Result<f64> {
        self.values.get(value).copied().ok_or_else(|| {
            PearlError::General(format!("message carries no value for {:?}", value))
        })
    }

    pub fn values(&self) -> &IndexMap<String, f64> {
        &self.values
    }

}


/// The messages computed under one set of evidence, keyed by directed edge.
#[derive(Default)]
pub struct MessageStore {
    messages: HashMap<(Node, Node), Message>,
}

impl MessageStore {

    pub fn new() -> MessageStore {
        MessageStore {
            messages: HashMap::new(),
        }
    }

    pub fn contains(&self, from: Node, to: Node) -> bool {
        self.messages.contains_key(&(from, to))
    }

    pub fn cache(&mut self, message: Message) {
        self.messages.insert((message.from, message.to), message);
    }

    pub fn get(&self, from: Node, to: Node) -> Result<&Message> {
        self.messages.get(&(from, to)).ok_or_else(|| {
            PearlError::General(format!("no message cached from {:?} to {:?}", from, to))
        })
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

}
