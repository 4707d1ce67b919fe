//! # Summary
//!
//! This module holds the per-key Paxos bookkeeping. Every key owns an
//! independent single-decree instance that is created the first time a
//! proposer mentions the key, and lives until the whole table is cleared.

use std::sync::Arc;

use hashbrown::HashMap as Map;
use parking_lot::Mutex;

use crate::message::{Operation, PValue, ProposalID, Response};

/// Acceptor memory for a single key.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Instance {
    /// Highest proposal this acceptor has promised not to ignore
    pub highest_promised: ProposalID,

    /// Proposal under which `accepted_value` was accepted
    pub accepted_id: ProposalID,

    /// Most recently accepted value, if any
    pub accepted_value: Option<Operation>,
}

impl Instance {
    /// Promises `proposal` if it is strictly higher than every earlier promise.
    pub fn prepare(&mut self, proposal: ProposalID) -> Response {
        if proposal > self.highest_promised {
            self.highest_promised = proposal;
            Response::Promise {
                proposal,
                accepted: self.accepted(),
            }
        } else {
            Response::Reject {
                promised: self.highest_promised,
            }
        }
    }

    /// Accepts `value` unless a higher proposal has been promised since.
    ///
    /// Uses `>=` so a proposer can get its own freshly promised ID accepted.
    pub fn accept(&mut self, proposal: ProposalID, value: Operation) -> Response {
        if proposal >= self.highest_promised {
            self.highest_promised = proposal;
            self.accepted_id = proposal;
            self.accepted_value = Some(value.clone());
            Response::Accepted { proposal, value }
        } else {
            Response::Rejected { proposal, value }
        }
    }

    pub fn accepted(&self) -> Option<PValue> {
        self.accepted_value.as_ref().map(|value| PValue {
            proposal: self.accepted_id,
            value: value.clone(),
        })
    }
}

/// Map from key to its Paxos instance. Each instance sits behind its own
/// lock, so calls for different keys never wait on each other.
#[derive(Debug, Default)]
pub struct Table(Mutex<Map<String, Arc<Mutex<Instance>>>>);

impl Table {
    pub fn new() -> Self {
        Table::default()
    }

    /// Looks up the instance for `key`, creating an empty one if needed.
    pub fn instance(&self, key: &str) -> Arc<Mutex<Instance>> {
        let mut instances = self.0.lock();
        if let Some(instance) = instances.get(key) {
            return instance.clone();
        }
        instances.entry(key.to_owned())
            .or_default()
            .clone()
    }

    /// Copy of the instance for `key` without creating it.
    pub fn get(&self, key: &str) -> Option<Instance> {
        let instance = self.0.lock().get(key).cloned()?;
        let snapshot = instance.lock().clone();
        Some(snapshot)
    }

    /// Drops every instance. Calls already holding an instance finish
    /// against the detached copy.
    pub fn clear(&self) {
        self.0.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.0.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
