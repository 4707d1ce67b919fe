//! # Summary
//!
//! This module defines the `Acceptor` struct, which acts as Paxos's
//! distributed memory. Acceptors keep track of the highest proposal they
//! have promised and the value they last accepted, separately for each key.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::message::{Operation, ProposalID, Response};
use crate::state;
use crate::thread::failure::Liveness;

/// Functions as distributed memory.
#[derive(Debug)]
pub struct Acceptor {
    /// Name used in logs
    name: String,

    /// Per-key promise and accept bookkeeping
    table: state::Table,

    /// Cleared while the failure simulator has this node down
    liveness: Liveness,
}

impl Acceptor {
    pub fn new(name: String, liveness: Liveness) -> Self {
        Acceptor {
            name,
            table: state::Table::new(),
            liveness,
        }
    }

    /// Promises `proposal` for `key` if it beats every earlier promise.
    pub fn prepare(&self, proposal: ProposalID, key: &str) -> Response {
        if !self.liveness.is_active() {
            debug!("{} down, rejecting prepare {} for {}", self.name, proposal, key);
            return Response::Reject { promised: ProposalID::default() };
        }
        let instance = self.table.instance(key);
        let response = instance.lock().prepare(proposal);
        trace!("{} answered prepare {} for {} with {:?}", self.name, proposal, key, response);
        response
    }

    /// Accepts `value` for `key` unless a higher proposal was promised.
    pub fn accept(&self, proposal: ProposalID, value: Operation, key: &str) -> Response {
        if !self.liveness.is_active() {
            debug!("{} down, rejecting accept {} for {}", self.name, proposal, key);
            return Response::Rejected { proposal, value };
        }
        if !value.is_valid() || value.key() != key {
            warn!("{} refusing {} proposed under key {:?}", self.name, value, key);
            return Response::Rejected { proposal, value };
        }
        let instance = self.table.instance(key);
        let response = instance.lock().accept(proposal, value);
        trace!("{} answered accept {} for {} with {:?}", self.name, proposal, key, response);
        response
    }

    /// Forgets every instance, starting a fresh run of consensus for all keys.
    pub fn clear(&self) {
        info!("{} clearing {} paxos instances", self.name, self.table.len());
        self.table.clear();
    }

    /// Instance for `key`, created if this is the first time it is mentioned.
    pub fn instance(&self, key: &str) -> Arc<Mutex<state::Instance>> {
        self.table.instance(key)
    }

    pub fn table(&self) -> &state::Table {
        &self.table
    }

    pub fn liveness(&self) -> &Liveness {
        &self.liveness
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn acceptor() -> Acceptor {
        Acceptor::new("server-1".into(), Liveness::new())
    }

    #[test]
    fn inactive_acceptor_rejects_without_touching_state() {
        let acceptor = acceptor();
        acceptor.liveness().set_active(false);
        assert_eq!(
            acceptor.prepare(ProposalID::new(1, 0), "x"),
            Response::Reject { promised: ProposalID::default() },
        );
        assert!(matches!(
            acceptor.accept(ProposalID::new(1, 0), Operation::put("x", "1"), "x"),
            Response::Rejected { .. },
        ));
        assert!(acceptor.table().is_empty());

        acceptor.liveness().set_active(true);
        assert!(matches!(acceptor.prepare(ProposalID::new(1, 0), "x"), Response::Promise { .. }));
    }

    #[test]
    fn accept_refuses_values_for_other_keys() {
        let acceptor = acceptor();
        let response = acceptor.accept(ProposalID::new(1, 0), Operation::put("y", "1"), "x");
        assert!(matches!(response, Response::Rejected { .. }));
        assert!(acceptor.table().get("x").is_none());
    }

    #[test]
    fn clear_discards_promises() {
        let acceptor = acceptor();
        acceptor.prepare(ProposalID::new(3, 1), "x");
        acceptor.accept(ProposalID::new(3, 1), Operation::put("x", "1"), "x");
        acceptor.clear();
        assert!(acceptor.table().is_empty());
        assert_eq!(
            acceptor.prepare(ProposalID::new(1, 0), "x"),
            Response::Promise { proposal: ProposalID::new(1, 0), accepted: None },
        );
    }

    #[test]
    fn concurrent_prepares_for_one_key_promise_each_id_once() {
        let acceptor = Arc::new(acceptor());
        let handles = (0..8)
            .map(|node| {
                let acceptor = acceptor.clone();
                std::thread::spawn(move || {
                    (1..=50)
                        .filter(|round| {
                            let proposal = ProposalID::new(*round, node);
                            matches!(acceptor.prepare(proposal, "x"), Response::Promise { .. })
                        })
                        .count()
                })
            })
            .collect::<Vec<_>>();
        let promised: usize = handles.into_iter().map(|handle| handle.join().unwrap()).sum();
        assert!(promised >= 1);
        assert_eq!(
            acceptor.table().get("x").map(|instance| instance.highest_promised),
            Some(ProposalID::new(50, 7)),
        );
    }
}
