use std::fmt;

use serde_derive::{Deserialize, Serialize};

/// Write that the cluster agrees on for a single key.
#[derive(Serialize, Deserialize)]
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    Put {
        key: String,
        value: String,
    },
    Delete {
        key: String,
    },
}

impl Operation {
    pub fn put<K: Into<String>, V: Into<String>>(key: K, value: V) -> Self {
        Operation::Put { key: key.into(), value: value.into() }
    }

    pub fn delete<K: Into<String>>(key: K) -> Self {
        Operation::Delete { key: key.into() }
    }

    /// Key whose Paxos instance this operation is proposed under.
    pub fn key(&self) -> &str {
        match self {
        | Operation::Put { key, .. } => key,
        | Operation::Delete { key } => key,
        }
    }

    /// Empty keys are never proposed, accepted, or applied.
    pub fn is_valid(&self) -> bool {
        !self.key().is_empty()
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
        | Operation::Put { key, value } => write!(fmt, "PUT({}, {})", key, value),
        | Operation::Delete { key } => write!(fmt, "DELETE({})", key),
        }
    }
}

/// Proposal number, ordered by round first and proposing node second.
///
/// Each node only ever issues proposals carrying its own index, so two
/// nodes can never generate the same ID. Legal rounds start at 1: the
/// default value sorts below every proposal anyone can make.
#[derive(Serialize, Deserialize)]
#[derive(Copy, Clone, Default, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProposalID {
    pub round: u64,
    pub node: usize,
}

impl ProposalID {
    pub fn new(round: u64, node: usize) -> Self {
        ProposalID { round, node }
    }

    pub fn is_sentinel(&self) -> bool {
        *self == ProposalID::default()
    }
}

impl fmt::Display for ProposalID {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "{}.{}", self.round, self.node)
    }
}

/// Value accepted under a particular proposal.
#[derive(Serialize, Deserialize)]
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PValue {
    pub proposal: ProposalID,
    pub value: Operation,
}

/// Peer-facing calls a node answers for the rest of the cluster.
#[derive(Serialize, Deserialize)]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Request {
    Prepare {
        proposal: ProposalID,
        key: String,
    },
    Accept {
        proposal: ProposalID,
        value: Operation,
        key: String,
    },
    Learn(Operation),
    Clear,
    Identity,
}

#[derive(Serialize, Deserialize)]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Response {
    /// Acceptor will ignore anything lower than `proposal` for this key.
    Promise {
        proposal: ProposalID,
        accepted: Option<PValue>,
    },

    /// Prepare refused. Carries the acceptor's highest promise, or the
    /// sentinel when the acceptor is down.
    Reject {
        promised: ProposalID,
    },

    Accepted {
        proposal: ProposalID,
        value: Operation,
    },

    Rejected {
        proposal: ProposalID,
        value: Operation,
    },

    Ack,

    Identity(String),
}

impl Response {
    /// Refusal matching the kind of `request`.
    pub fn refuse(request: &Request) -> Self {
        match request {
        | Request::Accept { proposal, value, .. } => Response::Rejected {
            proposal: *proposal,
            value: value.clone(),
        },
        | _ => Response::Reject { promised: ProposalID::default() },
        }
    }
}

/// Frame on a peer connection. Responses echo the `seq` of their request so
/// that many calls can share one connection.
#[derive(Serialize, Deserialize)]
#[derive(Clone, Debug)]
pub struct Envelope<T> {
    pub seq: u64,
    pub body: T,
}
