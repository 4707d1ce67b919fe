use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::cluster::Cluster;
use crate::message::{Operation, ProposalID, Request, Response};
use crate::thread::{commander, scout};
use crate::thread::acceptor::Acceptor;

/// Result of one consensus round.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// The cluster chose this value. It is not necessarily the value that
    /// was proposed: a value accepted earlier always wins.
    Committed(Operation),

    Rejected(Rejection),
}

/// Why a round ended without a decision.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Rejection {
    NoPromiseMajority {
        promises: usize,
        quorum: usize,
    },
    NoAcceptMajority {
        accepts: usize,
        quorum: usize,
    },
}

impl fmt::Display for Rejection {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
        | Rejection::NoPromiseMajority { promises, quorum } => {
            write!(fmt, "proposal rejected: no majority of promises ({}/{})", promises, quorum)
        }
        | Rejection::NoAcceptMajority { accepts, quorum } => {
            write!(fmt, "failed to reach consensus ({}/{} accepts)", accepts, quorum)
        }
        }
    }
}

/// Drives consensus rounds on behalf of one node.
pub struct Leader {
    /// Index of this node in the cluster, salted into every proposal
    id: usize,

    /// Every member, this node included
    cluster: Cluster,

    /// Local acceptor, consulted for the highest proposal seen per key
    acceptor: Arc<Acceptor>,

    /// Highest round this node has used or heard of
    round: Mutex<u64>,

    /// Per-member deadline for each phase
    timeout: Duration,
}

impl Leader {
    pub fn new(id: usize, cluster: Cluster, acceptor: Arc<Acceptor>, timeout: Duration) -> Self {
        Leader {
            id,
            cluster,
            acceptor,
            round: Mutex::new(0),
            timeout,
        }
    }

    pub fn cluster(&self) -> &Cluster {
        &self.cluster
    }

    /// Runs one full round for `value` and reports what the cluster decided.
    ///
    /// Never retries: a rejected round is reported as such and a later call
    /// will use a higher proposal number.
    pub async fn propose(&self, value: Operation) -> Outcome {
        let key = value.key().to_owned();
        let quorum = self.cluster.quorum();
        let proposal = self.next_proposal(&key);
        info!("proposing {} under {}", value, proposal);

        let promises = scout::prepare(&self.cluster, proposal, &key, self.timeout).await;
        self.observe(promises.promised);
        if promises.count < quorum {
            warn!("{} rejected: {} of {} promised", proposal, promises.count, self.cluster.len());
            return Outcome::Rejected(Rejection::NoPromiseMajority {
                promises: promises.count,
                quorum,
            });
        }

        let value = match promises.accepted {
        | Some(pvalue) => {
            if pvalue.value != value {
                info!("{} adopting {} accepted under {}", proposal, pvalue.value, pvalue.proposal);
            }
            pvalue.value
        }
        | None => value,
        };

        let accepts = commander::accept(&self.cluster, proposal, &value, &key, self.timeout).await;
        if accepts < quorum {
            warn!("{} failed: {} of {} accepted", proposal, accepts, self.cluster.len());
            return Outcome::Rejected(Rejection::NoAcceptMajority {
                accepts,
                quorum,
            });
        }

        info!("{} decided {}", proposal, value);
        self.cluster.notify(Request::Learn(value.clone()));
        Outcome::Committed(value)
    }

    /// Broadcasts a clear request so every member forgets all Paxos state.
    /// Returns how many members acknowledged.
    pub async fn initiate_new_paxos_run(&self) -> usize {
        info!("starting a new paxos run across {} members", self.cluster.len());
        self.cluster.broadcast(Request::Clear, self.timeout)
            .await
            .into_iter()
            .filter(|response| *response == Some(Response::Ack))
            .count()
    }

    /// Next proposal for `key`: one round past anything this node has issued,
    /// promised or heard about.
    fn next_proposal(&self, key: &str) -> ProposalID {
        // accepted_id never exceeds highest_promised
        let promised = self.acceptor.instance(key).lock().highest_promised;
        let mut round = self.round.lock();
        *round = std::cmp::max(*round, promised.round) + 1;
        ProposalID::new(*round, self.id)
    }

    fn observe(&self, promised: ProposalID) {
        let mut round = self.round.lock();
        if promised.round > *round {
            debug!("raising round from {} to {}", *round, promised.round);
            *round = promised.round;
        }
    }
}
