use std::time::Duration;

use crate::cluster::Cluster;
use crate::message::{PValue, ProposalID, Request, Response};

/// What the prepare phase collected from the cluster.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Promises {
    /// Number of members that promised our proposal
    pub count: usize,

    /// Previously accepted value with the highest proposal among the promises
    pub accepted: Option<PValue>,

    /// Highest promise reported by members that rejected us
    pub promised: ProposalID,
}

impl Promises {
    /// Folds one reply for `proposal` into the tally.
    pub fn record(&mut self, proposal: ProposalID, response: Response) {
        match response {
        | Response::Promise { proposal: promised, accepted } if promised == proposal => {
            self.count += 1;
            if let Some(pvalue) = accepted {
                let higher = self.accepted
                    .as_ref()
                    .map_or(true, |best| pvalue.proposal > best.proposal);
                if higher {
                    self.accepted = Some(pvalue);
                }
            }
        }
        | Response::Reject { promised } => {
            self.promised = std::cmp::max(self.promised, promised);
        }
        | other => debug!("ignoring {:?} during prepare for {}", other, proposal),
        }
    }
}

/// Sends `prepare(proposal, key)` to every member and tallies the promises.
pub async fn prepare(cluster: &Cluster, proposal: ProposalID, key: &str, timeout: Duration) -> Promises {
    let request = Request::Prepare {
        proposal,
        key: key.to_owned(),
    };
    let mut promises = Promises::default();
    for response in cluster.broadcast(request, timeout).await.into_iter().flatten() {
        promises.record(proposal, response);
    }
    debug!("{} promises for {} on {}", promises.count, proposal, key);
    promises
}
