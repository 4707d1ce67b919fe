use std::time::Duration;

use crate::cluster::Cluster;
use crate::message::{Operation, ProposalID, Request, Response};

/// Sends `accept(proposal, value, key)` to every member and counts how many
/// accepted that exact proposal.
pub async fn accept(
    cluster: &Cluster,
    proposal: ProposalID,
    value: &Operation,
    key: &str,
    timeout: Duration,
) -> usize {
    let request = Request::Accept {
        proposal,
        value: value.clone(),
        key: key.to_owned(),
    };
    let accepted = cluster.broadcast(request, timeout)
        .await
        .into_iter()
        .flatten()
        .filter(|response| match response {
            | Response::Accepted { proposal: accepted, .. } => *accepted == proposal,
            | _ => false,
        })
        .count();
    debug!("{} accepts for {} on {}", accepted, proposal, key);
    accepted
}
