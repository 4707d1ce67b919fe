//! # Summary
//!
//! This module turns the configured list of peer addresses into a
//! `Cluster`. Every member other than the local node is asked for its
//! identity until it answers, so a node only starts serving clients once
//! the whole cluster is reachable.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use crate::cluster::{Cluster, Member};
use crate::error::{Error, Result};
use crate::message::{Request, Response};
use crate::server::Node;
use crate::thread::peer::Peer;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RegistryConfig {
    /// Identity requests per member before giving up
    pub retries: usize,

    /// Deadline for each request, and the pause between requests
    pub backoff: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        RegistryConfig {
            retries: 5,
            backoff: Duration::from_secs(2),
        }
    }
}

impl RegistryConfig {
    pub fn with_retries(mut self, retries: usize) -> Self {
        self.retries = std::cmp::max(retries, 1);
        self
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }
}

/// Builds the cluster seen by `node`, which sits at index `node.id()` of `addrs`.
pub async fn resolve(node: Arc<Node>, addrs: &[SocketAddr], config: RegistryConfig) -> Result<Cluster> {
    let mut members = Vec::with_capacity(addrs.len());
    for (index, addr) in addrs.iter().enumerate() {
        if index == node.id() {
            members.push(Member::from_arc(node.name().to_owned(), node.clone()));
            continue;
        }
        let peer = Peer::new(*addr);
        let name = lookup(&peer, config).await?;
        info!("{} resolved {} at {}", node.name(), name, addr);
        members.push(Member::new(name, peer));
    }
    Ok(Cluster::new(members))
}

/// Asks `peer` for its name, retrying with a fixed pause.
async fn lookup(peer: &Peer, config: RegistryConfig) -> Result<String> {
    let attempts = std::cmp::max(config.retries, 1);
    for attempt in 1..=attempts {
        match tokio::time::timeout(config.backoff, peer.request(Request::Identity)).await {
        | Ok(Ok(Response::Identity(name))) => return Ok(name),
        | Ok(Ok(response)) => {
            return Err(Error::Unexpected(format!("{:?} from {}", response, peer.addr())));
        }
        | Ok(Err(error)) => {
            debug!("attempt {}/{} to reach {} failed: {}", attempt, attempts, peer.addr(), error);
        }
        | Err(_) => {
            debug!("attempt {}/{} to reach {} timed out", attempt, attempts, peer.addr());
        }
        }
        if attempt < attempts {
            tokio::time::sleep(config.backoff).await;
        }
    }
    warn!("giving up on {} after {} attempts", peer.addr(), attempts);
    Err(Error::Unresolved {
        addr: peer.addr(),
        attempts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::thread::failure::Liveness;

    #[tokio::test]
    async fn local_node_needs_no_request() {
        let node = Arc::new(Node::new(0, "server-1".into(), Liveness::new()));
        let addrs = vec!["127.0.0.1:1".parse().unwrap()];
        let cluster = resolve(node, &addrs, RegistryConfig::default()).await.unwrap();
        assert_eq!(cluster.len(), 1);
        assert_eq!(cluster.members()[0].name(), "server-1");
    }

    #[tokio::test]
    async fn unreachable_members_fail_resolution() {
        let node = Arc::new(Node::new(0, "server-1".into(), Liveness::new()));
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let closed = listener.local_addr().unwrap();
        drop(listener);
        let addrs = vec!["127.0.0.1:1".parse().unwrap(), closed];
        let config = RegistryConfig::default()
            .with_retries(2)
            .with_backoff(Duration::from_millis(10));
        match resolve(node, &addrs, config).await {
        | Err(Error::Unresolved { addr, attempts }) => {
            assert_eq!(addr, closed);
            assert_eq!(attempts, 2);
        }
        | other => panic!("expected resolution failure, got {:?}", other.map(|cluster| cluster.len())),
        }
    }
}
