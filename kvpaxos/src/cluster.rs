//! # Summary
//!
//! This module describes the fixed set of cluster members a node talks to,
//! and the fan-out helpers the proposer uses to reach all of them at once.
//! The member list is resolved once at startup and never changes afterwards.

use std::sync::Arc;
use std::time::Duration;

use futures::future::{self, BoxFuture};

use crate::error::Result;
use crate::message::{Request, Response};

/// Callable reference to a cluster member's peer-facing handlers.
pub trait Remote: Send + Sync {
    fn call(&self, request: Request) -> BoxFuture<'static, Result<Response>>;
}

/// Named reference to one cluster member.
#[derive(Derivative)]
#[derivative(Debug)]
#[derive(Clone)]
pub struct Member {
    name: String,
    #[derivative(Debug = "ignore")]
    remote: Arc<dyn Remote>,
}

impl Member {
    pub fn new<N: Into<String>, R: Remote + 'static>(name: N, remote: R) -> Self {
        Member {
            name: name.into(),
            remote: Arc::new(remote),
        }
    }

    pub fn from_arc<N: Into<String>>(name: N, remote: Arc<dyn Remote>) -> Self {
        Member {
            name: name.into(),
            remote,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn call(&self, request: Request) -> BoxFuture<'static, Result<Response>> {
        self.remote.call(request)
    }
}

/// Immutable, ordered list of every member, including the local node.
#[derive(Clone, Debug)]
pub struct Cluster {
    members: Arc<[Member]>,
}

impl Cluster {
    pub fn new(members: Vec<Member>) -> Self {
        Cluster {
            members: members.into(),
        }
    }

    pub fn members(&self) -> &[Member] {
        &self.members
    }

    /// Configured cluster size. Unreachable members still count.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Smallest number of members that is strictly more than half.
    pub fn quorum(&self) -> usize {
        self.members.len() / 2 + 1
    }

    /// Sends `request` to every member concurrently and waits at most
    /// `timeout` for each reply. Failed or late members yield `None`.
    pub async fn broadcast(&self, request: Request, timeout: Duration) -> Vec<Option<Response>> {
        let calls = self.members.iter().map(|member| {
            let call = member.call(request.clone());
            let name = member.name();
            async move {
                match tokio::time::timeout(timeout, call).await {
                | Ok(Ok(response)) => {
                    trace!("received {:?} from {}", response, name);
                    Some(response)
                }
                | Ok(Err(error)) => {
                    warn!("{} unreachable: {}", name, error);
                    None
                }
                | Err(_) => {
                    warn!("{} timed out after {:?}", name, timeout);
                    None
                }
                }
            }
        });
        future::join_all(calls).await
    }

    /// Sends `request` to every member without waiting for replies.
    /// Delivery failures are logged and not retried.
    pub fn notify(&self, request: Request) {
        for member in self.members.iter() {
            let call = member.call(request.clone());
            let name = member.name.clone();
            tokio::spawn(async move {
                match call.await {
                | Ok(_) => trace!("delivered to {}", name),
                | Err(error) => warn!("failed to deliver to {}: {}", name, error),
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    impl Remote for Echo {
        fn call(&self, _: Request) -> BoxFuture<'static, Result<Response>> {
            Box::pin(future::ready(Ok(Response::Ack)))
        }
    }

    struct Silent;

    impl Remote for Silent {
        fn call(&self, _: Request) -> BoxFuture<'static, Result<Response>> {
            Box::pin(future::pending())
        }
    }

    fn cluster(echo: usize, silent: usize) -> Cluster {
        let mut members = Vec::new();
        for index in 0..echo {
            members.push(Member::new(format!("echo-{}", index), Echo));
        }
        for index in 0..silent {
            members.push(Member::new(format!("silent-{}", index), Silent));
        }
        Cluster::new(members)
    }

    #[test]
    fn quorum_is_strict_majority_of_configured_size() {
        assert_eq!(cluster(1, 0).quorum(), 1);
        assert_eq!(cluster(2, 0).quorum(), 2);
        assert_eq!(cluster(3, 0).quorum(), 2);
        assert_eq!(cluster(2, 2).quorum(), 3);
        assert_eq!(cluster(3, 2).quorum(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn broadcast_drops_members_that_miss_the_deadline() {
        let cluster = cluster(3, 2);
        let responses = cluster.broadcast(Request::Identity, Duration::from_secs(2)).await;
        assert_eq!(responses.len(), 5);
        assert_eq!(responses.iter().filter(|response| response.is_some()).count(), 3);
        assert!(responses[3].is_none() && responses[4].is_none());
    }

    #[test]
    fn members_hide_their_remote_in_debug_output() {
        let member = Member::new("server-1", Echo);
        assert!(format!("{:?}", member).contains("server-1"));
    }
}
