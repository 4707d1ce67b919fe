//! # Summary
//!
//! This module glues the roles of a single node together. `Node` is the
//! passive half that peers call into (acceptor, learner, administration);
//! `Server` adds the proposer and answers client requests.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use futures::future::{self, BoxFuture};

use crate::cluster::{Cluster, Remote};
use crate::error::Result;
use crate::external;
use crate::message::{Operation, Request, Response};
use crate::thread::acceptor::Acceptor;
use crate::thread::failure::Liveness;
use crate::thread::leader::{Leader, Outcome};
use crate::thread::replica::Replica;

/// Peer-facing side of a node.
#[derive(Debug)]
pub struct Node {
    id: usize,
    name: String,
    acceptor: Arc<Acceptor>,
    replica: Replica,
}

impl Node {
    pub fn new(id: usize, name: String, liveness: Liveness) -> Self {
        Node {
            id,
            acceptor: Arc::new(Acceptor::new(name.clone(), liveness)),
            replica: Replica::new(name.clone()),
            name,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn acceptor(&self) -> &Arc<Acceptor> {
        &self.acceptor
    }

    pub fn replica(&self) -> &Replica {
        &self.replica
    }

    /// Answers a peer request. Anything that goes wrong inside a handler
    /// turns into a refusal instead of taking the node down; per-key updates
    /// happen under the instance lock, so a failed handler leaves no partial
    /// state behind.
    pub fn handle(&self, request: Request) -> Response {
        let fallback = Response::refuse(&request);
        match panic::catch_unwind(AssertUnwindSafe(|| self.dispatch(request))) {
        | Ok(response) => response,
        | Err(_) => {
            error!("{} handler failed, refusing request", self.name);
            fallback
        }
        }
    }

    fn dispatch(&self, request: Request) -> Response {
        trace!("{} received {:?}", self.name, request);
        match request {
        | Request::Prepare { proposal, key } => self.acceptor.prepare(proposal, &key),
        | Request::Accept { proposal, value, key } => self.acceptor.accept(proposal, value, &key),
        | Request::Learn(operation) => {
            self.replica.learn(operation);
            Response::Ack
        }
        | Request::Clear => {
            self.acceptor.clear();
            Response::Ack
        }
        | Request::Identity => Response::Identity(self.name.clone()),
        }
    }
}

impl Remote for Node {
    fn call(&self, request: Request) -> BoxFuture<'static, Result<Response>> {
        Box::pin(future::ready(Ok(self.handle(request))))
    }
}

/// Client-facing side of a node.
pub struct Server {
    node: Arc<Node>,
    leader: Leader,
}

impl Server {
    pub fn new(node: Arc<Node>, cluster: Cluster, timeout: Duration) -> Self {
        let leader = Leader::new(node.id(), cluster, node.acceptor().clone(), timeout);
        Server { node, leader }
    }

    pub fn node(&self) -> &Arc<Node> {
        &self.node
    }

    pub fn leader(&self) -> &Leader {
        &self.leader
    }

    /// Local read; never goes through consensus.
    pub fn get(&self, key: &str) -> Option<String> {
        self.node.replica().store().get(key)
    }

    pub async fn put(&self, key: String, value: String) -> external::Response {
        if key.is_empty() {
            return external::Response::Rejected { reason: "empty key".into() };
        }
        self.commit(Operation::Put { key, value }).await
    }

    /// Keys this node has never seen are reported missing without a round.
    pub async fn delete(&self, key: String) -> external::Response {
        if !self.node.replica().store().contains(&key) {
            debug!("{} has no {:?}, skipping consensus", self.node.name(), key);
            return external::Response::NotFound { key };
        }
        self.commit(Operation::Delete { key }).await
    }

    pub async fn reset(&self) -> external::Response {
        let acknowledged = self.leader.initiate_new_paxos_run().await;
        external::Response::Reset { acknowledged }
    }

    pub async fn handle(&self, request: external::Request) -> external::Response {
        match request {
        | external::Request::Get { key } => match self.get(&key) {
            | Some(value) => external::Response::Value { key, value },
            | None => external::Response::NotFound { key },
        },
        | external::Request::Put { key, value } => self.put(key, value).await,
        | external::Request::Delete { key } => self.delete(key).await,
        | external::Request::Reset => self.reset().await,
        }
    }

    async fn commit(&self, operation: Operation) -> external::Response {
        match self.leader.propose(operation).await {
        | Outcome::Committed(Operation::Put { key, value }) => external::Response::Stored { key, value },
        | Outcome::Committed(Operation::Delete { key }) => external::Response::Deleted { key },
        | Outcome::Rejected(rejection) => external::Response::Rejected { reason: rejection.to_string() },
        }
    }
}
