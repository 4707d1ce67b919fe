use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::error::{Error, Result};
use crate::registry::{self, RegistryConfig};
use crate::server::{Node, Server};
use crate::thread;
use crate::thread::failure::{FailureConfig, Liveness, Simulator};

/// Peer ports default to this base plus the node index.
pub const INTERNAL_PORT: u16 = 20000;

#[derive(Clone, Debug)]
pub struct Config {
    /// Index of this node in `peers`
    id: usize,

    /// Port for incoming client requests
    port: u16,

    /// Number of members
    count: usize,

    /// Peer address of every member, this node included
    peers: Vec<SocketAddr>,

    /// Per-member deadline for each consensus phase
    timeout: Duration,

    failures: FailureConfig,

    registry: RegistryConfig,
}

impl Config {
    /// Cluster of `count` nodes on the loopback interface, with peer ports
    /// starting at `INTERNAL_PORT`. Members past the last port are left
    /// out, which `run` reports as a configuration error.
    pub fn new(id: usize, port: u16, count: usize) -> Self {
        let peers = (0..count)
            .map_while(|index| {
                let port = INTERNAL_PORT.checked_add(u16::try_from(index).ok()?)?;
                Some(SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port))
            })
            .collect();
        Config {
            id,
            port,
            count,
            peers,
            timeout: Duration::from_secs(1),
            failures: FailureConfig::default(),
            registry: RegistryConfig::default(),
        }
    }

    pub fn with_peers(mut self, peers: Vec<SocketAddr>) -> Self {
        self.count = peers.len();
        self.peers = peers;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_failures(mut self, failures: FailureConfig) -> Self {
        self.failures = failures;
        self
    }

    pub fn with_registry(mut self, registry: RegistryConfig) -> Self {
        self.registry = registry;
        self
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn peers(&self) -> &[SocketAddr] {
        &self.peers
    }

    /// Display name, counting from one.
    pub fn name(&self) -> String {
        format!("server-{}", self.id + 1)
    }

    fn validate(&self) -> Result<()> {
        if self.peers.len() != self.count {
            return Err(Error::Config(format!(
                "{} members do not fit in the peer ports from {}",
                self.count,
                INTERNAL_PORT,
            )));
        }
        if self.peers.is_empty() {
            return Err(Error::Config("cluster has no members".into()));
        }
        if self.id >= self.peers.len() {
            return Err(Error::Config(format!(
                "node index {} out of range for {} members",
                self.id,
                self.peers.len(),
            )));
        }
        if self.timeout == Duration::from_secs(0) {
            return Err(Error::Config("timeout must be positive".into()));
        }
        Ok(())
    }

    /// Binds both ports, resolves the cluster and starts serving.
    ///
    /// Peer requests are answered as soon as the peer port is bound, so
    /// nodes started at the same time can resolve each other. Client
    /// requests are only accepted once every member has been resolved.
    pub async fn run(self) -> Result<Running> {
        self.validate()?;
        let name = self.name();
        let liveness = Liveness::new();
        let node = Arc::new(Node::new(self.id, name.clone(), liveness.clone()));
        let mut tasks = Tasks::default();

        let peer_listener = TcpListener::bind(self.peers[self.id]).await?;
        let peer_addr = peer_listener.local_addr()?;
        info!("{} listening for peers on {}", name, peer_addr);
        tasks.push(tokio::spawn(thread::peer::listen(peer_listener, node.clone())));

        // Early returns from here on drop `tasks`, which stops the peer listener
        let cluster = registry::resolve(node.clone(), &self.peers, self.registry).await?;
        let server = Arc::new(Server::new(node, cluster, self.timeout));

        let client_listener = TcpListener::bind(SocketAddr::new(self.peers[self.id].ip(), self.port)).await?;
        let client_addr = client_listener.local_addr()?;
        info!("{} listening for clients on {}", name, client_addr);
        tasks.push(tokio::spawn(thread::client::listen(client_listener, server.clone())));

        let simulator = if self.failures.enabled {
            Some(Simulator::spawn(name, liveness, self.failures))
        } else {
            None
        };

        Ok(Running {
            server,
            peer_addr,
            client_addr,
            tasks,
            simulator,
        })
    }
}

/// Background tasks of one node, aborted together when dropped.
#[derive(Debug, Default)]
struct Tasks(Vec<JoinHandle<()>>);

impl Tasks {
    fn push(&mut self, task: JoinHandle<()>) {
        self.0.push(task);
    }
}

impl Drop for Tasks {
    fn drop(&mut self) {
        for task in &self.0 {
            task.abort();
        }
    }
}

/// A started node. Dropping it stops every task it spawned.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct Running {
    #[derivative(Debug = "ignore")]
    server: Arc<Server>,
    peer_addr: SocketAddr,
    client_addr: SocketAddr,
    tasks: Tasks,
    simulator: Option<Simulator>,
}

impl Running {
    pub fn server(&self) -> &Arc<Server> {
        &self.server
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    pub fn client_addr(&self) -> SocketAddr {
        self.client_addr
    }
}
