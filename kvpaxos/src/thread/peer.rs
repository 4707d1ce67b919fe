//! # Summary
//!
//! This module carries peer requests over TCP.
//!
//! `Peer` is the calling side: it connects lazily, reconnects after the
//! connection drops, and multiplexes concurrent calls over one stream by
//! tagging each request with a sequence number. `listen` is the answering
//! side: each incoming request is handled on its own task and the response
//! is written back with the same sequence number.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use hashbrown::HashMap as Map;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;

use crate::cluster::Remote;
use crate::error::{Error, Result};
use crate::message::{Envelope, Request, Response};
use crate::server::Node;
use crate::socket;

/// Calls waiting for a response on one connection.
#[derive(Default)]
struct Pending {
    waiters: Map<u64, oneshot::Sender<Response>>,
    closed: bool,
}

impl Pending {
    /// Fails every outstanding call and refuses new ones.
    fn close(&mut self) {
        self.closed = true;
        self.waiters.clear();
    }
}

/// Deadline for dialing a peer.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(1);

/// Removes a call's entry from `Pending` once the caller stops waiting,
/// whether it got a response or gave up.
struct Waiting<'a> {
    pending: &'a parking_lot::Mutex<Pending>,
    seq: u64,
}

impl Drop for Waiting<'_> {
    fn drop(&mut self) {
        self.pending.lock().waiters.remove(&self.seq);
    }
}

/// Live connection to a peer.
#[derive(Clone)]
struct Connection {
    addr: SocketAddr,
    tx: mpsc::UnboundedSender<Envelope<Request>>,
    pending: Arc<parking_lot::Mutex<Pending>>,
    seq: Arc<AtomicU64>,
}

impl Connection {
    fn spawn(addr: SocketAddr, stream: TcpStream) -> Self {
        let (mut peer_rx, mut peer_tx) = socket::split::<Envelope<Response>, Envelope<Request>>(stream);
        let (tx, mut rx) = mpsc::unbounded_channel::<Envelope<Request>>();
        let pending = Arc::new(parking_lot::Mutex::new(Pending::default()));

        // Forward outgoing requests
        let writer_pending = pending.clone();
        tokio::spawn(async move {
            while let Some(envelope) = rx.recv().await {
                trace!("sending {:?} to {}", envelope, addr);
                if let Err(error) = peer_tx.send(&envelope).await {
                    warn!("failed to write to {}: {}", addr, error);
                    break;
                }
            }
            writer_pending.lock().close();
        });

        // Resolve incoming responses
        let reader_pending = pending.clone();
        tokio::spawn(async move {
            loop {
                match peer_rx.recv().await {
                | Some(Ok(Envelope { seq, body })) => {
                    if let Some(waiter) = reader_pending.lock().waiters.remove(&seq) {
                        waiter.send(body).ok();
                    }
                }
                | Some(Err(Error::Codec(error))) => {
                    warn!("discarding malformed frame from {}: {}", addr, error);
                }
                | Some(Err(error)) => {
                    debug!("connection to {} failed: {}", addr, error);
                    break;
                }
                | None => break,
                }
            }
            info!("disconnected from {}", addr);
            reader_pending.lock().close();
        });

        Connection {
            addr,
            tx,
            pending,
            seq: Arc::new(AtomicU64::new(0)),
        }
    }

    fn is_closed(&self) -> bool {
        self.pending.lock().closed || self.tx.is_closed()
    }

    async fn call(&self, request: Request) -> Result<Response> {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let (waiter, response) = oneshot::channel();
        {
            let mut pending = self.pending.lock();
            if pending.closed {
                return Err(Error::Closed(self.addr.to_string()));
            }
            pending.waiters.insert(seq, waiter);
        }
        let _waiting = Waiting { pending: &self.pending, seq };
        if self.tx.send(Envelope { seq, body: request }).is_err() {
            return Err(Error::Closed(self.addr.to_string()));
        }
        response.await.map_err(|_| Error::Closed(self.addr.to_string()))
    }
}

/// Remote reference to another node's peer port.
#[derive(Clone)]
pub struct Peer {
    addr: SocketAddr,
    connect_timeout: Duration,
    connection: Arc<tokio::sync::Mutex<Option<Connection>>>,
}

impl Peer {
    pub fn new(addr: SocketAddr) -> Self {
        Peer {
            addr,
            connect_timeout: CONNECT_TIMEOUT,
            connection: Arc::new(tokio::sync::Mutex::new(None)),
        }
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub async fn request(&self, request: Request) -> Result<Response> {
        let connection = self.connect().await?;
        connection.call(request).await
    }

    /// Reuses the open connection, or dials a new one. Other calls wait
    /// for the dial, so it is bounded by `connect_timeout`.
    async fn connect(&self) -> Result<Connection> {
        let mut guard = self.connection.lock().await;
        if let Some(connection) = guard.as_ref() {
            if !connection.is_closed() {
                return Ok(connection.clone());
            }
        }
        let stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect(self.addr))
            .await
            .map_err(|_| Error::Timeout(format!("connection to {}", self.addr)))??;
        stream.set_nodelay(true)?;
        info!("connected to {}", self.addr);
        let connection = Connection::spawn(self.addr, stream);
        *guard = Some(connection.clone());
        Ok(connection)
    }
}

impl Remote for Peer {
    fn call(&self, request: Request) -> BoxFuture<'static, Result<Response>> {
        let peer = self.clone();
        async move { peer.request(request).await }.boxed()
    }
}

/// Accepts peer connections and answers them from `node`. Aborting this
/// task also closes every connection it accepted.
pub async fn listen(listener: TcpListener, node: Arc<Node>) {
    let mut connections = JoinSet::new();
    loop {
        tokio::select! {
            (stream, addr) = socket::accept(&listener) => {
                debug!("{} accepted peer connection from {}", node.name(), addr);
                connections.spawn(serve(stream, addr, node.clone()));
            }
            Some(_) = connections.join_next(), if !connections.is_empty() => (),
        }
    }
}

async fn serve(stream: TcpStream, addr: SocketAddr, node: Arc<Node>) {
    let (mut peer_rx, mut peer_tx) = socket::split::<Envelope<Request>, Envelope<Response>>(stream);
    let (tx, mut rx) = mpsc::unbounded_channel::<Envelope<Response>>();

    // Forward outgoing responses
    let writer = tokio::spawn(async move {
        while let Some(envelope) = rx.recv().await {
            if let Err(error) = peer_tx.send(&envelope).await {
                debug!("failed to answer {}: {}", addr, error);
                break;
            }
        }
    });

    // Handle incoming requests
    loop {
        match peer_rx.recv().await {
        | Some(Ok(Envelope { seq, body })) => {
            let node = node.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                let response = node.handle(body);
                tx.send(Envelope { seq, body: response }).ok();
            });
        }
        | Some(Err(Error::Codec(error))) => {
            warn!("{} discarding malformed frame from {}: {}", node.name(), addr, error);
        }
        | Some(Err(error)) => {
            debug!("{} lost peer connection from {}: {}", node.name(), addr, error);
            break;
        }
        | None => break,
        }
    }

    drop(tx);
    writer.await.ok();
    debug!("{} closed peer connection from {}", node.name(), addr);
}
