//! # Summary
//!
//! This module defines external connections to clients.
//! Requests on one connection are answered in the order they arrive.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;

use crate::error::Error;
use crate::external;
use crate::server::Server;
use crate::socket;

/// Accepts client connections. Aborting this task also closes every
/// connection it accepted.
pub async fn listen(listener: TcpListener, server: Arc<Server>) {
    let mut connections = JoinSet::new();
    loop {
        tokio::select! {
            (stream, addr) = socket::accept(&listener) => {
                connections.spawn(serve(stream, addr, server.clone()));
            }
            Some(_) = connections.join_next(), if !connections.is_empty() => (),
        }
    }
}

async fn serve(stream: TcpStream, addr: SocketAddr, server: Arc<Server>) {
    let (mut client_rx, mut client_tx) = socket::split::<external::Request, external::Response>(stream);
    info!("connected to client {}", addr);
    loop {
        let response = match client_rx.recv().await {
        | Some(Ok(request)) => {
            debug!("received {:?} from {}", request, addr);
            server.handle(request).await
        }
        | Some(Err(Error::Codec(error))) => {
            warn!("malformed request from {}: {}", addr, error);
            external::Response::Rejected { reason: "malformed request".into() }
        }
        | Some(Err(error)) => {
            debug!("client {} failed: {}", addr, error);
            break;
        }
        | None => break,
        };
        trace!("sending {:?} to {}", response, addr);
        if let Err(error) = client_tx.send(&response).await {
            debug!("failed to answer {}: {}", addr, error);
            break;
        }
    }
    info!("disconnected from client {}", addr);
}
