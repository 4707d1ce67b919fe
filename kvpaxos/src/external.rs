//! # Summary
//!
//! This module defines the protocol spoken between clients and a node, and
//! a small async client for it. Each request on a connection gets exactly
//! one response, in order.

use std::fmt;
use std::net::SocketAddr;

use serde_derive::{Deserialize, Serialize};
use tokio::net::TcpStream;

use crate::error::{Error, Result};
use crate::socket;

#[derive(Serialize, Deserialize)]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Request {
    Get {
        key: String,
    },
    Put {
        key: String,
        value: String,
    },
    Delete {
        key: String,
    },
    /// Clear Paxos state on every member.
    Reset,
}

#[derive(Serialize, Deserialize)]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Response {
    Value {
        key: String,
        value: String,
    },
    NotFound {
        key: String,
    },
    /// The cluster stored `value` under `key`.
    Stored {
        key: String,
        value: String,
    },
    Deleted {
        key: String,
    },
    Rejected {
        reason: String,
    },
    Reset {
        acknowledged: usize,
    },
}

impl fmt::Display for Response {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
        | Response::Value { key, value } => write!(fmt, "Value for {}: {}", key, value),
        | Response::NotFound { key } => write!(fmt, "Key {} cannot be found", key),
        | Response::Stored { key, value } => write!(fmt, "Key: {} Value: {} have been written to the cluster", key, value),
        | Response::Deleted { key } => write!(fmt, "Key {} deleted from the cluster", key),
        | Response::Rejected { reason } => write!(fmt, "Operation failed: {}", reason),
        | Response::Reset { acknowledged } => write!(fmt, "Paxos state cleared on {} members", acknowledged),
        }
    }
}

/// Connection to a single node's client port.
pub struct Client {
    addr: SocketAddr,
    rx: socket::Rx<Response>,
    tx: socket::Tx<Request>,
}

impl Client {
    pub async fn connect(addr: SocketAddr) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        let (rx, tx) = socket::split(stream);
        Ok(Client { addr, rx, tx })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub async fn call(&mut self, request: Request) -> Result<Response> {
        self.tx.send(&request).await?;
        match self.rx.recv().await {
        | Some(response) => response,
        | None => Err(Error::Closed(self.addr.to_string())),
        }
    }

    pub async fn get(&mut self, key: &str) -> Result<Response> {
        self.call(Request::Get { key: key.to_owned() }).await
    }

    pub async fn put(&mut self, key: &str, value: &str) -> Result<Response> {
        self.call(Request::Put { key: key.to_owned(), value: value.to_owned() }).await
    }

    pub async fn delete(&mut self, key: &str) -> Result<Response> {
        self.call(Request::Delete { key: key.to_owned() }).await
    }

    pub async fn reset(&mut self) -> Result<Response> {
        self.call(Request::Reset).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn responses_read_like_status_lines() {
        let found = Response::Value { key: "Key1".into(), value: "Value1".into() };
        let missing = Response::NotFound { key: "Key9".into() };
        assert_eq!(found.to_string(), "Value for Key1: Value1");
        assert_eq!(missing.to_string(), "Key Key9 cannot be found");
    }
}
