//! # Summary
//!
//! This module abstracts over external connections to clients and peer servers.
//!
//! Wraps `tokio-util`'s length-delimited codec around the two halves of a
//! TCP stream and encodes every frame with `bincode`. Because frames are
//! length-delimited, a payload that fails to decode does not desynchronize
//! the stream: the reader reports a codec error and can carry on.

use std::future::Future;
use std::io;
use std::marker::PhantomData;
use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio_util::codec::{FramedRead, FramedWrite, LengthDelimitedCodec};

use crate::error::{Error, Result};

/// Pause after a failed `accept` before trying again.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Receiving half. Expects length-delimited, bincode-encoded values of type `T`.
pub struct Rx<T> {
    inner: FramedRead<OwnedReadHalf, LengthDelimitedCodec>,
    _marker: PhantomData<fn() -> T>,
}

/// Transmitting half. Sends length-delimited, bincode-encoded values of type `T`.
pub struct Tx<T> {
    inner: FramedWrite<OwnedWriteHalf, LengthDelimitedCodec>,
    _marker: PhantomData<fn(T)>,
}

/// Split a `TcpStream` into a pair of receiving and transmitting channels.
pub fn split<R, T>(stream: TcpStream) -> (Rx<R>, Tx<T>)
where R: serde::de::DeserializeOwned,
      T: serde::Serialize,
{
    let (rx, tx) = stream.into_split();
    let rx = Rx {
        inner: FramedRead::new(rx, LengthDelimitedCodec::new()),
        _marker: PhantomData,
    };
    let tx = Tx {
        inner: FramedWrite::new(tx, LengthDelimitedCodec::new()),
        _marker: PhantomData,
    };
    (rx, tx)
}

impl<R: serde::de::DeserializeOwned> Rx<R> {
    /// Next frame, or `None` once the remote end has closed the stream.
    /// `Error::Codec` leaves the stream usable.
    pub async fn recv(&mut self) -> Option<Result<R>> {
        let frame = match self.inner.next().await? {
        | Ok(frame) => frame,
        | Err(error) => return Some(Err(Error::Io(error))),
        };
        Some(bincode::deserialize(&frame).map_err(Error::from))
    }
}

impl<T: serde::Serialize> Tx<T> {
    pub async fn send(&mut self, message: &T) -> Result<()> {
        let frame = bincode::serialize(message)?;
        self.inner.send(Bytes::from(frame)).await?;
        Ok(())
    }
}

/// Next inbound connection. Failed accepts (e.g. out of file descriptors)
/// are logged and retried after a short pause.
pub async fn accept(listener: &TcpListener) -> (TcpStream, SocketAddr) {
    let (stream, addr) = retry_accept(|| listener.accept(), ACCEPT_BACKOFF).await;
    stream.set_nodelay(true).ok();
    (stream, addr)
}

async fn retry_accept<F, Fut, T>(mut accept: F, backoff: Duration) -> T
where F: FnMut() -> Fut,
      Fut: Future<Output = io::Result<T>>,
{
    loop {
        match accept().await {
        | Ok(accepted) => return accepted,
        | Err(error) => {
            warn!("failed to accept connection: {}", error);
            tokio::time::sleep(backoff).await;
        }
        }
    }
}
