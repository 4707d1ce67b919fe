use std::net::SocketAddr;

/// Everything that can go wrong outside of the consensus decision itself.
///
/// A proposal that fails to gather a majority is not an error; see
/// [`Outcome`](crate::Outcome).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("codec error: {0}")]
    Codec(#[from] bincode::Error),

    #[error("connection to {0} closed")]
    Closed(String),

    #[error("timed out waiting for {0}")]
    Timeout(String),

    #[error("unexpected response: {0}")]
    Unexpected(String),

    #[error("could not resolve cluster member at {addr} after {attempts} attempts")]
    Unresolved {
        addr: SocketAddr,
        attempts: usize,
    },

    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;
