#[macro_use] extern crate derivative;
#[macro_use] extern crate log;

mod cluster;
mod config;
mod error;
mod message;
mod registry;
mod server;
mod socket;
mod state;
mod store;
mod thread;

pub mod external;

pub use crate::cluster::{Cluster, Member, Remote};
pub use crate::config::{Config, Running, INTERNAL_PORT};
pub use crate::error::{Error, Result};
pub use crate::message::{Envelope, Operation, PValue, ProposalID, Request, Response};
pub use crate::registry::RegistryConfig;
pub use crate::server::{Node, Server};
pub use crate::state::{Instance, Table};
pub use crate::store::Store;
pub use crate::thread::acceptor::Acceptor;
pub use crate::thread::failure::{FailureConfig, Liveness, Simulator};
pub use crate::thread::leader::{Leader, Outcome, Rejection};
pub use crate::thread::peer::Peer;
pub use crate::thread::replica::Replica;
