//! # Summary
//!
//! This module contains the roles each node plays in the protocol.
//!
//! `acceptor` and `replica` are the passive halves that answer peers,
//! `leader` drives a round with the help of `scout` (prepare phase) and
//! `commander` (accept phase), `failure` flips the acceptor on and off,
//! and `peer` and `client` carry requests over TCP.

/// Distributed memory.
pub(crate) mod acceptor;

/// Client communication.
pub(crate) mod client;

/// Accept phase.
pub(crate) mod commander;

/// Intermittent failure injection.
pub(crate) mod failure;

/// Round driver.
pub(crate) mod leader;

/// Peer server communication.
pub(crate) mod peer;

/// Replicated key/value state.
pub(crate) mod replica;

/// Prepare phase.
pub(crate) mod scout;
