#![deny(missing_docs)]
//! Bloomcast API contains the bloomcast module traits and the basic types
//! required to define the api of those traits.
//!
//! Bloomcast is a cluster-wide topic pub-sub: every node hosts an arbitrary
//! set of local subscribers keyed by string topics, and every message
//! published anywhere in the cluster is delivered to exactly the local
//! subscribers whose topics match. Instead of replicating the full topic
//! set, each node advertises a compressed form of it cluster-wide: the
//! fingerprints produced by a seeded hash family. Publishers route on the
//! fingerprints, subscribers filter false positives against the
//! authoritative local registry.
//!
//! If you want a runnable reference implementation of these traits, see
//! the bloomcast_core crate.

/// Boxed future type.
pub type BoxFut<'a, T> =
    std::pin::Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;

pub mod id;
pub use id::{AckLabel, NodeId, SubscriberId, Topic};

pub mod config;

pub mod builder;
pub use builder::Builder;

mod error;
pub use error::*;

mod indel;
pub use indel::*;

pub mod hash;
pub use hash::*;

pub mod ddata;
pub use ddata::*;

pub mod pubsub;
pub use pubsub::*;

pub mod transport;
pub use transport::*;

pub mod subscriptions;
pub use subscriptions::*;

pub mod metrics;
pub use metrics::*;
