//! Replicated key-value stores ("ddata") advertising per-node state
//! cluster-wide.
//!
//! Two instantiations exist: the compressed store (`S = i32`) carrying
//! each node's topic fingerprints, and the literal store (`S = String`)
//! carrying declared acknowledgement labels, where hash collisions would
//! be unacceptable.
//!
//! Writes are asynchronous and eventually convergent. Each node's entry is
//! single-writer: only the owning node mutates it, every other node is a
//! reader. An entry appears when a node first advertises state and is
//! removed when that node leaves the cluster.

use crate::*;
use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::sync::Arc;

/// Consistency level a replicated write waits for before acknowledging.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    serde::Serialize,
    serde::Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub enum WriteConsistency {
    /// Acknowledge once the local replica has applied the write.
    #[default]
    Local,

    /// Acknowledge once a majority of replicas have applied the write.
    Majority,

    /// Acknowledge once every reachable replica has applied the write.
    All,
}

/// Notified after any entry of the replicated map changes.
///
/// The notification carries no payload, deduplication and re-reading are
/// the listener's responsibility. Listeners are invoked inline on the
/// writer's execution context and must not block.
pub type DynDDataListener = Arc<dyn Fn() + 'static + Send + Sync>;

/// A handle to one replicated map, bound to the owning node's identity.
pub trait DData<S: Eq + Hash + 'static>:
    'static + Send + Sync + std::fmt::Debug
{
    /// The node whose entry this handle writes.
    fn node_id(&self) -> &NodeId;

    /// Apply an indel update to this node's entry, waiting for the
    /// requested consistency.
    ///
    /// May fail with [BcError::ReplicationTimeout] or
    /// [BcError::ClusterUnreachable]; the caller decides whether to retry
    /// or to schedule a forced full replacement.
    fn write(
        &self,
        update: IndelUpdate<S>,
        consistency: WriteConsistency,
    ) -> BoxFut<'_, BcResult<()>>;

    /// The latest locally observed replica state.
    fn read(&self) -> BoxFut<'_, BcResult<HashMap<NodeId, HashSet<S>>>>;

    /// Register a change listener. Listeners cannot be removed; they live
    /// as long as the replicated map does.
    fn add_change_listener(&self, listener: DynDDataListener);

    /// Drop a departed node's entry from the replica.
    fn remove_node(&self, node: &NodeId) -> BoxFut<'_, BcResult<()>>;
}

/// Trait object [DData].
pub type DynDData<S> = Arc<dyn DData<S>>;

/// The compressed advertisement store: per node, the hash fingerprints of
/// the topics it is interested in.
pub type DynCompressedDData = DynDData<i32>;

/// The literal store: per node, its declared acknowledgement labels.
pub type DynLiteralDData = DynDData<String>;

/// A factory for creating [DData] handles bound to a node identity.
///
/// One factory instance represents one replicated map: handles created
/// from the same factory observe each other's writes.
pub trait DDataFactory<S: Eq + Hash + 'static>:
    'static + Send + Sync + std::fmt::Debug
{
    /// Help the builder construct a default config for this module.
    fn default_config(&self, config: &mut config::Config) -> BcResult<()>;

    /// Validate configuration.
    fn validate_config(&self, config: &config::Config) -> BcResult<()>;

    /// Construct a handle writing `node_id`'s entry.
    fn create(
        &self,
        builder: Arc<Builder>,
        node_id: NodeId,
    ) -> BoxFut<'static, BcResult<DynDData<S>>>;
}

/// Trait object [DDataFactory].
pub type DynDDataFactory<S> = Arc<dyn DDataFactory<S>>;
