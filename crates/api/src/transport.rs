//! Node-to-node forwarding of published messages.
//!
//! The wire format is delegated to the host runtime's cluster transport;
//! this api only fixes the payload shape ([Envelope]) and the delivery
//! contract: at-most-once, non-blocking, per-sender ordered.

use crate::*;
use std::sync::Arc;

/// A message forwarded across the cluster, together with the node it was
/// published from so that replies can route back.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope<T> {
    /// The publishing node.
    pub source: NodeId,

    /// The published message.
    pub message: T,
}

/// Accepts envelopes forwarded to this node's subscriber.
pub trait EnvelopeSink<T: PubSubMessage>:
    'static + Send + Sync + std::fmt::Debug
{
    /// Hand an incoming envelope to the local subscriber. Must not block.
    fn accept(&self, envelope: Envelope<T>);
}

/// Trait object [EnvelopeSink].
pub type DynEnvelopeSink<T> = Arc<dyn EnvelopeSink<T>>;

/// Cluster transport carrying forwarded messages between nodes.
pub trait Transport<T: PubSubMessage>:
    'static + Send + Sync + std::fmt::Debug
{
    /// Forward an envelope to the subscriber running on `target`.
    ///
    /// At-most-once: an unreachable or unknown target drops the envelope
    /// without error. Envelopes from one sender to one target arrive in
    /// send order.
    fn forward(
        &self,
        target: NodeId,
        envelope: Envelope<T>,
    ) -> BoxFut<'_, BcResult<()>>;

    /// Connect the local subscriber's intake: envelopes addressed to
    /// `node` are handed to `sink` from now on, replacing any previous
    /// registration for that node.
    fn register_sink(&self, node: NodeId, sink: DynEnvelopeSink<T>);
}

/// Trait object [Transport].
pub type DynTransport<T> = Arc<dyn Transport<T>>;
