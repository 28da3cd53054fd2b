//! The distributed pub-sub API surface exposed to external collaborators.

use crate::*;
use std::collections::HashSet;
use std::sync::Arc;

/// Marker for message payload types the pub-sub can carry.
///
/// The pub-sub is fully parametric in the message type; the only coupling
/// point is the [TopicExtractor] the caller supplies.
pub trait PubSubMessage:
    'static + Clone + Send + Sync + std::fmt::Debug
{
}
impl<T: 'static + Clone + Send + Sync + std::fmt::Debug> PubSubMessage for T {}

/// Extracts from each message the topics it is published at.
///
/// Supplied by the caller at factory time. Must be identical on every
/// node: the publisher uses it to route and the subscriber uses it to
/// filter.
pub trait TopicExtractor<T: PubSubMessage>:
    'static + Send + Sync + std::fmt::Debug
{
    /// The topics of a message. An empty set publishes nowhere; that is
    /// not an error.
    fn topics(&self, message: &T) -> HashSet<Topic>;
}

/// Trait object [TopicExtractor].
pub type DynTopicExtractor<T> = Arc<dyn TopicExtractor<T>>;

/// Publish-side access to the distributed pub-sub.
pub trait DistributedPub<T: PubSubMessage>:
    'static + Send + Sync + std::fmt::Debug
{
    /// Publish a message to every subscriber in the cluster whose topics
    /// match.
    ///
    /// Fire-and-forget: returns as soon as the message is enqueued for
    /// routing. Delivery is at-most-once and unordered across publishers;
    /// one publisher's messages to one subscriber arrive in publish order.
    fn publish(&self, message: T) -> BcResult<()>;
}

/// Trait object [DistributedPub].
pub type DynDistributedPub<T> = Arc<dyn DistributedPub<T>>;

/// Subscribe-side access to the distributed pub-sub.
///
/// The returned futures of the subscription operations resolve once the
/// local change has been written to the replicated store, i.e. once remote
/// publishers can be expected to start (or stop) forwarding.
pub trait DistributedSub<T: PubSubMessage>:
    'static + Send + Sync + std::fmt::Debug
{
    /// Add a subscriber to each of the given topics. Idempotent.
    fn subscribe(
        &self,
        handle: DynSubscriberHandle<T>,
        topics: HashSet<Topic>,
    ) -> BoxFut<'_, BcResult<()>>;

    /// Remove a subscriber from the given topics only.
    fn unsubscribe(
        &self,
        subscriber: SubscriberId,
        topics: HashSet<Topic>,
    ) -> BoxFut<'_, BcResult<()>>;

    /// Remove a subscriber from every topic. Used on subscriber death.
    fn remove_subscriber(
        &self,
        subscriber: SubscriberId,
    ) -> BoxFut<'_, BcResult<()>>;

    /// Declare acknowledgement labels owned by this node.
    ///
    /// Fails with [BcError::LabelConflict] if any label is already
    /// advertised by another node; in that case none of the labels are
    /// declared.
    fn declare_ack_labels(
        &self,
        labels: HashSet<AckLabel>,
    ) -> BoxFut<'_, BcResult<()>>;

    /// Release previously declared acknowledgement labels.
    fn release_ack_labels(
        &self,
        labels: HashSet<AckLabel>,
    ) -> BoxFut<'_, BcResult<()>>;

    /// The node currently advertising a label, if any.
    ///
    /// Reads the latest locally observed replica state. While concurrent
    /// declarations are being reconciled, different nodes may transiently
    /// disagree; after quiescence every node reports the same owner.
    fn owner_of_ack_label(
        &self,
        label: AckLabel,
    ) -> BoxFut<'_, BcResult<Option<NodeId>>>;
}

/// Trait object [DistributedSub].
pub type DynDistributedSub<T> = Arc<dyn DistributedSub<T>>;
