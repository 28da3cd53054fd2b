//! Local subscriber handles and the read-only subscriptions snapshot.

use crate::*;
use std::collections::HashSet;
use std::sync::Arc;

/// An addressable reference to a local message consumer.
///
/// The registry holds a non-owning reference: the consumer owns itself and
/// may disappear at any time, in which case deliveries are dropped and the
/// host is expected to call `remove_subscriber`. Two handles address the
/// same consumer exactly when their [SubscriberHandle::id]s are equal.
pub trait SubscriberHandle<T: PubSubMessage>:
    'static + Send + Sync + std::fmt::Debug
{
    /// The identity of this subscriber.
    fn id(&self) -> &SubscriberId;

    /// Hand a forwarded message to the consumer.
    ///
    /// A single non-blocking tell: if the consumer's mailbox is bounded
    /// and full, the host runtime's policy applies.
    fn deliver(&self, envelope: Envelope<T>);
}

/// Trait object [SubscriberHandle].
pub type DynSubscriberHandle<T> = Arc<dyn SubscriberHandle<T>>;

/// An immutable snapshot of the local subscriptions registry.
///
/// Readers are freely shareable between threads; mutating the registry
/// produces a new reader and never disturbs ones already handed out. The
/// subscriber task filters every forwarded message against the current
/// reader, which is authoritative: hash-collision false positives at the
/// routing layer stop here.
#[derive(Debug, Clone)]
pub struct SubscriptionsReader<T: PubSubMessage> {
    by_topic: im::HashMap<Topic, im::HashSet<SubscriberId>>,
    handles: im::HashMap<SubscriberId, DynSubscriberHandle<T>>,
}

impl<T: PubSubMessage> Default for SubscriptionsReader<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T: PubSubMessage> SubscriptionsReader<T> {
    /// The snapshot of an empty registry.
    pub fn empty() -> Self {
        Self {
            by_topic: im::HashMap::new(),
            handles: im::HashMap::new(),
        }
    }

    /// Construct a snapshot from the registry's internal maps.
    ///
    /// Every subscriber id appearing under a topic must have a handle in
    /// `handles`; ids without one are ignored at lookup time.
    pub fn new(
        by_topic: im::HashMap<Topic, im::HashSet<SubscriberId>>,
        handles: im::HashMap<SubscriberId, DynSubscriberHandle<T>>,
    ) -> Self {
        Self { by_topic, handles }
    }

    /// The union of subscribers over the given topics, each handle at most
    /// once no matter how many topics it matches.
    pub fn subscribers_for<'t>(
        &self,
        topics: impl IntoIterator<Item = &'t Topic>,
    ) -> Vec<DynSubscriberHandle<T>> {
        let mut seen: HashSet<&SubscriberId> = HashSet::new();
        let mut out = Vec::new();
        for topic in topics {
            let Some(subscribers) = self.by_topic.get(topic) else {
                continue;
            };
            for id in subscribers {
                if seen.contains(id) {
                    continue;
                }
                if let Some(handle) = self.handles.get(id) {
                    seen.insert(id);
                    out.push(handle.clone());
                }
            }
        }
        out
    }

    /// The topics with at least one subscriber.
    pub fn topics(&self) -> impl Iterator<Item = &Topic> {
        self.by_topic.keys()
    }

    /// `true` if no subscriber is registered for any topic.
    pub fn is_empty(&self) -> bool {
        self.by_topic.is_empty()
    }
}
