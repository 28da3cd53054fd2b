//! The node-local, authoritative subscription registry.

use bloomcast_api::*;
use std::collections::HashSet;

/// Mapping from topics to local subscriber handles, plus the inverse
/// mapping for O(degree) subscriber removal.
///
/// Owned and mutated exclusively by the update loop task, so no locking
/// is involved. Snapshots handed to the subscriber are O(1) thanks to the
/// structural sharing of the underlying persistent maps.
///
/// Invariant: the forward and inverse mappings always agree, and a handle
/// is retained exactly as long as it is subscribed to at least one topic.
pub struct Subscriptions<T: PubSubMessage> {
    by_topic: im::HashMap<Topic, im::HashSet<SubscriberId>>,
    by_subscriber: im::HashMap<SubscriberId, im::HashSet<Topic>>,
    handles: im::HashMap<SubscriberId, DynSubscriberHandle<T>>,
}

impl<T: PubSubMessage> std::fmt::Debug for Subscriptions<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscriptions")
            .field("topics", &self.by_topic.len())
            .field("subscribers", &self.by_subscriber.len())
            .finish()
    }
}

impl<T: PubSubMessage> Default for Subscriptions<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: PubSubMessage> Subscriptions<T> {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            by_topic: im::HashMap::new(),
            by_subscriber: im::HashMap::new(),
            handles: im::HashMap::new(),
        }
    }

    /// Add a subscriber to each of the given topics. Idempotent: repeated
    /// calls with the same arguments leave the registry unchanged.
    pub fn subscribe(
        &mut self,
        handle: DynSubscriberHandle<T>,
        topics: impl IntoIterator<Item = Topic>,
    ) {
        let id = handle.id().clone();
        let mut subscribed =
            self.by_subscriber.get(&id).cloned().unwrap_or_default();
        for topic in topics {
            self.by_topic
                .entry(topic.clone())
                .or_default()
                .insert(id.clone());
            subscribed.insert(topic);
        }
        if subscribed.is_empty() {
            // Subscribing to no topics registers nothing.
            return;
        }
        self.by_subscriber.insert(id.clone(), subscribed);
        self.handles.insert(id, handle);
    }

    /// Remove a subscriber from the listed topics only.
    pub fn unsubscribe(
        &mut self,
        subscriber: &SubscriberId,
        topics: impl IntoIterator<Item = Topic>,
    ) {
        let Some(mut subscribed) =
            self.by_subscriber.get(subscriber).cloned()
        else {
            return;
        };
        for topic in topics {
            if subscribed.remove(&topic).is_none() {
                continue;
            }
            if let Some(subscribers) = self.by_topic.get_mut(&topic) {
                subscribers.remove(subscriber);
                if subscribers.is_empty() {
                    self.by_topic.remove(&topic);
                }
            }
        }
        if subscribed.is_empty() {
            self.by_subscriber.remove(subscriber);
            self.handles.remove(subscriber);
        } else {
            self.by_subscriber.insert(subscriber.clone(), subscribed);
        }
    }

    /// Remove a subscriber from every topic. Used when the host observes
    /// the subscriber's termination.
    pub fn remove_subscriber(&mut self, subscriber: &SubscriberId) {
        let Some(subscribed) = self.by_subscriber.remove(subscriber) else {
            return;
        };
        for topic in subscribed {
            if let Some(subscribers) = self.by_topic.get_mut(&topic) {
                subscribers.remove(subscriber);
                if subscribers.is_empty() {
                    self.by_topic.remove(&topic);
                }
            }
        }
        self.handles.remove(subscriber);
    }

    /// The set of topics with at least one subscriber.
    pub fn topic_set(&self) -> HashSet<Topic> {
        self.by_topic.keys().cloned().collect()
    }

    /// The symmetric difference of the current topic set against the last
    /// exported one, as `(added, removed)`.
    ///
    /// Between two flushes, any number of subscription calls change the
    /// returned diff at most once per topic: the diff reflects sets, not
    /// call counts.
    pub fn diff_since(
        &self,
        last_exported: &HashSet<Topic>,
    ) -> (HashSet<Topic>, HashSet<Topic>) {
        let added = self
            .by_topic
            .keys()
            .filter(|topic| !last_exported.contains(topic))
            .cloned()
            .collect();
        let removed = last_exported
            .iter()
            .filter(|topic| !self.by_topic.contains_key(topic))
            .cloned()
            .collect();
        (added, removed)
    }

    /// An immutable snapshot for the subscriber task. O(1) handoff.
    pub fn snapshot(&self) -> SubscriptionsReader<T> {
        SubscriptionsReader::new(self.by_topic.clone(), self.handles.clone())
    }
}
