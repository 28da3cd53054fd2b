//! Pub-sub delivery counters.
//!
//! The true/false positive pair is the primary observability surface for
//! diagnosing hash-collision regressions: a rising false-positive rate
//! means the compressed advertisements are routing messages to nodes with
//! no matching subscriber.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A monotonic 64-bit counter, freely shareable.
#[derive(Debug, Clone, Default)]
pub struct Counter(Arc<AtomicU64>);

impl Counter {
    /// Increment by one.
    pub fn increment(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    /// The current value.
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Delivery counters of one pub-sub factory, keyed by its factory id.
#[derive(Debug, Clone)]
pub struct PubSubCounters {
    factory_id: Arc<str>,

    /// Forwarded messages that reached at least one local subscriber.
    pub true_positive: Counter,

    /// Forwarded messages that matched no local subscriber, i.e. hash
    /// collisions at the routing layer.
    pub false_positive: Counter,
}

impl PubSubCounters {
    /// Construct the counter pair for a factory.
    pub fn new(factory_id: impl Into<Arc<str>>) -> Self {
        Self {
            factory_id: factory_id.into(),
            true_positive: Counter::default(),
            false_positive: Counter::default(),
        }
    }

    /// The factory these counters belong to.
    pub fn factory_id(&self) -> &str {
        &self.factory_id
    }
}
