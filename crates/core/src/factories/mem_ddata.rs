//! The in-process replicated store implementation provided by bloomcast.
//!
//! This is NOT a production module. It is for testing and single-process
//! clusters only: one factory instance plays the role of one replicated
//! map, and every handle created from it shares the same state, so
//! convergence is instantaneous and all write consistencies behave alike.
//! Per-node write failures can be injected to exercise the forced-resync
//! paths of the update loop.

use bloomcast_api::*;
use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::sync::{Arc, Mutex};

/// The in-process [DDataFactory] provided by bloomcast.
pub struct MemDDataFactory<S> {
    shared: Arc<Shared<S>>,
}

impl<S> std::fmt::Debug for MemDDataFactory<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemDDataFactory").finish()
    }
}

struct Shared<S> {
    inner: Mutex<Inner<S>>,
}

struct Inner<S> {
    entries: HashMap<NodeId, HashSet<S>>,
    listeners: Vec<DynDDataListener>,
    failing: HashSet<NodeId>,
}

impl<S> Default for Inner<S> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            listeners: Vec::new(),
            failing: HashSet::new(),
        }
    }
}

impl<S> Shared<S> {
    /// Run `mutate` under the lock, then invoke the change listeners
    /// outside of it. Listeners only poke mailboxes, so calling them
    /// inline keeps write-then-notify ordering observable to callers.
    fn mutate_and_notify(
        &self,
        mutate: impl FnOnce(&mut Inner<S>) -> BcResult<bool>,
    ) -> BcResult<()> {
        let listeners = {
            let mut inner = self.inner.lock().unwrap();
            if !mutate(&mut inner)? {
                return Ok(());
            }
            inner.listeners.clone()
        };
        for listener in &listeners {
            listener();
        }
        Ok(())
    }
}

impl<S: Eq + Hash + Clone + Send + Sync + std::fmt::Debug + 'static>
    MemDDataFactory<S>
{
    /// Construct a new MemDDataFactory, i.e. a new empty replicated map.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner::default()),
            }),
        })
    }

    /// Make every write by `node` fail with a replication timeout until
    /// cleared again. Reads are unaffected.
    pub fn fail_writes(&self, node: &NodeId, failing: bool) {
        let mut inner = self.shared.inner.lock().unwrap();
        if failing {
            inner.failing.insert(node.clone());
        } else {
            inner.failing.remove(node);
        }
    }
}

impl<S: Eq + Hash + Clone + Send + Sync + std::fmt::Debug + 'static>
    DDataFactory<S> for MemDDataFactory<S>
{
    fn default_config(&self, _config: &mut config::Config) -> BcResult<()> {
        Ok(())
    }

    fn validate_config(&self, _config: &config::Config) -> BcResult<()> {
        Ok(())
    }

    fn create(
        &self,
        _builder: Arc<Builder>,
        node_id: NodeId,
    ) -> BoxFut<'static, BcResult<DynDData<S>>> {
        let shared = self.shared.clone();
        Box::pin(async move {
            let out: DynDData<S> = Arc::new(MemDData { node_id, shared });
            Ok(out)
        })
    }
}

struct MemDData<S> {
    node_id: NodeId,
    shared: Arc<Shared<S>>,
}

impl<S> std::fmt::Debug for MemDData<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemDData")
            .field("node_id", &self.node_id)
            .finish()
    }
}

impl<S: Eq + Hash + Clone + Send + Sync + std::fmt::Debug + 'static> DData<S>
    for MemDData<S>
{
    fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    fn write(
        &self,
        update: IndelUpdate<S>,
        _consistency: WriteConsistency,
    ) -> BoxFut<'_, BcResult<()>> {
        Box::pin(async move {
            self.shared.mutate_and_notify(|inner| {
                if inner.failing.contains(&self.node_id) {
                    return Err(BcError::replication_timeout(format!(
                        "injected write failure on {}",
                        self.node_id,
                    )));
                }
                let entry =
                    inner.entries.entry(self.node_id.clone()).or_default();
                update.apply_to(entry);
                Ok(true)
            })
        })
    }

    fn read(&self) -> BoxFut<'_, BcResult<HashMap<NodeId, HashSet<S>>>> {
        Box::pin(async move {
            Ok(self.shared.inner.lock().unwrap().entries.clone())
        })
    }

    fn add_change_listener(&self, listener: DynDDataListener) {
        self.shared.inner.lock().unwrap().listeners.push(listener);
    }

    fn remove_node(&self, node: &NodeId) -> BoxFut<'_, BcResult<()>> {
        let node = node.clone();
        Box::pin(async move {
            self.shared.mutate_and_notify(|inner| {
                Ok(inner.entries.remove(&node).is_some())
            })
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use bloomcast_test_utils::test_node;
    use std::sync::atomic::{AtomicU32, Ordering};

    async fn two_handles() -> (DynDData<i32>, DynDData<i32>, Arc<Builder>) {
        let factory = MemDDataFactory::<i32>::new();
        let builder = Arc::new(crate::default_builder());
        let a = factory
            .create(builder.clone(), test_node(1))
            .await
            .unwrap();
        let b = factory
            .create(builder.clone(), test_node(2))
            .await
            .unwrap();
        (a, b, builder)
    }

    #[tokio::test]
    async fn handles_of_one_factory_share_state() {
        let (a, b, _builder) = two_handles().await;

        let mut update = IndelUpdate::new();
        update.insert(7);
        a.write(update, WriteConsistency::Local).await.unwrap();

        let read = b.read().await.unwrap();
        assert_eq!(HashSet::from([7]), read[&test_node(1)]);
    }

    #[tokio::test]
    async fn replacement_write_discards_previous_entry() {
        let (a, _b, _builder) = two_handles().await;

        let mut update = IndelUpdate::new();
        update.insert(1);
        update.insert(2);
        a.write(update, WriteConsistency::Local).await.unwrap();
        a.write(
            IndelUpdate::replacing(HashSet::from([9])),
            WriteConsistency::All,
        )
        .await
        .unwrap();

        let read = a.read().await.unwrap();
        assert_eq!(HashSet::from([9]), read[&test_node(1)]);
    }

    #[tokio::test]
    async fn injected_failure_times_out_writes_until_cleared() {
        let factory = MemDDataFactory::<i32>::new();
        let builder = Arc::new(crate::default_builder());
        let a = factory
            .create(builder.clone(), test_node(1))
            .await
            .unwrap();

        factory.fail_writes(&test_node(1), true);
        let mut update = IndelUpdate::new();
        update.insert(7);
        let err = a
            .write(update.clone(), WriteConsistency::Local)
            .await
            .unwrap_err();
        assert!(err.is_replication_failure());
        assert!(a.read().await.unwrap().is_empty());

        factory.fail_writes(&test_node(1), false);
        a.write(update, WriteConsistency::Local).await.unwrap();
        assert_eq!(
            HashSet::from([7]),
            a.read().await.unwrap()[&test_node(1)],
        );
    }

    #[tokio::test]
    async fn listeners_fire_on_write_and_removal() {
        let (a, b, _builder) = two_handles().await;

        let notified = Arc::new(AtomicU32::new(0));
        b.add_change_listener(Arc::new({
            let notified = notified.clone();
            move || {
                notified.fetch_add(1, Ordering::Relaxed);
            }
        }));

        let mut update = IndelUpdate::new();
        update.insert(7);
        a.write(update, WriteConsistency::Local).await.unwrap();
        assert_eq!(1, notified.load(Ordering::Relaxed));

        a.remove_node(&test_node(1)).await.unwrap();
        assert_eq!(2, notified.load(Ordering::Relaxed));
        assert!(a.read().await.unwrap().is_empty());

        // Removing an absent entry is not a change.
        a.remove_node(&test_node(1)).await.unwrap();
        assert_eq!(2, notified.load(Ordering::Relaxed));
    }
}
