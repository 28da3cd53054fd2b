//! The pub-sub factory: the assembly point wiring publisher, subscriber,
//! update loop and ack-label registry together for one node.
//!
//! Should not be created more than once per node and factory id. The
//! factory id names one pub-sub instance cluster-wide (one message type,
//! one topic extractor) and labels its counters and log lines, so several
//! independent pub-subs can share a cluster.

use crate::factories::core_acks::{spawn_acks, AcksCmd};
use crate::factories::core_publisher::spawn_publisher;
use crate::factories::core_subscriber::{
    spawn_subscriber, SubscriberCmd, SubscriberSink,
};
use crate::factories::core_updater::{spawn_updater, UpdaterCmd};
use crate::factories::supervisor::Mailbox;
use bloomcast_api::*;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::AbortHandle;

/// CorePubSub configuration types.
mod config {
    use bloomcast_api::WriteConsistency;
    use std::time::Duration;

    /// Configuration parameters for [PubSubFactory](super::PubSubFactory).
    #[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct CorePubSubConfig {
        /// The number of hash functions in the topic hash family.
        ///
        /// Advertised memory is ≈ 4·k bytes per local topic; a false
        /// positive requires all k fingerprints of a topic to collide.
        /// Must match on every node of the cluster.
        ///
        /// Default: 2.
        pub hash_family_size: usize,

        /// The cluster-wide hash salt. Must match on every node.
        ///
        /// Default: a fixed literal.
        pub seed: String,

        /// The interval in milliseconds between update-loop flushes of
        /// local subscription state into the replicated store.
        ///
        /// Default: 3000 (3s).
        pub update_interval_ms: u64,

        /// The probability per tick of writing a full replacement instead
        /// of a delta. Forced writes recover from missed deltas; 1.0
        /// disables delta updates entirely.
        ///
        /// Default: 0.01.
        pub force_update_probability: f64,

        /// The delay in milliseconds before respawning a crashed pub-sub
        /// component task.
        ///
        /// Default: 10000 (10s).
        pub restart_delay_ms: u64,

        /// The replication consistency for ordinary writes. Forced
        /// replacement writes always use `all`.
        ///
        /// Default: local.
        pub write_consistency: WriteConsistency,

        /// The per-write replication timeout in milliseconds. A write
        /// missing it counts as failed and schedules a forced
        /// replacement.
        ///
        /// Default: 2000 (2s).
        pub write_timeout_ms: u64,
    }

    impl Default for CorePubSubConfig {
        fn default() -> Self {
            Self {
                hash_family_size: 2,
                seed: "Lv2PdDowjSHfbQhU".into(),
                update_interval_ms: 3000,
                force_update_probability: 0.01,
                restart_delay_ms: 10_000,
                write_consistency: WriteConsistency::Local,
                write_timeout_ms: 2000,
            }
        }
    }

    impl CorePubSubConfig {
        /// Get the update interval as a [Duration].
        pub fn update_interval(&self) -> Duration {
            Duration::from_millis(self.update_interval_ms)
        }

        /// Get the restart delay as a [Duration].
        pub fn restart_delay(&self) -> Duration {
            Duration::from_millis(self.restart_delay_ms)
        }

        /// Get the write timeout as a [Duration].
        pub fn write_timeout(&self) -> Duration {
            Duration::from_millis(self.write_timeout_ms)
        }
    }

    /// Module-level configuration for CorePubSub.
    #[derive(Debug, Default, Clone, serde::Serialize, serde::Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct CorePubSubModConfig {
        /// CorePubSub configuration.
        #[serde(default)]
        pub core_pub_sub: CorePubSubConfig,
    }

    impl bloomcast_api::config::ModConfig for CorePubSubModConfig {}
}

pub use config::*;

/// Creator of pub-sub access for one node.
pub struct PubSubFactory<T: PubSubMessage> {
    factory_id: Arc<str>,
    node_id: NodeId,
    extractor: DynTopicExtractor<T>,
    transport: DynTransport<T>,
    config: CorePubSubConfig,
    hasher: DynTopicHasher,
    compressed: DynCompressedDData,
    ack_store: Option<DynLiteralDData>,
    counters: PubSubCounters,
}

impl<T: PubSubMessage> std::fmt::Debug for PubSubFactory<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PubSubFactory")
            .field("factory_id", &self.factory_id)
            .field("node_id", &self.node_id)
            .finish()
    }
}

impl<T: PubSubMessage> PubSubFactory<T> {
    /// Create a pub-sub factory.
    ///
    /// The builder carries the cluster-shared pieces (config, replicated
    /// store factories, hash family); the transport and topic extractor
    /// come from the host at factory time.
    pub async fn create(
        builder: Arc<Builder>,
        factory_id: impl Into<Arc<str>>,
        node_id: NodeId,
        extractor: DynTopicExtractor<T>,
        transport: DynTransport<T>,
    ) -> BcResult<Self> {
        let factory_id = factory_id.into();
        let mod_config: CorePubSubModConfig =
            builder.config.get_module_config()?;
        let config = mod_config.core_pub_sub;
        if config.hash_family_size == 0 {
            return Err(BcError::other("hashFamilySize must be at least 1"));
        }
        if !(0.0..=1.0).contains(&config.force_update_probability) {
            return Err(BcError::other(
                "forceUpdateProbability must be within [0, 1]",
            ));
        }

        let hasher: DynTopicHasher = match &builder.topic_hasher {
            Some(hasher) => hasher.clone(),
            None => Arc::new(SeededTopicHasher::new(
                config.seed.as_str(),
                config.hash_family_size,
            )),
        };
        let compressed = builder
            .compressed
            .create(builder.clone(), node_id.clone())
            .await?;
        let ack_store = match &builder.acks {
            Some(factory) => Some(
                factory.create(builder.clone(), node_id.clone()).await?,
            ),
            None => None,
        };
        let counters = PubSubCounters::new(factory_id.clone());

        Ok(Self {
            factory_id,
            node_id,
            extractor,
            transport,
            config,
            hasher,
            compressed,
            ack_store,
            counters,
        })
    }

    /// Start the publish side: a supervised publisher task routing on the
    /// replicated advertisement view.
    pub fn start_distributed_pub(&self) -> DynDistributedPub<T> {
        Arc::new(spawn_publisher(
            self.factory_id.clone(),
            self.node_id.clone(),
            self.extractor.clone(),
            self.hasher.clone(),
            self.compressed.clone(),
            self.transport.clone(),
            self.config.restart_delay(),
        ))
    }

    /// Start the subscribe side: supervised subscriber, update loop and,
    /// if configured, the ack-label registry. Hooks the subscriber up as
    /// this node's transport sink.
    pub fn start_distributed_sub(&self) -> DynDistributedSub<T> {
        let subscriber = spawn_subscriber(
            self.factory_id.clone(),
            self.extractor.clone(),
            self.counters.clone(),
            self.config.restart_delay(),
        );
        self.transport.register_sink(
            self.node_id.clone(),
            Arc::new(SubscriberSink(subscriber.mailbox.clone())),
        );
        let (updater, updater_abort) = spawn_updater(
            self.factory_id.clone(),
            self.config.clone(),
            self.hasher.clone(),
            self.compressed.clone(),
            subscriber.mailbox.clone(),
        );
        let mut aborts = vec![subscriber.abort, updater_abort];
        let acks = self.ack_store.as_ref().map(|store| {
            let (mailbox, abort) = spawn_acks(
                self.factory_id.clone(),
                store.clone(),
                self.config.write_consistency,
                self.config.write_timeout(),
                self.config.restart_delay(),
            );
            aborts.push(abort);
            mailbox
        });
        Arc::new(CoreSub {
            factory_id: self.factory_id.clone(),
            subscriber: subscriber.mailbox,
            updater,
            acks,
            _aborts: aborts,
        })
    }

    /// The delivery counters of this factory.
    pub fn counters(&self) -> PubSubCounters {
        self.counters.clone()
    }

    /// The node this factory belongs to.
    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }
}

struct CoreSub<T: PubSubMessage> {
    factory_id: Arc<str>,
    subscriber: Arc<Mailbox<SubscriberCmd<T>>>,
    updater: Arc<Mailbox<UpdaterCmd<T>>>,
    acks: Option<Arc<Mailbox<AcksCmd>>>,
    _aborts: Vec<AbortHandle>,
}

impl<T: PubSubMessage> std::fmt::Debug for CoreSub<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreSub")
            .field("factory_id", &self.factory_id)
            .finish()
    }
}

impl<T: PubSubMessage> CoreSub<T> {
    fn send_updater(
        &self,
        make_cmd: impl FnOnce(oneshot::Sender<BcResult<()>>) -> UpdaterCmd<T>,
    ) -> BoxFut<'_, BcResult<()>> {
        let (ack, rx) = oneshot::channel();
        self.updater.send(make_cmd(ack));
        Box::pin(async move {
            rx.await.map_err(|_| {
                BcError::other("subscription update loop stopped")
            })?
        })
    }

    fn send_acks(
        &self,
        make_cmd: impl FnOnce(oneshot::Sender<BcResult<()>>) -> AcksCmd,
    ) -> BoxFut<'_, BcResult<()>> {
        let Some(acks) = &self.acks else {
            return Box::pin(async {
                Err(BcError::other(
                    "ack labels are not configured for this factory",
                ))
            });
        };
        let (ack, rx) = oneshot::channel();
        acks.send(make_cmd(ack));
        Box::pin(async move {
            rx.await
                .map_err(|_| BcError::other("ack label registry stopped"))?
        })
    }
}

impl<T: PubSubMessage> DistributedSub<T> for CoreSub<T> {
    fn subscribe(
        &self,
        handle: DynSubscriberHandle<T>,
        topics: HashSet<Topic>,
    ) -> BoxFut<'_, BcResult<()>> {
        self.send_updater(move |ack| UpdaterCmd::Subscribe {
            handle,
            topics,
            ack,
        })
    }

    fn unsubscribe(
        &self,
        subscriber: SubscriberId,
        topics: HashSet<Topic>,
    ) -> BoxFut<'_, BcResult<()>> {
        self.send_updater(move |ack| UpdaterCmd::Unsubscribe {
            subscriber,
            topics,
            ack,
        })
    }

    fn remove_subscriber(
        &self,
        subscriber: SubscriberId,
    ) -> BoxFut<'_, BcResult<()>> {
        self.send_updater(move |ack| UpdaterCmd::RemoveSubscriber {
            subscriber,
            ack,
        })
    }

    fn declare_ack_labels(
        &self,
        labels: HashSet<AckLabel>,
    ) -> BoxFut<'_, BcResult<()>> {
        self.send_acks(move |ack| AcksCmd::Declare { labels, ack })
    }

    fn release_ack_labels(
        &self,
        labels: HashSet<AckLabel>,
    ) -> BoxFut<'_, BcResult<()>> {
        self.send_acks(move |ack| AcksCmd::Release { labels, ack })
    }

    fn owner_of_ack_label(
        &self,
        label: AckLabel,
    ) -> BoxFut<'_, BcResult<Option<NodeId>>> {
        let Some(acks) = &self.acks else {
            return Box::pin(async {
                Err(BcError::other(
                    "ack labels are not configured for this factory",
                ))
            });
        };
        let (reply, rx) = oneshot::channel();
        acks.send(AcksCmd::OwnerOf { label, reply });
        Box::pin(async move {
            rx.await
                .map_err(|_| BcError::other("ack label registry stopped"))?
        })
    }
}

impl<T: PubSubMessage> Drop for CoreSub<T> {
    fn drop(&mut self) {
        self.subscriber.send(SubscriberCmd::Stop);
        self.updater.send(UpdaterCmd::Stop);
        if let Some(acks) = &self.acks {
            acks.send(AcksCmd::Stop);
        }
    }
}
