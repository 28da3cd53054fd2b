//! The update loop: flush local subscription state into the replicated
//! advertisement store.
//!
//! The updater owns the authoritative [Subscriptions] registry. All
//! subscription mutations arrive as mailbox commands, and every
//! `updateIntervalMs` the loop diffs the registry's topic set against the
//! last flushed one and writes the fingerprint delta. Each tick flips to a
//! full replacement with probability `forceUpdateProbability`, or
//! deterministically after a failed write; forced writes recover from any
//! missed delta, so replication failures are swallowed rather than
//! surfaced.
//!
//! Subscription acks are parked until the flush that covers them
//! succeeds: when a `subscribe` future resolves, remote publishers can be
//! expected to have the advertisement.

use crate::factories::core_pubsub::CorePubSubConfig;
use crate::factories::core_subscriber::SubscriberCmd;
use crate::factories::supervisor::{spawn_supervised, Mailbox};
use crate::Subscriptions;
use bloomcast_api::*;
use rand::Rng;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::AbortHandle;

/// Resolved when the flush covering the subscription change succeeds.
pub(crate) type Ack = oneshot::Sender<BcResult<()>>;

pub(crate) enum UpdaterCmd<T: PubSubMessage> {
    Subscribe {
        handle: DynSubscriberHandle<T>,
        topics: HashSet<Topic>,
        ack: Ack,
    },
    Unsubscribe {
        subscriber: SubscriberId,
        topics: HashSet<Topic>,
        ack: Ack,
    },
    RemoveSubscriber {
        subscriber: SubscriberId,
        ack: Ack,
    },
    Stop,
}

pub(crate) fn spawn_updater<T: PubSubMessage>(
    factory_id: Arc<str>,
    config: CorePubSubConfig,
    hasher: DynTopicHasher,
    ddata: DynCompressedDData,
    subscriber: Arc<Mailbox<SubscriberCmd<T>>>,
) -> (Arc<Mailbox<UpdaterCmd<T>>>, AbortHandle) {
    let (mailbox, first_receiver) = Mailbox::new();
    let abort = spawn_supervised(
        "updater",
        config.restart_delay(),
        mailbox.clone(),
        first_receiver,
        move |mut rx| {
            let mut updater = Updater {
                factory_id: factory_id.clone(),
                config: config.clone(),
                hasher: hasher.clone(),
                ddata: ddata.clone(),
                subscriber: subscriber.clone(),
                subscriptions: Subscriptions::new(),
                last_flushed_topics: HashSet::new(),
                last_flushed_hashes: HashSet::new(),
                // A fresh incarnation cannot know what is advertised; the
                // first flush replaces the entry wholesale, which also
                // clears anything a crashed predecessor left behind.
                force_next_write: true,
                pending_acks: Vec::new(),
            };
            let update_interval = config.update_interval();
            async move {
                let mut ticks = tokio::time::interval_at(
                    tokio::time::Instant::now() + update_interval,
                    update_interval,
                );
                // Fixed-period; missed ticks are not queued.
                ticks.set_missed_tick_behavior(
                    tokio::time::MissedTickBehavior::Skip,
                );
                loop {
                    tokio::select! {
                        cmd = rx.recv() => match cmd {
                            Some(cmd) => {
                                if updater.handle_cmd(cmd) {
                                    break;
                                }
                            }
                            None => break,
                        },
                        _ = ticks.tick() => updater.flush().await,
                    }
                }
            }
        },
    );
    (mailbox, abort)
}

struct Updater<T: PubSubMessage> {
    factory_id: Arc<str>,
    config: CorePubSubConfig,
    hasher: DynTopicHasher,
    ddata: DynCompressedDData,
    subscriber: Arc<Mailbox<SubscriberCmd<T>>>,
    subscriptions: Subscriptions<T>,
    last_flushed_topics: HashSet<Topic>,
    last_flushed_hashes: HashSet<i32>,
    force_next_write: bool,
    pending_acks: Vec<Ack>,
}

impl<T: PubSubMessage> Updater<T> {
    /// Apply a mailbox command to the registry. Returns `true` on Stop.
    fn handle_cmd(&mut self, cmd: UpdaterCmd<T>) -> bool {
        match cmd {
            UpdaterCmd::Subscribe {
                handle,
                topics,
                ack,
            } => {
                self.subscriptions.subscribe(handle, topics);
                self.pending_acks.push(ack);
            }
            UpdaterCmd::Unsubscribe {
                subscriber,
                topics,
                ack,
            } => {
                self.subscriptions.unsubscribe(&subscriber, topics);
                self.pending_acks.push(ack);
            }
            UpdaterCmd::RemoveSubscriber { subscriber, ack } => {
                self.subscriptions.remove_subscriber(&subscriber);
                self.pending_acks.push(ack);
            }
            UpdaterCmd::Stop => return true,
        }
        false
    }

    async fn flush(&mut self) {
        let force = self.force_next_write
            || rand::thread_rng().gen::<f64>()
                < self.config.force_update_probability;

        let (added, removed) =
            self.subscriptions.diff_since(&self.last_flushed_topics);
        if !force && added.is_empty() && removed.is_empty() {
            // The advertisement already covers the registry.
            self.finish_flush(None);
            return;
        }

        let current_topics = self.subscriptions.topic_set();
        let current_hashes =
            hash_all(&*self.hasher, current_topics.iter());

        let update = if force {
            IndelUpdate::replacing(current_hashes.clone())
        } else {
            let mut update = IndelUpdate::new();
            for fingerprint in
                current_hashes.difference(&self.last_flushed_hashes)
            {
                update.insert(*fingerprint);
            }
            // Collision-safe deletion: a fingerprint still produced by a
            // live topic never leaves the advertisement.
            for fingerprint in
                self.last_flushed_hashes.difference(&current_hashes)
            {
                update.delete(*fingerprint);
            }
            update
        };

        if !force && update.is_empty() {
            // The topic set changed but its fingerprint image did not.
            self.finish_flush(Some((current_topics, current_hashes)));
            return;
        }

        // Forced replacements must land on every replica to fulfil their
        // resynchronization purpose.
        let consistency = if force {
            WriteConsistency::All
        } else {
            self.config.write_consistency
        };
        let result = match tokio::time::timeout(
            self.config.write_timeout(),
            self.ddata.write(update, consistency),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => {
                Err(BcError::replication_timeout("subscription flush"))
            }
        };

        match result {
            Ok(()) => {
                tracing::debug!(
                    factory = %self.factory_id,
                    forced = force,
                    topics = current_topics.len(),
                    "advertised local subscription state",
                );
                self.finish_flush(Some((current_topics, current_hashes)));
            }
            Err(err) => {
                self.force_next_write = true;
                tracing::debug!(
                    factory = %self.factory_id,
                    ?err,
                    "replicated write failed, forcing full resync next tick",
                );
            }
        }
    }

    /// Close out a tick whose advertisement now covers the registry.
    fn finish_flush(
        &mut self,
        flushed: Option<(HashSet<Topic>, HashSet<i32>)>,
    ) {
        if let Some((topics, hashes)) = flushed {
            self.last_flushed_topics = topics;
            self.last_flushed_hashes = hashes;
            self.force_next_write = false;
        }
        // Hand the subscriber the snapshot matching the advertised state.
        // Re-sending it on no-change ticks also reseeds a subscriber
        // incarnation that restarted since the last flush.
        self.subscriber.send(SubscriberCmd::SwapReader(
            self.subscriptions.snapshot(),
        ));
        for ack in self.pending_acks.drain(..) {
            let _ = ack.send(Ok(()));
        }
    }
}
