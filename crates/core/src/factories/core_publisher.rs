//! The publisher task: route published messages to candidate nodes.
//!
//! Routing works entirely on the compressed replica view: a node is a
//! candidate for a message when, for at least one of the message's topics,
//! every fingerprint of that topic appears in the node's advertised set.
//! Collisions make this an over-approximation; the receiving subscriber
//! filters against its authoritative local registry.

use crate::factories::supervisor::{spawn_supervised, Mailbox};
use bloomcast_api::*;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::AbortHandle;

pub(crate) enum PublisherCmd<T: PubSubMessage> {
    /// Route one published message.
    Publish(T),

    /// The replicated advertisement map changed; refresh the routing view.
    ReplicaChanged,

    /// Graceful shutdown.
    Stop,
}

/// The publish-side access produced by the pub-sub factory.
pub struct CorePublisher<T: PubSubMessage> {
    factory_id: Arc<str>,
    mailbox: Arc<Mailbox<PublisherCmd<T>>>,
    _abort: AbortHandle,
}

impl<T: PubSubMessage> std::fmt::Debug for CorePublisher<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CorePublisher")
            .field("factory_id", &self.factory_id)
            .finish()
    }
}

impl<T: PubSubMessage> DistributedPub<T> for CorePublisher<T> {
    fn publish(&self, message: T) -> BcResult<()> {
        self.mailbox.send(PublisherCmd::Publish(message));
        Ok(())
    }
}

impl<T: PubSubMessage> Drop for CorePublisher<T> {
    fn drop(&mut self) {
        self.mailbox.send(PublisherCmd::Stop);
    }
}

pub(crate) fn spawn_publisher<T: PubSubMessage>(
    factory_id: Arc<str>,
    node_id: NodeId,
    extractor: DynTopicExtractor<T>,
    hasher: DynTopicHasher,
    ddata: DynCompressedDData,
    transport: DynTransport<T>,
    restart_delay: Duration,
) -> CorePublisher<T> {
    let (mailbox, first_receiver) = Mailbox::new();

    // Hook the routing view up to replica changes before the task starts,
    // so no write can fall between the initial read and the first poke.
    ddata.add_change_listener(Arc::new({
        let mailbox = mailbox.clone();
        move || mailbox.send(PublisherCmd::ReplicaChanged)
    }));

    let task_factory_id = factory_id.clone();
    let abort = spawn_supervised(
        "publisher",
        restart_delay,
        mailbox.clone(),
        first_receiver,
        move |mut rx| {
            let factory_id = task_factory_id.clone();
            let node_id = node_id.clone();
            let extractor = extractor.clone();
            let hasher = hasher.clone();
            let ddata = ddata.clone();
            let transport = transport.clone();
            async move {
                let mut replica = match ddata.read().await {
                    Ok(replica) => replica,
                    Err(err) => {
                        tracing::debug!(
                            factory = %factory_id,
                            ?err,
                            "initial replica read failed, starting empty",
                        );
                        HashMap::new()
                    }
                };
                while let Some(cmd) = rx.recv().await {
                    match cmd {
                        PublisherCmd::ReplicaChanged => {
                            match ddata.read().await {
                                Ok(new_replica) => replica = new_replica,
                                Err(err) => tracing::debug!(
                                    factory = %factory_id,
                                    ?err,
                                    "replica read failed, routing on stale view",
                                ),
                            }
                        }
                        PublisherCmd::Publish(message) => {
                            let topics = extractor.topics(&message);
                            if topics.is_empty() {
                                tracing::trace!(
                                    factory = %factory_id,
                                    "message without topics published nowhere",
                                );
                                continue;
                            }
                            let candidates =
                                candidate_nodes(&*hasher, &topics, &replica);
                            tracing::trace!(
                                factory = %factory_id,
                                candidates = candidates.len(),
                                "routing published message",
                            );
                            for target in candidates {
                                let envelope = Envelope {
                                    source: node_id.clone(),
                                    message: message.clone(),
                                };
                                if let Err(err) = transport
                                    .forward(target.clone(), envelope)
                                    .await
                                {
                                    tracing::debug!(
                                        factory = %factory_id,
                                        node = %target,
                                        ?err,
                                        "forward failed, dropping",
                                    );
                                }
                            }
                        }
                        PublisherCmd::Stop => break,
                    }
                }
            }
        },
    );

    CorePublisher {
        factory_id,
        mailbox,
        _abort: abort,
    }
}

/// The candidate set of a message: every node whose advertised
/// fingerprints fully contain the fingerprint image of at least one of
/// the message's topics. Self is not special-cased, local delivery uses
/// the same path.
fn candidate_nodes(
    hasher: &dyn TopicHasher,
    topics: &HashSet<Topic>,
    replica: &HashMap<NodeId, HashSet<i32>>,
) -> Vec<NodeId> {
    let images: Vec<Vec<i32>> =
        topics.iter().map(|topic| hasher.hashes(topic)).collect();
    replica
        .iter()
        .filter(|(_, advertised)| {
            images.iter().any(|image| {
                image.iter().all(|fingerprint| {
                    advertised.contains(fingerprint)
                })
            })
        })
        .map(|(node, _)| node.clone())
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;

    fn replica(
        entries: &[(usize, &[i32])],
    ) -> HashMap<NodeId, HashSet<i32>> {
        entries
            .iter()
            .map(|(index, fingerprints)| {
                (
                    bloomcast_test_utils::test_node(*index),
                    fingerprints.iter().copied().collect(),
                )
            })
            .collect()
    }

    #[test]
    fn candidate_needs_every_fingerprint_of_one_topic() {
        let hasher = SeededTopicHasher::new("seed", 2);
        let topic = Topic::from("t");
        let image = hasher.hashes(&topic);

        let full: &[i32] = &[image[0], image[1]];
        let partial: &[i32] = &[image[0]];
        let replica = replica(&[(1, full), (2, partial), (3, &[])]);

        let topics = HashSet::from([topic]);
        let candidates = candidate_nodes(&hasher, &topics, &replica);
        assert_eq!(vec![bloomcast_test_utils::test_node(1)], candidates);
    }

    #[test]
    fn any_topic_of_the_message_qualifies_a_node() {
        let hasher = SeededTopicHasher::new("seed", 1);
        let t1 = Topic::from("t1");
        let t2 = Topic::from("t2");
        let i1 = hasher.hashes(&t1);
        let i2 = hasher.hashes(&t2);

        let replica = replica(&[(1, &[i1[0]]), (2, &[i2[0]])]);
        let topics = HashSet::from([t1, t2]);
        let mut candidates = candidate_nodes(&hasher, &topics, &replica);
        candidates.sort();
        assert_eq!(
            vec![
                bloomcast_test_utils::test_node(1),
                bloomcast_test_utils::test_node(2),
            ],
            candidates,
        );
    }
}
