//! The acknowledgement-label registry: declare globally unique labels and
//! locate the node owning one.
//!
//! Labels live in the literal replicated store, exact strings rather than
//! fingerprints, because a hash collision between two labels would
//! misroute acknowledgements. Declarations are checked against the latest
//! replica snapshot; under eventual consistency two nodes can still
//! declare the same label concurrently without either seeing a conflict,
//! so a change listener reconciles after convergence: every holder whose
//! node id is not the lexicographic minimum releases the label again.

use crate::factories::core_updater::Ack;
use crate::factories::supervisor::{spawn_supervised, Mailbox};
use bloomcast_api::*;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::AbortHandle;

pub(crate) enum AcksCmd {
    Declare {
        labels: HashSet<AckLabel>,
        ack: Ack,
    },
    Release {
        labels: HashSet<AckLabel>,
        ack: Ack,
    },
    OwnerOf {
        label: AckLabel,
        reply: oneshot::Sender<BcResult<Option<NodeId>>>,
    },
    /// The replicated label map changed; check for lost declarations.
    Reconcile,
    Stop,
}

pub(crate) fn spawn_acks(
    factory_id: Arc<str>,
    ddata: DynLiteralDData,
    write_consistency: WriteConsistency,
    write_timeout: Duration,
    restart_delay: Duration,
) -> (Arc<Mailbox<AcksCmd>>, AbortHandle) {
    let (mailbox, first_receiver) = Mailbox::new();

    ddata.add_change_listener(Arc::new({
        let mailbox = mailbox.clone();
        move || mailbox.send(AcksCmd::Reconcile)
    }));

    let abort = spawn_supervised(
        "ack-labels",
        restart_delay,
        mailbox.clone(),
        first_receiver,
        move |mut rx| {
            let registry = AckLabels {
                factory_id: factory_id.clone(),
                ddata: ddata.clone(),
                write_consistency,
                write_timeout,
            };
            async move {
                while let Some(cmd) = rx.recv().await {
                    match cmd {
                        AcksCmd::Declare { labels, ack } => {
                            let _ =
                                ack.send(registry.declare(labels).await);
                        }
                        AcksCmd::Release { labels, ack } => {
                            let _ =
                                ack.send(registry.release(&labels).await);
                        }
                        AcksCmd::OwnerOf { label, reply } => {
                            let _ =
                                reply.send(registry.owner_of(&label).await);
                        }
                        AcksCmd::Reconcile => registry.reconcile().await,
                        AcksCmd::Stop => break,
                    }
                }
            }
        },
    );
    (mailbox, abort)
}

struct AckLabels {
    factory_id: Arc<str>,
    ddata: DynLiteralDData,
    write_consistency: WriteConsistency,
    write_timeout: Duration,
}

impl AckLabels {
    async fn declare(&self, labels: HashSet<AckLabel>) -> BcResult<()> {
        let snapshot = self.ddata.read().await?;
        let own_node = self.ddata.node_id();
        for (node, held) in &snapshot {
            if node == own_node {
                continue;
            }
            if let Some(label) =
                labels.iter().find(|label| held.contains(label.as_str()))
            {
                // One conflict fails the entire declaration.
                return Err(BcError::LabelConflict {
                    label: label.clone(),
                    owner: node.clone(),
                });
            }
        }

        let mut update = IndelUpdate::new();
        for label in &labels {
            update.insert(label.to_string());
        }
        self.write(update).await?;
        tracing::debug!(
            factory = %self.factory_id,
            count = labels.len(),
            "declared ack labels",
        );
        Ok(())
    }

    async fn release(&self, labels: &HashSet<AckLabel>) -> BcResult<()> {
        let mut update = IndelUpdate::new();
        for label in labels {
            update.delete(label.to_string());
        }
        self.write(update).await
    }

    async fn owner_of(&self, label: &AckLabel) -> BcResult<Option<NodeId>> {
        let snapshot = self.ddata.read().await?;
        // While reconciliation is in flight more than one holder can be
        // visible; report the one that will survive it.
        Ok(snapshot
            .into_iter()
            .filter(|(_, held)| held.contains(label.as_str()))
            .map(|(node, _)| node)
            .min())
    }

    /// Release every label of ours that a smaller node id also holds.
    async fn reconcile(&self) {
        let snapshot = match self.ddata.read().await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                tracing::debug!(
                    factory = %self.factory_id,
                    ?err,
                    "label replica read failed, reconciling later",
                );
                return;
            }
        };
        let own_node = self.ddata.node_id();
        let Some(own_labels) = snapshot.get(own_node) else {
            return;
        };
        let lost: HashSet<AckLabel> = own_labels
            .iter()
            .filter(|label| {
                snapshot.iter().any(|(node, held)| {
                    node < own_node && held.contains(*label)
                })
            })
            .map(|label| AckLabel::from(label.as_str()))
            .collect();
        if lost.is_empty() {
            return;
        }
        tracing::warn!(
            factory = %self.factory_id,
            labels = ?lost,
            "releasing ack labels lost to a concurrent declaration",
        );
        if let Err(err) = self.release(&lost).await {
            tracing::debug!(
                factory = %self.factory_id,
                ?err,
                "label release failed, reconciling on the next change",
            );
        }
    }

    async fn write(&self, update: IndelUpdate<String>) -> BcResult<()> {
        match tokio::time::timeout(
            self.write_timeout,
            self.ddata.write(update, self.write_consistency),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(BcError::replication_timeout("ack label write")),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::factories::MemDDataFactory;
    use bloomcast_test_utils::{enable_tracing, iter_check, test_node};

    async fn spawn_node(
        factory: &Arc<MemDDataFactory<String>>,
        index: usize,
    ) -> (Arc<Mailbox<AcksCmd>>, DynLiteralDData) {
        let builder = Arc::new(crate::default_builder());
        let ddata = factory
            .create(builder, test_node(index))
            .await
            .unwrap();
        let (mailbox, _abort) = spawn_acks(
            "test".into(),
            ddata.clone(),
            WriteConsistency::Local,
            Duration::from_secs(1),
            Duration::from_millis(10),
        );
        (mailbox, ddata)
    }

    async fn declare(
        mailbox: &Arc<Mailbox<AcksCmd>>,
        labels: &[&str],
    ) -> BcResult<()> {
        let (ack, rx) = oneshot::channel();
        mailbox.send(AcksCmd::Declare {
            labels: labels.iter().map(|l| AckLabel::from(*l)).collect(),
            ack,
        });
        rx.await.unwrap()
    }

    async fn owner_of(
        mailbox: &Arc<Mailbox<AcksCmd>>,
        label: &str,
    ) -> Option<NodeId> {
        let (reply, rx) = oneshot::channel();
        mailbox.send(AcksCmd::OwnerOf {
            label: label.into(),
            reply,
        });
        rx.await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn second_declaration_of_a_label_conflicts() {
        enable_tracing();
        let factory = MemDDataFactory::<String>::new();
        let (n1, _) = spawn_node(&factory, 1).await;
        let (n2, _) = spawn_node(&factory, 2).await;

        declare(&n1, &["live", "twin"]).await.unwrap();

        let err = declare(&n2, &["twin", "other"]).await.unwrap_err();
        assert!(matches!(
            err,
            BcError::LabelConflict { label, owner }
                if label == AckLabel::from("twin")
                    && owner == test_node(1)
        ));
        // The whole declaration failed, so "other" was not declared.
        assert_eq!(None, owner_of(&n2, "other").await);

        n1.send(AcksCmd::Stop);
        n2.send(AcksCmd::Stop);
    }

    #[tokio::test]
    async fn release_frees_the_label_for_others() {
        enable_tracing();
        let factory = MemDDataFactory::<String>::new();
        let (n1, _) = spawn_node(&factory, 1).await;
        let (n2, _) = spawn_node(&factory, 2).await;

        declare(&n1, &["live"]).await.unwrap();
        let (ack, rx) = oneshot::channel();
        n1.send(AcksCmd::Release {
            labels: HashSet::from([AckLabel::from("live")]),
            ack,
        });
        rx.await.unwrap().unwrap();

        declare(&n2, &["live"]).await.unwrap();
        assert_eq!(Some(test_node(2)), owner_of(&n1, "live").await);

        n1.send(AcksCmd::Stop);
        n2.send(AcksCmd::Stop);
    }

    #[tokio::test]
    async fn concurrent_declaration_reconciles_to_the_smaller_node() {
        enable_tracing();
        let factory = MemDDataFactory::<String>::new();
        let (n2, ddata_2) = spawn_node(&factory, 2).await;
        let (n3, ddata_3) = spawn_node(&factory, 3).await;

        // Simulate the eventual-consistency race: both entries end up
        // holding the label, as if both declares saw no conflict.
        let mut update = IndelUpdate::new();
        update.insert("live".to_string());
        ddata_2
            .write(update.clone(), WriteConsistency::Local)
            .await
            .unwrap();
        ddata_3
            .write(update, WriteConsistency::Local)
            .await
            .unwrap();

        // The change listener drives node 3 to release its copy.
        iter_check!({
            let snapshot = ddata_3.read().await.unwrap();
            !snapshot
                .get(&test_node(3))
                .map(|held| held.contains("live"))
                .unwrap_or(false)
        });
        assert_eq!(Some(test_node(2)), owner_of(&n2, "live").await);
        assert_eq!(Some(test_node(2)), owner_of(&n3, "live").await);

        n2.send(AcksCmd::Stop);
        n3.send(AcksCmd::Stop);
    }
}
