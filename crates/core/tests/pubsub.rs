//! Cluster-level integration tests driving the pub-sub through its public
//! api only.

use bloomcast_api::*;
use bloomcast_core::factories::{
    CorePubSubConfig, CorePubSubModConfig, MemDDataFactory, MemTransport,
    PubSubFactory,
};
use bloomcast_test_utils::{
    enable_tracing, handle::TestSubscriber, iter_check, test_node,
};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone)]
struct Event {
    topic: String,
    body: String,
}

#[derive(Debug)]
struct EventTopics;

impl TopicExtractor<Event> for EventTopics {
    fn topics(&self, message: &Event) -> HashSet<Topic> {
        [Topic::from(message.topic.as_str())].into()
    }
}

struct Node {
    publish: DynDistributedPub<Event>,
    subscribe: DynDistributedSub<Event>,
    counters: PubSubCounters,
}

struct Cluster {
    builder: Arc<Builder>,
    transport: Arc<MemTransport<Event>>,
}

impl Cluster {
    fn new() -> Self {
        enable_tracing();
        let mut config = config::Config::default();
        config
            .set_module_config(&CorePubSubModConfig {
                core_pub_sub: CorePubSubConfig {
                    update_interval_ms: 50,
                    force_update_probability: 0.0,
                    ..CorePubSubConfig::default()
                },
            })
            .unwrap();
        let builder = Builder {
            config,
            topic_hasher: None,
            compressed: MemDDataFactory::<i32>::new(),
            acks: Some(MemDDataFactory::<String>::new()),
        }
        .build();
        Self {
            builder,
            transport: MemTransport::new(),
        }
    }

    async fn node(&self, index: usize) -> Node {
        let factory = PubSubFactory::create(
            self.builder.clone(),
            "events",
            test_node(index),
            Arc::new(EventTopics),
            self.transport.clone(),
        )
        .await
        .unwrap();
        Node {
            publish: factory.start_distributed_pub(),
            subscribe: factory.start_distributed_sub(),
            counters: factory.counters(),
        }
    }
}

fn event(topic: &str, body: &str) -> Event {
    Event {
        topic: topic.to_string(),
        body: body.to_string(),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn one_publish_fans_out_to_every_subscribed_node() {
    let cluster = Cluster::new();
    let n1 = cluster.node(1).await;
    let n2 = cluster.node(2).await;
    let n3 = cluster.node(3).await;

    let (handle_2, mut rx_2) = TestSubscriber::create("on-n2");
    let (handle_3, mut rx_3) = TestSubscriber::create("on-n3");
    n2.subscribe
        .subscribe(handle_2, [Topic::from("alerts")].into())
        .await
        .unwrap();
    n3.subscribe
        .subscribe(handle_3, [Topic::from("alerts")].into())
        .await
        .unwrap();

    n1.publish.publish(event("alerts", "overheated")).unwrap();

    assert_eq!("overheated", rx_2.recv().await.unwrap().message.body);
    assert_eq!("overheated", rx_3.recv().await.unwrap().message.body);
    iter_check!({
        n2.counters.true_positive.get() == 1
            && n3.counters.true_positive.get() == 1
    });

    // A topic nobody subscribed to goes nowhere.
    n1.publish.publish(event("other", "ignored")).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(rx_2.try_recv().is_err());
    assert!(rx_3.try_recv().is_err());
}

#[tokio::test(flavor = "multi_thread")]
async fn a_late_subscriber_starts_receiving_after_its_flush() {
    let cluster = Cluster::new();
    let n1 = cluster.node(1).await;
    let n2 = cluster.node(2).await;

    n1.publish.publish(event("alerts", "before")).unwrap();

    let (handle, mut rx) = TestSubscriber::create("late");
    n2.subscribe
        .subscribe(handle, [Topic::from("alerts")].into())
        .await
        .unwrap();

    n1.publish.publish(event("alerts", "after")).unwrap();
    let envelope = rx.recv().await.unwrap();
    // The pre-subscription publish was never forwarded.
    assert_eq!("after", envelope.message.body);
    assert_eq!(test_node(1), envelope.source);
}

#[tokio::test(flavor = "multi_thread")]
async fn ack_label_ownership_is_cluster_wide() {
    let cluster = Cluster::new();
    let n1 = cluster.node(1).await;
    let n2 = cluster.node(2).await;
    let n3 = cluster.node(3).await;

    n3.subscribe
        .declare_ack_labels([AckLabel::from("receipts")].into())
        .await
        .unwrap();

    let err = n1
        .subscribe
        .declare_ack_labels([AckLabel::from("receipts")].into())
        .await
        .unwrap_err();
    assert!(matches!(err, BcError::LabelConflict { .. }));

    for node in [&n1, &n2, &n3] {
        assert_eq!(
            Some(test_node(3)),
            node.subscribe
                .owner_of_ack_label("receipts".into())
                .await
                .unwrap(),
        );
    }

    n3.subscribe
        .release_ack_labels([AckLabel::from("receipts")].into())
        .await
        .unwrap();
    n1.subscribe
        .declare_ack_labels([AckLabel::from("receipts")].into())
        .await
        .unwrap();
    assert_eq!(
        Some(test_node(1)),
        n2.subscribe
            .owner_of_ack_label("receipts".into())
            .await
            .unwrap(),
    );
}
