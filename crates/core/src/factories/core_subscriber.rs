//! The subscriber task: deliver forwarded messages to local subscribers.
//!
//! Every envelope forwarded to this node is filtered against the current
//! [SubscriptionsReader], which is authoritative: a message routed here by
//! a hash collision matches no local subscriber and is counted as a false
//! positive instead of being delivered.

use crate::factories::supervisor::{spawn_supervised, Mailbox};
use bloomcast_api::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::AbortHandle;

pub(crate) enum SubscriberCmd<T: PubSubMessage> {
    /// An envelope forwarded from some node's publisher.
    Forwarded(Envelope<T>),

    /// Swap in a new authoritative snapshot. Swaps apply in the order the
    /// update loop emits them.
    SwapReader(SubscriptionsReader<T>),

    /// Graceful shutdown.
    Stop,
}

pub(crate) struct CoreSubscriber<T: PubSubMessage> {
    pub mailbox: Arc<Mailbox<SubscriberCmd<T>>>,
    pub abort: AbortHandle,
}

/// Connects the transport intake to the subscriber mailbox.
pub(crate) struct SubscriberSink<T: PubSubMessage>(
    pub Arc<Mailbox<SubscriberCmd<T>>>,
);

impl<T: PubSubMessage> std::fmt::Debug for SubscriberSink<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriberSink").finish()
    }
}

impl<T: PubSubMessage> EnvelopeSink<T> for SubscriberSink<T> {
    fn accept(&self, envelope: Envelope<T>) {
        self.0.send(SubscriberCmd::Forwarded(envelope));
    }
}

pub(crate) fn spawn_subscriber<T: PubSubMessage>(
    factory_id: Arc<str>,
    extractor: DynTopicExtractor<T>,
    counters: PubSubCounters,
    restart_delay: Duration,
) -> CoreSubscriber<T> {
    let (mailbox, first_receiver) = Mailbox::new();
    let abort = spawn_supervised(
        "subscriber",
        restart_delay,
        mailbox.clone(),
        first_receiver,
        move |mut rx| {
            let factory_id = factory_id.clone();
            let extractor = extractor.clone();
            let counters = counters.clone();
            async move {
                // A fresh incarnation starts from the empty reader; the
                // update loop hands over the current snapshot on its next
                // tick.
                let mut reader = SubscriptionsReader::empty();
                while let Some(cmd) = rx.recv().await {
                    match cmd {
                        SubscriberCmd::SwapReader(new_reader) => {
                            reader = new_reader;
                        }
                        SubscriberCmd::Forwarded(envelope) => {
                            broadcast(
                                &factory_id,
                                &*extractor,
                                &counters,
                                &reader,
                                envelope,
                            );
                        }
                        SubscriberCmd::Stop => break,
                    }
                }
            }
        },
    );
    CoreSubscriber { mailbox, abort }
}

fn broadcast<T: PubSubMessage>(
    factory_id: &str,
    extractor: &dyn TopicExtractor<T>,
    counters: &PubSubCounters,
    reader: &SubscriptionsReader<T>,
    envelope: Envelope<T>,
) {
    let topics = extractor.topics(&envelope.message);
    let subscribers = reader.subscribers_for(topics.iter());
    if subscribers.is_empty() {
        counters.false_positive.increment();
        tracing::trace!(
            factory = factory_id,
            source = %envelope.source,
            "forwarded message matched no local subscriber",
        );
        return;
    }
    counters.true_positive.increment();
    for subscriber in subscribers {
        subscriber.deliver(envelope.clone());
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use bloomcast_test_utils::{
        enable_tracing, handle::TestSubscriber, iter_check, test_node,
    };
    use std::collections::HashSet;

    #[derive(Debug)]
    struct CommaTopics;

    impl TopicExtractor<String> for CommaTopics {
        fn topics(&self, message: &String) -> HashSet<Topic> {
            message
                .split(',')
                .filter(|t| !t.is_empty())
                .map(Topic::from)
                .collect()
        }
    }

    fn forwarded(message: &str) -> SubscriberCmd<String> {
        SubscriberCmd::Forwarded(Envelope {
            source: test_node(1),
            message: message.to_string(),
        })
    }

    #[tokio::test]
    async fn delivers_once_per_matching_subscriber() {
        enable_tracing();
        let counters = PubSubCounters::new("test");
        let subscriber = spawn_subscriber(
            "test".into(),
            Arc::new(CommaTopics),
            counters.clone(),
            Duration::from_millis(10),
        );

        let (handle_a, mut rx_a) = TestSubscriber::create("a");
        let (handle_b, mut rx_b) = TestSubscriber::create("b");
        let mut registry = crate::Subscriptions::new();
        registry.subscribe(handle_a, [Topic::from("t1"), Topic::from("t2")]);
        registry.subscribe(handle_b, [Topic::from("t2")]);
        subscriber
            .mailbox
            .send(SubscriberCmd::SwapReader(registry.snapshot()));

        // Both topics match subscriber a, but it gets the message once.
        subscriber.mailbox.send(forwarded("t1,t2"));
        iter_check!({ counters.true_positive.get() == 1 });
        let envelope = rx_a.recv().await.unwrap();
        assert_eq!("t1,t2", envelope.message);
        assert_eq!(test_node(1), envelope.source);
        assert!(rx_a.try_recv().is_err());
        assert_eq!("t1,t2", rx_b.recv().await.unwrap().message);

        subscriber.mailbox.send(SubscriberCmd::Stop);
    }

    #[tokio::test]
    async fn unmatched_forward_counts_as_false_positive() {
        enable_tracing();
        let counters = PubSubCounters::new("test");
        let subscriber = spawn_subscriber(
            "test".into(),
            Arc::new(CommaTopics),
            counters.clone(),
            Duration::from_millis(10),
        );

        let (handle, mut rx) = TestSubscriber::create("a");
        let mut registry = crate::Subscriptions::new();
        registry.subscribe(handle, [Topic::from("other")]);
        subscriber
            .mailbox
            .send(SubscriberCmd::SwapReader(registry.snapshot()));

        subscriber.mailbox.send(forwarded("t"));
        iter_check!({ counters.false_positive.get() == 1 });
        assert_eq!(0, counters.true_positive.get());
        assert!(rx.try_recv().is_err());

        subscriber.mailbox.send(SubscriberCmd::Stop);
    }
}
