//! The in-process transport implementation provided by bloomcast.
//!
//! This is NOT a production module. It is for testing and single-process
//! clusters only: it will only deliver envelopes between nodes registered
//! on the same hub instance.

use bloomcast_api::*;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// An in-process transport hub.
///
/// Each node registers its subscriber intake under its node id;
/// [Transport::forward] hands the envelope to the target's sink inline.
/// Unknown targets drop the envelope, which is exactly the at-most-once
/// contract real cluster transports provide.
pub struct MemTransport<T: PubSubMessage> {
    sinks: Mutex<HashMap<NodeId, DynEnvelopeSink<T>>>,
}

impl<T: PubSubMessage> std::fmt::Debug for MemTransport<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemTransport").finish()
    }
}

impl<T: PubSubMessage> MemTransport<T> {
    /// Construct a new MemTransport hub.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            sinks: Mutex::new(HashMap::new()),
        })
    }
}

impl<T: PubSubMessage> Transport<T> for MemTransport<T> {
    fn forward(
        &self,
        target: NodeId,
        envelope: Envelope<T>,
    ) -> BoxFut<'_, BcResult<()>> {
        Box::pin(async move {
            let sink = self.sinks.lock().unwrap().get(&target).cloned();
            match sink {
                Some(sink) => sink.accept(envelope),
                None => {
                    tracing::trace!(
                        node = %target,
                        "dropping envelope for unknown node",
                    );
                }
            }
            Ok(())
        })
    }

    fn register_sink(&self, node: NodeId, sink: DynEnvelopeSink<T>) {
        self.sinks.lock().unwrap().insert(node, sink);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use bloomcast_test_utils::test_node;

    #[derive(Debug, Default)]
    struct RecordingSink(Mutex<Vec<Envelope<String>>>);

    impl EnvelopeSink<String> for RecordingSink {
        fn accept(&self, envelope: Envelope<String>) {
            self.0.lock().unwrap().push(envelope);
        }
    }

    #[tokio::test]
    async fn forwards_to_registered_sink_in_send_order() {
        let transport = MemTransport::<String>::new();
        let sink = Arc::new(RecordingSink::default());
        transport.register_sink(test_node(1), sink.clone());

        for body in ["a", "b"] {
            transport
                .forward(
                    test_node(1),
                    Envelope {
                        source: test_node(2),
                        message: body.to_string(),
                    },
                )
                .await
                .unwrap();
        }

        let received = sink.0.lock().unwrap();
        assert_eq!(2, received.len());
        assert_eq!("a", received[0].message);
        assert_eq!("b", received[1].message);
        assert_eq!(test_node(2), received[0].source);
    }

    #[tokio::test]
    async fn unknown_target_drops_without_error() {
        let transport = MemTransport::<String>::new();
        transport
            .forward(
                test_node(9),
                Envelope {
                    source: test_node(2),
                    message: "lost".to_string(),
                },
            )
            .await
            .unwrap();
    }
}
