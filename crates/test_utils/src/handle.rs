//! Channel-backed subscriber handles for tests.

use bloomcast_api::*;
use std::sync::Arc;
use tokio::sync::mpsc::{
    unbounded_channel, UnboundedReceiver, UnboundedSender,
};

/// A subscriber handle that delivers into an unbounded channel, so tests
/// can assert on exactly what arrived.
pub struct TestSubscriber<T> {
    id: SubscriberId,
    sender: UnboundedSender<Envelope<T>>,
}

impl<T> std::fmt::Debug for TestSubscriber<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestSubscriber").field("id", &self.id).finish()
    }
}

impl<T: PubSubMessage> TestSubscriber<T> {
    /// Create a handle plus the receiving end of its deliveries.
    pub fn create(
        id: impl Into<SubscriberId>,
    ) -> (DynSubscriberHandle<T>, UnboundedReceiver<Envelope<T>>) {
        let (sender, receiver) = unbounded_channel();
        (
            Arc::new(Self {
                id: id.into(),
                sender,
            }),
            receiver,
        )
    }
}

impl<T: PubSubMessage> SubscriberHandle<T> for TestSubscriber<T> {
    fn id(&self) -> &SubscriberId {
        &self.id
    }

    fn deliver(&self, envelope: Envelope<T>) {
        // The test may have dropped the receiver already; deliveries to a
        // gone subscriber are dropped like anywhere else.
        let _ = self.sender.send(envelope);
    }
}
