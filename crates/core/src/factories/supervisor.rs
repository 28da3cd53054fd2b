//! Task supervision for the pub-sub component tree.
//!
//! Every pub-sub component is a single task draining a mailbox. The
//! supervisor spawns the task, watches its join handle, and respawns it
//! after the restart delay if it terminated by panic. A respawn gets a
//! fresh mailbox: messages in flight to the dead incarnation are
//! discarded, and replicated state is repopulated by the next update tick.

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc::{
    unbounded_channel, UnboundedReceiver, UnboundedSender,
};
use tokio::task::AbortHandle;

/// A component mailbox whose sending side survives supervisor restarts.
///
/// Senders always address the currently live incarnation of the task.
pub struct Mailbox<C>(Mutex<UnboundedSender<C>>);

impl<C> std::fmt::Debug for Mailbox<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mailbox").finish()
    }
}

impl<C> Mailbox<C> {
    /// Create a mailbox and the receiver of its first incarnation.
    ///
    /// Creating the mailbox before [spawn_supervised] lets callers hook it
    /// up to listeners and sinks first, so nothing sent during component
    /// startup is lost.
    pub fn new() -> (Arc<Self>, UnboundedReceiver<C>) {
        let (sender, receiver) = unbounded_channel();
        (Arc::new(Self(Mutex::new(sender))), receiver)
    }

    /// Send a command to the live incarnation. Dropped without error if
    /// the component has stopped.
    pub fn send(&self, cmd: C) {
        let _ = self.0.lock().unwrap().send(cmd);
    }
}

/// Spawn a supervised component task.
///
/// `make_child` is invoked with a mailbox receiver for every incarnation,
/// starting with `first_receiver`. A child that returns normally is
/// considered stopped and is not respawned; a child that panics is
/// respawned after `restart_delay`.
pub fn spawn_supervised<C, F, Fut>(
    name: &'static str,
    restart_delay: Duration,
    mailbox: Arc<Mailbox<C>>,
    first_receiver: UnboundedReceiver<C>,
    mut make_child: F,
) -> AbortHandle
where
    C: Send + 'static,
    F: FnMut(UnboundedReceiver<C>) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        let mut receiver = Some(first_receiver);
        loop {
            let rx = receiver.take().unwrap_or_else(|| {
                // Re-arm the mailbox for the next incarnation. Anything
                // queued for the dead one is discarded.
                let (sender, receiver) = unbounded_channel();
                *mailbox.0.lock().unwrap() = sender;
                receiver
            });
            match tokio::spawn(make_child(rx)).await {
                Ok(()) => {
                    tracing::debug!(task = name, "component stopped");
                    break;
                }
                Err(err) if err.is_panic() => {
                    tracing::warn!(
                        task = name,
                        ?err,
                        "component crashed, respawning after restart delay",
                    );
                    tokio::time::sleep(restart_delay).await;
                }
                Err(_) => break,
            }
        }
    })
    .abort_handle()
}
