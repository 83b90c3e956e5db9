//! Change notification hub
//!
//! One control loop owns the subscriber map. Subscriptions, removals and
//! broadcasts reach it as commands over a single channel, so they are applied
//! in the order they were sent. Publishing never waits on subscribers: a
//! subscriber whose buffer is full is dropped, which closes its stream.

use conduit_core::dto::event::ChangeMessage;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

enum HubCommand {
    Register(u64, mpsc::Sender<ChangeMessage>),
    Unregister(u64),
    Broadcast(ChangeMessage),
}

/// Handle to the hub loop; cheap to clone
#[derive(Clone)]
pub struct Hub {
    commands: mpsc::UnboundedSender<HubCommand>,
    next_id: Arc<AtomicU64>,
    buffer: usize,
}

/// A live subscription; `recv` yields `None` once the hub dropped it
pub struct Subscription {
    pub id: u64,
    receiver: mpsc::Receiver<ChangeMessage>,
}

impl Subscription {
    pub async fn recv(&mut self) -> Option<ChangeMessage> {
        self.receiver.recv().await
    }
}

impl Hub {
    /// Spawn the hub loop. It runs until `shutdown` is cancelled.
    pub fn spawn(buffer: usize, shutdown: CancellationToken) -> (Self, JoinHandle<()>) {
        let (commands, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(run(rx, shutdown));
        let hub = Self {
            commands,
            next_id: Arc::new(AtomicU64::new(1)),
            buffer: buffer.max(1),
        };
        (hub, handle)
    }

    pub fn subscribe(&self) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, receiver) = mpsc::channel(self.buffer);
        if self.commands.send(HubCommand::Register(id, tx)).is_err() {
            tracing::warn!("Change hub is not running, subscription {} is closed", id);
        }
        Subscription { id, receiver }
    }

    pub fn unsubscribe(&self, id: u64) {
        let _ = self.commands.send(HubCommand::Unregister(id));
    }

    pub fn publish(&self, message: ChangeMessage) {
        if self.commands.send(HubCommand::Broadcast(message)).is_err() {
            tracing::debug!("Change hub is not running, message dropped");
        }
    }
}

async fn run(mut commands: mpsc::UnboundedReceiver<HubCommand>, shutdown: CancellationToken) {
    let mut subscribers: HashMap<u64, mpsc::Sender<ChangeMessage>> = HashMap::new();

    loop {
        let command = tokio::select! {
            _ = shutdown.cancelled() => break,
            command = commands.recv() => match command {
                Some(command) => command,
                None => break,
            },
        };

        match command {
            HubCommand::Register(id, tx) => {
                subscribers.insert(id, tx);
            }
            HubCommand::Unregister(id) => {
                subscribers.remove(&id);
            }
            HubCommand::Broadcast(message) => {
                tracing::debug!(
                    "Broadcasting {:?} change to {} subscribers",
                    message.resource_type,
                    subscribers.len()
                );
                subscribers.retain(|id, tx| match tx.try_send(message.clone()) {
                    Ok(()) => true,
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        tracing::warn!("Subscriber {} is too slow, disconnecting", id);
                        false
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => false,
                });
            }
        }
    }

    tracing::info!("Change hub stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use conduit_core::domain::pipeline::Pipeline;
    use std::time::Duration;

    fn message(name: &str) -> ChangeMessage {
        ChangeMessage::pipeline(&Pipeline {
            name: name.to_string(),
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn test_broadcast_reaches_every_subscriber() {
        let (hub, _handle) = Hub::spawn(8, CancellationToken::new());
        let mut a = hub.subscribe();
        let mut b = hub.subscribe();

        hub.publish(message("one"));

        assert_eq!(a.recv().await.unwrap().data["name"], "one");
        assert_eq!(b.recv().await.unwrap().data["name"], "one");
    }

    #[tokio::test]
    async fn test_slow_subscriber_is_dropped() {
        let (hub, _handle) = Hub::spawn(1, CancellationToken::new());
        let mut slow = hub.subscribe();
        let mut fast = hub.subscribe();

        hub.publish(message("one"));
        assert_eq!(fast.recv().await.unwrap().data["name"], "one");
        hub.publish(message("two"));
        assert_eq!(fast.recv().await.unwrap().data["name"], "two");

        // First message was buffered, the second overflowed and closed it
        assert_eq!(slow.recv().await.unwrap().data["name"], "one");
        assert!(slow.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_unsubscribe_closes_stream() {
        let (hub, _handle) = Hub::spawn(8, CancellationToken::new());
        let mut sub = hub.subscribe();
        hub.unsubscribe(sub.id);

        let next = tokio::time::timeout(Duration::from_secs(1), sub.recv()).await;
        assert!(matches!(next, Ok(None)));
    }

    #[tokio::test]
    async fn test_shutdown_stops_loop() {
        let shutdown = CancellationToken::new();
        let (hub, handle) = Hub::spawn(8, shutdown.clone());
        let mut sub = hub.subscribe();

        shutdown.cancel();
        handle.await.unwrap();

        assert!(sub.recv().await.is_none());
        hub.publish(message("late"));
    }
}
