//! Request/response over a channel that only broadcasts.
//!
//! The backend never tags replies, so a request registers a temporary listener
//! that waits for the first message it recognizes and races it against a
//! timeout. Both paths compete for the same sender slot; whoever takes it
//! decides the outcome and the other becomes a no-op.

use crate::registry::{ListenerRegistry, Subscription};
use hw_protocol::ServerMessage;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;

type Slot<T> = Arc<Mutex<Option<oneshot::Sender<T>>>>;

pub(crate) struct PendingReply<T> {
    subscription: Subscription,
    slot: Slot<T>,
    rx: oneshot::Receiver<T>,
}

impl<T: Send + 'static> PendingReply<T> {
    /// Starts listening before the request goes out, so a fast reply is not missed.
    pub fn register<F>(registry: &ListenerRegistry, extract: F) -> Self
    where
        F: Fn(&ServerMessage) -> Option<T> + Send + Sync + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let slot: Slot<T> = Arc::new(Mutex::new(Some(tx)));
        let listener_slot = Arc::clone(&slot);

        let subscription = registry.subscribe(move |msg| {
            let Some(value) = extract(msg) else { return };
            let tx = take(&listener_slot);
            if let Some(tx) = tx {
                let _ = tx.send(value);
            }
        });

        Self {
            subscription,
            slot,
            rx,
        }
    }

    /// Resolves with the first matching message, or `None` once `timeout` elapses.
    pub async fn wait(mut self, timeout: Duration) -> Option<T> {
        tokio::select! {
            reply = &mut self.rx => reply.ok(),
            _ = tokio::time::sleep(timeout) => {
                let timed_out = take(&self.slot).is_some();
                if timed_out {
                    None
                } else {
                    // The listener claimed the slot first; its value is already in flight.
                    (&mut self.rx).await.ok()
                }
            }
        }
    }
}

impl<T> Drop for PendingReply<T> {
    fn drop(&mut self) {
        self.subscription.unsubscribe();
    }
}

fn take<T>(slot: &Slot<T>) -> Option<oneshot::Sender<T>> {
    slot.lock().unwrap_or_else(PoisonError::into_inner).take()
}

#[cfg(test)]
mod tests {
    use super::*;
    use hw_protocol::PortInfo;

    fn ports_of(msg: &ServerMessage) -> Option<Vec<PortInfo>> {
        match msg {
            ServerMessage::Ports { data } => Some(data.clone()),
            _ => None,
        }
    }

    fn ports(names: &[&str]) -> ServerMessage {
        ServerMessage::Ports {
            data: names
                .iter()
                .map(|n| PortInfo {
                    name: n.to_string(),
                    desc: String::new(),
                })
                .collect(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn first_matching_message_wins() {
        let registry = ListenerRegistry::new();
        let pending = PendingReply::register(&registry, ports_of);

        registry.dispatch(&ServerMessage::Status {
            message: "noise".to_string(),
        });
        registry.dispatch(&ports(&["COM1"]));
        registry.dispatch(&ports(&["COM2"]));

        let got = pending.wait(Duration::from_secs(5)).await;
        assert_eq!(got.map(|p| p[0].name.clone()).as_deref(), Some("COM1"));
        assert!(registry.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn claimed_reply_survives_an_expired_timer() {
        for _ in 0..50 {
            let registry = ListenerRegistry::new();
            let pending = PendingReply::register(&registry, ports_of);
            registry.dispatch(&ports(&["COM3"]));

            // Both select arms are ready; either way the claimed reply wins.
            let got = pending.wait(Duration::ZERO).await;
            assert_eq!(got.map(|p| p[0].name.clone()).as_deref(), Some("COM3"));
            assert!(registry.is_empty());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_resolves_none_and_unregisters() {
        let registry = ListenerRegistry::new();
        let pending = PendingReply::register(&registry, ports_of);
        assert_eq!(registry.len(), 1);

        let started = tokio::time::Instant::now();
        let got = pending.wait(Duration::from_millis(5000)).await;

        assert!(got.is_none());
        assert!(started.elapsed() >= Duration::from_millis(5000));
        assert!(registry.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn reply_arriving_before_timeout_resolves_early() {
        let registry = ListenerRegistry::new();
        let pending = PendingReply::register(&registry, ports_of);

        let feeder = registry.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            feeder.dispatch(&ports(&["COM7"]));
        });

        let started = tokio::time::Instant::now();
        let got = pending.wait(Duration::from_millis(5000)).await;
        assert_eq!(got.map(|p| p.len()), Some(1));
        assert!(started.elapsed() < Duration::from_millis(5000));
    }

    #[tokio::test]
    async fn dropping_a_pending_reply_removes_its_listener() {
        let registry = ListenerRegistry::new();
        let pending = PendingReply::register(&registry, ports_of);
        assert_eq!(registry.len(), 1);
        drop(pending);
        assert!(registry.is_empty());
    }
}
