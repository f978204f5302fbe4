use crate::config::LinkConfig;
use crate::correlate::PendingReply;
use crate::error::LinkError;
use crate::reconnect::ReconnectScheduler;
use crate::registry::{ListenerRegistry, Subscription};
use crate::session::{self, SessionEnd};
use crate::state::ConnectionState;
use hw_protocol::{ClientCommand, PortInfo, ServerMessage};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    Caller,
    /// Carries the epoch the timer was armed in.
    Reconnect { epoch: u64 },
}

/// Client side of the backend socket.
///
/// Cloning is cheap and every clone drives the same connection. When the last
/// clone is dropped the socket is closed and no reconnect is attempted.
#[derive(Clone)]
pub struct BackendLink {
    inner: Arc<Inner>,
}

struct Inner {
    config: LinkConfig,
    registry: ListenerRegistry,
    state: watch::Sender<ConnectionState>,
    control: Mutex<Control>,
}

#[derive(Default)]
struct Control {
    /// Present exactly while connected.
    outbound: Option<mpsc::UnboundedSender<Message>>,
    reconnect: ReconnectScheduler,
    /// Bumped by `disconnect`; attempts and sessions from an older epoch are stale.
    epoch: u64,
}

impl BackendLink {
    pub fn new(config: LinkConfig) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            inner: Arc::new(Inner {
                config,
                registry: ListenerRegistry::new(),
                state,
                control: Mutex::new(Control::default()),
            }),
        }
    }

    pub fn config(&self) -> &LinkConfig {
        &self.inner.config
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    pub fn is_reconnect_scheduled(&self) -> bool {
        self.inner.lock_control().reconnect.is_scheduled()
    }

    pub fn listener_count(&self) -> usize {
        self.inner.registry.len()
    }

    /// Opens the socket. Resolves once the transport is open, which says
    /// nothing about whether the backend is ready to answer.
    ///
    /// A failure here is returned to the caller and is not retried.
    pub async fn connect(&self) -> Result<(), LinkError> {
        Arc::clone(&self.inner).open(Origin::Caller).await
    }

    /// Closes the socket and cancels any pending reconnect. No automatic
    /// reconnect follows.
    pub fn disconnect(&self) {
        let mut control = self.inner.lock_control();
        control.epoch += 1;
        if control.reconnect.cancel() {
            tracing::debug!("cancelled pending reconnect");
        }
        if control.outbound.take().is_some() {
            tracing::info!(url = self.inner.config.url(), "disconnecting from backend");
        }
        self.inner.set_state(ConnectionState::Disconnected);
    }

    /// Registers a notification listener. Every inbound message reaches every
    /// listener, including replies to requests made elsewhere.
    pub fn on_message<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&ServerMessage) + Send + Sync + 'static,
    {
        self.inner.registry.subscribe(listener)
    }

    /// Sends `cmd` and waits for the first inbound message `extract` accepts.
    ///
    /// Resolves to `None` after the reply timeout, including when the command
    /// could not be sent at all.
    pub async fn request<T, F>(&self, cmd: ClientCommand, extract: F) -> Option<T>
    where
        T: Send + 'static,
        F: Fn(&ServerMessage) -> Option<T> + Send + Sync + 'static,
    {
        let pending = PendingReply::register(&self.inner.registry, extract);
        self.inner.send(&cmd);
        let reply = pending.wait(self.inner.config.reply_timeout).await;
        if reply.is_none() {
            tracing::debug!(command = cmd.name(), "no reply before timeout");
        }
        reply
    }

    pub async fn list_ports(&self) -> Vec<PortInfo> {
        self.request(ClientCommand::List, |msg| match msg {
            ServerMessage::Ports { data } => Some(data.clone()),
            _ => None,
        })
        .await
        .unwrap_or_default()
    }

    pub fn open_port(&self, port: &str, baud: u32) {
        self.inner.send(&ClientCommand::Open {
            port: port.to_string(),
            baud,
        });
    }

    pub fn close_port(&self) {
        self.inner.send(&ClientCommand::Close);
    }

    pub fn write_data(&self, payload: &str) {
        self.inner.send(&ClientCommand::Write {
            data: payload.to_string(),
        });
    }
}

impl Inner {
    fn lock_control(&self) -> MutexGuard<'_, Control> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, next: ConnectionState) {
        self.state.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next;
            true
        });
    }

    async fn open(self: Arc<Self>, origin: Origin) -> Result<(), LinkError> {
        let epoch = {
            let control = self.lock_control();
            if let Origin::Reconnect { epoch } = origin {
                if control.epoch != epoch {
                    return Err(LinkError::Aborted);
                }
            }
            let current = *self.state.borrow();
            match current {
                ConnectionState::Connected => return Ok(()),
                ConnectionState::Connecting => None,
                ConnectionState::Disconnected => {
                    self.set_state(ConnectionState::Connecting);
                    Some(control.epoch)
                }
            }
        };
        let Some(epoch) = epoch else {
            return self.join_attempt().await;
        };

        tracing::debug!(url = self.config.url(), ?origin, "connecting to backend");
        let result = tokio_tungstenite::connect_async(self.config.url()).await;

        let mut control = self.lock_control();
        if control.epoch != epoch {
            // Disconnected while the handshake was in flight; the socket, if
            // any, is dropped here.
            return Err(LinkError::Aborted);
        }

        match result {
            Ok((socket, _)) => {
                let (tx, rx) = mpsc::unbounded_channel();
                control.outbound = Some(tx);
                self.set_state(ConnectionState::Connected);
                drop(control);

                tracing::info!(url = self.config.url(), "connected to backend");
                let registry = self.registry.clone();
                let weak = Arc::downgrade(&self);
                tokio::spawn(async move {
                    let end = session::run(socket, rx, registry).await;
                    if let Some(inner) = weak.upgrade() {
                        inner.session_ended(epoch, end);
                    }
                });
                Ok(())
            }
            Err(e) => {
                self.set_state(ConnectionState::Disconnected);
                tracing::warn!(url = self.config.url(), error = %e, ?origin, "backend connection failed");
                if matches!(origin, Origin::Reconnect { .. }) {
                    // A failed retry counts as another close.
                    self.schedule_reconnect(&mut control);
                }
                Err(e.into())
            }
        }
    }

    async fn join_attempt(&self) -> Result<(), LinkError> {
        let mut rx = self.state.subscribe();
        let settled = rx
            .wait_for(|s| *s != ConnectionState::Connecting)
            .await
            .map(|s| *s);
        match settled {
            Ok(ConnectionState::Connected) => Ok(()),
            _ => Err(LinkError::AttemptFailed),
        }
    }

    fn session_ended(self: Arc<Self>, epoch: u64, end: SessionEnd) {
        let mut control = self.lock_control();
        if control.epoch != epoch {
            return;
        }
        control.outbound = None;
        self.set_state(ConnectionState::Disconnected);
        tracing::info!(url = self.config.url(), ?end, "disconnected from backend");
        self.schedule_reconnect(&mut control);
    }

    fn schedule_reconnect(self: &Arc<Self>, control: &mut Control) {
        let delay = self.config.reconnect_delay;
        let epoch = control.epoch;
        let weak: Weak<Inner> = Arc::downgrade(self);
        let armed = control.reconnect.schedule(delay, move |ticket| async move {
            let Some(inner) = weak.upgrade() else { return };
            if !inner.lock_control().reconnect.fire(ticket) {
                return;
            }
            tracing::info!("attempting to reconnect");
            if let Err(e) = inner.open(Origin::Reconnect { epoch }).await {
                tracing::debug!(error = %e, "reconnect attempt failed");
            }
        });
        if armed {
            tracing::debug!(?delay, "reconnect scheduled");
        }
    }

    /// Writes `cmd` if connected. Commands are never queued.
    fn send(&self, cmd: &ClientCommand) -> bool {
        let control = self.lock_control();
        let Some(tx) = control.outbound.as_ref() else {
            tracing::warn!(command = cmd.name(), "backend not connected; dropping command");
            return false;
        };
        let payload = match serde_json::to_string(cmd) {
            Ok(p) => p,
            Err(e) => {
                tracing::error!(command = cmd.name(), error = %e, "failed to encode command");
                return false;
            }
        };
        if tx.send(Message::Text(payload.into())).is_err() {
            tracing::warn!(command = cmd.name(), "backend session gone; dropping command");
            return false;
        }
        true
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        let control = self
            .control
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        control.reconnect.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn link() -> BackendLink {
        BackendLink::new(LinkConfig::default())
    }

    #[test]
    fn starts_disconnected_and_idle() {
        let link = link();
        assert_eq!(link.state(), ConnectionState::Disconnected);
        assert_eq!(link.listener_count(), 0);
    }

    #[tokio::test]
    async fn commands_while_disconnected_are_dropped() {
        let link = link();
        assert!(!link.inner.send(&ClientCommand::Close));
        link.open_port("COM1", 9600);
        link.write_data("hello");
        link.close_port();
        assert_eq!(link.state(), ConnectionState::Disconnected);
        assert!(!link.is_reconnect_scheduled());
    }

    #[tokio::test(start_paused = true)]
    async fn list_ports_while_disconnected_resolves_empty_after_timeout() {
        let link = link();
        let started = tokio::time::Instant::now();

        let ports = link.list_ports().await;

        assert!(ports.is_empty());
        assert!(started.elapsed() >= Duration::from_millis(5000));
        assert_eq!(link.listener_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn listeners_receive_in_registration_order() {
        let link = link();
        let order = Arc::new(Mutex::new(Vec::new()));
        let calls = Arc::new(AtomicUsize::new(0));

        for tag in [1, 2] {
            let (o, c) = (Arc::clone(&order), Arc::clone(&calls));
            link.on_message(move |_| {
                o.lock().unwrap().push(tag);
                c.fetch_add(1, Ordering::SeqCst);
            });
        }
        link.inner.registry.dispatch(&ServerMessage::Status {
            message: "Port closed".to_string(),
        });

        assert_eq!(*order.lock().unwrap(), vec![1, 2]);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn request_resolves_from_a_broadcast_reply() {
        let link = link();
        let feeder = link.inner.registry.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            feeder.dispatch(&ServerMessage::Ports {
                data: vec![PortInfo {
                    name: "COM1".to_string(),
                    desc: "X".to_string(),
                }],
            });
        });

        let ports = link.list_ports().await;
        assert_eq!(ports.len(), 1);
        assert_eq!(ports[0].name, "COM1");
        assert_eq!(link.listener_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn session_loss_schedules_exactly_one_reconnect() {
        let link = link();
        let epoch = link.inner.lock_control().epoch;
        link.inner.set_state(ConnectionState::Connected);

        Arc::clone(&link.inner).session_ended(epoch, SessionEnd::Lost);
        Arc::clone(&link.inner).session_ended(epoch, SessionEnd::Lost);

        assert_eq!(link.state(), ConnectionState::Disconnected);
        assert!(link.is_reconnect_scheduled());

        link.disconnect();
        assert!(!link.is_reconnect_scheduled());
        assert_eq!(link.state(), ConnectionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn fired_reconnect_from_before_disconnect_is_aborted() {
        let link = link();
        let armed_in = link.inner.lock_control().epoch;
        link.disconnect();

        // The timer already fired, so cancel() found nothing; the attempt must
        // still notice the disconnect before it touches the network.
        let result = Arc::clone(&link.inner)
            .open(Origin::Reconnect { epoch: armed_in })
            .await;

        assert!(matches!(result, Err(LinkError::Aborted)));
        assert_eq!(link.state(), ConnectionState::Disconnected);
        assert!(!link.is_reconnect_scheduled());
    }

    #[tokio::test(start_paused = true)]
    async fn stale_session_end_is_ignored_after_disconnect() {
        let link = link();
        let epoch = link.inner.lock_control().epoch;
        link.disconnect();

        Arc::clone(&link.inner).session_ended(epoch, SessionEnd::Released);
        assert!(!link.is_reconnect_scheduled());
    }
}
