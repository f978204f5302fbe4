use crate::protocol::{ClientCommand, InboundMsg, OutboundMsg, ServerMessage};
use crossbeam_channel::{Receiver, Sender, TryRecvError};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tungstenite::protocol::Message;

pub const DEFAULT_ADDR: &str = "127.0.0.1:9001";

const HANDSHAKE_TIMEOUT: Duration = Duration::from_millis(500);
const READ_POLL: Duration = Duration::from_millis(30);

struct ActiveClient {
    ws: tungstenite::WebSocket<TcpStream>,
    socket_addr: SocketAddr,
}

#[derive(Default)]
struct Shared {
    shutdown: AtomicBool,
    kick: AtomicBool,
    connections: AtomicUsize,
}

pub struct NetworkThread {
    shared: Arc<Shared>,
    listen_addr: SocketAddr,
    join_handle: Mutex<Option<JoinHandle<()>>>,
}

impl NetworkThread {
    pub fn spawn(in_tx: Sender<InboundMsg>, out_rx: Receiver<OutboundMsg>) -> Result<Self, String> {
        Self::spawn_with_addr(DEFAULT_ADDR, in_tx, out_rx)
    }

    pub fn spawn_with_addr(
        addr: &str,
        in_tx: Sender<InboundMsg>,
        out_rx: Receiver<OutboundMsg>,
    ) -> Result<Self, String> {
        let listener =
            TcpListener::bind(addr).map_err(|e| format!("ws bind failed on {addr}: {e}"))?;
        listener
            .set_nonblocking(true)
            .map_err(|e| format!("ws listener setup failed: {e}"))?;
        let listen_addr = listener
            .local_addr()
            .map_err(|e| format!("ws listener has no local address: {e}"))?;

        let shared = Arc::new(Shared::default());
        let shared_for_thread = Arc::clone(&shared);
        let join_handle =
            thread::spawn(move || run_server(listener, in_tx, out_rx, shared_for_thread));

        Ok(Self {
            shared,
            listen_addr,
            join_handle: Mutex::new(Some(join_handle)),
        })
    }

    pub fn listen_addr(&self) -> SocketAddr {
        self.listen_addr
    }

    /// Number of websocket handshakes accepted so far.
    pub fn connection_count(&self) -> usize {
        self.shared.connections.load(Ordering::SeqCst)
    }

    /// Drops the active client on the next loop iteration.
    pub fn kick_client(&self) {
        self.shared.kick.store(true, Ordering::SeqCst);
    }

    pub fn shutdown(&self) {
        self.shared.shutdown.store(true, Ordering::Relaxed);
        if let Ok(mut h) = self.join_handle.lock() {
            if let Some(h) = h.take() {
                let _ = h.join();
            }
        }
    }
}

impl Drop for NetworkThread {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_server(
    listener: TcpListener,
    in_tx: Sender<InboundMsg>,
    out_rx: Receiver<OutboundMsg>,
    shared: Arc<Shared>,
) {
    let mut active: Option<ActiveClient> = None;

    while !shared.shutdown.load(Ordering::Relaxed) {
        if shared.kick.swap(false, Ordering::SeqCst) {
            if let Some(mut client) = active.take() {
                tracing::debug!(peer = %client.socket_addr, "kicking client");
                let _ = client.ws.close(None);
                let _ = client.ws.flush();
                let _ = in_tx.try_send(InboundMsg::ClientDisconnected);
            }
        }

        // Accept new connections (single-client policy).
        loop {
            match listener.accept() {
                Ok((stream, socket_addr)) => {
                    let _ = stream.set_nonblocking(false);
                    let _ = stream.set_nodelay(true);
                    let _ = stream.set_read_timeout(Some(HANDSHAKE_TIMEOUT));
                    let _ = stream.set_write_timeout(Some(Duration::from_millis(200)));

                    let ws = match tungstenite::accept(stream) {
                        Ok(ws) => ws,
                        Err(e) => {
                            tracing::warn!(error = %e, "ws handshake failed");
                            continue;
                        }
                    };
                    let _ = ws.get_ref().set_read_timeout(Some(READ_POLL));
                    shared.connections.fetch_add(1, Ordering::SeqCst);

                    // Close previous active client.
                    if let Some(mut prev) = active.take() {
                        let _ = prev.ws.close(None);
                        let _ = prev.ws.flush();
                        let _ = in_tx.try_send(InboundMsg::ClientDisconnected);
                    }

                    tracing::info!(peer = %socket_addr, "client connected");
                    let _ = in_tx.try_send(InboundMsg::ClientConnected { socket_addr });
                    active = Some(ActiveClient { ws, socket_addr });
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    tracing::warn!(error = %e, "ws accept failed");
                    break;
                }
            }
        }

        // Outbound: drain queued messages. Nothing is kept for a future client.
        loop {
            let msg = match out_rx.try_recv() {
                Ok(msg) => msg,
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => return,
            };
            let Some(client) = active.as_mut() else {
                continue;
            };
            let sent = match msg {
                OutboundMsg::Send { msg } => send_server_message(&mut client.ws, &msg),
                OutboundMsg::Raw { text } => client.ws.send(Message::Text(text)).map_err(|_| ()),
            };
            if sent.is_err() {
                let _ = client.ws.close(None);
                active = None;
                let _ = in_tx.try_send(InboundMsg::ClientDisconnected);
                break;
            }
        }

        // Inbound: read at most one message per loop (timeouts keep the loop moving).
        if let Some(client) = active.as_mut() {
            match client.ws.read() {
                Ok(msg) => {
                    if handle_inbound(&in_tx, client, msg).is_err() {
                        let _ = client.ws.close(None);
                        active = None;
                        let _ = in_tx.try_send(InboundMsg::ClientDisconnected);
                    }
                }
                Err(tungstenite::Error::Io(e))
                    if e.kind() == std::io::ErrorKind::WouldBlock
                        || e.kind() == std::io::ErrorKind::TimedOut => {}
                Err(_) => {
                    tracing::info!(peer = %client.socket_addr, "client disconnected");
                    active = None;
                    let _ = in_tx.try_send(InboundMsg::ClientDisconnected);
                }
            }
        } else {
            // If no active client, avoid busy-looping.
            thread::sleep(Duration::from_millis(10));
        }
    }

    if let Some(mut client) = active {
        let _ = client.ws.close(None);
        let _ = client.ws.flush();
    }
}

fn handle_inbound(
    in_tx: &Sender<InboundMsg>,
    client: &mut ActiveClient,
    msg: Message,
) -> Result<(), ()> {
    let text = match msg {
        Message::Text(s) => s,
        Message::Binary(_) => return Ok(()),
        Message::Ping(payload) => {
            let _ = client.ws.send(Message::Pong(payload));
            return Ok(());
        }
        Message::Pong(_) => return Ok(()),
        Message::Close(_) => return Err(()),
        Message::Frame(_) => return Ok(()),
    };

    let cmd: ClientCommand = match serde_json::from_str(&text) {
        Ok(c) => c,
        Err(e) => {
            tracing::debug!(error = %e, "unparseable command");
            let _ = send_server_message(
                &mut client.ws,
                &ServerMessage::Error {
                    message: "Unknown command".to_string(),
                },
            );
            return Ok(());
        }
    };

    if in_tx.try_send(InboundMsg::Command { cmd }).is_err() {
        let _ = send_server_message(
            &mut client.ws,
            &ServerMessage::Error {
                message: "server busy".to_string(),
            },
        );
    }

    Ok(())
}

fn send_server_message(
    ws: &mut tungstenite::WebSocket<TcpStream>,
    msg: &ServerMessage,
) -> Result<(), ()> {
    let payload = serde_json::to_string(msg).map_err(|_| ())?;
    ws.send(Message::Text(payload)).map_err(|_| ())
}
