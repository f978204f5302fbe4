use crate::registry::ListenerRegistry;
use futures_util::{SinkExt, StreamExt};
use hw_protocol::ServerMessage;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

pub(crate) type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SessionEnd {
    /// The link dropped its writer; we closed the socket ourselves.
    Released,
    /// The transport went away underneath us.
    Lost,
}

/// Pumps one open socket until either side ends it.
pub(crate) async fn run(
    socket: Socket,
    mut outbound: mpsc::UnboundedReceiver<Message>,
    registry: ListenerRegistry,
) -> SessionEnd {
    let (mut write, mut read) = socket.split();

    loop {
        tokio::select! {
            next = outbound.recv() => {
                let Some(msg) = next else {
                    let _ = write.send(Message::Close(None)).await;
                    let _ = write.close().await;
                    return SessionEnd::Released;
                };
                if let Err(e) = write.send(msg).await {
                    tracing::warn!(error = %e, "backend write failed");
                    return SessionEnd::Lost;
                }
            }
            incoming = read.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => dispatch_text(&registry, &text),
                    Some(Ok(Message::Binary(bytes))) => match std::str::from_utf8(&bytes) {
                        Ok(text) => dispatch_text(&registry, text),
                        Err(_) => tracing::warn!(len = bytes.len(), "dropping non-utf8 binary frame"),
                    },
                    Some(Ok(Message::Close(frame))) => {
                        tracing::debug!(?frame, "backend closed the connection");
                        return SessionEnd::Lost;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "backend connection error");
                        return SessionEnd::Lost;
                    }
                    None => return SessionEnd::Lost,
                }
            }
        }
    }
}

fn dispatch_text(registry: &ListenerRegistry, text: &str) {
    match serde_json::from_str::<ServerMessage>(text) {
        Ok(msg) => {
            registry.dispatch(&msg);
        }
        Err(e) => tracing::warn!(error = %e, "dropping malformed backend message"),
    }
}
