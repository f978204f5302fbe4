use crate::protocol::{ClientCommand, InboundMsg, OutboundMsg, ServerMessage};
use crate::serial_api::SerialApi;
use crossbeam_channel::{Receiver, Sender, TryRecvError};

pub struct MainLoop {
    inbound_rx: Receiver<InboundMsg>,
    outbound_tx: Sender<OutboundMsg>,
    client_connected: bool,
    answer_port_listing: bool,
}

impl MainLoop {
    pub fn new(inbound_rx: Receiver<InboundMsg>, outbound_tx: Sender<OutboundMsg>) -> Self {
        Self {
            inbound_rx,
            outbound_tx,
            client_connected: false,
            answer_port_listing: true,
        }
    }

    /// When disabled, `list` commands are swallowed without a reply.
    pub fn set_answer_port_listing(&mut self, answer: bool) {
        self.answer_port_listing = answer;
    }

    pub fn tick(&mut self, api: &dyn SerialApi) {
        loop {
            match self.inbound_rx.try_recv() {
                Ok(InboundMsg::ClientConnected { .. }) => self.client_connected = true,
                Ok(InboundMsg::ClientDisconnected) => self.client_connected = false,
                Ok(InboundMsg::Command { cmd }) => {
                    if let Some(reply) = self.handle_command(api, cmd) {
                        self.try_send(OutboundMsg::Send { msg: reply });
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => break,
            }
        }

        // Received serial data is pushed to the client as it arrives.
        while let Some(data) = api.read() {
            if self.client_connected {
                self.try_send(OutboundMsg::Send {
                    msg: ServerMessage::Rx { data },
                });
            }
        }
    }

    pub fn try_send(&mut self, msg: OutboundMsg) {
        let _ = self.outbound_tx.try_send(msg);
    }

    fn handle_command(&mut self, api: &dyn SerialApi, cmd: ClientCommand) -> Option<ServerMessage> {
        tracing::debug!(command = cmd.name(), "handling command");
        let reply = match cmd {
            ClientCommand::List => {
                if !self.answer_port_listing {
                    return None;
                }
                ServerMessage::Ports {
                    data: api.list_ports(),
                }
            }
            ClientCommand::Open { port, baud } => match api.open(&port, baud) {
                Ok(()) => status("Port opened successfully"),
                Err(e) => {
                    tracing::debug!(%port, baud, error = %e, "open failed");
                    error("Failed to open port")
                }
            },
            ClientCommand::Write { data } => match api.write(&data) {
                Ok(()) => status("Data sent"),
                Err(e) => {
                    tracing::debug!(error = %e, "write failed");
                    error("Failed to send data")
                }
            },
            ClientCommand::Close => {
                api.close();
                status("Port closed")
            }
        };
        Some(reply)
    }
}

fn status(message: &str) -> ServerMessage {
    ServerMessage::Status {
        message: message.to_string(),
    }
}

fn error(message: &str) -> ServerMessage {
    ServerMessage::Error {
        message: message.to_string(),
    }
}
