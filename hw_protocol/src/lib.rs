use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PortInfo {
    pub name: String,
    pub desc: String,
}

/// Messages pushed by the backend. Replies and unsolicited notifications share
/// this shape; nothing ties a message to the command that caused it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum ServerMessage {
    Ports { data: Vec<PortInfo> },
    Rx { data: String },
    Status { message: String },
    Error { message: String },
}

impl ServerMessage {
    pub fn kind(&self) -> MessageKind {
        match self {
            ServerMessage::Ports { .. } => MessageKind::Ports,
            ServerMessage::Rx { .. } => MessageKind::Rx,
            ServerMessage::Status { .. } => MessageKind::Status,
            ServerMessage::Error { .. } => MessageKind::Error,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Ports,
    Rx,
    Status,
    Error,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MessageKind::Ports => "ports",
            MessageKind::Rx => "rx",
            MessageKind::Status => "status",
            MessageKind::Error => "error",
        })
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "cmd")]
pub enum ClientCommand {
    List,
    Open { port: String, baud: u32 },
    Close,
    Write { data: String },
}

impl ClientCommand {
    pub fn name(&self) -> &'static str {
        match self {
            ClientCommand::List => "list",
            ClientCommand::Open { .. } => "open",
            ClientCommand::Close => "close",
            ClientCommand::Write { .. } => "write",
        }
    }
}
