use std::net::SocketAddr;

pub const INBOUND_CAP: usize = 256;
pub const OUTBOUND_CAP: usize = 256;

pub enum InboundMsg {
    ClientConnected { socket_addr: SocketAddr },
    ClientDisconnected,
    Command { cmd: ClientCommand },
}

pub enum OutboundMsg {
    Send { msg: ServerMessage },
    /// Sent verbatim, used to feed clients frames that are not valid messages.
    Raw { text: String },
}

pub use hw_protocol::{ClientCommand, MessageKind, PortInfo, ServerMessage};
