mod backend;
mod main_loop;
mod net;
mod protocol;
mod serial_api;

pub use backend::{MockBackend, MockBackendOptions};
pub use main_loop::MainLoop;
pub use net::{NetworkThread, DEFAULT_ADDR};
pub use protocol::{
    ClientCommand, InboundMsg, MessageKind, OutboundMsg, PortInfo, ServerMessage, INBOUND_CAP,
    OUTBOUND_CAP,
};
pub use serial_api::{LoopbackSerial, SerialApi};
