//! Connection to the native serial backend.
//!
//! [`BackendLink`] owns a single websocket to the backend, reconnects after
//! unexpected loss, fans inbound messages out to registered listeners and
//! emulates request/response on top of the backend's broadcast-only protocol.

mod config;
mod correlate;
mod error;
mod link;
mod reconnect;
mod registry;
mod session;
mod state;

pub use config::{LinkConfig, DEFAULT_RECONNECT_DELAY, DEFAULT_REPLY_TIMEOUT, DEFAULT_URL};
pub use error::LinkError;
pub use link::BackendLink;
pub use registry::{ListenerId, Subscription};
pub use state::ConnectionState;

pub use hw_protocol::{ClientCommand, MessageKind, PortInfo, ServerMessage};
