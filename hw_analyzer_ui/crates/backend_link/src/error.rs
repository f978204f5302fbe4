use thiserror::Error;
use tokio_tungstenite::tungstenite;

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("invalid backend url {url:?}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("unsupported backend url scheme {0:?} (expected ws or wss)")]
    UnsupportedScheme(String),
    #[error("websocket error: {0}")]
    Transport(Box<tungstenite::Error>),
    #[error("connection attempt abandoned by disconnect")]
    Aborted,
    #[error("concurrent connection attempt did not open")]
    AttemptFailed,
}

impl From<tungstenite::Error> for LinkError {
    fn from(e: tungstenite::Error) -> Self {
        LinkError::Transport(Box::new(e))
    }
}
