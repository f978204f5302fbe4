use crate::error::LinkError;
use std::time::Duration;
use url::Url;

pub const DEFAULT_URL: &str = "ws://127.0.0.1:9001";
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(3000);
pub const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_millis(5000);

#[derive(Debug, Clone)]
pub struct LinkConfig {
    url: String,
    /// Fixed delay between losing the connection and the next attempt.
    pub reconnect_delay: Duration,
    /// How long a correlated request waits for its reply.
    pub reply_timeout: Duration,
}

impl LinkConfig {
    pub fn new(url: &str) -> Result<Self, LinkError> {
        let parsed = Url::parse(url).map_err(|source| LinkError::InvalidUrl {
            url: url.to_string(),
            source,
        })?;
        match parsed.scheme() {
            "ws" | "wss" => {}
            other => return Err(LinkError::UnsupportedScheme(other.to_string())),
        }
        Ok(Self {
            url: parsed.into(),
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            reply_timeout: DEFAULT_REPLY_TIMEOUT,
        })
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    pub fn with_reply_timeout(mut self, timeout: Duration) -> Self {
        self.reply_timeout = timeout;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            reply_timeout: DEFAULT_REPLY_TIMEOUT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_point_at_local_backend() {
        let cfg = LinkConfig::default();
        assert_eq!(cfg.url(), DEFAULT_URL);
        assert!(LinkConfig::new(cfg.url()).is_ok());
        assert_eq!(cfg.reconnect_delay, Duration::from_secs(3));
        assert_eq!(cfg.reply_timeout, Duration::from_secs(5));
    }

    #[test]
    fn rejects_non_websocket_urls() {
        assert!(matches!(
            LinkConfig::new("http://127.0.0.1:9001"),
            Err(LinkError::UnsupportedScheme(s)) if s == "http"
        ));
        assert!(matches!(
            LinkConfig::new("not a url"),
            Err(LinkError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn builder_overrides_timings() {
        let cfg = LinkConfig::new("wss://backend.local:9443")
            .unwrap()
            .with_reconnect_delay(Duration::from_millis(100))
            .with_reply_timeout(Duration::from_millis(250));
        assert_eq!(cfg.reconnect_delay, Duration::from_millis(100));
        assert_eq!(cfg.reply_timeout, Duration::from_millis(250));
    }
}
