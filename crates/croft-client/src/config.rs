use std::time::Duration;

use reqwest::Url;

use croft_types::models::TYPING_QUIET_PERIOD_MS;

use crate::error::ClientError;

/// Session configuration. Endpoints and deadlines are injected here at
/// construction time; nothing is read from the environment.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Hub base URL for the REST API, e.g. `http://127.0.0.1:4700`.
    pub base_url: Url,
    /// Deadline for every REST call. An unresponsive hub surfaces as an
    /// explicit timeout error, never a hung await.
    pub request_timeout: Duration,
    /// Deadline for dialing the WebSocket feed.
    pub connect_timeout: Duration,
    /// Consecutive failed connection attempts before giving up.
    pub max_reconnect_attempts: u32,
    /// How often the presence heartbeat refreshes last_seen while connected.
    pub heartbeat_interval: Duration,
    /// Idle time after which a typing indicator auto-clears.
    pub typing_quiet_period: Duration,
}

impl ClientConfig {
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            ..Self::default()
        }
    }

    /// Derive the WebSocket feed endpoint from the base URL.
    pub fn feed_url(&self) -> Result<Url, ClientError> {
        let mut url = self.base_url.clone();
        match url.scheme() {
            "http" => url
                .set_scheme("ws")
                .map_err(|_| ClientError::Config("cannot derive ws url".into()))?,
            "https" => url
                .set_scheme("wss")
                .map_err(|_| ClientError::Config("cannot derive wss url".into()))?,
            "ws" | "wss" => {}
            other => {
                return Err(ClientError::Config(format!(
                    "unsupported base url scheme: {other}"
                )))
            }
        }
        url.set_path("/feed");
        Ok(url)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: Url::parse("http://127.0.0.1:4700").expect("static url"),
            request_timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(10),
            max_reconnect_attempts: 5,
            heartbeat_interval: Duration::from_secs(30),
            typing_quiet_period: Duration::from_millis(TYPING_QUIET_PERIOD_MS),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = ClientConfig::default();
        assert_eq!(config.max_reconnect_attempts, 5);
        assert_eq!(config.typing_quiet_period, Duration::from_millis(3000));
        assert_eq!(config.request_timeout, Duration::from_secs(10));
    }

    #[test]
    fn feed_url_swaps_scheme_and_path() {
        let config = ClientConfig::new(Url::parse("http://farm.example:4700").unwrap());
        assert_eq!(config.feed_url().unwrap().as_str(), "ws://farm.example:4700/feed");

        let config = ClientConfig::new(Url::parse("https://farm.example").unwrap());
        assert_eq!(config.feed_url().unwrap().as_str(), "wss://farm.example/feed");
    }
}
