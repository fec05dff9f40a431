//! Channel configuration and endpoint construction.

use std::time::Duration;

use url::Url;

use crate::error::ChannelError;

/// Identity attached to the connection as endpoint query parameters.
#[derive(Debug, Clone)]
pub struct Identity {
    pub user_id: String,
    /// Room to join, when one exists at connect time (the session id doubles
    /// as the room id).
    pub room_id: Option<String>,
}

impl Identity {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            room_id: None,
        }
    }

    pub fn with_room(mut self, room_id: impl Into<String>) -> Self {
        self.room_id = Some(room_id.into());
        self
    }
}

/// Configuration for a [`Channel`](crate::channel::Channel).
///
/// Backoff delays are configurable so tests can exercise the real reconnect
/// path in milliseconds; production callers keep the defaults.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    pub endpoint: String,
    pub identity: Identity,
    pub auto_reconnect: bool,
    pub max_reconnect_attempts: u32,
    pub reconnect_base_delay: Duration,
    pub reconnect_max_delay: Duration,
    pub ping_interval: Duration,
}

impl ChannelConfig {
    pub fn new(endpoint: impl Into<String>, identity: Identity) -> Self {
        Self {
            endpoint: endpoint.into(),
            identity,
            auto_reconnect: true,
            max_reconnect_attempts: 5,
            reconnect_base_delay: Duration::from_millis(1000),
            reconnect_max_delay: Duration::from_secs(30),
            ping_interval: Duration::from_secs(30),
        }
    }

    pub fn with_auto_reconnect(mut self, enabled: bool) -> Self {
        self.auto_reconnect = enabled;
        self
    }

    pub fn with_max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }

    pub fn with_reconnect_base_delay(mut self, delay: Duration) -> Self {
        self.reconnect_base_delay = delay;
        self
    }

    pub fn with_ping_interval(mut self, interval: Duration) -> Self {
        self.ping_interval = interval;
        self
    }

    /// Builds the connect URL with `user_id` / `room_id` query parameters.
    pub(crate) fn connect_url(&self) -> Result<Url, ChannelError> {
        let mut url = Url::parse(&self.endpoint)
            .map_err(|err| ChannelError::InvalidEndpoint(format!("{}: {err}", self.endpoint)))?;
        url.query_pairs_mut()
            .append_pair("user_id", &self.identity.user_id);
        if let Some(room_id) = &self.identity.room_id {
            url.query_pairs_mut().append_pair("room_id", room_id);
        }
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_url_appends_identity_params() {
        let config = ChannelConfig::new(
            "ws://127.0.0.1:9000/api/v1/ws",
            Identity::new("alice").with_room("session_alice_1"),
        );
        let url = config.connect_url().unwrap();
        assert_eq!(
            url.as_str(),
            "ws://127.0.0.1:9000/api/v1/ws?user_id=alice&room_id=session_alice_1"
        );
    }

    #[test]
    fn connect_url_omits_missing_room() {
        let config = ChannelConfig::new("ws://127.0.0.1:9000/ws", Identity::new("alice"));
        let url = config.connect_url().unwrap();
        assert_eq!(url.as_str(), "ws://127.0.0.1:9000/ws?user_id=alice");
    }

    #[test]
    fn malformed_endpoint_is_reported() {
        let config = ChannelConfig::new("not a url", Identity::new("alice"));
        assert!(matches!(
            config.connect_url(),
            Err(ChannelError::InvalidEndpoint(_))
        ));
    }
}
