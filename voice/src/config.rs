//! Configuration a session connects with.

use crate::udp::UdpQueueConfig;

/// The configuration a [`Session`] uses to connect to a voice server.
///
/// [`Session`]: crate::Session
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct VoiceConfig {
    pub(crate) address: String,
    pub(crate) log_received_ws: bool,
    pub(crate) log_sent_ws: bool,
    pub(crate) server_id: String,
    pub(crate) session_id: String,
    pub(crate) token: String,
    pub(crate) udp_queue: UdpQueueConfig,
    pub(crate) use_tls: bool,
    pub(crate) user_id: String,
}

impl VoiceConfig {
    /// Create a configuration from the handshake essentials, with default
    /// settings for everything else.
    pub fn new(
        address: impl Into<String>,
        server_id: impl Into<String>,
        user_id: impl Into<String>,
        session_id: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            address: address.into(),
            log_received_ws: false,
            log_sent_ws: false,
            server_id: server_id.into(),
            session_id: session_id.into(),
            token: token.into(),
            udp_queue: UdpQueueConfig::default(),
            use_tls: true,
            user_id: user_id.into(),
        }
    }

    /// Address of the voice server, as `host` or `host:port`.
    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Whether to log payloads received over the WebSocket.
    ///
    /// Defaults to false.
    #[must_use]
    pub const fn log_received_ws(mut self, log: bool) -> Self {
        self.log_received_ws = log;

        self
    }

    /// Whether to log payloads sent over the WebSocket.
    ///
    /// Defaults to false.
    #[must_use]
    pub const fn log_sent_ws(mut self, log: bool) -> Self {
        self.log_sent_ws = log;

        self
    }

    /// Set the packet queue shape handed to the UDP helper.
    #[must_use]
    pub fn udp_queue(mut self, queue: UdpQueueConfig) -> Self {
        self.udp_queue = queue;

        self
    }

    /// Whether to connect with `wss://` rather than `ws://`.
    ///
    /// Defaults to true; switching it off is meant for talking to a local
    /// stand-in server.
    #[must_use]
    pub const fn use_tls(mut self, use_tls: bool) -> Self {
        self.use_tls = use_tls;

        self
    }
}

#[cfg(test)]
mod tests {
    use super::VoiceConfig;
    use static_assertions::assert_impl_all;
    use std::fmt::Debug;

    assert_impl_all!(VoiceConfig: Clone, Debug, Eq, PartialEq, Send, Sync);

    #[test]
    fn defaults() {
        let config = VoiceConfig::new("voice.example.com", "1", "2", "sess", "tok");

        assert!(config.use_tls);
        assert!(!config.log_sent_ws);
        assert!(!config.log_received_ws);
        assert_eq!("voice.example.com", config.address());
    }
}
