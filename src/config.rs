/// Link configuration
///
/// Start from the crate defaults and override only what the deployment
/// needs.
use std::time::Duration;

use crate::contracts::PeerName;

/// Settings a [`crate::NowLink`] runs with
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Name advertised in discovery frames
    pub name: PeerName,

    /// Reliable-send attempts when the caller does not pass its own
    pub retries: u32,

    /// How long each attempt waits for the application ACK
    pub ack_timeout: Duration,

    /// Pause after the transport refuses to enqueue a frame
    pub send_failure_backoff: Duration,

    /// Radio channel used when registering peers
    pub channel: u8,
}

impl Default for LinkConfig {
    fn default() -> Self {
        LinkBuilder::new().build()
    }
}

/// LinkBuilder - Fluent interface for link configuration
pub struct LinkBuilder {
    name: PeerName,
    retries: u32,
    ack_timeout_ms: u64,
    send_failure_backoff_ms: u64,
    channel: u8,
}

impl LinkBuilder {
    /// Create a new LinkBuilder with defaults
    pub fn new() -> Self {
        Self {
            name: PeerName::empty(),
            retries: crate::DEFAULT_RETRIES,
            ack_timeout_ms: crate::ACK_TIMEOUT_MS,
            send_failure_backoff_ms: crate::SEND_FAILURE_BACKOFF_MS,
            channel: crate::CURRENT_CHANNEL,
        }
    }

    /// Set the advertised node name (truncated to fit the 32-byte field)
    pub fn with_name(mut self, name: &str) -> Self {
        self.name = PeerName::new(name);
        self
    }

    /// Set default reliable-send attempts
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Set ACK wait per attempt in milliseconds
    pub fn with_ack_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.ack_timeout_ms = timeout_ms;
        self
    }

    /// Set backoff after a local send failure in milliseconds
    pub fn with_send_failure_backoff_ms(mut self, backoff_ms: u64) -> Self {
        self.send_failure_backoff_ms = backoff_ms;
        self
    }

    /// Set the registration channel (0 = current)
    pub fn with_channel(mut self, channel: u8) -> Self {
        self.channel = channel;
        self
    }

    pub fn get_retries(&self) -> u32 {
        self.retries
    }

    pub fn get_ack_timeout_ms(&self) -> u64 {
        self.ack_timeout_ms
    }

    pub fn get_send_failure_backoff_ms(&self) -> u64 {
        self.send_failure_backoff_ms
    }

    pub fn get_channel(&self) -> u8 {
        self.channel
    }

    pub fn build(self) -> LinkConfig {
        LinkConfig {
            name: self.name,
            retries: self.retries,
            ack_timeout: Duration::from_millis(self.ack_timeout_ms),
            send_failure_backoff: Duration::from_millis(self.send_failure_backoff_ms),
            channel: self.channel,
        }
    }
}

impl Default for LinkBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = LinkConfig::default();
        assert_eq!(config.retries, 5);
        assert_eq!(config.ack_timeout, Duration::from_millis(200));
        assert_eq!(config.send_failure_backoff, Duration::from_millis(100));
        assert_eq!(config.channel, 0);
        assert!(config.name.is_empty());
    }

    #[test]
    fn test_link_builder() {
        let builder = LinkBuilder::new()
            .with_name("greenhouse-3")
            .with_retries(3)
            .with_ack_timeout_ms(50)
            .with_send_failure_backoff_ms(5)
            .with_channel(6);

        assert_eq!(builder.get_retries(), 3);
        assert_eq!(builder.get_ack_timeout_ms(), 50);
        assert_eq!(builder.get_send_failure_backoff_ms(), 5);
        assert_eq!(builder.get_channel(), 6);

        let config = builder.build();
        assert_eq!(config.name.to_string_lossy(), "greenhouse-3");
        assert_eq!(config.ack_timeout, Duration::from_millis(50));
    }
}
