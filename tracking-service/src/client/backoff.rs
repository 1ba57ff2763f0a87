use std::time::Duration;

/// Reconnection settings for [`ConnectionManager`](super::ConnectionManager)
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    /// Reconnection attempts allowed before giving up
    pub max_retries: u32,
    pub min_delay: Duration,
    pub max_delay: Duration,
    pub grow_factor: f64,
    /// Handshake deadline; exceeding it counts as a failed attempt
    pub connection_timeout: Duration,
}

/// The policy of a default [`ClientConfig`](crate::config::ClientConfig)
impl Default for ReconnectPolicy {
    fn default() -> Self {
        crate::config::ClientConfig::default().reconnect_policy()
    }
}

impl ReconnectPolicy {
    /// Delay before reconnection attempt `attempt` (1-based)
    ///
    /// `min_delay * grow_factor^(attempt - 1)`, capped at `max_delay`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.min_delay.as_secs_f64() * self.grow_factor.powi(exponent);
        let capped = secs.min(self.max_delay.as_secs_f64());

        if capped.is_finite() {
            Duration::from_secs_f64(capped.max(0.0))
        } else {
            self.max_delay
        }
    }
}
