//! Connection lifecycle state machine.

use std::time::Duration;

use super::ReconnectPolicy;

/// Where a client connection is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionPhase {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    /// Waiting `delay` before reconnection attempt `attempt`
    Reconnecting { attempt: u32, delay: Duration },
    /// Reconnection attempts exhausted; nothing more will be tried
    Failed,
}

impl ConnectionPhase {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionPhase::Connected)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ConnectionPhase::Failed)
    }
}

/// Pure transition logic; the connection manager's run loop drives it
#[derive(Debug, Clone)]
pub struct ConnectionStateMachine {
    policy: ReconnectPolicy,
    phase: ConnectionPhase,
    attempts: u32,
}

impl ConnectionStateMachine {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            phase: ConnectionPhase::Disconnected,
            attempts: 0,
        }
    }

    pub fn phase(&self) -> ConnectionPhase {
        self.phase
    }

    /// Reconnection attempts since the last successful handshake
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Begin a handshake. Ignored unless disconnected or waiting to reconnect.
    pub fn connect(&mut self) -> ConnectionPhase {
        if matches!(
            self.phase,
            ConnectionPhase::Disconnected | ConnectionPhase::Reconnecting { .. }
        ) {
            self.phase = ConnectionPhase::Connecting;
        }
        self.phase
    }

    /// Handshake succeeded
    pub fn on_connected(&mut self) -> ConnectionPhase {
        if self.phase == ConnectionPhase::Connecting {
            self.phase = ConnectionPhase::Connected;
            self.attempts = 0;
        }
        self.phase
    }

    /// The transport closed, errored, or the handshake failed or timed out
    pub fn on_disconnected(&mut self) -> ConnectionPhase {
        if !matches!(
            self.phase,
            ConnectionPhase::Connected | ConnectionPhase::Connecting
        ) {
            return self.phase;
        }

        if self.attempts >= self.policy.max_retries {
            self.phase = ConnectionPhase::Failed;
        } else {
            self.attempts += 1;
            self.phase = ConnectionPhase::Reconnecting {
                attempt: self.attempts,
                delay: self.policy.delay(self.attempts),
            };
        }
        self.phase
    }

    /// Deliberate close by the owner; no reconnection follows
    pub fn close(&mut self) -> ConnectionPhase {
        if !self.phase.is_terminal() {
            self.phase = ConnectionPhase::Disconnected;
        }
        self.phase
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(max_retries: u32) -> ReconnectPolicy {
        ReconnectPolicy {
            max_retries,
            ..ReconnectPolicy::default()
        }
    }

    #[test]
    fn test_drop_and_recover_resets_attempts() {
        let mut machine = ConnectionStateMachine::new(policy(5));
        assert_eq!(machine.connect(), ConnectionPhase::Connecting);
        assert_eq!(machine.on_connected(), ConnectionPhase::Connected);

        // Connection drops mid-session
        assert!(matches!(
            machine.on_disconnected(),
            ConnectionPhase::Reconnecting { attempt: 1, .. }
        ));
        assert_eq!(machine.connect(), ConnectionPhase::Connecting);

        // First retry fails too
        assert!(matches!(
            machine.on_disconnected(),
            ConnectionPhase::Reconnecting { attempt: 2, .. }
        ));
        assert_eq!(machine.attempts(), 2);
        assert_eq!(machine.connect(), ConnectionPhase::Connecting);
        assert_eq!(machine.on_connected(), ConnectionPhase::Connected);
        assert_eq!(machine.attempts(), 0);
    }

    #[test]
    fn test_attempts_stop_exactly_at_limit() {
        let max_retries = 4;
        let mut machine = ConnectionStateMachine::new(policy(max_retries));
        machine.connect();

        let mut delays = Vec::new();
        loop {
            match machine.on_disconnected() {
                ConnectionPhase::Reconnecting { attempt, delay } => {
                    assert_eq!(attempt as usize, delays.len() + 1);
                    delays.push(delay);
                    machine.connect();
                }
                ConnectionPhase::Failed => break,
                other => panic!("Unexpected phase {:?}", other),
            }
        }

        assert_eq!(delays.len(), max_retries as usize);
        assert!(delays.windows(2).all(|w| w[0] <= w[1]));

        // Terminal: nothing moves it again
        assert_eq!(machine.connect(), ConnectionPhase::Failed);
        assert_eq!(machine.on_disconnected(), ConnectionPhase::Failed);
        assert_eq!(machine.close(), ConnectionPhase::Failed);
    }

    #[test]
    fn test_zero_retries_fails_on_first_drop() {
        let mut machine = ConnectionStateMachine::new(policy(0));
        machine.connect();
        machine.on_connected();
        assert_eq!(machine.on_disconnected(), ConnectionPhase::Failed);
    }

    #[test]
    fn test_close_is_not_reconnected() {
        let mut machine = ConnectionStateMachine::new(policy(3));
        machine.connect();
        machine.on_connected();
        assert_eq!(machine.close(), ConnectionPhase::Disconnected);
        assert_eq!(machine.on_disconnected(), ConnectionPhase::Disconnected);
    }
}
