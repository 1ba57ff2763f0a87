//! Observer-side view of the tracking channel.

use std::sync::{Mutex, MutexGuard};

use super::{ConnectionPhase, MessageHandler};
use crate::websocket::{CarrierLocation, TrackingUpdate};

/// What an observer currently knows
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ViewSnapshot {
    pub connected: bool,
    /// Replaced wholesale by every snapshot
    pub carriers: Vec<CarrierLocation>,
    pub last_update: Option<TrackingUpdate>,
    pub last_error: Option<String>,
}

/// [`MessageHandler`] that keeps a [`ViewSnapshot`] current
#[derive(Debug, Default)]
pub struct TrackingView {
    state: Mutex<ViewSnapshot>,
}

impl TrackingView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> ViewSnapshot {
        self.state().clone()
    }

    fn state(&self) -> MutexGuard<'_, ViewSnapshot> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl MessageHandler for TrackingView {
    fn on_phase_change(&self, phase: ConnectionPhase) {
        let mut state = self.state();
        match phase {
            ConnectionPhase::Connected => {
                state.connected = true;
                state.last_error = None;
            }
            ConnectionPhase::Reconnecting { .. } => {
                state.connected = false;
                state.last_error = Some("Connection closed. Attempting to reconnect...".to_string());
            }
            ConnectionPhase::Failed => {
                state.connected = false;
                state.last_error = Some("Connection lost. Reconnection attempts exhausted".to_string());
            }
            ConnectionPhase::Disconnected | ConnectionPhase::Connecting => {
                state.connected = false;
            }
        }
    }

    fn on_load_update(&self, update: &TrackingUpdate) {
        self.state().last_update = Some(update.clone());
    }

    fn on_carrier_locations(&self, carriers: &[CarrierLocation]) {
        self.state().carriers = carriers.to_vec();
    }

    fn on_error(&self, error: &str) {
        let message = if error.is_empty() {
            "Unknown error occurred"
        } else {
            error
        };
        self.state().last_error = Some(message.to_string());
    }

    fn on_invalid_message(&self, _error: &serde_json::Error) {
        self.state().last_error = Some("Failed to process server message".to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::dispatch;
    use std::time::Duration;

    #[test]
    fn test_view_follows_envelopes() {
        let view = TrackingView::new();
        view.on_phase_change(ConnectionPhase::Connected);

        dispatch(
            &view,
            r#"{"type":"carrier_locations","carriers":[{"id":1,"location":[33.57,-7.59],"name":"Atlas"},{"id":2,"location":[35.17,-5.27],"name":"Rif"}]}"#,
        );
        dispatch(
            &view,
            r#"{"type":"carrier_locations","carriers":[{"id":2,"location":[35.2,-5.3],"name":"Rif"}]}"#,
        );
        dispatch(
            &view,
            r#"{"type":"load_update","data":{"entityId":42,"latitude":31.79,"longitude":-7.09}}"#,
        );

        let snapshot = view.snapshot();
        assert!(snapshot.connected);
        assert_eq!(snapshot.carriers.len(), 1);
        assert_eq!(snapshot.carriers[0].location, [35.2, -5.3]);
        assert_eq!(snapshot.last_update.unwrap().entity_id, 42);
        assert!(snapshot.last_error.is_none());
    }

    #[test]
    fn test_view_errors_and_reconnects() {
        let view = TrackingView::new();
        view.on_phase_change(ConnectionPhase::Connected);

        dispatch(&view, r#"{"type":"error","error":""}"#);
        assert_eq!(
            view.snapshot().last_error.as_deref(),
            Some("Unknown error occurred")
        );

        view.on_phase_change(ConnectionPhase::Reconnecting {
            attempt: 1,
            delay: Duration::from_secs(1),
        });
        assert!(!view.snapshot().connected);

        view.on_phase_change(ConnectionPhase::Connected);
        let snapshot = view.snapshot();
        assert!(snapshot.connected);
        assert!(snapshot.last_error.is_none());
    }
}
