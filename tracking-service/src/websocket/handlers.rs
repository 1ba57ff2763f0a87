//! WebSocket connection handler.
//!
//! Runs one reader loop per connection; inbound frames are ingested in the
//! order they arrive. Outbound frames are written by a separate task draining
//! the connection's registry channel.

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, Stream, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::ValidationError;
use crate::service::TrackingService;

use super::manager::{ConnectionId, ConnectionStatus};
use super::messages::ServerMessage;

/// Handle a WebSocket connection
///
/// Registers the connection, processes inbound updates until the peer closes
/// or the transport fails, then unregisters it.
pub async fn handle_ws_connection(
    socket: WebSocket,
    remote_addr: Option<SocketAddr>,
    service: Arc<TrackingService>,
) {
    let connection_id: ConnectionId = uuid::Uuid::new_v4();
    info!(connection_id = %connection_id, remote_addr = ?remote_addr, "New tracking connection");

    let (mut ws_tx, ws_rx) = socket.split();
    let (frame_tx, mut frame_rx) = mpsc::unbounded_channel();

    service.registry.register(connection_id, remote_addr, frame_tx);

    let mut send_task = tokio::spawn(async move {
        while let Some(frame) = frame_rx.recv().await {
            if ws_tx.send(Message::Text(frame)).await.is_err() {
                break;
            }
        }
        let _ = ws_tx.close().await;
        debug!(connection_id = %connection_id, "WebSocket send task ended");
    });

    let cancel = CancellationToken::new();
    let reader_service = service.clone();
    let reader_cancel = cancel.clone();
    let mut recv_task = tokio::spawn(async move {
        read_frames(ws_rx, connection_id, &reader_service, reader_cancel).await;
    });

    // Whichever side finishes first ends the connection. The reader is never
    // aborted: an update it has started is persisted and routed in full.
    tokio::select! {
        _ = &mut recv_task => send_task.abort(),
        _ = &mut send_task => {
            cancel.cancel();
            let _ = recv_task.await;
        }
    }

    service
        .registry
        .set_status(connection_id, ConnectionStatus::Closing);
    service.registry.unregister(connection_id);
    info!(connection_id = %connection_id, "Tracking connection closed");
}

/// Ingest inbound frames in arrival order until the peer closes, the
/// transport fails, or `cancel` fires while waiting for the next frame
async fn read_frames<S>(
    mut frames: S,
    connection_id: ConnectionId,
    service: &TrackingService,
    cancel: CancellationToken,
) where
    S: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    loop {
        let next = tokio::select! {
            biased;
            next = frames.next() => next,
            _ = cancel.cancelled() => break,
        };
        let Some(result) = next else {
            break;
        };

        match result {
            Ok(Message::Text(text)) => {
                let _ = service.ingest(connection_id, text.as_str()).await;
            }
            Ok(Message::Binary(data)) => match std::str::from_utf8(&data) {
                Ok(text) => {
                    let _ = service.ingest(connection_id, text).await;
                }
                Err(_) => {
                    warn!(connection_id = %connection_id, "Binary frame is not UTF-8");
                    service.registry.send_to(
                        connection_id,
                        &ServerMessage::Error {
                            error: ValidationError::NotUtf8.to_string(),
                        },
                    );
                }
            },
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {
                // axum answers pings itself
            }
            Ok(Message::Close(_)) => {
                info!(connection_id = %connection_id, "Tracking connection closed by client");
                break;
            }
            Err(e) => {
                error!(connection_id = %connection_id, error = %e, "WebSocket error");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use serde_json::{Value, json};

    use crate::config::TrackingConfig;
    use crate::db::Database;
    use crate::service::state::LoadStatus;
    use crate::websocket::ConnectionRegistry;

    #[tokio::test]
    async fn test_cancel_finishes_received_update() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        db.insert_load(LoadStatus::InTransit).unwrap();
        let registry = Arc::new(ConnectionRegistry::new());
        let service = TrackingService::new(db, registry.clone(), TrackingConfig::default());

        let sender = uuid::Uuid::new_v4();
        let (sender_tx, _sender_rx) = mpsc::unbounded_channel();
        registry.register(sender, None, sender_tx);
        let (observer_tx, mut observer_rx) = mpsc::unbounded_channel();
        registry.register(uuid::Uuid::new_v4(), None, observer_tx);
        while observer_rx.try_recv().is_ok() {}

        let raw = r#"{"entityId":1,"latitude":31.0,"longitude":-7.0}"#;
        let frames = stream::iter(vec![Ok(Message::Text(raw.into()))]).chain(stream::pending());

        // Already cancelled: the pending frame is still applied, then the
        // reader stops instead of waiting on the stalled stream
        let cancel = CancellationToken::new();
        cancel.cancel();
        tokio::time::timeout(
            std::time::Duration::from_secs(2),
            read_frames(frames, sender, &service, cancel),
        )
        .await
        .unwrap();

        let history = service.recent_history(1, None).await.unwrap();
        assert_eq!(history.len(), 1);

        let frame = observer_rx.try_recv().unwrap();
        let value: Value = serde_json::from_str(frame.as_str()).unwrap();
        assert_eq!(value["type"], json!("load_update"));
        assert_eq!(service.pending_entity_locks(), 0);
    }
}
