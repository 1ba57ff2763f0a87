//! Connection manager run loop.

use futures::{SinkExt, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{ConnectionPhase, ConnectionStateMachine, MessageHandler, ReconnectPolicy, dispatch};
use crate::error::ClientError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// One logical connection to the tracking channel
///
/// The transport underneath is replaced on every reconnection; the manager,
/// its handler and its phase channel stay the same. Dropping the manager
/// closes the connection like [`close`](Self::close) without waiting.
pub struct ConnectionManager {
    outbound: mpsc::UnboundedSender<String>,
    phase: watch::Receiver<ConnectionPhase>,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
    max_retries: u32,
}

impl ConnectionManager {
    /// Start connecting to `url` in the background
    pub fn connect(
        url: impl Into<String>,
        policy: ReconnectPolicy,
        handler: Arc<dyn MessageHandler>,
    ) -> Self {
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let (phase_tx, phase) = watch::channel(ConnectionPhase::Disconnected);
        let cancel = CancellationToken::new();
        let max_retries = policy.max_retries;

        let run = RunLoop {
            url: url.into(),
            machine: ConnectionStateMachine::new(policy.clone()),
            policy,
            handler,
            phase_tx,
            outbound_rx,
            cancel: cancel.clone(),
        };
        let handle = tokio::spawn(run.run());

        Self {
            outbound,
            phase,
            cancel,
            handle: Some(handle),
            max_retries,
        }
    }

    pub fn phase(&self) -> ConnectionPhase {
        *self.phase.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionPhase> {
        self.phase.clone()
    }

    /// Queue a message for the live connection
    ///
    /// Fails with [`ClientError::NotConnected`] unless connected; the message
    /// is dropped, never buffered for a later connection.
    pub fn send<T: Serialize>(&self, message: &T) -> Result<(), ClientError> {
        if !self.phase.borrow().is_connected() {
            return Err(ClientError::NotConnected);
        }

        let text = serde_json::to_string(message)?;
        self.outbound
            .send(text)
            .map_err(|_| ClientError::NotConnected)
    }

    /// Wait until connected, or fail once reconnection is exhausted
    pub async fn wait_connected(&self) -> Result<(), ClientError> {
        let mut phase = self.phase.clone();
        loop {
            let current = *phase.borrow_and_update();
            match current {
                ConnectionPhase::Connected => return Ok(()),
                ConnectionPhase::Failed => {
                    return Err(ClientError::Exhausted {
                        attempts: self.max_retries,
                    });
                }
                _ => {}
            }
            if phase.changed().await.is_err() {
                return Err(ClientError::NotConnected);
            }
        }
    }

    /// Close the connection and stop reconnecting
    pub async fn close(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take()
            && let Err(e) = handle.await
        {
            warn!(error = %e, "Connection manager task ended abnormally");
        }
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct RunLoop {
    url: String,
    policy: ReconnectPolicy,
    machine: ConnectionStateMachine,
    handler: Arc<dyn MessageHandler>,
    phase_tx: watch::Sender<ConnectionPhase>,
    outbound_rx: mpsc::UnboundedReceiver<String>,
    cancel: CancellationToken,
}

impl RunLoop {
    fn publish(&self, phase: ConnectionPhase) {
        self.phase_tx.send_replace(phase);
        self.handler.on_phase_change(phase);
    }

    async fn handshake(&self) -> Result<WsStream, ClientError> {
        match tokio::time::timeout(self.policy.connection_timeout, connect_async(self.url.as_str()))
            .await
        {
            Ok(Ok((stream, _response))) => Ok(stream),
            Ok(Err(e)) => Err(ClientError::Transport {
                message: e.to_string(),
            }),
            Err(_) => Err(ClientError::Transport {
                message: format!(
                    "handshake timed out after {} ms",
                    self.policy.connection_timeout.as_millis()
                ),
            }),
        }
    }

    async fn run(mut self) {
        loop {
            let phase = self.machine.connect();
            self.publish(phase);
            debug!(url = %self.url, "Connecting to tracking channel");

            let outcome = tokio::select! {
                _ = self.cancel.cancelled() => return self.shut_down(),
                outcome = self.handshake() => outcome,
            };

            match outcome {
                Ok(stream) => {
                    let phase = self.machine.on_connected();
                    self.publish(phase);
                    info!(url = %self.url, "Tracking channel connected");

                    if self.pump(stream).await {
                        return self.shut_down();
                    }
                }
                Err(e) => {
                    warn!(url = %self.url, error = %e, "Tracking channel connection attempt failed");
                }
            }

            // Messages accepted for the dead transport are not replayed
            while self.outbound_rx.try_recv().is_ok() {}

            match self.machine.on_disconnected() {
                ConnectionPhase::Reconnecting { attempt, delay } => {
                    self.publish(ConnectionPhase::Reconnecting { attempt, delay });
                    info!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Reconnecting to tracking channel"
                    );

                    tokio::select! {
                        _ = self.cancel.cancelled() => return self.shut_down(),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                phase => {
                    self.publish(phase);
                    error!(
                        url = %self.url,
                        attempts = self.policy.max_retries,
                        "Giving up on tracking channel"
                    );
                    return;
                }
            }
        }
    }

    /// Shuttle frames until the transport ends. Returns true when cancelled or
    /// the manager was dropped.
    async fn pump(&mut self, stream: WsStream) -> bool {
        let (mut sink, mut source) = stream.split();

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    let _ = sink.send(Message::Close(None)).await;
                    return true;
                }
                outbound = self.outbound_rx.recv() => {
                    let Some(text) = outbound else {
                        // Owner is gone
                        let _ = sink.send(Message::Close(None)).await;
                        return true;
                    };
                    if let Err(e) = sink.send(Message::Text(text)).await {
                        warn!(error = %e, "Failed to send on tracking channel");
                        return false;
                    }
                }
                frame = source.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        dispatch(self.handler.as_ref(), &text);
                    }
                    Some(Ok(Message::Binary(data))) => match std::str::from_utf8(&data) {
                        Ok(text) => {
                            dispatch(self.handler.as_ref(), text);
                        }
                        Err(_) => warn!("Ignoring non UTF-8 binary frame"),
                    },
                    Some(Ok(Message::Close(frame))) => {
                        info!(frame = ?frame, "Tracking channel closed by server");
                        return false;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(error = %e, "Tracking channel transport error");
                        return false;
                    }
                    None => return false,
                },
            }
        }
    }

    fn shut_down(&mut self) {
        let phase = self.machine.close();
        self.publish(phase);
        debug!("Connection manager stopped");
    }
}
