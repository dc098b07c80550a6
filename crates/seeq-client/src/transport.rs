// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Transport adapter: one persistent duplex WebSocket to the backend.
//!
//! The connection lives in a spawned actor task driven by
//! [`TransportCommand`]s and reporting [`TransportEvent`]s, so the session
//! controller (and tests) talk to it purely through channels.
//!
//! Connection policy:
//! - the actor stays disconnected until the first `Connect` or `Send`;
//! - payloads sent while disconnected queue and replay once the socket opens,
//!   so the initial query frame never races connection establishment;
//! - each connect sequence makes `max_attempts` tries with delays of
//!   `base * factor^attempt`; exhaustion emits `Failed` and ends the task;
//! - an abnormal close (anything the caller did not request) reconnects with
//!   a fresh attempt budget; a requested `Close` never reconnects.

use std::collections::VecDeque;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use seeq_config::{BackendConfig, TransportConfig};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{client::IntoClientRequest, protocol::Message as WsMessage},
    MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, info, warn};

use crate::error::TransportError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug)]
pub enum TransportCommand {
    /// Establish the connection (idempotent once connected).
    Connect,
    /// Send one text frame; queued while disconnected.
    Send(String),
    /// Close without reconnection.
    Close,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// The socket is open; queued payloads have been replayed.
    Open,
    /// One raw inbound text frame.
    Frame(String),
    /// The socket closed.  `requested` distinguishes a caller-initiated
    /// close (no reconnect) from an abnormal one (reconnect in progress).
    Closed { requested: bool },
    /// Terminal transport failure; no further events will follow.
    Failed(String),
}

/// Cheap cloneable handle to the transport actor.
#[derive(Debug, Clone)]
pub struct TransportHandle {
    cmd_tx: mpsc::Sender<TransportCommand>,
}

impl TransportHandle {
    /// Wrap an existing command channel.  Used by tests and alternate
    /// transport implementations; production code gets a handle from
    /// [`spawn_transport`].
    pub fn from_channel(cmd_tx: mpsc::Sender<TransportCommand>) -> Self {
        Self { cmd_tx }
    }

    pub async fn connect(&self) -> Result<(), TransportError> {
        self.command(TransportCommand::Connect).await
    }

    pub async fn send(&self, payload: String) -> Result<(), TransportError> {
        self.command(TransportCommand::Send(payload)).await
    }

    pub async fn close(&self) -> Result<(), TransportError> {
        self.command(TransportCommand::Close).await
    }

    async fn command(&self, cmd: TransportCommand) -> Result<(), TransportError> {
        self.cmd_tx
            .send(cmd)
            .await
            .map_err(|_| TransportError::NotConnected)
    }
}

/// Spawn the websocket actor.  Returns the command handle and the event
/// stream the controller consumes.
pub fn spawn_transport(
    backend: BackendConfig,
    opts: TransportConfig,
) -> (TransportHandle, mpsc::Receiver<TransportEvent>) {
    let (cmd_tx, cmd_rx) = mpsc::channel(64);
    let (event_tx, event_rx) = mpsc::channel(256);
    tokio::spawn(run_transport(backend, opts, cmd_rx, event_tx));
    (TransportHandle::from_channel(cmd_tx), event_rx)
}

/// Delay before retry `attempt` (0-based): `base * factor^attempt`.
pub(crate) fn backoff_delay(opts: &TransportConfig, attempt: u32) -> Duration {
    let millis = opts.base_delay_ms as f64 * opts.backoff_factor.powi(attempt as i32);
    Duration::from_millis(millis as u64)
}

async fn run_transport(
    backend: BackendConfig,
    opts: TransportConfig,
    mut cmd_rx: mpsc::Receiver<TransportCommand>,
    event_tx: mpsc::Sender<TransportEvent>,
) {
    let mut pending: VecDeque<String> = VecDeque::new();

    // Disconnected until something asks for the connection.
    match cmd_rx.recv().await {
        None => return,
        Some(TransportCommand::Close) => {
            let _ = event_tx
                .send(TransportEvent::Closed { requested: true })
                .await;
            return;
        }
        Some(TransportCommand::Connect) => {}
        Some(TransportCommand::Send(p)) => pending.push_back(p),
    }

    'outage: loop {
        let mut ws = match connect_with_backoff(&backend, &opts).await {
            Ok(ws) => ws,
            Err(e) => {
                let _ = event_tx.send(TransportEvent::Failed(e.to_string())).await;
                return;
            }
        };
        let _ = event_tx.send(TransportEvent::Open).await;

        // Replay payloads queued while disconnected, oldest first.
        while let Some(p) = pending.pop_front() {
            if let Err(e) = ws.send(WsMessage::Text(p.clone())).await {
                warn!("send during replay failed: {e}");
                pending.push_front(p);
                let _ = event_tx
                    .send(TransportEvent::Closed { requested: false })
                    .await;
                continue 'outage;
            }
        }

        match drive(&mut ws, &mut cmd_rx, &event_tx, &mut pending).await {
            Driven::UserClosed => {
                let _ = ws.close(None).await;
                let _ = event_tx
                    .send(TransportEvent::Closed { requested: true })
                    .await;
                return;
            }
            Driven::CommandChannelGone => {
                let _ = ws.close(None).await;
                return;
            }
            Driven::Abnormal => {
                info!("connection lost; scheduling reconnect");
                let _ = event_tx
                    .send(TransportEvent::Closed { requested: false })
                    .await;
            }
        }
    }
}

enum Driven {
    UserClosed,
    CommandChannelGone,
    Abnormal,
}

/// Pump one open socket until it closes or the caller asks to stop.
async fn drive(
    ws: &mut WsStream,
    cmd_rx: &mut mpsc::Receiver<TransportCommand>,
    event_tx: &mpsc::Sender<TransportEvent>,
    pending: &mut VecDeque<String>,
) -> Driven {
    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => match cmd {
                None => return Driven::CommandChannelGone,
                Some(TransportCommand::Close) => return Driven::UserClosed,
                Some(TransportCommand::Connect) => {} // already connected
                Some(TransportCommand::Send(p)) => {
                    if let Err(e) = ws.send(WsMessage::Text(p.clone())).await {
                        warn!("send failed: {e}");
                        // Re-queue so the payload survives the reconnect.
                        pending.push_back(p);
                        return Driven::Abnormal;
                    }
                }
            },
            msg = ws.next() => match msg {
                Some(Ok(WsMessage::Text(text))) => {
                    let _ = event_tx.send(TransportEvent::Frame(text)).await;
                }
                Some(Ok(WsMessage::Ping(data))) => {
                    if ws.send(WsMessage::Pong(data)).await.is_err() {
                        return Driven::Abnormal;
                    }
                }
                Some(Ok(WsMessage::Close(_))) | None => return Driven::Abnormal,
                Some(Ok(_)) => {} // binary frames ignored
                Some(Err(e)) => {
                    debug!("WebSocket recv error: {e}");
                    return Driven::Abnormal;
                }
            }
        }
    }
}

/// One connect sequence: `max_attempts` tries with exponential backoff.
async fn connect_with_backoff(
    backend: &BackendConfig,
    opts: &TransportConfig,
) -> Result<WsStream, TransportError> {
    for attempt in 0..opts.max_attempts {
        if attempt > 0 {
            let delay = backoff_delay(opts, attempt - 1);
            debug!(attempt, ?delay, "waiting before reconnect");
            tokio::time::sleep(delay).await;
        }
        match connect_once(backend).await {
            Ok(ws) => {
                info!(url = %backend.url, "connected to backend");
                return Ok(ws);
            }
            Err(e) => warn!(attempt, "connect failed: {e}"),
        }
    }
    Err(TransportError::ConnectionLost {
        attempts: opts.max_attempts,
    })
}

async fn connect_once(backend: &BackendConfig) -> anyhow::Result<WsStream> {
    let mut request = backend
        .url
        .as_str()
        .into_client_request()
        .map_err(|e| TransportError::BadUrl(e.to_string()))?;

    // Bearer token rides the upgrade handshake, like any other HTTP request.
    if let Some(token) = &backend.token {
        request.headers_mut().insert(
            "Authorization",
            format!("Bearer {token}")
                .parse()
                .map_err(|_| TransportError::BadUrl("invalid token header value".into()))?,
        );
    }

    let (stream, response) = connect_async(request).await?;
    debug!(status = %response.status(), "WebSocket handshake complete");
    Ok(stream)
}

// ── Unit tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn opts(base_ms: u64, factor: f64, attempts: u32) -> TransportConfig {
        TransportConfig {
            base_delay_ms: base_ms,
            backoff_factor: factor,
            max_attempts: attempts,
        }
    }

    #[test]
    fn backoff_delays_grow_exponentially() {
        let o = opts(500, 2.0, 5);
        assert_eq!(backoff_delay(&o, 0), Duration::from_millis(500));
        assert_eq!(backoff_delay(&o, 1), Duration::from_millis(1000));
        assert_eq!(backoff_delay(&o, 3), Duration::from_millis(4000));
    }

    #[test]
    fn backoff_factor_one_is_constant() {
        let o = opts(250, 1.0, 3);
        assert_eq!(backoff_delay(&o, 0), backoff_delay(&o, 2));
    }

    #[tokio::test]
    async fn connect_budget_exhaustion_is_connection_lost() {
        // Nothing listens on this port; every attempt fails fast.
        let backend = BackendConfig {
            url: "ws://127.0.0.1:1/ws".to_string(),
            token: None,
        };
        let o = opts(1, 1.0, 2);
        let err = connect_with_backoff(&backend, &o).await.unwrap_err();
        assert!(matches!(err, TransportError::ConnectionLost { attempts: 2 }));
    }

    #[tokio::test]
    async fn invalid_url_is_rejected_before_any_attempt() {
        let backend = BackendConfig {
            url: "not a url".to_string(),
            token: None,
        };
        let err = connect_once(&backend).await.unwrap_err();
        assert!(err.downcast_ref::<TransportError>().is_some());
    }

    #[tokio::test]
    async fn close_before_connect_reports_requested_close() {
        let backend = BackendConfig {
            url: "ws://127.0.0.1:1/ws".to_string(),
            token: None,
        };
        let (handle, mut events) = spawn_transport(backend, opts(1, 1.0, 1));
        handle.close().await.unwrap();
        assert_eq!(
            events.recv().await,
            Some(TransportEvent::Closed { requested: true })
        );
    }

    #[tokio::test]
    async fn send_with_dead_actor_is_not_connected() {
        let (cmd_tx, cmd_rx) = mpsc::channel(1);
        drop(cmd_rx);
        let handle = TransportHandle::from_channel(cmd_tx);
        assert!(matches!(
            handle.send("x".into()).await,
            Err(TransportError::NotConnected)
        ));
    }
}
