// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Session controller: one query's lifecycle end-to-end.
//!
//! Owns the engine session and the transport handle, decodes inbound frames,
//! applies them through the reducer and forwards engine events to whatever
//! front-end is listening.  Operator actions arrive on a command channel,
//! mirroring the request/event seam the rest of the workspace uses.

use seeq_config::EngineConfig;
use seeq_engine::{ChannelState, EngineEvent, Session, SessionStatus};
use seeq_wire::{decode, OutboundFrame};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::transport::{TransportEvent, TransportHandle};

/// Operator input forwarded from the front-end.
#[derive(Debug)]
pub enum OperatorAction {
    /// Free-text reply to the pending feedback request.
    Reply(String),
    /// One-click approval of the pending feedback request.
    Approve,
    /// Cancel the pending feedback request (streaming continues).
    Cancel,
    /// Tear the session down: close the transport without reconnection and
    /// mark the session failed with a cancellation reason.
    Abort,
}

/// Final state handed back to the caller once the run loop ends.
#[derive(Debug)]
pub struct SessionOutcome {
    pub session_id: String,
    pub status: SessionStatus,
    /// Snapshot of every channel in display order.
    pub channels: Vec<ChannelState>,
}

pub struct SessionController {
    session: Session,
    transport: TransportHandle,
    transport_rx: mpsc::Receiver<TransportEvent>,
    actions_rx: mpsc::Receiver<OperatorAction>,
    events_tx: mpsc::Sender<EngineEvent>,
}

impl SessionController {
    pub fn new(
        engine: &EngineConfig,
        transport: TransportHandle,
        transport_rx: mpsc::Receiver<TransportEvent>,
        actions_rx: mpsc::Receiver<OperatorAction>,
        events_tx: mpsc::Sender<EngineEvent>,
    ) -> Self {
        Self {
            session: Session::new(engine.overlap_window, &engine.placeholder),
            transport,
            transport_rx,
            actions_rx,
            events_tx,
        }
    }

    /// Run one query to a terminal state.
    ///
    /// The initial query frame is handed to the transport immediately; the
    /// transport queues it until the socket opens, so the send never races
    /// connection establishment.
    pub async fn run(mut self, query: &str) -> anyhow::Result<SessionOutcome> {
        info!(session = %self.session.id, "starting query session");
        let events = self.session.start(query);
        self.forward(events).await;

        self.transport.connect().await?;
        self.transport
            .send(OutboundFrame::query(query).encode()?)
            .await?;

        let mut actions_open = true;
        loop {
            tokio::select! {
                ev = self.transport_rx.recv() => {
                    if self.on_transport_event(ev).await {
                        break;
                    }
                }
                act = self.actions_rx.recv(), if actions_open => {
                    match act {
                        None => actions_open = false,
                        Some(action) => {
                            if self.on_action(action).await {
                                break;
                            }
                        }
                    }
                }
            }
        }

        Ok(self.outcome())
    }

    /// Returns true when the run loop should end.
    async fn on_transport_event(&mut self, ev: Option<TransportEvent>) -> bool {
        match ev {
            Some(TransportEvent::Open) => {
                debug!("transport open");
                false
            }
            Some(TransportEvent::Frame(raw)) => self.on_frame(&raw).await,
            Some(TransportEvent::Closed { requested: false }) => {
                let events = vec![EngineEvent::Notice(
                    "connection lost; reconnecting".to_string(),
                )];
                self.forward(events).await;
                false
            }
            Some(TransportEvent::Closed { requested: true }) => true,
            Some(TransportEvent::Failed(message)) => {
                let events = self.session.fail(message);
                self.forward(events).await;
                true
            }
            // The transport task is gone without a terminal event.
            None => {
                let events = self.session.fail("transport terminated unexpectedly");
                self.forward(events).await;
                true
            }
        }
    }

    async fn on_frame(&mut self, raw: &str) -> bool {
        let frame = match decode(raw) {
            Ok(f) => f,
            Err(e) => {
                // Malformed frames are skipped, never fatal.
                warn!("skipping frame: {e}");
                self.forward(vec![EngineEvent::Notice(format!("skipped frame: {e}"))])
                    .await;
                return false;
            }
        };
        let events = self.session.apply(frame);
        self.forward(events).await;
        self.terminal()
    }

    /// Returns true when the run loop should end.
    async fn on_action(&mut self, action: OperatorAction) -> bool {
        let resolved = match action {
            OperatorAction::Reply(text) => self.session.resolve_feedback(&text),
            OperatorAction::Approve => self.session.approve_feedback(),
            OperatorAction::Cancel => self.session.cancel_feedback(),
            OperatorAction::Abort => {
                info!(session = %self.session.id, "session aborted by operator");
                let _ = self.transport.close().await;
                let events = self.session.fail("cancelled by operator");
                self.forward(events).await;
                return true;
            }
        };

        match resolved {
            Ok((frame, events)) => {
                self.forward(events).await;
                match frame.encode() {
                    Ok(payload) => {
                        if let Err(e) = self.transport.send(payload).await {
                            let events = self.session.fail(e.to_string());
                            self.forward(events).await;
                            return true;
                        }
                    }
                    Err(e) => warn!("encoding feedback frame failed: {e}"),
                }
                false
            }
            // Second action for the same request: idempotent no-op.
            Err(e) => {
                debug!("feedback action ignored: {e}");
                false
            }
        }
    }

    async fn forward(&self, events: Vec<EngineEvent>) {
        for ev in events {
            let _ = self.events_tx.send(ev).await;
        }
    }

    fn terminal(&self) -> bool {
        matches!(
            self.session.status,
            SessionStatus::Completed | SessionStatus::Failed
        )
    }

    fn outcome(&self) -> SessionOutcome {
        SessionOutcome {
            session_id: self.session.id.clone(),
            status: self.session.status,
            channels: self.session.store().snapshots(),
        }
    }
}

// ── Unit tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::TransportCommand;
    use seeq_wire::ChannelId;
    use tokio::sync::mpsc;

    struct Harness {
        cmd_rx: mpsc::Receiver<TransportCommand>,
        transport_tx: mpsc::Sender<TransportEvent>,
        actions_tx: mpsc::Sender<OperatorAction>,
        events_rx: mpsc::Receiver<EngineEvent>,
        run: tokio::task::JoinHandle<anyhow::Result<SessionOutcome>>,
    }

    /// Controller wired to loopback channels instead of a live socket.
    fn harness(query: &str) -> Harness {
        let (cmd_tx, cmd_rx) = mpsc::channel(64);
        let (transport_tx, transport_rx) = mpsc::channel(64);
        let (actions_tx, actions_rx) = mpsc::channel(16);
        let (events_tx, events_rx) = mpsc::channel(256);
        let controller = SessionController::new(
            &seeq_config::EngineConfig::default(),
            TransportHandle::from_channel(cmd_tx),
            transport_rx,
            actions_rx,
            events_tx,
        );
        let query = query.to_string();
        let run = tokio::spawn(async move { controller.run(&query).await });
        Harness {
            cmd_rx,
            transport_tx,
            actions_tx,
            events_rx,
            run,
        }
    }

    async fn next_send(h: &mut Harness) -> String {
        loop {
            match h.cmd_rx.recv().await.expect("command channel closed") {
                TransportCommand::Send(p) => return p,
                TransportCommand::Connect | TransportCommand::Close => {}
            }
        }
    }

    fn msg(channel: &str, source: &str, content: &str, is_final: bool) -> TransportEvent {
        TransportEvent::Frame(
            serde_json::json!({
                "type": "message",
                "channel": channel,
                "source": source,
                "content": content,
                "is_final": is_final,
            })
            .to_string(),
        )
    }

    #[tokio::test]
    async fn initial_query_is_queued_before_open() {
        let mut h = harness("total sales per region");
        // Connect must be issued first, then the query payload — regardless
        // of the socket not being open yet.
        match h.cmd_rx.recv().await.unwrap() {
            TransportCommand::Connect => {}
            other => panic!("expected Connect first, got {other:?}"),
        }
        let payload = next_send(&mut h).await;
        let json: serde_json::Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(json["query"], "total sales per region");
        h.run.abort();
    }

    #[tokio::test]
    async fn completes_when_terminal_frame_settles_all_channels() {
        let mut h = harness("q");
        h.transport_tx.send(TransportEvent::Open).await.unwrap();
        h.transport_tx
            .send(msg("analysis", "planner", "Step 1: parse query", true))
            .await
            .unwrap();
        h.transport_tx
            .send(msg("process", "trace", "done", true))
            .await
            .unwrap();
        h.transport_tx
            .send(TransportEvent::Frame(
                serde_json::json!({
                    "type": "final_result",
                    "result": {
                        "sql": "SELECT region, SUM(total) FROM sales GROUP BY region",
                        "explanation": "sums sales per region",
                        "results": [{"region": "north", "sum": 10}],
                        "visualization_type": null,
                        "visualization_config": null,
                    }
                })
                .to_string(),
            ))
            .await
            .unwrap();

        let outcome = h.run.await.unwrap().unwrap();
        assert_eq!(outcome.status, SessionStatus::Completed);
        let sql = outcome
            .channels
            .iter()
            .find(|c| c.id == ChannelId::Sql)
            .unwrap();
        assert!(sql.finalized);
        assert!(sql.text.starts_with("SELECT region"));
    }

    #[tokio::test]
    async fn overlapping_resend_is_absorbed_end_to_end() {
        let mut h = harness("q");
        h.transport_tx.send(TransportEvent::Open).await.unwrap();
        h.transport_tx
            .send(msg("analysis", "planner", "Step 1: parse query", false))
            .await
            .unwrap();
        h.transport_tx
            .send(msg("analysis", "planner", "query\n\nStep 2: build plan", false))
            .await
            .unwrap();
        h.transport_tx
            .send(TransportEvent::Frame(r#"{"error":"stop here"}"#.to_string()))
            .await
            .unwrap();

        let outcome = h.run.await.unwrap().unwrap();
        let analysis = outcome
            .channels
            .iter()
            .find(|c| c.id == ChannelId::Analysis)
            .unwrap();
        assert_eq!(analysis.text, "Step 1: parse query\n\nStep 2: build plan");
    }

    #[tokio::test]
    async fn feedback_reply_is_sent_and_annotated() {
        let mut h = harness("q");
        h.transport_tx.send(TransportEvent::Open).await.unwrap();
        let _query = next_send(&mut h).await;

        h.transport_tx
            .send(msg("analysis", "planner", "considering a join", false))
            .await
            .unwrap();
        h.transport_tx
            .send(msg("analysis", "feedback_request", "Proceed with this join?", false))
            .await
            .unwrap();

        // Wait for the prompt to surface before acting on it.
        loop {
            match h.events_rx.recv().await.unwrap() {
                EngineEvent::FeedbackRequested { prompt } => {
                    assert_eq!(prompt, "Proceed with this join?");
                    break;
                }
                _ => {}
            }
        }

        h.actions_tx
            .send(OperatorAction::Reply("use fiscal year".into()))
            .await
            .unwrap();
        let payload = next_send(&mut h).await;
        let json: serde_json::Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(json["content"], "use fiscal year");
        assert_eq!(json["is_feedback"], true);

        // A duplicate action must not send a second frame.
        h.actions_tx.send(OperatorAction::Approve).await.unwrap();
        h.transport_tx
            .send(TransportEvent::Frame(r#"{"error":"stop"}"#.to_string()))
            .await
            .unwrap();
        let outcome = h.run.await.unwrap().unwrap();

        let analysis = outcome
            .channels
            .iter()
            .find(|c| c.id == ChannelId::Analysis)
            .unwrap();
        assert_eq!(analysis.text.matches("user feedback").count(), 1);
        assert!(!analysis.text.contains("user approved"));
    }

    #[tokio::test]
    async fn abort_closes_transport_and_fails_session() {
        let mut h = harness("q");
        h.transport_tx.send(TransportEvent::Open).await.unwrap();
        let _query = next_send(&mut h).await;

        h.actions_tx.send(OperatorAction::Abort).await.unwrap();
        // The controller must ask the transport to close.
        loop {
            match h.cmd_rx.recv().await.unwrap() {
                TransportCommand::Close => break,
                _ => {}
            }
        }
        let outcome = h.run.await.unwrap().unwrap();
        assert_eq!(outcome.status, SessionStatus::Failed);
    }

    #[tokio::test]
    async fn backend_error_frame_fails_session_verbatim() {
        let mut h = harness("q");
        h.transport_tx.send(TransportEvent::Open).await.unwrap();
        h.transport_tx
            .send(TransportEvent::Frame(
                r#"{"error":"table not found: salez"}"#.to_string(),
            ))
            .await
            .unwrap();
        let outcome = h.run.await.unwrap().unwrap();
        assert_eq!(outcome.status, SessionStatus::Failed);

        // The verbatim message must have been surfaced on the event stream.
        let mut saw = false;
        while let Ok(ev) = h.events_rx.try_recv() {
            if let EngineEvent::SessionFailed { message } = ev {
                assert_eq!(message, "table not found: salez");
                saw = true;
            }
        }
        assert!(saw);
    }

    #[tokio::test]
    async fn transport_failure_fails_session() {
        let mut h = harness("q");
        h.transport_tx
            .send(TransportEvent::Failed(
                "connection lost after 5 connect attempts".to_string(),
            ))
            .await
            .unwrap();
        let outcome = h.run.await.unwrap().unwrap();
        assert_eq!(outcome.status, SessionStatus::Failed);
    }

    #[tokio::test]
    async fn malformed_frames_are_skipped_not_fatal() {
        let mut h = harness("q");
        h.transport_tx.send(TransportEvent::Open).await.unwrap();
        h.transport_tx
            .send(TransportEvent::Frame("not json at all".to_string()))
            .await
            .unwrap();
        h.transport_tx
            .send(msg("sql", "generator", "SELECT 1", false))
            .await
            .unwrap();
        h.transport_tx
            .send(TransportEvent::Frame(r#"{"error":"stop"}"#.to_string()))
            .await
            .unwrap();
        let outcome = h.run.await.unwrap().unwrap();
        let sql = outcome
            .channels
            .iter()
            .find(|c| c.id == ChannelId::Sql)
            .unwrap();
        assert_eq!(sql.text, "SELECT 1");
    }
}
