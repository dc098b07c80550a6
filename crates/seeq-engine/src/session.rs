// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//!
//! One query's lifecycle as an explicit reducer over the channel store.
//!
//! All state transitions happen on message-arrival order from one transport,
//! so no two frames for the same session are ever applied concurrently; the
//! merge engine's overlap detection is the only place delivery duplication
//! is absorbed.

use serde::{Deserialize, Serialize};
use seeq_wire::{InboundFrame, OutboundFrame};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::channel::DEFAULT_PLACEHOLDER;
use crate::error::EngineError;
use crate::events::EngineEvent;
use crate::feedback::FeedbackGate;
use crate::merge::DEFAULT_OVERLAP_WINDOW;
use crate::reconcile::apply_final_result;
use crate::store::ChannelStore;

/// Lifecycle state of one query session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// No query submitted yet.
    Idle,
    /// Frames are being consumed and merged.
    Running,
    /// The backend is blocked on a pending feedback request.
    AwaitingFeedback,
    /// Every channel settled; the session accepts no more frames.
    Completed,
    /// Terminal error (backend error frame, connection exhaustion, abort).
    Failed,
}

/// One query's lifecycle: channel store, feedback gate and status.
///
/// Constructed per query and discarded on completion — there is no ambient
/// "current connection" state shared across sessions.
#[derive(Debug)]
pub struct Session {
    pub id: String,
    pub query: String,
    pub status: SessionStatus,
    store: ChannelStore,
    gate: FeedbackGate,
}

impl Session {
    pub fn new(overlap_window: usize, placeholder: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            query: String::new(),
            status: SessionStatus::Idle,
            store: ChannelStore::new(overlap_window, placeholder),
            gate: FeedbackGate::new(),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_OVERLAP_WINDOW, DEFAULT_PLACEHOLDER)
    }

    pub fn store(&self) -> &ChannelStore {
        &self.store
    }

    pub fn feedback_pending(&self) -> bool {
        self.gate.is_pending()
    }

    /// Begin a new query: every channel fully resets before any new envelope
    /// applies, so no text leaks across sessions.
    pub fn start(&mut self, query: &str) -> Vec<EngineEvent> {
        self.store.reset_all();
        self.gate.reset();
        self.query = query.to_string();
        self.set_status(SessionStatus::Running)
            .into_iter()
            .collect()
    }

    /// The single reducer over decoded inbound frames.  Applied before any
    /// consumer read; returns the events the consumer should react to.
    pub fn apply(&mut self, frame: InboundFrame) -> Vec<EngineEvent> {
        if matches!(self.status, SessionStatus::Completed | SessionStatus::Failed) {
            debug!(status = ?self.status, "frame after terminal state ignored");
            return Vec::new();
        }

        let mut events = Vec::new();
        match frame {
            InboundFrame::Message(env) if env.is_feedback_request() => {
                if self.gate.raise(&env.content) {
                    events.push(EngineEvent::FeedbackRequested {
                        prompt: env.content.clone(),
                    });
                    events.extend(self.set_status(SessionStatus::AwaitingFeedback));
                }
            }
            InboundFrame::Message(env) => match self.store.apply_envelope(&env) {
                Ok(id) => events.push(EngineEvent::ChannelUpdated(id)),
                Err(e @ EngineError::UnknownChannel(_)) => {
                    warn!(channel = %env.channel, "dropping envelope: {e}");
                    events.push(EngineEvent::Notice(e.to_string()));
                }
                Err(e) => {
                    warn!("dropping envelope: {e}");
                    events.push(EngineEvent::Notice(e.to_string()));
                }
            },
            InboundFrame::FinalResult(result) => {
                for id in apply_final_result(&mut self.store, &result) {
                    events.push(EngineEvent::ChannelUpdated(id));
                }
                if self.store.all_settled() {
                    events.extend(self.set_status(SessionStatus::Completed));
                }
            }
            InboundFrame::Error(message) => {
                // Session-fatal: overrides all channel states.
                events.extend(self.set_status(SessionStatus::Failed));
                events.push(EngineEvent::SessionFailed { message });
            }
        }
        events
    }

    /// Free-text reply to the pending feedback request.  The transcript
    /// annotation lands on the `analysis` channel exactly once; the caller
    /// sends the returned frame.
    pub fn resolve_feedback(&mut self, text: &str) -> Result<(OutboundFrame, Vec<EngineEvent>), EngineError> {
        self.reject_if_terminal()?;
        let (note, frame) = self.gate.resolve(text)?;
        Ok((frame, self.after_feedback(&note)))
    }

    /// One-click approval of the pending feedback request.
    pub fn approve_feedback(&mut self) -> Result<(OutboundFrame, Vec<EngineEvent>), EngineError> {
        self.reject_if_terminal()?;
        let (note, frame) = self.gate.approve()?;
        Ok((frame, self.after_feedback(&note)))
    }

    /// Cancel the pending feedback request.  No transcript annotation.
    pub fn cancel_feedback(&mut self) -> Result<(OutboundFrame, Vec<EngineEvent>), EngineError> {
        self.reject_if_terminal()?;
        let frame = self.gate.cancel()?;
        let events = self.set_status(SessionStatus::Running).into_iter().collect();
        Ok((frame, events))
    }

    /// Operator actions after the session ended are conflicts, like frames
    /// after the terminal state: the gate may still hold a pending request
    /// when a terminal frame settles every channel, and acting on it then
    /// would annotate a finalized channel and regress the status.
    fn reject_if_terminal(&self) -> Result<(), EngineError> {
        if matches!(self.status, SessionStatus::Completed | SessionStatus::Failed) {
            debug!(status = ?self.status, "feedback action after terminal state rejected");
            return Err(EngineError::FeedbackConflict);
        }
        Ok(())
    }

    /// Local terminal failure (connection exhaustion, operator abort).
    pub fn fail(&mut self, reason: impl Into<String>) -> Vec<EngineEvent> {
        let mut events: Vec<EngineEvent> =
            self.set_status(SessionStatus::Failed).into_iter().collect();
        events.push(EngineEvent::SessionFailed {
            message: reason.into(),
        });
        events
    }

    fn after_feedback(&mut self, note: &str) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        if self
            .store
            .get_mut(seeq_wire::ChannelId::Analysis)
            .annotate(note)
        {
            events.push(EngineEvent::ChannelUpdated(seeq_wire::ChannelId::Analysis));
        }
        events.extend(self.set_status(SessionStatus::Running));
        events
    }

    fn set_status(&mut self, status: SessionStatus) -> Option<EngineEvent> {
        if self.status == status {
            return None;
        }
        debug!(from = ?self.status, to = ?status, "session status change");
        self.status = status;
        Some(EngineEvent::StatusChanged(status))
    }
}

// ── Unit tests ────────────────────────────────────────────────────────────────
