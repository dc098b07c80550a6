// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//!
//! Feedback gate: the human-in-the-loop checkpoint embedded in the stream.
//!
//! The backend signals it is blocked on operator input by emitting an
//! envelope from the designated checkpoint source.  While pending, inbound
//! envelopes keep merging normally (the backend may still stream trace and
//! analysis output); only new query submissions are blocked, and that is the
//! consumer's responsibility.  Exactly one request may be pending per
//! session, resolved by exactly one operator action.

use seeq_wire::{FeedbackFrame, OutboundFrame};
use tracing::{debug, warn};

use crate::error::EngineError;

#[derive(Debug, Clone, PartialEq, Eq)]
enum GateState {
    Idle,
    Pending { prompt: String },
}

#[derive(Debug, Clone)]
pub struct FeedbackGate {
    state: GateState,
}

impl FeedbackGate {
    pub fn new() -> Self {
        Self {
            state: GateState::Idle,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.state, GateState::Pending { .. })
    }

    pub fn prompt(&self) -> Option<&str> {
        match &self.state {
            GateState::Pending { prompt } => Some(prompt),
            GateState::Idle => None,
        }
    }

    /// Enter `pending`.  A second raise while one request is pending is
    /// dropped with a warning — at most one may be pending per session.
    /// Returns whether the gate transitioned.
    pub fn raise(&mut self, prompt: &str) -> bool {
        if self.is_pending() {
            warn!("feedback request while one is already pending; dropped");
            return false;
        }
        self.state = GateState::Pending {
            prompt: prompt.to_string(),
        };
        true
    }

    /// Resolve with the operator's free-text reply.
    ///
    /// Returns the transcript annotation to record and the outbound frame to
    /// send.  Calling while idle is a [`EngineError::FeedbackConflict`],
    /// which callers treat as an idempotent no-op — the second invocation of
    /// a resolve handler must not send twice.
    pub fn resolve(&mut self, text: &str) -> Result<(String, OutboundFrame), EngineError> {
        self.take_pending()?;
        debug!(len = text.len(), "feedback resolved with reply");
        Ok((
            format!("— user feedback: {text} —"),
            OutboundFrame::Feedback(FeedbackFrame::new(text)),
        ))
    }

    /// Resolve with a one-click approval: fixed annotation, fixed token.
    pub fn approve(&mut self) -> Result<(String, OutboundFrame), EngineError> {
        self.take_pending()?;
        debug!("feedback approved");
        Ok((
            "— user approved —".to_string(),
            OutboundFrame::Feedback(FeedbackFrame::approval()),
        ))
    }

    /// Cancel the pending request: fixed token, no transcript annotation.
    pub fn cancel(&mut self) -> Result<OutboundFrame, EngineError> {
        self.take_pending()?;
        debug!("feedback cancelled");
        Ok(OutboundFrame::Feedback(FeedbackFrame::cancellation()))
    }

    pub fn reset(&mut self) {
        self.state = GateState::Idle;
    }

    fn take_pending(&mut self) -> Result<String, EngineError> {
        match std::mem::replace(&mut self.state, GateState::Idle) {
            GateState::Pending { prompt } => Ok(prompt),
            GateState::Idle => Err(EngineError::FeedbackConflict),
        }
    }
}

impl Default for FeedbackGate {
    fn default() -> Self {
        Self::new()
    }
}

// ── Unit tests ────────────────────────────────────────────────────────────────
