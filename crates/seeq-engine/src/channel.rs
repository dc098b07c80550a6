// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//!
//! Per-channel accumulated state.
//!
//! A channel's text is monotonically non-decreasing while streaming and
//! immutable once finalized.  Every received envelope is recorded in the
//! history even when it no longer changes the text.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use seeq_wire::{ChannelId, Envelope};

use crate::merge::merge;

/// Initial text shown on a freshly-reset channel.  Not real content: the
/// first envelope replaces it instead of appending.
pub const DEFAULT_PLACEHOLDER: &str = "working...\n\n";

/// One envelope as recorded in a channel's history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceivedEnvelope {
    pub source: String,
    pub content: String,
    pub is_final: bool,
    pub received_at: DateTime<Utc>,
}

impl From<&Envelope> for ReceivedEnvelope {
    fn from(env: &Envelope) -> Self {
        Self {
            source: env.source.clone(),
            content: env.content.clone(),
            is_final: env.is_final,
            received_at: env.received_at,
        }
    }
}

/// Accumulated state for one logical output channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelState {
    pub id: ChannelId,
    /// Reconstructed document text.
    pub text: String,
    /// Ordered record of every envelope received for this channel.
    pub history: Vec<ReceivedEnvelope>,
    pub streaming: bool,
    pub finalized: bool,
    /// Backend declared this channel carries nothing for this query.
    /// Counts toward session completion like `finalized`.
    pub not_applicable: bool,
    /// Structured final payload (result rows, visualization config).
    pub payload: Option<serde_json::Value>,
}

impl ChannelState {
    pub fn new(id: ChannelId, placeholder: &str) -> Self {
        Self {
            id,
            text: placeholder.to_string(),
            history: Vec::new(),
            streaming: false,
            finalized: false,
            not_applicable: false,
            payload: None,
        }
    }

    /// Restore the pristine post-reset state.  Must run before any envelope
    /// of a new session applies, so no text leaks across sessions.
    pub fn reset(&mut self, placeholder: &str) {
        *self = ChannelState::new(self.id, placeholder);
    }

    /// Apply one incremental envelope.
    ///
    /// The first envelope on a fresh channel replaces the placeholder
    /// outright (one-time transition, gated on the message count); later
    /// envelopes merge with overlap detection bounded by `window` chars.
    /// Envelopes arriving after finalization are recorded but leave the
    /// text untouched.
    pub fn apply(&mut self, env: &Envelope, window: usize, placeholder: &str) {
        self.history.push(ReceivedEnvelope::from(env));

        if self.finalized {
            tracing::debug!(channel = %self.id, "envelope after finalization ignored");
            return;
        }

        if self.history.len() == 1 && (self.text.is_empty() || self.text == placeholder) {
            self.text = env.content.clone();
        } else {
            self.text = merge(&self.text, &env.content, window);
        }
        self.streaming = !env.is_final;
    }

    /// Finalize with an authoritative value.  Supersedes streamed text when
    /// `text` is given; either way the channel stops streaming and becomes
    /// immutable.
    pub fn finalize(&mut self, text: Option<String>, payload: Option<serde_json::Value>) {
        if let Some(t) = text {
            self.text = t;
        }
        if payload.is_some() {
            self.payload = payload;
        }
        self.finalized = true;
        self.streaming = false;
    }

    /// Mark the channel as carrying nothing for this query.
    pub fn mark_not_applicable(&mut self) {
        self.not_applicable = true;
        self.finalized = true;
        self.streaming = false;
        self.text.clear();
    }

    /// True once the channel no longer blocks session completion.
    pub fn settled(&self) -> bool {
        self.finalized || self.not_applicable
    }

    /// Append a visibly delimited annotation (feedback transcript separator).
    ///
    /// Guarded by a containment check against the literal annotation text so
    /// a repeated resolve never inserts it twice, and so the merge engine
    /// never reprocesses the same interjection.  A finalized channel is
    /// immutable and refuses the annotation.  Returns whether the text
    /// changed.
    pub fn annotate(&mut self, note: &str) -> bool {
        if self.finalized || self.text.contains(note) {
            return false;
        }
        if !self.text.is_empty() && !self.text.ends_with('\n') {
            self.text.push('\n');
        }
        self.text.push_str(note);
        self.text.push('\n');
        true
    }
}

// ── Unit tests ────────────────────────────────────────────────────────────────
