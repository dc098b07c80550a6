// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//!
//! Wire protocol between the client and the text-to-SQL agent backend.
//!
//! All frames are JSON text over one duplex WebSocket connection.
//!
//! # Typical query flow
//!
//! ```text
//! Client                                Backend pipeline
//!    │                                       │
//!    │── {query} ───────────────────────────►│
//!    │                                       │  ... agent actors stream ...
//!    │◄─ message {channel, source, content} ──│  × N, channels interleaved
//!    │◄─ message {source: feedback_request} ──│  (human checkpoint)
//!    │── feedback {content, is_feedback} ────►│
//!    │◄─ message ... ─────────────────────────│  streaming resumes
//!    │◄─ final_result {result: {sql, ...}} ───│  authoritative payloads
//! ```
//!
//! The backend replays trailing portions of already-sent text; deduplication
//! happens client-side in `seeq-engine`, not here.  An `{"error": ..}` frame
//! (no `type` tag) is session-fatal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Source label marking the human-in-the-loop checkpoint.  An incremental
/// frame from this source carries a prompt for the operator, not channel
/// content.
pub const FEEDBACK_SOURCE: &str = "feedback_request";

/// Fixed reply content for a one-click approval.
pub const APPROVAL_TOKEN: &str = "approved";

/// Fixed reply content for cancelling a pending feedback request.
pub const CANCEL_TOKEN: &str = "cancelled";

// ── Channels ──────────────────────────────────────────────────────────────────

/// The fixed set of logical output channels within one query's response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelId {
    /// Query analysis / reasoning narration.
    Analysis,
    /// The generated SQL statement.
    Sql,
    /// Natural-language explanation of the generated query.
    Explanation,
    /// Result rows.
    Data,
    /// Visualization spec (chart type + config).
    Visualization,
    /// Internal trace / debug output.
    Process,
}

impl ChannelId {
    /// All channels, in display order.
    pub const ALL: [ChannelId; 6] = [
        ChannelId::Analysis,
        ChannelId::Sql,
        ChannelId::Explanation,
        ChannelId::Data,
        ChannelId::Visualization,
        ChannelId::Process,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelId::Analysis => "analysis",
            ChannelId::Sql => "sql",
            ChannelId::Explanation => "explanation",
            ChannelId::Data => "data",
            ChannelId::Visualization => "visualization",
            ChannelId::Process => "process",
        }
    }

    /// Resolve a wire channel id.  Returns `None` for unknown ids so one
    /// malformed backend actor cannot halt the session — the caller logs
    /// and drops instead.
    pub fn parse(s: &str) -> Option<ChannelId> {
        match s {
            "analysis" => Some(ChannelId::Analysis),
            "sql" => Some(ChannelId::Sql),
            "explanation" => Some(ChannelId::Explanation),
            "data" => Some(ChannelId::Data),
            "visualization" => Some(ChannelId::Visualization),
            "process" => Some(ChannelId::Process),
            _ => None,
        }
    }
}

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Inbound frames ────────────────────────────────────────────────────────────

/// One decoded incremental unit.  Immutable once decoded; appended to the
/// channel's history, never mutated.
///
/// The channel id stays a raw string here — routing resolves it against
/// [`ChannelId`] so an unknown id is a per-frame warning, not a decode error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub channel: String,
    /// Which backend actor produced the fragment.
    pub source: String,
    pub content: String,
    pub is_final: bool,
    /// Local receive timestamp, stamped at decode time.
    pub received_at: DateTime<Utc>,
}

impl Envelope {
    /// True when this envelope is a human-checkpoint prompt rather than
    /// channel content.
    pub fn is_feedback_request(&self) -> bool {
        self.source == FEEDBACK_SOURCE
    }
}

/// Authoritative payloads carried by a terminal frame.  Any subset of keys
/// may be present; an explicit `null` marks that channel not-applicable,
/// while an absent key leaves the channel in its last streaming state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FinalResult {
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Option::is_none")]
    pub sql: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Option::is_none")]
    pub explanation: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Option::is_none")]
    pub results: Option<Option<serde_json::Value>>,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Option::is_none")]
    pub visualization_type: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Option::is_none")]
    pub visualization_config: Option<Option<serde_json::Value>>,
}

/// Distinguishes an absent key (outer `None`) from an explicit JSON `null`
/// (outer `Some(None)`).  Plain `Option<Option<T>>` collapses both to `None`.
fn nullable<'de, T, D>(de: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Deserialize::deserialize(de).map(Some)
}

/// One decoded inbound frame.
#[derive(Debug, Clone)]
pub enum InboundFrame {
    /// Incremental text fragment for one channel.
    Message(Envelope),
    /// Terminal frame finalizing a subset of channels.
    FinalResult(FinalResult),
    /// Session-fatal backend error, surfaced verbatim.
    Error(String),
}

// ── Outbound frames ───────────────────────────────────────────────────────────

/// The initial frame that starts one query lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryFrame {
    pub query: String,
}

/// Operator reply to a pending feedback request.  All fields except
/// `content` are fixed by the backend contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackFrame {
    pub content: String,
    pub source: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub role: String,
    pub is_feedback: bool,
}

impl FeedbackFrame {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            source: "user".to_string(),
            kind: "text".to_string(),
            role: "user".to_string(),
            is_feedback: true,
        }
    }

    /// Fixed one-click approval reply.
    pub fn approval() -> Self {
        Self::new(APPROVAL_TOKEN)
    }

    /// Fixed cancellation reply.
    pub fn cancellation() -> Self {
        Self::new(CANCEL_TOKEN)
    }
}

/// Everything the client may send to the backend.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum OutboundFrame {
    Query(QueryFrame),
    Feedback(FeedbackFrame),
}

impl OutboundFrame {
    pub fn query(text: impl Into<String>) -> Self {
        OutboundFrame::Query(QueryFrame { query: text.into() })
    }

    /// Encode the frame as a JSON text payload for the transport.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

// ── Unit tests ────────────────────────────────────────────────────────────────
