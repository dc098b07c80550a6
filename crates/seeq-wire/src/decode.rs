// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//!
//! Tolerant frame decoder.
//!
//! A malformed frame yields a [`DecodeError`] the caller logs and skips; it
//! never aborts the stream and never partially mutates channel state.  Two
//! typed shapes are recognized (`message`, `final_result`) plus the untagged
//! `{"error": ..}` shape the backend emits on fatal failures.

use chrono::Utc;
use serde::Deserialize;
use thiserror::Error;

use crate::frames::{Envelope, FinalResult, InboundFrame};

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("frame is not valid JSON: {0}")]
    Json(String),

    #[error("unrecognized frame shape: {preview}")]
    UnrecognizedShape { preview: String },
}

/// Tagged wire shapes.  `Envelope` carries a local receive timestamp, so the
/// raw shape is deserialized separately and stamped here.
#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum TypedFrame {
    Message {
        channel: String,
        source: String,
        content: String,
        #[serde(default)]
        is_final: bool,
    },
    FinalResult {
        #[serde(default)]
        result: FinalResult,
    },
}

#[derive(Deserialize)]
struct ErrorFrame {
    error: String,
}

/// Decode one raw text frame into a typed [`InboundFrame`].
pub fn decode(raw: &str) -> Result<InboundFrame, DecodeError> {
    // Reject non-JSON up front so the shape fallbacks below only ever see
    // well-formed documents.
    let value: serde_json::Value =
        serde_json::from_str(raw).map_err(|e| DecodeError::Json(e.to_string()))?;

    if let Ok(frame) = TypedFrame::deserialize(&value) {
        return Ok(match frame {
            TypedFrame::Message {
                channel,
                source,
                content,
                is_final,
            } => InboundFrame::Message(Envelope {
                channel,
                source,
                content,
                is_final,
                received_at: Utc::now(),
            }),
            TypedFrame::FinalResult { result } => InboundFrame::FinalResult(result),
        });
    }

    if let Ok(ErrorFrame { error }) = ErrorFrame::deserialize(&value) {
        return Ok(InboundFrame::Error(error));
    }

    Err(DecodeError::UnrecognizedShape {
        preview: preview(raw),
    })
}

/// First 80 chars of the offending frame, for log lines.
fn preview(raw: &str) -> String {
    let p: String = raw.chars().take(80).collect();
    if raw.chars().count() > 80 {
        format!("{p}…")
    } else {
        p
    }
}

// ── Unit tests ────────────────────────────────────────────────────────────────
