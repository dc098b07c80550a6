// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Routing miss: the envelope names a channel outside the fixed set.
    /// Logged and skipped, never fatal to the session.
    #[error("unknown channel id: {0:?}")]
    UnknownChannel(String),

    /// An operator action arrived while no feedback request was pending
    /// (or the request was already resolved).  Idempotent no-op for callers.
    #[error("no feedback request is pending")]
    FeedbackConflict,
}
