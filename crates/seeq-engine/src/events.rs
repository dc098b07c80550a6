// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use seeq_wire::ChannelId;

use crate::session::SessionStatus;

/// Events emitted by the session reducer.
/// Consumers (the CLI runner, a UI layer) subscribe to these to drive their
/// output; the engine itself never renders or scrolls anything.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// A channel's accumulated state changed; read a fresh snapshot.
    ChannelUpdated(ChannelId),
    /// The backend is blocked on operator input.
    FeedbackRequested { prompt: String },
    /// The session lifecycle state changed.
    StatusChanged(SessionStatus),
    /// A transient, dismissible notice (skipped frame, routing miss).
    Notice(String),
    /// The session failed; `message` carries the backend error verbatim or
    /// the local cancellation reason.
    SessionFailed { message: String },
}
