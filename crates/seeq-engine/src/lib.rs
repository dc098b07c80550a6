// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod merge;
mod channel;
mod store;
mod reconcile;
mod feedback;
mod session;
mod events;
mod error;

pub use merge::{merge, overlap, DEFAULT_OVERLAP_WINDOW};
pub use channel::{ChannelState, ReceivedEnvelope, DEFAULT_PLACEHOLDER};
pub use store::ChannelStore;
pub use reconcile::apply_final_result;
pub use feedback::FeedbackGate;
pub use session::{Session, SessionStatus};
pub use events::EngineEvent;
pub use error::EngineError;
