// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//!
//! Channel store: the fixed set of per-channel states for one session.
//!
//! Owned exclusively by one [`crate::Session`] at a time.  Reads hand out
//! cloned snapshots, so a consumer never observes a half-applied envelope.

use std::collections::BTreeMap;

use seeq_wire::{ChannelId, Envelope};

use crate::channel::ChannelState;
use crate::error::EngineError;

#[derive(Debug, Clone)]
pub struct ChannelStore {
    channels: BTreeMap<ChannelId, ChannelState>,
    /// Overlap-detection window in chars, tunable per deployment.
    window: usize,
    placeholder: String,
}

impl ChannelStore {
    pub fn new(window: usize, placeholder: impl Into<String>) -> Self {
        let placeholder = placeholder.into();
        let channels = ChannelId::ALL
            .iter()
            .map(|&id| (id, ChannelState::new(id, &placeholder)))
            .collect();
        Self {
            channels,
            window,
            placeholder,
        }
    }

    /// Route one incremental envelope to its channel.
    ///
    /// Unknown channel ids are reported but non-fatal: the caller logs the
    /// miss and the session continues, so one malformed backend actor cannot
    /// halt the stream.
    pub fn apply_envelope(&mut self, env: &Envelope) -> Result<ChannelId, EngineError> {
        let id = ChannelId::parse(&env.channel)
            .ok_or_else(|| EngineError::UnknownChannel(env.channel.clone()))?;
        // Entry always exists: the map is seeded with the full fixed set.
        if let Some(ch) = self.channels.get_mut(&id) {
            ch.apply(env, self.window, &self.placeholder);
        }
        Ok(id)
    }

    pub fn get(&self, id: ChannelId) -> &ChannelState {
        &self.channels[&id]
    }

    pub fn get_mut(&mut self, id: ChannelId) -> &mut ChannelState {
        self.channels.get_mut(&id).unwrap_or_else(|| {
            // Seeded at construction; a miss is a programming error.
            unreachable!("channel store missing fixed channel")
        })
    }

    /// Snapshot-consistent copy of one channel.
    pub fn snapshot(&self, id: ChannelId) -> ChannelState {
        self.channels[&id].clone()
    }

    /// All channels in display order.
    pub fn snapshots(&self) -> Vec<ChannelState> {
        self.channels.values().cloned().collect()
    }

    /// True once every channel is finalized or marked not-applicable.
    pub fn all_settled(&self) -> bool {
        self.channels.values().all(|ch| ch.settled())
    }

    /// Full reset before a new session, preventing cross-session leakage of
    /// accumulated text.
    pub fn reset_all(&mut self) {
        for ch in self.channels.values_mut() {
            ch.reset(&self.placeholder);
        }
    }

    pub fn window(&self) -> usize {
        self.window
    }
}

impl Default for ChannelStore {
    fn default() -> Self {
        Self::new(
            crate::merge::DEFAULT_OVERLAP_WINDOW,
            crate::channel::DEFAULT_PLACEHOLDER,
        )
    }
}

// ── Unit tests ────────────────────────────────────────────────────────────────
