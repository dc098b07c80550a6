// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//!
//! Finalization reconciler: merges a terminal frame's authoritative payloads
//! over whatever partial text streaming had accumulated.
//!
//! The terminal frame keys map onto channels as follows:
//!
//! | result key              | channel         | value                     |
//! |-------------------------|-----------------|---------------------------|
//! | `sql`                   | `sql`           | full query text           |
//! | `explanation`           | `explanation`   | full explanation text     |
//! | `results`               | `data`          | row set (structured)      |
//! | `visualization_type`    | `visualization` | chart kind (text)         |
//! | `visualization_config`  | `visualization` | chart spec (structured)   |
//!
//! An explicit `null` marks the channel not-applicable.  Absent keys leave
//! the channel in its last streaming state; the session only completes once
//! every channel has settled.

use seeq_wire::{ChannelId, FinalResult};

use crate::store::ChannelStore;

/// Apply one terminal frame.  Returns the channels whose state changed.
pub fn apply_final_result(store: &mut ChannelStore, result: &FinalResult) -> Vec<ChannelId> {
    let mut touched = Vec::new();

    if let Some(value) = &result.sql {
        finalize_text(store, ChannelId::Sql, value.clone(), &mut touched);
    }
    if let Some(value) = &result.explanation {
        finalize_text(store, ChannelId::Explanation, value.clone(), &mut touched);
    }
    if let Some(value) = &result.results {
        match value {
            Some(rows) => {
                let text = serde_json::to_string_pretty(rows).unwrap_or_default();
                store
                    .get_mut(ChannelId::Data)
                    .finalize(Some(text), Some(rows.clone()));
            }
            None => store.get_mut(ChannelId::Data).mark_not_applicable(),
        }
        touched.push(ChannelId::Data);
    }

    let viz_type = result.visualization_type.clone();
    let viz_config = result.visualization_config.clone();
    if viz_type.is_some() || viz_config.is_some() {
        let kind = viz_type.clone().flatten();
        let config = viz_config.flatten();
        if kind.is_none() && config.is_none() {
            // Both keys present but null: no chart for this query.
            store.get_mut(ChannelId::Visualization).mark_not_applicable();
        } else {
            store.get_mut(ChannelId::Visualization).finalize(kind, config);
        }
        touched.push(ChannelId::Visualization);
    }

    // Trace-like channels carry no entry in the terminal payload.  Once a
    // terminal frame arrives, any channel that already stopped streaming is
    // settled in place; channels still streaming stay open, anticipating
    // further completions.
    for id in ChannelId::ALL {
        let ch = store.get_mut(id);
        if !ch.settled() && !ch.streaming && !ch.history.is_empty() {
            ch.finalize(None, None);
            touched.push(id);
        }
    }

    touched
}

fn finalize_text(
    store: &mut ChannelStore,
    id: ChannelId,
    value: Option<String>,
    touched: &mut Vec<ChannelId>,
) {
    match value {
        Some(text) => store.get_mut(id).finalize(Some(text), None),
        None => store.get_mut(id).mark_not_applicable(),
    }
    touched.push(id);
}

// ── Unit tests ────────────────────────────────────────────────────────────────
