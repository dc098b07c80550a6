// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//!
//! Overlap-absorbing text merge.
//!
//! The backend delivers at-least-once without sequence numbers, and its
//! dominant replay pattern is resending a trailing portion of already-sent
//! text together with the new text.  `merge` scans the tail of the existing
//! document against the head of the incoming fragment, bounded by a window,
//! and appends only the non-duplicated suffix.
//!
//! This is a pure function so it is unit-testable without any transport or
//! rendering harness.

/// Maximum suffix/prefix length (in chars) considered when deduplicating.
///
/// Chosen empirically against observed backend resend sizes; tunable via
/// `engine.overlap_window` in the config.
pub const DEFAULT_OVERLAP_WINDOW: usize = 100;

/// Length in **bytes** of the longest prefix of `incoming` that equals a
/// suffix of `existing`, considering at most `window` chars of each.
pub fn overlap(existing: &str, incoming: &str, window: usize) -> usize {
    if window == 0 || existing.is_empty() || incoming.is_empty() {
        return 0;
    }

    // Byte offset where the last `window` chars of `existing` begin.
    let tail_start = existing
        .char_indices()
        .rev()
        .take(window)
        .last()
        .map(|(i, _)| i)
        .unwrap_or(0);
    let tail = &existing[tail_start..];

    // Longest suffix first: i == 0 is the whole tail.
    for (i, _) in tail.char_indices() {
        let suffix = &tail[i..];
        if incoming.starts_with(suffix) {
            return suffix.len();
        }
    }
    0
}

/// `existing` plus the non-overlapping remainder of `incoming`.
pub fn merge(existing: &str, incoming: &str, window: usize) -> String {
    let k = overlap(existing, incoming, window);
    let mut out = String::with_capacity(existing.len() + incoming.len() - k);
    out.push_str(existing);
    out.push_str(&incoming[k..]);
    out
}

// ── Unit tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const W: usize = DEFAULT_OVERLAP_WINDOW;

    // ── Idempotent re-send absorption ─────────────────────────────────────────

    /// For every k up to the window, a resend of the last k chars plus new
    /// text merges to exactly existing + new text.
    #[test]
    fn resent_suffix_is_absorbed_for_every_k() {
        let existing = "abcdefghijklmnopqrstuvwxyz0123456789".repeat(4);
        let new_text = "NEW TAIL";
        for k in 1..=W.min(existing.len()) {
            let resent = &existing[existing.len() - k..];
            let incoming = format!("{resent}{new_text}");
            let merged = merge(&existing, &incoming, W);
            assert_eq!(merged, format!("{existing}{new_text}"), "k = {k}");
        }
    }

    #[test]
    fn full_duplicate_within_window_appends_nothing() {
        let existing = "short document";
        let merged = merge(existing, existing, W);
        assert_eq!(merged, existing);
    }

    // ── No detectable overlap ─────────────────────────────────────────────────

    #[test]
    fn disjoint_fragments_concatenate() {
        assert_eq!(merge("SELECT id", " FROM users", W), "SELECT id FROM users");
    }

    #[test]
    fn empty_incoming_is_identity() {
        assert_eq!(merge("doc", "", W), "doc");
    }

    #[test]
    fn empty_existing_takes_incoming() {
        assert_eq!(merge("", "fresh", W), "fresh");
    }

    // ── The worked example from the channel feeds ─────────────────────────────

    /// A realistic resend: the backend re-sends the trailing "query" of
    /// "Step 1: parse query" together with the next step.  The 5-char
    /// overlap must win over the shorter 1-char ("y") candidate.
    #[test]
    fn longest_overlap_wins_over_shorter_candidates() {
        let existing = "Step 1: parse query";
        let incoming = "query\n\nStep 2: build plan";
        let merged = merge(existing, incoming, W);
        assert_eq!(merged, "Step 1: parse query\n\nStep 2: build plan");
    }

    // ── Window bounding ───────────────────────────────────────────────────────

    #[test]
    fn overlap_longer_than_window_is_only_partially_detected() {
        let existing = "a".repeat(50);
        let incoming = format!("{}b", "a".repeat(50));
        // Window of 10: only the last 10 chars are scanned, so 40 duplicated
        // chars survive the join.  Correctness demands a window at least as
        // wide as the largest resend.
        let merged = merge(&existing, &incoming, 10);
        assert_eq!(merged.len(), 50 + 40 + 1);
    }

    #[test]
    fn zero_window_disables_detection() {
        assert_eq!(merge("abc", "abc", 0), "abcabc");
    }

    #[test]
    fn window_of_one_catches_single_char_resend() {
        assert_eq!(merge("ab", "bc", 1), "abc");
    }

    // ── UTF-8 safety ──────────────────────────────────────────────────────────

    #[test]
    fn multibyte_overlap_is_detected() {
        let existing = "Umsätze für Q4 — prüfe";
        let incoming = "prüfe die Filiale";
        let merged = merge(existing, incoming, W);
        assert_eq!(merged, "Umsätze für Q4 — prüfe die Filiale");
    }

    #[test]
    fn window_counts_chars_not_bytes() {
        // 4 multibyte chars; a window of 4 must cover all of them.
        let existing = "éééé";
        let merged = merge(existing, "ééééX", 4);
        assert_eq!(merged, "ééééX");
    }

    #[test]
    fn overlap_returns_byte_length() {
        assert_eq!(overlap("prü", "prüfen", W), "prü".len());
    }
}
