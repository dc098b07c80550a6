// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    /// A send was issued with no live transport task (never connected, or
    /// already closed).  The actor normally absorbs this by connecting and
    /// replaying the queued payload; this surfaces only when the task is gone.
    #[error("not connected to the backend")]
    NotConnected,

    /// The reconnect budget was exhausted.  Fatal: the session fails.
    #[error("connection lost after {attempts} connect attempts")]
    ConnectionLost { attempts: u32 },

    #[error("invalid backend URL: {0}")]
    BadUrl(String),
}
