// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod frames;
mod decode;

pub use frames::{
    ChannelId, Envelope, FeedbackFrame, FinalResult, InboundFrame, OutboundFrame, QueryFrame,
    APPROVAL_TOKEN, CANCEL_TOKEN, FEEDBACK_SOURCE,
};
pub use decode::{decode, DecodeError};
