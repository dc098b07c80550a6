// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
mod transport;
mod controller;
mod error;

pub use transport::{spawn_transport, TransportCommand, TransportEvent, TransportHandle};
pub use controller::{OperatorAction, SessionController, SessionOutcome};
pub use error::TransportError;
