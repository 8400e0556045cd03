// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

pub mod action;
pub mod engine;
pub mod error;
pub mod session;

pub use action::{Action, Opcode, HANDSHAKE_RESPONSE_TYPE};
pub use engine::{BoringTunEngine, TunnelEngine};
pub use error::{EngineError, Result};
pub use session::{BoringTunSession, EngineSession, SessionStats, MAX_DATAGRAM_SIZE};
