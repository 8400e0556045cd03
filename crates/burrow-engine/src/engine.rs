// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The engine binding handed to a session driver.
//!
//! Drivers never load or reference the engine implicitly; they receive a
//! [`TunnelEngine`] at construction and open sessions through it. This is the
//! single initialization point for the engine; there is no process-wide
//! engine state.

use crate::error::Result;
use crate::session::{BoringTunSession, EngineSession};
use burrow_common::{Interface, Peer};
use tracing::{debug, instrument};

/// Factory for live tunnel sessions.
pub trait TunnelEngine: Send + Sync {
	/// Open a session binding `interface` to `peer`.
	///
	/// Fails with [`crate::EngineError::SessionCreation`] if the engine
	/// rejects the key material or cannot allocate the session; the caller
	/// must not proceed without a valid handle.
	fn open_session(
		&self,
		interface: &Interface,
		peer: &Peer,
		index: u32,
	) -> Result<Box<dyn EngineSession>>;
}

/// The production engine: boringtun's userspace WireGuard implementation.
#[derive(Clone, Copy, Debug, Default)]
pub struct BoringTunEngine;

impl BoringTunEngine {
	pub fn new() -> Self {
		Self
	}
}

impl TunnelEngine for BoringTunEngine {
	#[instrument(skip_all, fields(peer = %peer.public_key, index))]
	fn open_session(
		&self,
		interface: &Interface,
		peer: &Peer,
		index: u32,
	) -> Result<Box<dyn EngineSession>> {
		let session = BoringTunSession::open(interface, peer, index)?;
		debug!("opened engine session");
		Ok(Box::new(session))
	}
}
