// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The live engine session handle.
//!
//! A session owns one native tunnel resource and a fixed scratch buffer that
//! every operation writes into. The engine reports how many bytes of the
//! buffer are valid; only that prefix is copied out, so stale bytes from a
//! previous call are never forwarded. The handle is closed exactly once and
//! detects any use after close.

use crate::action::{Action, Opcode};
use crate::error::{EngineError, Result};
use burrow_common::{Interface, Peer};
use bytes::Bytes;
use defguard_boringtun::noise::{Tunn, TunnResult};
use defguard_boringtun::x25519::{PublicKey, StaticSecret};
use std::time::Duration;
use tracing::trace;

/// Largest expected WireGuard UDP payload plus protocol overhead.
pub const MAX_DATAGRAM_SIZE: usize = 0x10000 + 0x40;

/// Read-only snapshot of session counters.
#[derive(Clone, Debug)]
pub struct SessionStats {
	pub time_since_last_handshake: Option<Duration>,
	pub tx_bytes: usize,
	pub rx_bytes: usize,
	pub estimated_loss: f32,
	pub estimated_rtt: Option<u32>,
}

/// A live tunnel session produced by a [`crate::TunnelEngine`].
///
/// All operations are bounded, CPU-only calls; the engine performs no I/O.
/// Access must be serialized by the owner; a session is never shared between
/// drivers.
pub trait EngineSession: Send {
	/// Encrypt an outbound IP packet.
	fn wrap(&mut self, plaintext: &[u8]) -> Result<Action>;

	/// Decrypt or decapsulate an inbound datagram. May yield a
	/// `WriteToNetwork` action (handshake continuation) instead of tunnel
	/// data; the caller forwards it through the normal dispatch path.
	fn unwrap(&mut self, datagram: &[u8]) -> Result<Action>;

	/// Advance internal timers. Recommended external cadence: ~100ms per
	/// engine contract; the driver ticks at the peer keepalive interval.
	fn tick(&mut self) -> Result<Action>;

	/// Start a new handshake. Always yields `WriteToNetwork` on success;
	/// anything else is a protocol invariant violation the caller must treat
	/// as fatal.
	fn force_handshake(&mut self) -> Result<Action>;

	fn stats(&mut self) -> Result<SessionStats>;

	/// Release the native resource. Exactly once; all later calls on the
	/// handle fail with [`EngineError::Closed`].
	fn close(&mut self) -> Result<()>;

	fn is_closed(&self) -> bool;
}

/// [`EngineSession`] backed by boringtun's userspace WireGuard implementation.
///
/// Byte counters are tracked here in plaintext terms: `tx_bytes` is the sum of
/// packet lengths accepted by [`wrap`](EngineSession::wrap), `rx_bytes` the sum
/// of tunnel payloads delivered by [`unwrap`](EngineSession::unwrap). The
/// engine's own counters measure encrypted wire sizes and are not exposed.
pub struct BoringTunSession {
	tunn: Option<Tunn>,
	scratch: Vec<u8>,
	tx_bytes: usize,
	rx_bytes: usize,
}

impl BoringTunSession {
	pub fn open(interface: &Interface, peer: &Peer, index: u32) -> Result<Self> {
		let secret = StaticSecret::from(*interface.secret_key().expose_bytes());
		let public = PublicKey::from(*peer.public_key.as_bytes());
		let preshared = peer.preshared_key.as_ref().map(|k| *k.expose_bytes());

		let tunn = Tunn::new(secret, public, preshared, peer.keepalive, index, None);

		Ok(Self {
			tunn: Some(tunn),
			scratch: vec![0u8; MAX_DATAGRAM_SIZE],
			tx_bytes: 0,
			rx_bytes: 0,
		})
	}
}

/// The engine hands back a view of the valid prefix of the scratch buffer;
/// copying that view (and nothing more) is what keeps stale bytes out of the
/// forwarded payload.
fn convert(result: TunnResult<'_>) -> Action {
	match result {
		TunnResult::Done => Action::Done,
		TunnResult::Err(e) => Action::Error(format!("{:?}", e)),
		TunnResult::WriteToNetwork(data) => Action::WriteToNetwork(Bytes::copy_from_slice(data)),
		TunnResult::WriteToTunnelV4(data, _) => {
			Action::WriteToTunnelV4(Bytes::copy_from_slice(data))
		}
		TunnResult::WriteToTunnelV6(data, _) => {
			Action::WriteToTunnelV6(Bytes::copy_from_slice(data))
		}
	}
}

impl EngineSession for BoringTunSession {
	fn wrap(&mut self, plaintext: &[u8]) -> Result<Action> {
		let tunn = self.tunn.as_mut().ok_or(EngineError::Closed)?;
		let action = convert(tunn.encapsulate(plaintext, &mut self.scratch));
		if action.opcode() != Opcode::Error {
			// Accepted packets count even while queued behind a pending
			// handshake; the engine sends them once the session is up.
			self.tx_bytes += plaintext.len();
		}
		trace!(len = plaintext.len(), opcode = ?action.opcode(), "wrap");
		Ok(action)
	}

	fn unwrap(&mut self, datagram: &[u8]) -> Result<Action> {
		let tunn = self.tunn.as_mut().ok_or(EngineError::Closed)?;
		let action = convert(tunn.decapsulate(None, datagram, &mut self.scratch));
		if matches!(
			action.opcode(),
			Opcode::WriteToTunnelV4 | Opcode::WriteToTunnelV6
		) {
			if let Some(payload) = action.payload() {
				self.rx_bytes += payload.len();
			}
		}
		trace!(len = datagram.len(), opcode = ?action.opcode(), "unwrap");
		Ok(action)
	}

	fn tick(&mut self) -> Result<Action> {
		let tunn = self.tunn.as_mut().ok_or(EngineError::Closed)?;
		Ok(convert(tunn.update_timers(&mut self.scratch)))
	}

	fn force_handshake(&mut self) -> Result<Action> {
		let tunn = self.tunn.as_mut().ok_or(EngineError::Closed)?;
		Ok(convert(tunn.format_handshake_initiation(&mut self.scratch, true)))
	}

	fn stats(&mut self) -> Result<SessionStats> {
		let tunn = self.tunn.as_mut().ok_or(EngineError::Closed)?;
		let (time_since_last_handshake, _, _, estimated_loss, estimated_rtt) = tunn.stats();
		Ok(SessionStats {
			time_since_last_handshake,
			tx_bytes: self.tx_bytes,
			rx_bytes: self.rx_bytes,
			estimated_loss,
			estimated_rtt,
		})
	}

	fn close(&mut self) -> Result<()> {
		match self.tunn.take() {
			Some(tunn) => {
				drop(tunn);
				Ok(())
			}
			None => Err(EngineError::Closed),
		}
	}

	fn is_closed(&self) -> bool {
		self.tunn.is_none()
	}
}
