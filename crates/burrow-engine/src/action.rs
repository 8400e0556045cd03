// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! What the engine asks the caller to do next.
//!
//! Every engine operation returns an [`Action`]: an opcode plus the payload
//! that opcode refers to. The opcode set and its wire values are part of the
//! engine contract and must match the engine exactly.

use bytes::Bytes;

/// First byte of a WireGuard handshake-response datagram on the wire.
pub const HANDSHAKE_RESPONSE_TYPE: u8 = 2;

/// Operation requested from the caller.
///
/// Wire values are fixed by the engine contract: `Done=0`,
/// `WriteToNetwork=1`, `Error=2`, `WriteToTunnelV4=4`, `WriteToTunnelV6=6`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum Opcode {
	/// No operation is required.
	Done = 0,
	/// Send the payload to the remote endpoint verbatim.
	WriteToNetwork = 1,
	/// The engine reported an error; nothing to forward.
	Error = 2,
	/// Deliver the payload to the application as a received IPv4 packet.
	WriteToTunnelV4 = 4,
	/// Deliver the payload to the application as a received IPv6 packet.
	WriteToTunnelV6 = 6,
}

impl Opcode {
	pub fn from_wire(value: i32) -> Option<Self> {
		match value {
			0 => Some(Self::Done),
			1 => Some(Self::WriteToNetwork),
			2 => Some(Self::Error),
			4 => Some(Self::WriteToTunnelV4),
			6 => Some(Self::WriteToTunnelV6),
			_ => None,
		}
	}

	pub fn wire_value(self) -> i32 {
		self as i32
	}
}

/// An engine-produced action: the opcode plus its payload, if any.
#[derive(Clone, Debug)]
pub enum Action {
	Done,
	WriteToNetwork(Bytes),
	Error(String),
	WriteToTunnelV4(Bytes),
	WriteToTunnelV6(Bytes),
}

impl Action {
	pub fn opcode(&self) -> Opcode {
		match self {
			Action::Done => Opcode::Done,
			Action::WriteToNetwork(_) => Opcode::WriteToNetwork,
			Action::Error(_) => Opcode::Error,
			Action::WriteToTunnelV4(_) => Opcode::WriteToTunnelV4,
			Action::WriteToTunnelV6(_) => Opcode::WriteToTunnelV6,
		}
	}

	/// The byte payload, absent for `Done` and `Error`.
	pub fn payload(&self) -> Option<&Bytes> {
		match self {
			Action::Done | Action::Error(_) => None,
			Action::WriteToNetwork(buf)
			| Action::WriteToTunnelV4(buf)
			| Action::WriteToTunnelV6(buf) => Some(buf),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn wire_values_match_engine_contract() {
		assert_eq!(Opcode::Done.wire_value(), 0);
		assert_eq!(Opcode::WriteToNetwork.wire_value(), 1);
		assert_eq!(Opcode::Error.wire_value(), 2);
		assert_eq!(Opcode::WriteToTunnelV4.wire_value(), 4);
		assert_eq!(Opcode::WriteToTunnelV6.wire_value(), 6);
	}

	#[test]
	fn from_wire_roundtrip() {
		for opcode in [
			Opcode::Done,
			Opcode::WriteToNetwork,
			Opcode::Error,
			Opcode::WriteToTunnelV4,
			Opcode::WriteToTunnelV6,
		] {
			assert_eq!(Opcode::from_wire(opcode.wire_value()), Some(opcode));
		}
	}

	#[test]
	fn from_wire_rejects_unknown() {
		assert_eq!(Opcode::from_wire(3), None);
		assert_eq!(Opcode::from_wire(5), None);
		assert_eq!(Opcode::from_wire(-1), None);
	}

	#[test]
	fn payload_presence_follows_opcode() {
		assert!(Action::Done.payload().is_none());
		assert!(Action::Error("boom".into()).payload().is_none());

		let buf = Bytes::from_static(b"packet");
		assert_eq!(
			Action::WriteToNetwork(buf.clone()).payload(),
			Some(&buf)
		);
		assert_eq!(
			Action::WriteToTunnelV4(buf.clone()).payload(),
			Some(&buf)
		);
	}
}
