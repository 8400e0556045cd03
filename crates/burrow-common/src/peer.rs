// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Session identity: the local interface and the remote peer.

use crate::keys::{PresharedKey, PublicKey, SecretKey};
use std::net::SocketAddr;

/// Default persistent keepalive interval in seconds.
pub const DEFAULT_KEEPALIVE: u16 = 10;

/// The local end of a tunnel: one x25519 secret key.
#[derive(Clone, Debug)]
pub struct Interface {
	secret: SecretKey,
}

impl Interface {
	pub fn new(secret: SecretKey) -> Self {
		Self { secret }
	}

	pub fn secret_key(&self) -> &SecretKey {
		&self.secret
	}

	pub fn public_key(&self) -> PublicKey {
		self.secret.public_key()
	}
}

/// The remote end of a tunnel.
///
/// The endpoint is optional: sessions driven entirely in-process (tests,
/// simulations) have no network address. Keepalive defaults to
/// [`DEFAULT_KEEPALIVE`]; `None` disables the keepalive timer.
#[derive(Clone, Debug)]
pub struct Peer {
	pub public_key: PublicKey,
	pub preshared_key: Option<PresharedKey>,
	pub endpoint: Option<SocketAddr>,
	pub keepalive: Option<u16>,
}

impl Peer {
	pub fn new(public_key: PublicKey) -> Self {
		Self {
			public_key,
			preshared_key: None,
			endpoint: None,
			keepalive: Some(DEFAULT_KEEPALIVE),
		}
	}

	pub fn with_endpoint(mut self, endpoint: SocketAddr) -> Self {
		self.endpoint = Some(endpoint);
		self
	}

	pub fn with_preshared_key(mut self, psk: PresharedKey) -> Self {
		self.preshared_key = Some(psk);
		self
	}

	pub fn with_keepalive(mut self, keepalive: Option<u16>) -> Self {
		self.keepalive = keepalive;
		self
	}
}
