// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use async_trait::async_trait;
use bytes::Bytes;

/// The application-facing consumer of a tunnel session.
///
/// Decrypted tunnel packets are delivered through [`datagram_received`];
/// lifecycle notifications have no-op defaults so sinks only implement what
/// they care about.
///
/// [`datagram_received`]: TunnelSink::datagram_received
#[async_trait]
pub trait TunnelSink: Send + Sync {
	/// A decrypted IP packet arrived from the tunnel.
	async fn datagram_received(&self, packet: Bytes);

	/// The session handshake completed; the tunnel is usable.
	async fn connection_established(&self) {}

	/// The session was torn down (transport loss or explicit close).
	async fn connection_lost(&self) {}
}
