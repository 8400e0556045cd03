// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The single-consumer action dispatch loop.
//!
//! Each session owns one unbounded ordered queue of engine actions; one task
//! drains it and applies the opcode-determined side effect. Actions are
//! applied strictly in enqueue order. A failure applying one action is logged
//! and isolated; the loop moves on to the next action.
//!
//! Cancellation is cooperative: the loop checks its cancel signal between
//! awaits and hands the queue receiver back when it exits, so a paused
//! dispatcher can be resumed later from the current queue head with nothing
//! lost.

use crate::sink::TunnelSink;
use burrow_engine::Action;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

pub(crate) struct Dispatcher {
	udp: Arc<UdpSocket>,
	sink: Arc<dyn TunnelSink>,
}

impl Dispatcher {
	pub(crate) fn new(udp: Arc<UdpSocket>, sink: Arc<dyn TunnelSink>) -> Self {
		Self { udp, sink }
	}

	/// Drain the queue until cancelled or the queue closes. Returns the
	/// receiver so a later spawn can continue where this one stopped.
	pub(crate) fn spawn(
		self,
		mut queue: mpsc::UnboundedReceiver<Action>,
		mut cancel: watch::Receiver<bool>,
	) -> JoinHandle<mpsc::UnboundedReceiver<Action>> {
		tokio::spawn(async move {
			loop {
				tokio::select! {
					biased;

					changed = cancel.changed() => {
						// A dropped cancel sender means the owner is gone;
						// treat it the same as an explicit cancel.
						if changed.is_err() || *cancel.borrow() {
							trace!("dispatch loop cancelled");
							break;
						}
					}

					action = queue.recv() => {
						match action {
							Some(action) => {
								if let Err(e) = self.apply(action).await {
									warn!(error = %e, "failed to apply action, continuing");
								}
							}
							None => {
								trace!("action queue closed");
								break;
							}
						}
					}
				}
			}
			queue
		})
	}

	async fn apply(&self, action: Action) -> std::io::Result<()> {
		match action {
			Action::Done => {
				trace!("no-op action");
			}
			Action::WriteToNetwork(buf) => {
				trace!(len = buf.len(), "sending to network");
				self.udp.send(&buf).await?;
			}
			Action::Error(message) => {
				debug!(%message, "engine reported error, dropping");
			}
			Action::WriteToTunnelV4(buf) | Action::WriteToTunnelV6(buf) => {
				trace!(len = buf.len(), "delivering tunnel packet");
				self.sink.datagram_received(buf).await;
			}
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use async_trait::async_trait;
	use bytes::Bytes;
	use std::time::Duration;
	use tokio::time::timeout;

	struct CollectSink {
		tx: mpsc::UnboundedSender<Bytes>,
	}

	#[async_trait]
	impl TunnelSink for CollectSink {
		async fn datagram_received(&self, packet: Bytes) {
			let _ = self.tx.send(packet);
		}
	}

	async fn harness() -> (
		Dispatcher,
		Arc<UdpSocket>,
		mpsc::UnboundedReceiver<Bytes>,
	) {
		let remote = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
		let local = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
		local.connect(remote.local_addr().unwrap()).await.unwrap();

		let (sink_tx, sink_rx) = mpsc::unbounded_channel();
		let dispatcher = Dispatcher::new(local, Arc::new(CollectSink { tx: sink_tx }));
		(dispatcher, remote, sink_rx)
	}

	#[tokio::test]
	async fn network_writes_preserve_fifo_order() {
		let (dispatcher, remote, _sink_rx) = harness().await;

		let (tx, rx) = mpsc::unbounded_channel();
		let (_cancel_tx, cancel_rx) = watch::channel(false);
		let _task = dispatcher.spawn(rx, cancel_rx);

		for i in 0u8..4 {
			tx.send(Action::WriteToNetwork(Bytes::copy_from_slice(&[i; 8])))
				.unwrap();
		}

		let mut buf = [0u8; 64];
		for i in 0u8..4 {
			let (len, _) = timeout(Duration::from_secs(5), remote.recv_from(&mut buf))
				.await
				.unwrap()
				.unwrap();
			assert_eq!(&buf[..len], &[i; 8]);
		}
	}

	#[tokio::test]
	async fn tunnel_actions_reach_sink() {
		let (dispatcher, _remote, mut sink_rx) = harness().await;

		let (tx, rx) = mpsc::unbounded_channel();
		let (_cancel_tx, cancel_rx) = watch::channel(false);
		let _task = dispatcher.spawn(rx, cancel_rx);

		tx.send(Action::WriteToTunnelV4(Bytes::from_static(b"v4")))
			.unwrap();
		tx.send(Action::WriteToTunnelV6(Bytes::from_static(b"v6")))
			.unwrap();

		let first = timeout(Duration::from_secs(5), sink_rx.recv())
			.await
			.unwrap()
			.unwrap();
		assert_eq!(first.as_ref(), b"v4");
		let second = timeout(Duration::from_secs(5), sink_rx.recv())
			.await
			.unwrap()
			.unwrap();
		assert_eq!(second.as_ref(), b"v6");
	}

	#[tokio::test]
	async fn error_and_done_actions_do_not_stop_the_loop() {
		let (dispatcher, _remote, mut sink_rx) = harness().await;

		let (tx, rx) = mpsc::unbounded_channel();
		let (_cancel_tx, cancel_rx) = watch::channel(false);
		let _task = dispatcher.spawn(rx, cancel_rx);

		tx.send(Action::Error("decapsulation failed".into())).unwrap();
		tx.send(Action::Done).unwrap();
		tx.send(Action::WriteToTunnelV4(Bytes::from_static(b"after")))
			.unwrap();

		let delivered = timeout(Duration::from_secs(5), sink_rx.recv())
			.await
			.unwrap()
			.unwrap();
		assert_eq!(delivered.as_ref(), b"after");
	}

	#[tokio::test]
	async fn cancel_keeps_queued_actions_for_resume() {
		let (dispatcher, _remote, mut sink_rx) = harness().await;
		let udp = dispatcher.udp.clone();
		let sink = dispatcher.sink.clone();

		let (tx, rx) = mpsc::unbounded_channel();
		let (cancel_tx, cancel_rx) = watch::channel(false);
		let task = dispatcher.spawn(rx, cancel_rx);

		cancel_tx.send(true).unwrap();
		let queue = task.await.unwrap();

		// Enqueued while paused; handling is deferred, not dropped.
		tx.send(Action::WriteToTunnelV4(Bytes::from_static(b"deferred")))
			.unwrap();
		assert!(sink_rx.try_recv().is_err());

		let (_cancel_tx, cancel_rx) = watch::channel(false);
		let _task = Dispatcher::new(udp, sink).spawn(queue, cancel_rx);

		let delivered = timeout(Duration::from_secs(5), sink_rx.recv())
			.await
			.unwrap()
			.unwrap();
		assert_eq!(delivered.as_ref(), b"deferred");
	}
}
