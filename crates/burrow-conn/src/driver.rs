// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The session driver: one engine session bound to one UDP transport.
//!
//! A driver owns everything a single tunnel session needs: the connected
//! socket, the engine session handle, the action queue with its dispatcher,
//! and the reader and keepalive loops. The engine handle is
//! session-private; every call on it is serialized through one mutex, and it
//! is closed exactly once during teardown.
//!
//! Lifecycle: `Unbound → Connecting → HandshakePending → Established →
//! Closing → Closed`. [`TunnelDriver::connect`] returns once the handshake
//! has completed; there is no internal timeout, so callers that need one
//! should wrap the call in `tokio::time::timeout`.

use crate::dispatch::Dispatcher;
use crate::error::{ConnError, Result};
use crate::sink::TunnelSink;
use burrow_common::Config;
use burrow_engine::{Action, EngineSession, Opcode, TunnelEngine, HANDSHAKE_RESPONSE_TYPE, MAX_DATAGRAM_SIZE};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, trace, warn};

/// Observable driver lifecycle state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DriverState {
	Unbound,
	Connecting,
	HandshakePending,
	Established,
	Closing,
	Closed,
}

enum DispatchState {
	Running {
		cancel: watch::Sender<bool>,
		task: JoinHandle<mpsc::UnboundedReceiver<Action>>,
	},
	Paused(mpsc::UnboundedReceiver<Action>),
	Stopped,
}

struct DriverInner {
	udp: Arc<UdpSocket>,
	session: Mutex<Box<dyn EngineSession>>,
	peer_endpoint: SocketAddr,
	keepalive: Option<u16>,
	queue_tx: mpsc::UnboundedSender<Action>,
	dispatch: Mutex<DispatchState>,
	state_tx: watch::Sender<DriverState>,
	ready_tx: watch::Sender<bool>,
	shutdown_tx: watch::Sender<bool>,
	sink: Arc<dyn TunnelSink>,
	closing: AtomicBool,
	reader_task: StdMutex<Option<JoinHandle<()>>>,
	keepalive_task: StdMutex<Option<JoinHandle<()>>>,
}

/// A tunnel session bound to one transport connection.
pub struct TunnelDriver {
	inner: Arc<DriverInner>,
}

impl TunnelDriver {
	/// Open a session for `config`'s single peer and drive it to
	/// `Established`.
	///
	/// Fails before any network traffic if the config binds more than one
	/// peer, the peer has no endpoint, the engine rejects the session, or
	/// handshake initiation yields anything but a network write.
	#[instrument(skip_all, fields(peer = %config.peers.first().map(|p| p.public_key.to_base64()).unwrap_or_default()))]
	pub async fn connect(
		engine: Arc<dyn TunnelEngine>,
		config: &Config,
		sink: Arc<dyn TunnelSink>,
	) -> Result<Self> {
		let (interface, peer) = config.single_peer()?;
		let endpoint = peer.endpoint.ok_or(ConnError::MissingEndpoint)?;

		// send_replace: state must update whether or not anyone is watching.
		let (state_tx, _) = watch::channel(DriverState::Unbound);

		state_tx.send_replace(DriverState::Connecting);
		let udp = UdpSocket::bind("0.0.0.0:0").await?;
		udp.connect(endpoint).await?;
		debug!(local = ?udp.local_addr(), remote = %endpoint, "transport connected");

		let mut session = engine.open_session(interface, peer, 0)?;

		state_tx.send_replace(DriverState::HandshakePending);
		let initiation = session.force_handshake()?;
		if initiation.opcode() != Opcode::WriteToNetwork {
			// Protocol invariant violation; surface it before anything is
			// sent and release the handle we will never use.
			let _ = session.close();
			return Err(ConnError::HandshakeInitiation(initiation.opcode()));
		}

		let (queue_tx, queue_rx) = mpsc::unbounded_channel();
		let (ready_tx, _) = watch::channel(false);
		let (shutdown_tx, _) = watch::channel(false);

		let inner = Arc::new(DriverInner {
			udp: Arc::new(udp),
			session: Mutex::new(session),
			peer_endpoint: endpoint,
			keepalive: peer.keepalive,
			queue_tx,
			dispatch: Mutex::new(DispatchState::Stopped),
			state_tx,
			ready_tx,
			shutdown_tx,
			sink,
			closing: AtomicBool::new(false),
			reader_task: StdMutex::new(None),
			keepalive_task: StdMutex::new(None),
		});

		inner.start_dispatcher(queue_rx).await;
		inner.enqueue(initiation);
		inner.spawn_reader();

		inner.wait_ready().await?;

		inner.state_tx.send_replace(DriverState::Established);
		inner.spawn_keepalive();
		inner.sink.connection_established().await;
		info!("tunnel established");

		Ok(Self { inner })
	}

	/// Wrap an outbound IP packet and queue it for sending.
	///
	/// The wrap happens synchronously; the network write is performed by the
	/// dispatcher in queue order.
	pub async fn send(&self, packet: &[u8]) -> Result<()> {
		if self.inner.closing.load(Ordering::SeqCst) {
			return Err(ConnError::Closed);
		}
		let action = {
			let mut session = self.inner.session.lock().await;
			session.wrap(packet)?
		};
		self.inner.enqueue(action);
		Ok(())
	}

	/// Read-only snapshot of the engine session counters.
	pub async fn stats(&self) -> Result<burrow_engine::SessionStats> {
		let mut session = self.inner.session.lock().await;
		Ok(session.stats()?)
	}

	pub fn state(&self) -> DriverState {
		*self.inner.state_tx.borrow()
	}

	pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
		self.inner.udp.local_addr()
	}

	pub fn peer_endpoint(&self) -> SocketAddr {
		self.inner.peer_endpoint
	}

	/// Whether the dispatcher is currently draining the queue. A paused
	/// driver still accepts `send`, but nothing reaches the network until
	/// [`resume_writing`](Self::resume_writing).
	pub async fn is_writable(&self) -> bool {
		matches!(
			*self.inner.dispatch.lock().await,
			DispatchState::Running { .. }
		)
	}

	/// Stop the dispatch task without draining the queue. Queued actions are
	/// deferred, not dropped.
	pub async fn pause_writing(&self) {
		let mut dispatch = self.inner.dispatch.lock().await;
		// Only a running dispatcher can be paused; a redundant pause must not
		// disturb an already-paused queue.
		if !matches!(*dispatch, DispatchState::Running { .. }) {
			return;
		}
		if let DispatchState::Running { cancel, task } =
			std::mem::replace(&mut *dispatch, DispatchState::Stopped)
		{
			let _ = cancel.send(true);
			match task.await {
				Ok(queue) => {
					*dispatch = DispatchState::Paused(queue);
					debug!("dispatch paused");
				}
				Err(e) => {
					warn!(error = %e, "dispatch task failed during pause");
				}
			}
		}
	}

	/// Restart dispatch from the current queue head. A no-op unless the driver
	/// is paused; resuming a running dispatcher must leave it running.
	pub async fn resume_writing(&self) {
		let mut dispatch = self.inner.dispatch.lock().await;
		if !matches!(*dispatch, DispatchState::Paused(_)) {
			return;
		}
		if let DispatchState::Paused(queue) =
			std::mem::replace(&mut *dispatch, DispatchState::Stopped)
		{
			*dispatch = self.inner.spawn_dispatcher(queue);
			debug!("dispatch resumed");
		}
	}

	/// Tear the session down: keepalive first, then dispatch and the reader,
	/// then the engine handle (closed exactly once), then the sink's
	/// connection-lost notification. Idempotent.
	pub async fn close(&self) {
		self.inner.teardown(false).await;
	}
}

impl DriverInner {
	fn enqueue(&self, action: Action) {
		// Receiver only drops at teardown; a send failure past that point is
		// uninteresting.
		let _ = self.queue_tx.send(action);
	}

	fn spawn_dispatcher(&self, queue: mpsc::UnboundedReceiver<Action>) -> DispatchState {
		let (cancel_tx, cancel_rx) = watch::channel(false);
		let dispatcher = Dispatcher::new(Arc::clone(&self.udp), Arc::clone(&self.sink));
		DispatchState::Running {
			cancel: cancel_tx,
			task: dispatcher.spawn(queue, cancel_rx),
		}
	}

	async fn start_dispatcher(&self, queue: mpsc::UnboundedReceiver<Action>) {
		let mut dispatch = self.dispatch.lock().await;
		*dispatch = self.spawn_dispatcher(queue);
	}

	fn spawn_reader(self: &Arc<Self>) {
		let inner = Arc::clone(self);
		let mut shutdown_rx = self.shutdown_tx.subscribe();

		let task = tokio::spawn(async move {
			let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];

			loop {
				tokio::select! {
					biased;

					_ = shutdown_rx.changed() => {
						if *shutdown_rx.borrow() {
							trace!("reader shutting down");
							break;
						}
					}

					result = inner.udp.recv(&mut buf) => {
						match result {
							Ok(len) => {
								inner.process_datagram(&buf[..len]).await;
							}
							Err(e) => {
								warn!(error = %e, "transport lost");
								inner.teardown(true).await;
								break;
							}
						}
					}
				}
			}
		});

		*self.reader_task.lock().unwrap_or_else(|e| e.into_inner()) = Some(task);
	}

	// The socket is connected, so the OS has already filtered the source
	// address; every datagram that arrives here came from the peer endpoint.
	async fn process_datagram(&self, datagram: &[u8]) {
		let action = {
			let mut session = self.session.lock().await;
			match session.unwrap(datagram) {
				Ok(action) => action,
				Err(e) => {
					debug!(error = %e, "unwrap on closed or failed session");
					return;
				}
			}
		};

		// A network-write result for a datagram whose leading byte is the
		// handshake-response message type means our initiation was answered.
		if action.opcode() == Opcode::WriteToNetwork
			&& datagram.first() == Some(&HANDSHAKE_RESPONSE_TYPE)
		{
			self.mark_ready();
		}

		self.enqueue(action);
	}

	fn mark_ready(&self) {
		let fired = self.ready_tx.send_if_modified(|ready| {
			if *ready {
				false
			} else {
				*ready = true;
				true
			}
		});
		if fired {
			debug!("handshake response observed");
		}
	}

	async fn wait_ready(&self) -> Result<()> {
		let mut ready_rx = self.ready_tx.subscribe();
		let mut shutdown_rx = self.shutdown_tx.subscribe();

		loop {
			if *ready_rx.borrow_and_update() {
				return Ok(());
			}
			tokio::select! {
				changed = ready_rx.changed() => {
					if changed.is_err() {
						return Err(ConnError::Closed);
					}
				}
				_ = shutdown_rx.changed() => {
					if *shutdown_rx.borrow() {
						return Err(ConnError::Closed);
					}
				}
			}
		}
	}

	fn spawn_keepalive(self: &Arc<Self>) {
		let Some(interval) = self.keepalive else {
			debug!("keepalive disabled");
			return;
		};

		let inner = Arc::clone(self);
		let mut shutdown_rx = self.shutdown_tx.subscribe();

		let task = tokio::spawn(async move {
			loop {
				tokio::select! {
					biased;

					_ = shutdown_rx.changed() => {
						if *shutdown_rx.borrow() {
							trace!("keepalive shutting down");
							break;
						}
					}

					_ = tokio::time::sleep(Duration::from_secs(interval.into())) => {
						let action = {
							let mut session = inner.session.lock().await;
							match session.tick() {
								Ok(action) => action,
								Err(_) => break,
							}
						};
						trace!(opcode = ?action.opcode(), "keepalive tick");
						inner.enqueue(action);
					}
				}
			}
		});

		*self.keepalive_task.lock().unwrap_or_else(|e| e.into_inner()) = Some(task);
	}

	async fn teardown(&self, from_reader: bool) {
		if self.closing.swap(true, Ordering::SeqCst) {
			return;
		}

		self.state_tx.send_replace(DriverState::Closing);
		let _ = self.shutdown_tx.send(true);

		// Keepalive must stop before the handle is closed so a destroyed
		// session is never ticked.
		let keepalive = self
			.keepalive_task
			.lock()
			.unwrap_or_else(|e| e.into_inner())
			.take();
		if let Some(task) = keepalive {
			let _ = task.await;
		}

		{
			let mut dispatch = self.dispatch.lock().await;
			if let DispatchState::Running { cancel, task } =
				std::mem::replace(&mut *dispatch, DispatchState::Stopped)
			{
				let _ = cancel.send(true);
				let _ = task.await;
			}
		}

		if !from_reader {
			let reader = self
				.reader_task
				.lock()
				.unwrap_or_else(|e| e.into_inner())
				.take();
			if let Some(task) = reader {
				let _ = task.await;
			}
		}

		{
			let mut session = self.session.lock().await;
			if let Err(e) = session.close() {
				warn!(error = %e, "engine session already closed");
			}
		}

		self.state_tx.send_replace(DriverState::Closed);
		self.sink.connection_lost().await;
		info!("tunnel closed");
	}
}
