// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use burrow_engine::Opcode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConnError {
	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),

	#[error("engine error: {0}")]
	Engine(#[from] burrow_engine::EngineError),

	#[error("config error: {0}")]
	Config(#[from] burrow_common::ConfigError),

	#[error("peer has no endpoint; a network session needs an address to connect to")]
	MissingEndpoint,

	#[error("handshake initiation produced {0:?}, expected WriteToNetwork")]
	HandshakeInitiation(Opcode),

	#[error("driver is closed")]
	Closed,
}

pub type Result<T> = std::result::Result<T, ConnError>;
