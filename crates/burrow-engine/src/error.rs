// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
	#[error("engine rejected session parameters: {0}")]
	SessionCreation(String),

	#[error("session handle is closed")]
	Closed,
}

pub type Result<T> = std::result::Result<T, EngineError>;
