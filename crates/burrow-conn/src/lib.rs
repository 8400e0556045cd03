// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

pub mod dispatch;
pub mod driver;
pub mod error;
pub mod sink;

pub use driver::{DriverState, TunnelDriver};
pub use error::{ConnError, Result};
pub use sink::TunnelSink;
