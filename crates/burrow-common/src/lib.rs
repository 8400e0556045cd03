// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

pub mod config;
pub mod keys;
pub mod peer;
pub mod secret;

pub use config::{load_config_file, parse_config, Config, ConfigError};
pub use keys::{KeyError, KeyPair, PresharedKey, PublicKey, SecretKey};
pub use peer::{Interface, Peer, DEFAULT_KEEPALIVE};
pub use secret::{Secret, SecretString, REDACTED};
