// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Tunnel configuration: one interface plus one or more peers.
//!
//! Configurations can be built programmatically or loaded from the wg-quick
//! INI format (`[Interface]` / `[Peer]` sections with `PrivateKey`,
//! `PublicKey`, `Endpoint`, `PresharedKey`, `PersistentKeepalive` keys).
//! Parsing is a thin I/O layer; binding a configuration to a session enforces
//! the one-peer-per-session constraint.

use crate::keys::{KeyError, PresharedKey, PublicKey, SecretKey};
use crate::peer::{Interface, Peer, DEFAULT_KEEPALIVE};
use std::path::Path;
use thiserror::Error;
use tokio::fs;
use tracing::instrument;

#[derive(Error, Debug)]
pub enum ConfigError {
	#[error("failed to read config file: {0}")]
	Read(#[from] std::io::Error),

	#[error("invalid key: {0}")]
	Key(#[from] KeyError),

	#[error("config defines no [Interface] section")]
	MissingInterface,

	#[error("missing required field {0}")]
	MissingField(&'static str),

	#[error("invalid value for {field}: {value}")]
	InvalidValue { field: &'static str, value: String },

	#[error("config defines no peers")]
	NoPeers,

	#[error("config binds {0} peers to a single session: each session connects exactly one interface to one peer")]
	MultiplePeers(usize),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// One local interface plus an ordered collection of peers.
#[derive(Clone, Debug)]
pub struct Config {
	pub interface: Interface,
	pub peers: Vec<Peer>,
}

impl Config {
	pub fn new(interface: Interface, peers: Vec<Peer>) -> Self {
		Self { interface, peers }
	}

	/// Bind this configuration to a single session.
	///
	/// A session connects exactly one interface to exactly one peer;
	/// multi-peer fan-out needs one session per peer.
	pub fn single_peer(&self) -> Result<(&Interface, &Peer)> {
		match self.peers.len() {
			0 => Err(ConfigError::NoPeers),
			1 => Ok((&self.interface, &self.peers[0])),
			n => Err(ConfigError::MultiplePeers(n)),
		}
	}
}

/// Parse a wg-quick style configuration from text.
pub fn parse_config(text: &str) -> Result<Config> {
	#[derive(PartialEq)]
	enum Section {
		None,
		Interface,
		Peer,
	}

	let mut section = Section::None;
	let mut secret: Option<SecretKey> = None;
	let mut peers: Vec<Peer> = Vec::new();
	let mut current: Option<PeerBuilder> = None;

	for raw in text.lines() {
		let line = raw.split('#').next().unwrap_or("").trim();
		if line.is_empty() {
			continue;
		}

		if line.eq_ignore_ascii_case("[interface]") {
			if let Some(builder) = current.take() {
				peers.push(builder.build()?);
			}
			section = Section::Interface;
			continue;
		}
		if line.eq_ignore_ascii_case("[peer]") {
			if let Some(builder) = current.take() {
				peers.push(builder.build()?);
			}
			section = Section::Peer;
			current = Some(PeerBuilder::default());
			continue;
		}

		let Some((key, value)) = line.split_once('=') else {
			continue;
		};
		let (key, value) = (key.trim(), value.trim());

		match section {
			Section::Interface => {
				if key.eq_ignore_ascii_case("PrivateKey") {
					secret = Some(SecretKey::from_base64(value)?);
				}
			}
			Section::Peer => {
				if let Some(builder) = current.as_mut() {
					builder.set(key, value)?;
				}
			}
			Section::None => {}
		}
	}

	if let Some(builder) = current.take() {
		peers.push(builder.build()?);
	}

	let secret = secret.ok_or(ConfigError::MissingInterface)?;
	if peers.is_empty() {
		return Err(ConfigError::NoPeers);
	}

	Ok(Config::new(Interface::new(secret), peers))
}

/// Load and parse a wg-quick style configuration file.
#[instrument(skip_all, fields(path = %path.as_ref().display()))]
pub async fn load_config_file(path: impl AsRef<Path>) -> Result<Config> {
	let text = fs::read_to_string(path.as_ref()).await?;
	parse_config(&text)
}

#[derive(Default)]
struct PeerBuilder {
	public_key: Option<PublicKey>,
	preshared_key: Option<PresharedKey>,
	endpoint: Option<std::net::SocketAddr>,
	keepalive: Option<u16>,
}

impl PeerBuilder {
	fn set(&mut self, key: &str, value: &str) -> Result<()> {
		if key.eq_ignore_ascii_case("PublicKey") {
			self.public_key = Some(PublicKey::from_base64(value)?);
		} else if key.eq_ignore_ascii_case("PresharedKey") {
			self.preshared_key = Some(PresharedKey::from_base64(value)?);
		} else if key.eq_ignore_ascii_case("Endpoint") {
			self.endpoint = Some(value.parse().map_err(|_| ConfigError::InvalidValue {
				field: "Endpoint",
				value: value.to_string(),
			})?);
		} else if key.eq_ignore_ascii_case("PersistentKeepalive") {
			self.keepalive = Some(value.parse().map_err(|_| ConfigError::InvalidValue {
				field: "PersistentKeepalive",
				value: value.to_string(),
			})?);
		}
		Ok(())
	}

	fn build(self) -> Result<Peer> {
		let public_key = self.public_key.ok_or(ConfigError::MissingField("PublicKey"))?;
		let mut peer = Peer::new(public_key)
			.with_keepalive(Some(self.keepalive.unwrap_or(DEFAULT_KEEPALIVE)));
		if let Some(psk) = self.preshared_key {
			peer = peer.with_preshared_key(psk);
		}
		if let Some(endpoint) = self.endpoint {
			peer = peer.with_endpoint(endpoint);
		}
		Ok(peer)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::keys::KeyPair;

	const SAMPLE: &str = "\
[Interface]
PrivateKey = YJ1bbwR9OA+7AIZI0fnLA84lcltZXbsXej+rhYZvS3A=

[Peer]
PublicKey = JHIy+6HJTke/0WzMVLDsRnV/n/YxfiCSZargR2ZmKAY=
Endpoint = 203.0.113.7:51820
PresharedKey = AgGZWT8Gp2la+dkmDWPxMVTp1WJgR4gmAubGu9Z6crg=
PersistentKeepalive = 25
";

	#[test]
	fn parses_full_config() {
		let config = parse_config(SAMPLE).unwrap();
		assert_eq!(config.peers.len(), 1);

		let peer = &config.peers[0];
		assert_eq!(
			peer.public_key.to_base64(),
			"JHIy+6HJTke/0WzMVLDsRnV/n/YxfiCSZargR2ZmKAY="
		);
		assert_eq!(peer.endpoint, Some("203.0.113.7:51820".parse().unwrap()));
		assert!(peer.preshared_key.is_some());
		assert_eq!(peer.keepalive, Some(25));
	}

	#[test]
	fn keepalive_defaults_when_absent() {
		let text = "\
[Interface]
PrivateKey = YJ1bbwR9OA+7AIZI0fnLA84lcltZXbsXej+rhYZvS3A=

[Peer]
PublicKey = JHIy+6HJTke/0WzMVLDsRnV/n/YxfiCSZargR2ZmKAY=
";
		let config = parse_config(text).unwrap();
		assert_eq!(config.peers[0].keepalive, Some(DEFAULT_KEEPALIVE));
	}

	#[test]
	fn comments_and_blank_lines_ignored() {
		let text = "\
# tunnel to the lab
[Interface]
PrivateKey = YJ1bbwR9OA+7AIZI0fnLA84lcltZXbsXej+rhYZvS3A=  # local identity

[Peer]
PublicKey = JHIy+6HJTke/0WzMVLDsRnV/n/YxfiCSZargR2ZmKAY=
";
		assert!(parse_config(text).is_ok());
	}

	#[test]
	fn rejects_missing_interface() {
		let text = "\
[Peer]
PublicKey = JHIy+6HJTke/0WzMVLDsRnV/n/YxfiCSZargR2ZmKAY=
";
		assert!(matches!(
			parse_config(text).unwrap_err(),
			ConfigError::MissingInterface
		));
	}

	#[test]
	fn rejects_peer_without_public_key() {
		let text = "\
[Interface]
PrivateKey = YJ1bbwR9OA+7AIZI0fnLA84lcltZXbsXej+rhYZvS3A=

[Peer]
Endpoint = 203.0.113.7:51820
";
		assert!(matches!(
			parse_config(text).unwrap_err(),
			ConfigError::MissingField("PublicKey")
		));
	}

	#[test]
	fn rejects_invalid_endpoint() {
		let text = "\
[Interface]
PrivateKey = YJ1bbwR9OA+7AIZI0fnLA84lcltZXbsXej+rhYZvS3A=

[Peer]
PublicKey = JHIy+6HJTke/0WzMVLDsRnV/n/YxfiCSZargR2ZmKAY=
Endpoint = not-an-endpoint
";
		assert!(matches!(
			parse_config(text).unwrap_err(),
			ConfigError::InvalidValue { field: "Endpoint", .. }
		));
	}

	#[test]
	fn single_peer_binding() {
		let config = parse_config(SAMPLE).unwrap();
		assert!(config.single_peer().is_ok());
	}

	#[test]
	fn binding_rejects_multiple_peers() {
		let a = KeyPair::generate();
		let b = KeyPair::generate();
		let c = KeyPair::generate();
		let config = Config::new(
			Interface::new(a.secret_key().clone()),
			vec![Peer::new(*b.public_key()), Peer::new(*c.public_key())],
		);
		assert!(matches!(
			config.single_peer().unwrap_err(),
			ConfigError::MultiplePeers(2)
		));
	}

	#[test]
	fn binding_rejects_empty_peers() {
		let a = KeyPair::generate();
		let config = Config::new(Interface::new(a.secret_key().clone()), vec![]);
		assert!(matches!(config.single_peer().unwrap_err(), ConfigError::NoPeers));
	}

	#[tokio::test]
	async fn loads_config_from_file() {
		let dir = tempfile::TempDir::new().unwrap();
		let path = dir.path().join("wg0.conf");
		tokio::fs::write(&path, SAMPLE).await.unwrap();

		let config = load_config_file(&path).await.unwrap();
		assert_eq!(config.peers.len(), 1);
	}
}
