// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! X25519 key material for tunnel sessions.
//!
//! Keys are opaque 32-byte values in two capability-distinguished variants:
//! a [`SecretKey`] can derive its [`PublicKey`], a public key cannot go the
//! other way. Textual encodings follow the WireGuard convention of padded
//! standard base64 (plus hex for diagnostics). Secret keys never leak through
//! Debug/Display/Serialize and are zeroized on drop.

use crate::secret::Secret;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rand::rngs::OsRng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use thiserror::Error;
use x25519_dalek::{PublicKey as X25519Public, StaticSecret};
use zeroize::Zeroize;

pub const KEY_LEN: usize = 32;

#[derive(Error, Debug)]
pub enum KeyError {
	#[error("invalid key length: expected {KEY_LEN} bytes, got {0}")]
	InvalidLength(usize),

	#[error("invalid base64 encoding: {0}")]
	InvalidBase64(#[from] base64::DecodeError),

	#[error("invalid hex encoding: {0}")]
	InvalidHex(#[from] hex::FromHexError),
}

pub type Result<T> = std::result::Result<T, KeyError>;

fn decode_base64(s: &str) -> Result<[u8; KEY_LEN]> {
	let bytes = STANDARD.decode(s)?;
	if bytes.len() != KEY_LEN {
		return Err(KeyError::InvalidLength(bytes.len()));
	}
	let mut arr = [0u8; KEY_LEN];
	arr.copy_from_slice(&bytes);
	Ok(arr)
}

fn decode_hex(s: &str) -> Result<[u8; KEY_LEN]> {
	let bytes = hex::decode(s)?;
	if bytes.len() != KEY_LEN {
		return Err(KeyError::InvalidLength(bytes.len()));
	}
	let mut arr = [0u8; KEY_LEN];
	arr.copy_from_slice(&bytes);
	Ok(arr)
}

/// A local x25519 secret key.
#[derive(Clone, Zeroize)]
#[zeroize(drop)]
pub struct SecretKey {
	bytes: [u8; KEY_LEN],
}

impl SecretKey {
	pub fn generate() -> Self {
		let secret = StaticSecret::random_from_rng(OsRng);
		Self {
			bytes: secret.to_bytes(),
		}
	}

	pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
		Self { bytes }
	}

	pub fn from_base64(s: &str) -> Result<Self> {
		Ok(Self {
			bytes: decode_base64(s)?,
		})
	}

	pub fn from_hex(s: &str) -> Result<Self> {
		Ok(Self {
			bytes: decode_hex(s)?,
		})
	}

	pub fn to_base64(&self) -> Secret<String> {
		Secret::new(STANDARD.encode(self.bytes))
	}

	pub fn to_hex(&self) -> Secret<String> {
		Secret::new(hex::encode(self.bytes))
	}

	/// Derive the matching public key. Deterministic for a given secret.
	pub fn public_key(&self) -> PublicKey {
		let secret = StaticSecret::from(self.bytes);
		let public = X25519Public::from(&secret);
		PublicKey {
			bytes: *public.as_bytes(),
		}
	}

	pub fn expose_bytes(&self) -> &[u8; KEY_LEN] {
		&self.bytes
	}
}

impl fmt::Debug for SecretKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("SecretKey")
			.field("bytes", &"[REDACTED]")
			.finish()
	}
}

impl fmt::Display for SecretKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str("[REDACTED]")
	}
}

impl Serialize for SecretKey {
	fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.serialize_str("[REDACTED]")
	}
}

impl<'de> Deserialize<'de> for SecretKey {
	fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
	where
		D: Deserializer<'de>,
	{
		let s = String::deserialize(deserializer)?;
		Self::from_base64(&s).map_err(serde::de::Error::custom)
	}
}

/// A remote peer's x25519 public key.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKey {
	bytes: [u8; KEY_LEN],
}

impl PublicKey {
	pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
		Self { bytes }
	}

	pub fn from_base64(s: &str) -> Result<Self> {
		Ok(Self {
			bytes: decode_base64(s)?,
		})
	}

	pub fn from_hex(s: &str) -> Result<Self> {
		Ok(Self {
			bytes: decode_hex(s)?,
		})
	}

	pub fn to_base64(&self) -> String {
		STANDARD.encode(self.bytes)
	}

	pub fn to_hex(&self) -> String {
		hex::encode(self.bytes)
	}

	pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
		&self.bytes
	}
}

impl fmt::Debug for PublicKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let b64 = self.to_base64();
		let prefix = if b64.len() >= 8 { &b64[..8] } else { &b64 };
		f.debug_struct("PublicKey")
			.field("prefix", &format!("{}...", prefix))
			.finish()
	}
}

impl fmt::Display for PublicKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.to_base64())
	}
}

impl Serialize for PublicKey {
	fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.serialize_str(&self.to_base64())
	}
}

impl<'de> Deserialize<'de> for PublicKey {
	fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
	where
		D: Deserializer<'de>,
	{
		let s = String::deserialize(deserializer)?;
		Self::from_base64(&s).map_err(serde::de::Error::custom)
	}
}

/// A 32-byte symmetric pre-shared key mixed into the handshake.
#[derive(Clone, Zeroize)]
#[zeroize(drop)]
pub struct PresharedKey {
	bytes: [u8; KEY_LEN],
}

impl PresharedKey {
	pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
		Self { bytes }
	}

	pub fn from_base64(s: &str) -> Result<Self> {
		Ok(Self {
			bytes: decode_base64(s)?,
		})
	}

	pub fn to_base64(&self) -> Secret<String> {
		Secret::new(STANDARD.encode(self.bytes))
	}

	pub fn expose_bytes(&self) -> &[u8; KEY_LEN] {
		&self.bytes
	}
}

impl fmt::Debug for PresharedKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("PresharedKey")
			.field("bytes", &"[REDACTED]")
			.finish()
	}
}

/// A secret key together with its derived public key.
#[derive(Clone)]
pub struct KeyPair {
	secret: SecretKey,
	public: PublicKey,
}

impl KeyPair {
	pub fn generate() -> Self {
		let secret = SecretKey::generate();
		let public = secret.public_key();
		Self { secret, public }
	}

	pub fn from_secret(secret: SecretKey) -> Self {
		let public = secret.public_key();
		Self { secret, public }
	}

	pub fn from_base64(secret_base64: &str) -> Result<Self> {
		Ok(Self::from_secret(SecretKey::from_base64(secret_base64)?))
	}

	pub fn secret_key(&self) -> &SecretKey {
		&self.secret
	}

	pub fn public_key(&self) -> &PublicKey {
		&self.public
	}
}

impl fmt::Debug for KeyPair {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("KeyPair")
			.field("secret", &self.secret)
			.field("public", &self.public)
			.finish()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;

	// Published vector: deriving from this secret must always yield this public key.
	const VECTOR_SECRET: &str = "YJ1bbwR9OA+7AIZI0fnLA84lcltZXbsXej+rhYZvS3A=";
	const VECTOR_PUBLIC: &str = "JHIy+6HJTke/0WzMVLDsRnV/n/YxfiCSZargR2ZmKAY=";

	#[test]
	fn public_key_derivation_vector() {
		let secret = SecretKey::from_base64(VECTOR_SECRET).unwrap();
		assert_eq!(secret.public_key().to_base64(), VECTOR_PUBLIC);
	}

	#[test]
	fn derivation_is_deterministic() {
		let secret = SecretKey::generate();
		let first = secret.public_key();
		let second = secret.public_key();
		assert_eq!(first.as_bytes(), second.as_bytes());
	}

	#[test]
	fn base64_roundtrip() {
		let keypair = KeyPair::generate();
		let b64 = keypair.secret_key().to_base64();
		let restored = KeyPair::from_base64(b64.expose()).unwrap();
		assert_eq!(keypair.public_key(), restored.public_key());
	}

	#[test]
	fn rejects_wrong_length_base64() {
		let err = SecretKey::from_base64(&STANDARD.encode([0u8; 16])).unwrap_err();
		assert!(matches!(err, KeyError::InvalidLength(16)));
	}

	#[test]
	fn rejects_malformed_base64() {
		assert!(PublicKey::from_base64("not!!valid@@base64").is_err());
	}

	#[test]
	fn rejects_wrong_length_hex() {
		let err = SecretKey::from_hex(&hex::encode([0u8; 31])).unwrap_err();
		assert!(matches!(err, KeyError::InvalidLength(31)));
	}

	#[test]
	fn secret_key_debug_is_redacted() {
		let secret = SecretKey::from_base64(VECTOR_SECRET).unwrap();
		let debug = format!("{:?}", secret);
		assert!(debug.contains("[REDACTED]"));
		assert!(!debug.contains(VECTOR_SECRET));
	}

	#[test]
	fn secret_key_serialize_is_redacted() {
		let secret = SecretKey::from_base64(VECTOR_SECRET).unwrap();
		let json = serde_json::to_string(&secret).unwrap();
		assert!(json.contains("[REDACTED]"));
		assert!(!json.contains(VECTOR_SECRET));
	}

	#[test]
	fn public_key_display_is_full_base64() {
		let keypair = KeyPair::generate();
		assert_eq!(
			format!("{}", keypair.public_key()),
			keypair.public_key().to_base64()
		);
	}

	#[test]
	fn public_key_serde_roundtrip() {
		let keypair = KeyPair::generate();
		let json = serde_json::to_string(keypair.public_key()).unwrap();
		let restored: PublicKey = serde_json::from_str(&json).unwrap();
		assert_eq!(keypair.public_key(), &restored);
	}

	proptest! {
		#[test]
		fn base64_roundtrip_any_key(seed in prop::array::uniform32(any::<u8>())) {
			let public = PublicKey::from_bytes(seed);
			let restored = PublicKey::from_base64(&public.to_base64()).unwrap();
			prop_assert_eq!(public.as_bytes(), restored.as_bytes());
		}

		#[test]
		fn hex_roundtrip_any_key(seed in prop::array::uniform32(any::<u8>())) {
			let public = PublicKey::from_bytes(seed);
			let restored = PublicKey::from_hex(&public.to_hex()).unwrap();
			prop_assert_eq!(public.as_bytes(), restored.as_bytes());
		}

		#[test]
		fn derivation_deterministic_any_secret(seed in prop::array::uniform32(any::<u8>())) {
			let secret = SecretKey::from_bytes(seed);
			let first = secret.public_key();
			let second = secret.public_key();
			prop_assert_eq!(first.as_bytes(), second.as_bytes());
		}

		#[test]
		fn secret_key_never_leaks(seed in prop::array::uniform32(any::<u8>())) {
			let secret = SecretKey::from_bytes(seed);
			let b64 = STANDARD.encode(seed);
			let hex_str = hex::encode(seed);

			let debug = format!("{:?}", secret);
			prop_assert!(!debug.contains(&b64));
			prop_assert!(!debug.contains(&hex_str));

			let display = format!("{}", secret);
			prop_assert_eq!(display, "[REDACTED]");
		}
	}
}
