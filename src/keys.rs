use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use curve25519_dalek::scalar;
use rand::TryRngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use thiserror::Error;
use x25519_dalek::StaticSecret;

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("system RNG failure: {0}")]
    Rng(String),

    #[error("invalid base64 key material: {0}")]
    Encoding(#[from] base64::DecodeError),

    #[error("key must be 32 bytes, got {0}")]
    Length(usize),
}

/// A WireGuard Curve25519 private key. Clamped at generation time, so the
/// base64 form matches what `wg genkey` would emit.
#[derive(Clone, PartialEq, Eq)]
pub struct PrivateKey([u8; 32]);

/// The Curve25519 public key matching a [`PrivateKey`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublicKey([u8; 32]);

pub fn generate_private_key() -> Result<PrivateKey, KeyError> {
    let mut bytes = [0u8; 32];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| KeyError::Rng(e.to_string()))?;
    Ok(PrivateKey(scalar::clamp_integer(bytes)))
}

pub fn derive_public_key(private_key: &PrivateKey) -> PublicKey {
    let secret = StaticSecret::from(private_key.0);
    PublicKey(*x25519_dalek::PublicKey::from(&secret).as_bytes())
}

fn decode32(encoded: &str) -> Result<[u8; 32], KeyError> {
    let bytes = STANDARD.decode(encoded.trim())?;
    let len = bytes.len();
    bytes.try_into().map_err(|_| KeyError::Length(len))
}

impl PrivateKey {
    pub fn from_base64(encoded: &str) -> Result<Self, KeyError> {
        Ok(Self(decode32(encoded)?))
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.0)
    }
}

impl PublicKey {
    pub fn from_base64(encoded: &str) -> Result<Self, KeyError> {
        Ok(Self(decode32(encoded)?))
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.0)
    }
}

// Keep private key material out of logs.
impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PrivateKey(..)")
    }
}

impl Serialize for PrivateKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_base64())
    }
}

impl<'de> Deserialize<'de> for PrivateKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        PrivateKey::from_base64(&encoded).map_err(serde::de::Error::custom)
    }
}
