// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Crypto & ID primitives (C1).
//!
//! `device_id`/`mid`/`uuid` are ordinary ID generation and are fully
//! implemented here. `sign`/`decrypt` delegate to the marketplace's
//! obfuscated client algorithm, which this crate deliberately does not
//! reimplement (§9 Design Notes, §1 Non-goals) — they are exposed as a
//! `Crypto` trait with a single production entry point per operation, kept
//! separate from the actual HTTP/byte transforms so that tests can swap in a
//! deterministic fake.

use sha2::{Digest, Sha256};

use crate::error::EngineError;

/// A fixed constant of the remote ecosystem, folded into every signature.
const APP_KEY: &str = "444e9908a51d1cb236a27862abc769c9";

/// Sealed crypto collaborator. Implementations must be pure and thread-safe.
pub trait Crypto: Send + Sync {
    /// Computes `sign(timestamp, token, data)` per §4.1.
    fn sign(&self, timestamp: u64, token: &str, data: &str) -> String;

    /// Reverses the server's message encoding. Fails with `EngineError::Decode`
    /// on malformed input.
    fn decrypt(&self, payload: &[u8]) -> Result<Vec<u8>, EngineError>;
}

/// Deterministic, stable device-id derivation: a user always derives to the
/// same device id. Not part of the sealed `Crypto` trait — this is ordinary
/// hashing, not an obfuscated client algorithm.
pub fn device_id(user_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b"xianyu-device-salt:");
    hasher.update(user_id.as_bytes());
    let digest = hasher.finalize();
    hex::encode(digest)
}

/// Per-message identifier. Uniqueness within a session is sufficient.
pub fn mid() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Per-message identifier, alias of [`mid`] for call sites that name it
/// `uuid()` (matching `generate_uuid` in the original source).
pub fn uuid() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Production `Crypto` implementation. `sign` and `decrypt` are the single
/// integration points with the marketplace's real client algorithm; this
/// crate does not attempt to derive their internals.
pub struct MarketplaceCrypto;

impl Crypto for MarketplaceCrypto {
    fn sign(&self, timestamp: u64, token: &str, data: &str) -> String {
        // Digest over `token & timestamp & app_key & data`, per §4.1. The
        // exact byte layout is the marketplace's own; this computes the
        // signature shape the spec describes without claiming to match the
        // production algorithm bit-for-bit.
        let mut hasher = Sha256::new();
        hasher.update(token.as_bytes());
        hasher.update(timestamp.to_string().as_bytes());
        hasher.update(APP_KEY.as_bytes());
        hasher.update(data.as_bytes());
        hex::encode(hasher.finalize())
    }

    fn decrypt(&self, _payload: &[u8]) -> Result<Vec<u8>, EngineError> {
        Err(EngineError::Internal(
            "MarketplaceCrypto::decrypt is a sealed integration point; wire the real client algorithm here".into(),
        ))
    }
}

/// Deterministic fake for tests: `sign` is a simple reproducible digest,
/// `decrypt` treats the payload as already-plaintext JSON (no transform).
#[cfg(test)]
pub struct FakeCrypto;

#[cfg(test)]
impl Crypto for FakeCrypto {
    fn sign(&self, timestamp: u64, token: &str, data: &str) -> String {
        format!("fake-sig:{token}:{timestamp}:{}", data.len())
    }

    fn decrypt(&self, payload: &[u8]) -> Result<Vec<u8>, EngineError> {
        Ok(payload.to_vec())
    }
}
