// src/fingerprint.rs
//! Fixed-size digests used in place of large-object comparisons.
//!
//! SHA-256, lowercase hex. Only equality matters here; nothing is
//! authenticated with these values.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt::Write as _;

use crate::fetch::Observation;

/// SHA-256 of the empty byte sequence. Absent and empty payloads map here.
pub const EMPTY_DIGEST: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

/// Digest of an optional payload; `None` yields [`EMPTY_DIGEST`].
pub fn digest<P: AsRef<[u8]>>(payload: Option<P>) -> String {
    match payload {
        Some(p) => digest_bytes(p.as_ref()),
        None => EMPTY_DIGEST.to_string(),
    }
}

pub fn digest_bytes(bytes: &[u8]) -> String {
    if bytes.is_empty() {
        return EMPTY_DIGEST.to_string();
    }
    let hash = Sha256::digest(bytes);
    let mut out = String::with_capacity(64);
    for b in hash.iter() {
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

pub fn digest_str(text: &str) -> String {
    digest_bytes(text.as_bytes())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FingerprintSet {
    pub markup_digest: String,
    pub text_digest: String,
    pub image_digest: String,
}

impl FingerprintSet {
    /// Fingerprint an observation. The text digest covers the normalized text,
    /// not whatever the fetcher reported.
    pub fn of(obs: &Observation, normalized_text: &str) -> Self {
        Self {
            markup_digest: digest_str(&obs.markup),
            text_digest: digest_str(normalized_text),
            image_digest: digest_bytes(&obs.image),
        }
    }

    /// All three digests of an empty observation.
    pub fn empty() -> Self {
        Self {
            markup_digest: EMPTY_DIGEST.to_string(),
            text_digest: EMPTY_DIGEST.to_string(),
            image_digest: EMPTY_DIGEST.to_string(),
        }
    }
}
