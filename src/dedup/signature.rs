//! Content signatures for near-duplicate detection.
//!
//! A signature is the CRC32 of a normalized, bounded prefix of a text batch:
//! 1. Trim, lower-case and collapse whitespace runs
//! 2. Keep the first `SIGNATURE_PREFIX_CHARS` characters
//! 3. Hash the prefix
//!
//! Cache keys scope a signature to the page it came from: `url_hash:signature`.

use std::fmt::Display;
use std::ops::Deref;

use serde::{Deserialize, Serialize};

/// Number of normalized characters that feed the signature hash.
pub const SIGNATURE_PREFIX_CHARS: usize = 300;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentSignature(String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl Display for ContentSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Deref for ContentSignature {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Deref for CacheKey {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<&str> for CacheKey {
    fn from(key: &str) -> Self {
        CacheKey(key.to_string())
    }
}

impl From<String> for CacheKey {
    fn from(key: String) -> Self {
        CacheKey(key)
    }
}

/// Lower-case the text and collapse every whitespace run into one space.
pub fn normalize(text: &str) -> String {
    text.split_whitespace()
        .map(|word| word.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Signature over the default prefix length.
pub fn generate_signature(text: &str) -> ContentSignature {
    generate_signature_with(text, SIGNATURE_PREFIX_CHARS)
}

/// Signature over the first `prefix_chars` normalized characters.
pub fn generate_signature_with(text: &str, prefix_chars: usize) -> ContentSignature {
    let normalized = normalize(text);
    let prefix: String = normalized.chars().take(prefix_chars).collect();

    ContentSignature(hash_hex(prefix.as_bytes()))
}

pub fn url_hash(url: &str) -> String {
    hash_hex(url.as_bytes())
}

pub fn cache_key(source_url: &str, signature: &ContentSignature) -> CacheKey {
    CacheKey(format!("{}:{}", url_hash(source_url), signature))
}

fn hash_hex(data: &[u8]) -> String {
    format!("{:08x}", crc32fast::hash(data))
}
