//! Content addressing for braid.
//!
//! Two small, deterministic primitives that every other component leans on:
//!
//! - [`ContentHash`]: a validated 64-character lowercase hex SHA-256 digest
//!   of exact file bytes. Identical content always hashes identically; no
//!   normalization is applied before hashing.
//! - [`storage_key`]: a collision-avoiding flattening of a file path into a
//!   single token usable as an on-disk record name. Both path separators and
//!   the extension dot map to one neutral separator so that paths differing
//!   only in separators stay distinct from each other's siblings.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

// ---------------------------------------------------------------------------
// ContentHash
// ---------------------------------------------------------------------------

/// A validated 64-character lowercase hex SHA-256 digest.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentHash(String);

impl ContentHash {
    /// Create a `ContentHash` from a hex string, validating format.
    ///
    /// # Errors
    /// Returns an error if the string is not exactly 64 lowercase hex
    /// characters.
    pub fn new(s: &str) -> Result<Self, ValidationError> {
        Self::validate(s)?;
        Ok(Self(s.to_owned()))
    }

    /// Return the inner hex string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn validate(s: &str) -> Result<(), ValidationError> {
        if s.len() != 64 {
            return Err(ValidationError {
                kind: ErrorKind::ContentHash,
                value: s.to_owned(),
                reason: format!("expected 64 hex characters, got {}", s.len()),
            });
        }
        if !s
            .chars()
            .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase())
        {
            return Err(ValidationError {
                kind: ErrorKind::ContentHash,
                value: s.to_owned(),
                reason: "must contain only lowercase hex characters (0-9, a-f)".to_owned(),
            });
        }
        Ok(())
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ContentHash {
    type Err = ValidationError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for ContentHash {
    type Error = ValidationError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::validate(&s)?;
        Ok(Self(s))
    }
}

impl From<ContentHash> for String {
    fn from(hash: ContentHash) -> Self {
        hash.0
    }
}

/// Hash exact content bytes into a [`ContentHash`].
///
/// Deterministic: the same bytes always produce the same digest. Distinct
/// inputs produce distinct digests with overwhelming probability.
#[must_use]
pub fn hash_content(content: &str) -> ContentHash {
    use fmt::Write as _;

    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let digest = hasher.finalize();
    let mut hex = String::with_capacity(64);
    for byte in digest {
        let _ = write!(hex, "{byte:02x}");
    }
    ContentHash(hex)
}

// ---------------------------------------------------------------------------
// Storage keys
// ---------------------------------------------------------------------------

/// Derive a flat storage key from a file path.
///
/// Replaces both path separators (`/` and `\`) and dots with `_`, so the
/// result is a single token with no separator or extension characters:
///
/// ```
/// use braid::hash::storage_key;
/// use std::path::Path;
///
/// assert_eq!(storage_key(Path::new("src/app/main.py")), "src_app_main_py");
/// assert_eq!(storage_key(Path::new("src\\app\\main.py")), "src_app_main_py");
/// ```
///
/// Deterministic by construction; distinct plausible repository paths map to
/// distinct keys because every separator occupies its own `_` slot.
#[must_use]
pub fn storage_key(path: &Path) -> String {
    path.to_string_lossy()
        .chars()
        .map(|c| match c {
            '/' | '\\' | '.' => '_',
            other => other,
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Validation errors
// ---------------------------------------------------------------------------

/// The kind of value that failed validation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// A [`ContentHash`] validation error.
    ContentHash,
    /// A task identifier validation error.
    TaskId,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ContentHash => write!(f, "ContentHash"),
            Self::TaskId => write!(f, "TaskId"),
        }
    }
}

/// A validation error for braid core types.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidationError {
    /// What kind of value was being validated.
    pub kind: ErrorKind,
    /// The invalid value.
    pub value: String,
    /// Human-readable explanation.
    pub reason: String,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid {}: {:?}, {}",
            self.kind, self.value, self.reason
        )
    }
}

impl std::error::Error for ValidationError {}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
