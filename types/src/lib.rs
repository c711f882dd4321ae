//! Core domain types for sieve.
//!
//! This crate contains pure domain types with no IO, no async, and minimal dependencies.
//! Everything here can be used from any layer of the pipeline.

// Pedantic lint configuration - these are intentional design choices
#![allow(clippy::missing_errors_doc)] // Result-returning functions are self-explanatory

mod checkpoint;
mod validation;

pub use checkpoint::{
    CheckpointState, IdentityRecord, InvalidCandidate, RunSummary, SourceFingerprint,
};
pub use validation::{Activity, RemoteError, RemoteErrorKind, ValidationResult};

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Number of characters in a candidate body.
pub const BODY_LEN: usize = 56;
/// Number of checksum characters appended to a body.
pub const CHECKSUM_LEN: usize = 4;
/// Number of characters in a full identity.
pub const IDENTITY_LEN: usize = BODY_LEN + CHECKSUM_LEN;
/// Number of bytes in a decoded key.
pub const KEY_LEN: usize = 32;

// ============================================================================
// Candidate
// ============================================================================

/// Why a raw candidate string could not be used as a body.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CandidateFormatError {
    #[error("expected {expected} characters, found {actual}")]
    WrongLength { expected: usize, actual: usize },
    #[error("non-alphabetic character {found:?} at position {position}")]
    NonAlphabetic { position: usize, found: char },
}

/// Canonical form of raw candidate input: surrounding whitespace trimmed, ASCII uppercased.
///
/// Canonicalization never fails; malformed strings are still recorded verbatim
/// (in canonical form) as invalid candidates.
#[must_use]
pub fn canonicalize(raw: &str) -> String {
    raw.trim().to_ascii_uppercase()
}

/// A validated 56-character A-Z body.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Candidate(String);

impl Candidate {
    /// Canonicalize and validate a raw candidate.
    pub fn parse(raw: &str) -> Result<Self, CandidateFormatError> {
        let canonical = canonicalize(raw);
        check_alphabet(&canonical, BODY_LEN)?;
        Ok(Self(canonical))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl TryFrom<String> for Candidate {
    type Error = CandidateFormatError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Candidate> for String {
    fn from(value: Candidate) -> Self {
        value.0
    }
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn check_alphabet(value: &str, expected: usize) -> Result<(), CandidateFormatError> {
    let actual = value.chars().count();
    if actual != expected {
        return Err(CandidateFormatError::WrongLength { expected, actual });
    }
    if let Some((position, found)) = value
        .chars()
        .enumerate()
        .find(|(_, c)| !c.is_ascii_uppercase())
    {
        return Err(CandidateFormatError::NonAlphabetic { position, found });
    }
    Ok(())
}

// ============================================================================
// Key, checksum, identity
// ============================================================================

/// A 32-byte key decoded from a body.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKey([u8; KEY_LEN]);

impl PublicKey {
    #[must_use]
    pub const fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    #[must_use]
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }

    pub fn from_hex(value: &str) -> Result<Self, KeyParseError> {
        if value.len() != KEY_LEN * 2 || !value.is_ascii() {
            return Err(KeyParseError);
        }
        let mut bytes = [0u8; KEY_LEN];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&value[i * 2..i * 2 + 2], 16).map_err(|_| KeyParseError)?;
        }
        Ok(Self(bytes))
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.to_hex())
    }
}

impl Serialize for PublicKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::from_hex(&raw).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("public key must be 64 hex characters")]
pub struct KeyParseError;

/// Four A-Z checksum characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Checksum([u8; CHECKSUM_LEN]);

impl Checksum {
    /// Build from base-26 digit values (each must be < 26).
    #[must_use]
    pub fn from_digits(digits: [u8; CHECKSUM_LEN]) -> Self {
        Self(digits.map(|d| b'A' + (d % 26)))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        // Invariant: always four ASCII uppercase letters.
        std::str::from_utf8(&self.0).unwrap_or("????")
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A 60-character identity: body followed by checksum.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identity(String);

impl Identity {
    #[must_use]
    pub fn from_parts(body: &Candidate, checksum: &Checksum) -> Self {
        let mut value = String::with_capacity(IDENTITY_LEN);
        value.push_str(body.as_str());
        value.push_str(checksum.as_str());
        Self(value)
    }

    /// Validate the shape of an identity string (length and alphabet only).
    ///
    /// Checksum agreement is checked by the codec, not here.
    pub fn parse(raw: &str) -> Result<Self, CandidateFormatError> {
        let canonical = canonicalize(raw);
        check_alphabet(&canonical, IDENTITY_LEN)?;
        Ok(Self(canonical))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn body(&self) -> &str {
        &self.0[..BODY_LEN]
    }

    #[must_use]
    pub fn checksum(&self) -> &str {
        &self.0[BODY_LEN..]
    }

    /// Character at `position`, or `None` past the end.
    #[must_use]
    pub fn char_at(&self, position: usize) -> Option<u8> {
        self.0.as_bytes().get(position).copied()
    }
}

impl TryFrom<String> for Identity {
    type Error = CandidateFormatError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Identity> for String {
    fn from(value: Identity) -> Self {
        value.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
