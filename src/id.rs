//! Platform identifiers.
//!
//! Orgs, stacks, users and backend resources are addressed by a 64-bit ID
//! written as exactly 16 lowercase hex characters. Zero is never valid.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;
use uuid::Uuid;

/// Encoded length of a platform ID.
pub const ID_LENGTH: usize = 16;

/// Reasons an ID string is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdError {
    /// Wrong number of characters.
    #[error("id must have a length of {ID_LENGTH} bytes, got {0}")]
    Length(usize),
    /// Non-hex characters.
    #[error("id contains non-hexadecimal characters")]
    NotHex,
    /// The all-zero ID.
    #[error("id cannot be zero")]
    Zero,
}

/// A 64-bit platform identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlatformId(u64);

impl PlatformId {
    /// Creates an ID from a raw value, rejecting zero.
    ///
    /// # Errors
    ///
    /// Returns `IdError::Zero` for the zero value.
    pub const fn new(value: u64) -> Result<Self, IdError> {
        if value == 0 {
            Err(IdError::Zero)
        } else {
            Ok(Self(value))
        }
    }

    /// Generates a random non-zero ID.
    #[must_use]
    pub fn generate() -> Self {
        loop {
            let bytes = Uuid::new_v4().into_bytes();
            let mut head = [0_u8; 8];
            head.copy_from_slice(&bytes[..8]);
            let value = u64::from_be_bytes(head);
            if value != 0 {
                return Self(value);
            }
        }
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for PlatformId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl FromStr for PlatformId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != ID_LENGTH {
            return Err(IdError::Length(s.len()));
        }
        if !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(IdError::NotHex);
        }
        let value = u64::from_str_radix(s, 16).map_err(|_| IdError::NotHex)?;
        Self::new(value)
    }
}

impl Serialize for PlatformId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PlatformId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
