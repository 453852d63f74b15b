use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use ed25519_dalek::VerifyingKey;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// An account identity: the ed25519 public key of whoever signs for it.
///
/// Manufacturers, holders, buyers and recipients are all `HolderId`s.
#[derive(Clone, Copy)]
pub struct HolderId(pub VerifyingKey);

impl HolderId {
    pub fn as_bytes(&self) -> &[u8; 32] {
        self.0.as_bytes()
    }

    /// False for small-order keys. Nobody can sign for one, so custody must
    /// never be handed to it.
    pub fn is_well_formed(&self) -> bool {
        !self.0.is_weak()
    }

    /// Lowercase hex form, 64 characters.
    pub fn to_hex(&self) -> String {
        hex::encode(self.as_bytes())
    }
}

impl From<VerifyingKey> for HolderId {
    fn from(key: VerifyingKey) -> Self {
        Self(key)
    }
}

impl PartialEq for HolderId {
    fn eq(&self, other: &Self) -> bool {
        self.0.as_bytes() == other.0.as_bytes()
    }
}
impl Eq for HolderId {}

impl PartialOrd for HolderId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for HolderId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.as_bytes().cmp(other.0.as_bytes())
    }
}
impl Hash for HolderId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.as_bytes().hash(state);
    }
}

impl fmt::Display for HolderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for HolderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HolderId({})", self.to_hex())
    }
}

/// Why a string could not be read as a [`HolderId`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    #[error("identity must be 64 hex characters, got {0}")]
    Length(usize),
    #[error("identity is not valid hex")]
    NotHex,
    #[error("identity is not a valid ed25519 public key")]
    NotAKey,
}

impl FromStr for HolderId {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.len() != 64 {
            return Err(IdentityError::Length(s.len()));
        }
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s, &mut bytes).map_err(|_| IdentityError::NotHex)?;
        VerifyingKey::from_bytes(&bytes)
            .map(HolderId)
            .map_err(|_| IdentityError::NotAKey)
    }
}

// Hex on the wire so identities can key JSON maps.
impl Serialize for HolderId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for HolderId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
