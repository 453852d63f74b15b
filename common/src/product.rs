use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::currency::{self, Amount};
use crate::error::LedgerError;
use crate::identity::HolderId;

/// Unique product identifier, chosen by the manufacturer (e.g. `"DRUG001"`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(pub String);

impl ProductId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProductId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A tracked good and its chain of custody.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub batch: String,
    pub status: String,
    /// External content reference, e.g. an IPFS hash of the batch paperwork.
    pub document_reference: String,
    pub manufacturer: HolderId,
    pub current_holder: HolderId,
    /// Price in wei. Fixed at creation.
    #[serde(with = "currency::as_decimal_string")]
    pub price: Amount,
    /// Set by the first purchase and never cleared.
    pub sold: bool,
    /// Every holder so far, oldest first. Starts with the manufacturer.
    pub history: Vec<HolderId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A record that breaks one of the custody invariants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvariantViolation {
    EmptyHistory,
    HistoryNotRootedAtManufacturer,
    HistoryNotEndingAtHolder,
}

impl fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyHistory => write!(f, "history is empty"),
            Self::HistoryNotRootedAtManufacturer => {
                write!(f, "history does not start with the manufacturer")
            }
            Self::HistoryNotEndingAtHolder => {
                write!(f, "history does not end with the current holder")
            }
        }
    }
}

impl Product {
    pub(crate) fn new(fields: NewProduct, manufacturer: HolderId, now: DateTime<Utc>) -> Self {
        Self {
            id: fields.id,
            name: fields.name,
            batch: fields.batch,
            status: fields.status,
            document_reference: fields.document_reference,
            manufacturer,
            current_holder: manufacturer,
            price: fields.price,
            sold: false,
            history: vec![manufacturer],
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_held_by(&self, holder: &HolderId) -> bool {
        self.current_holder == *holder
    }

    /// Hand custody to `holder` and record it in the history.
    pub(crate) fn hand_to(&mut self, holder: HolderId, now: DateTime<Utc>) {
        self.current_holder = holder;
        self.history.push(holder);
        self.updated_at = now;
    }

    pub fn check_invariants(&self) -> Result<(), InvariantViolation> {
        let (first, last) = match (self.history.first(), self.history.last()) {
            (Some(first), Some(last)) => (first, last),
            _ => return Err(InvariantViolation::EmptyHistory),
        };
        if *first != self.manufacturer {
            return Err(InvariantViolation::HistoryNotRootedAtManufacturer);
        }
        if *last != self.current_holder {
            return Err(InvariantViolation::HistoryNotEndingAtHolder);
        }
        Ok(())
    }
}

/// Typed creation payload.
#[derive(Debug, Clone, PartialEq)]
pub struct NewProduct {
    pub id: ProductId,
    pub name: String,
    pub batch: String,
    pub price: Amount,
    pub status: String,
    pub document_reference: String,
}

/// Creation payload as it arrives from a client, price still as text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductDraft {
    pub id: String,
    pub name: String,
    pub batch: String,
    /// Accepts anything [`currency::parse_amount`] does, e.g. `"1 ether"`.
    pub price: String,
    pub status: String,
    #[serde(default)]
    pub document_reference: String,
}

impl ProductDraft {
    pub fn into_new_product(self) -> Result<NewProduct, LedgerError> {
        let price = currency::parse_amount(&self.price).map_err(LedgerError::InvalidPrice)?;
        Ok(NewProduct {
            id: ProductId(self.id),
            name: self.name,
            batch: self.batch,
            price,
            status: self.status,
            document_reference: self.document_reference,
        })
    }
}
