use thiserror::Error;

use crate::currency::{Amount, AmountError};
use crate::identity::IdentityError;
use crate::product::{InvariantViolation, ProductId};

/// Rule violations. Every one is detected before the ledger changes anything.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("product {0} already exists")]
    DuplicateIdentifier(ProductId),

    #[error("product {0} not found")]
    NotFound(ProductId),

    #[error("cannot buy your own product")]
    SelfPurchase,

    #[error("insufficient payment: price is {required} wei, offered {offered} wei")]
    InsufficientPayment { required: Amount, offered: Amount },

    #[error("only the current holder may do this")]
    Unauthorized,

    #[error("invalid recipient: {0}")]
    InvalidRecipient(String),

    #[error("invalid price: {0}")]
    InvalidPrice(#[source] AmountError),

    #[error("status must not be empty")]
    EmptyStatus,

    #[error("product identifier must not be empty")]
    InvalidIdentifier,

    #[error("invalid payment: {0}")]
    InvalidPayment(#[source] AmountError),

    #[error("overpayment rejected: price is {required} wei, offered {offered} wei")]
    Overpayment { required: Amount, offered: Amount },
}

impl LedgerError {
    /// Stable machine-readable code for wire responses.
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::DuplicateIdentifier(_) => "duplicate_identifier",
            LedgerError::NotFound(_) => "not_found",
            LedgerError::SelfPurchase => "self_purchase",
            LedgerError::InsufficientPayment { .. } => "insufficient_payment",
            LedgerError::Unauthorized => "unauthorized",
            LedgerError::InvalidRecipient(_) => "invalid_recipient",
            LedgerError::InvalidPrice(_) => "invalid_price",
            LedgerError::EmptyStatus => "empty_status",
            LedgerError::InvalidIdentifier => "invalid_identifier",
            LedgerError::InvalidPayment(_) => "invalid_payment",
            LedgerError::Overpayment { .. } => "overpayment",
        }
    }
}

impl From<IdentityError> for LedgerError {
    fn from(error: IdentityError) -> Self {
        LedgerError::InvalidRecipient(error.to_string())
    }
}

/// Why a persisted snapshot could not be restored.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SnapshotError {
    #[error("product stored under {key} has id {id}")]
    KeyMismatch { key: ProductId, id: ProductId },

    #[error("product {id}: {violation}")]
    Invariant {
        id: ProductId,
        violation: InvariantViolation,
    },

    #[error("event journal is out of order at seq {0}")]
    JournalOrder(u64),

    #[error("transaction id {0} leaves no room for further credits")]
    TransactionIdOverflow(u64),
}
