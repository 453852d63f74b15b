use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::currency::{self, Amount};
use crate::identity::HolderId;
use crate::product::ProductId;

/// Something observers (UIs, indexers) should hear about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum LedgerEvent {
    ProductCreated {
        id: ProductId,
        name: String,
        manufacturer: HolderId,
    },
    ProductPurchased {
        id: ProductId,
        buyer: HolderId,
        #[serde(with = "currency::as_decimal_string")]
        amount: Amount,
    },
    ProductTransferred {
        id: ProductId,
        from: HolderId,
        to: HolderId,
    },
    StatusUpdated {
        id: ProductId,
        status: String,
    },
}

impl LedgerEvent {
    pub fn product_id(&self) -> &ProductId {
        match self {
            LedgerEvent::ProductCreated { id, .. }
            | LedgerEvent::ProductPurchased { id, .. }
            | LedgerEvent::ProductTransferred { id, .. }
            | LedgerEvent::StatusUpdated { id, .. } => id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            LedgerEvent::ProductCreated { .. } => "ProductCreated",
            LedgerEvent::ProductPurchased { .. } => "ProductPurchased",
            LedgerEvent::ProductTransferred { .. } => "ProductTransferred",
            LedgerEvent::StatusUpdated { .. } => "StatusUpdated",
        }
    }
}

/// A journaled event. `seq` starts at 1 and increases by one per event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub seq: u64,
    pub at: DateTime<Utc>,
    #[serde(flatten)]
    pub event: LedgerEvent,
}
