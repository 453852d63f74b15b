use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::currency::{self, Amount};
use crate::identity::HolderId;
use crate::product::ProductId;

/// A single settlement credit in an account.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WalletTransaction {
    /// Ledger-wide, monotonically increasing.
    pub id: u64,
    #[serde(with = "currency::as_decimal_string")]
    pub amount: Amount,
    pub product_id: ProductId,
    /// The other side of the payment: the buyer for sale proceeds, the seller
    /// for refunds.
    pub counterparty: HolderId,
    pub memo: String,
    pub timestamp: DateTime<Utc>,
}

/// Append-only settlement history for one identity.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub entries: Vec<WalletTransaction>,
}

impl Account {
    /// Derive the balance from the entries.
    pub fn balance(&self) -> Amount {
        self.entries
            .iter()
            .fold(0, |acc: Amount, tx| acc.saturating_add(tx.amount))
    }

    pub(crate) fn record(&mut self, tx: WalletTransaction) {
        self.entries.push(tx);
    }
}
