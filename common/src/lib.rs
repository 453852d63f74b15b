//! Chain-of-custody ledger for physical goods.
//!
//! A [`ProductLedger`] owns every [`Product`] record. Records are created by
//! a manufacturer, change hands by purchase or explicit transfer, and keep an
//! append-only history of every holder. The ledger performs no I/O: the host
//! process decides how callers are authenticated, where snapshots live and
//! who hears about events.

pub mod command;
pub mod currency;
pub mod error;
pub mod event;
pub mod identity;
pub mod ledger;
pub mod product;
pub mod wallet;

pub use command::{LedgerCommand, SignedCommand};
pub use currency::Amount;
pub use error::{LedgerError, SnapshotError};
pub use event::{EventRecord, LedgerEvent};
pub use identity::HolderId;
pub use ledger::{LedgerConfig, LedgerSnapshot, OverpaymentPolicy, ProductLedger, Receipt};
pub use product::{NewProduct, Product, ProductDraft, ProductId};
