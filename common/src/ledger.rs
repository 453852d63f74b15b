//! The product ledger: the only thing allowed to change a [`Product`].
//!
//! Every mutating operation takes the authenticated caller explicitly, checks
//! all of its rules against the current state, and only then applies its
//! effects. An `Err` therefore always means nothing changed.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::command::LedgerCommand;
use crate::currency::{self, Amount};
use crate::error::{LedgerError, SnapshotError};
use crate::event::{EventRecord, LedgerEvent};
use crate::identity::HolderId;
use crate::product::{NewProduct, Product, ProductId};
use crate::wallet::{Account, WalletTransaction};

/// What happens to the part of a payment above the price.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverpaymentPolicy {
    /// Seller gets the price, buyer is credited the excess.
    #[default]
    Refund,
    /// Seller gets the whole payment.
    Forfeit,
    /// Payments above the price are refused.
    Reject,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerConfig {
    #[serde(default)]
    pub overpayment: OverpaymentPolicy,
}

/// Result of a successful mutation: the record as it now stands and the
/// event it produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Receipt {
    pub product: Product,
    pub event: EventRecord,
}

/// Everything the ledger owns, in a form that can be written to disk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub products: BTreeMap<ProductId, Product>,
    #[serde(default)]
    pub accounts: BTreeMap<HolderId, Account>,
    #[serde(default)]
    pub events: Vec<EventRecord>,
    #[serde(default)]
    pub next_tx_id: u64,
}

#[derive(Debug, Clone, Default)]
pub struct ProductLedger {
    config: LedgerConfig,
    products: BTreeMap<ProductId, Product>,
    accounts: BTreeMap<HolderId, Account>,
    events: Vec<EventRecord>,
    next_tx_id: u64,
}

impl ProductLedger {
    pub fn new(config: LedgerConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn len(&self) -> usize {
        self.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }

    // ─── Mutations ──────────────────────────────────────────────────────────

    /// Register a new product with `caller` as manufacturer and first holder.
    pub fn create(&mut self, new: NewProduct, caller: HolderId) -> Result<Receipt, LedgerError> {
        self.check_new_id(&new.id)?;
        let now = Utc::now();
        let product = Product::new(new, caller, now);
        self.products.insert(product.id.clone(), product.clone());

        let event = self.emit(
            now,
            LedgerEvent::ProductCreated {
                id: product.id.clone(),
                name: product.name.clone(),
                manufacturer: caller,
            },
        );
        Ok(Receipt { product, event })
    }

    /// Buy the product from its current holder.
    ///
    /// Allowed any number of times, by anyone but the current holder. The
    /// prior holder is credited the price; the excess follows the configured
    /// [`OverpaymentPolicy`].
    pub fn purchase(
        &mut self,
        id: &ProductId,
        payment: Amount,
        caller: HolderId,
    ) -> Result<Receipt, LedgerError> {
        let overpayment = self.config.overpayment;
        let product = self
            .products
            .get_mut(id)
            .ok_or_else(|| LedgerError::NotFound(id.clone()))?;
        if product.is_held_by(&caller) {
            return Err(LedgerError::SelfPurchase);
        }
        if payment < product.price {
            return Err(LedgerError::InsufficientPayment {
                required: product.price,
                offered: payment,
            });
        }
        let excess = payment - product.price;
        if excess > 0 && overpayment == OverpaymentPolicy::Reject {
            return Err(LedgerError::Overpayment {
                required: product.price,
                offered: payment,
            });
        }

        let now = Utc::now();
        let seller = product.current_holder;
        let price = product.price;
        product.hand_to(caller, now);
        product.sold = true;
        debug_assert!(product.check_invariants().is_ok());
        let product = product.clone();

        match overpayment {
            OverpaymentPolicy::Forfeit => {
                self.credit(seller, payment, id, caller, "sale proceeds", now);
            }
            OverpaymentPolicy::Refund | OverpaymentPolicy::Reject => {
                self.credit(seller, price, id, caller, "sale proceeds", now);
                self.credit(caller, excess, id, seller, "overpayment refund", now);
            }
        }

        let event = self.emit(
            now,
            LedgerEvent::ProductPurchased {
                id: id.clone(),
                buyer: caller,
                amount: payment,
            },
        );
        Ok(Receipt { product, event })
    }

    /// Hand the product to `recipient` without payment.
    pub fn transfer(
        &mut self,
        id: &ProductId,
        recipient: HolderId,
        caller: HolderId,
    ) -> Result<Receipt, LedgerError> {
        let product = self
            .products
            .get_mut(id)
            .ok_or_else(|| LedgerError::NotFound(id.clone()))?;
        if !product.is_held_by(&caller) {
            return Err(LedgerError::Unauthorized);
        }
        if !recipient.is_well_formed() {
            return Err(LedgerError::InvalidRecipient(
                "recipient is a small-order key".into(),
            ));
        }
        if product.is_held_by(&recipient) {
            return Err(LedgerError::InvalidRecipient(
                "recipient already holds the product".into(),
            ));
        }

        let now = Utc::now();
        let from = product.current_holder;
        product.hand_to(recipient, now);
        debug_assert!(product.check_invariants().is_ok());
        let product = product.clone();

        let event = self.emit(
            now,
            LedgerEvent::ProductTransferred {
                id: id.clone(),
                from,
                to: recipient,
            },
        );
        Ok(Receipt { product, event })
    }

    /// Replace the free-form status. Not an ownership event, so the history
    /// is left alone.
    pub fn update_status(
        &mut self,
        id: &ProductId,
        status: String,
        caller: HolderId,
    ) -> Result<Receipt, LedgerError> {
        let product = self
            .products
            .get_mut(id)
            .ok_or_else(|| LedgerError::NotFound(id.clone()))?;
        if !product.is_held_by(&caller) {
            return Err(LedgerError::Unauthorized);
        }
        if status.trim().is_empty() {
            return Err(LedgerError::EmptyStatus);
        }

        let now = Utc::now();
        product.status = status.clone();
        product.updated_at = now;
        let product = product.clone();

        let event = self.emit(
            now,
            LedgerEvent::StatusUpdated {
                id: id.clone(),
                status,
            },
        );
        Ok(Receipt { product, event })
    }

    /// Apply a client command on behalf of an already authenticated caller.
    ///
    /// Text fields are parsed here, after the record-level checks, so errors
    /// come out in the same order as the typed operations report them.
    pub fn apply(
        &mut self,
        command: LedgerCommand,
        caller: HolderId,
    ) -> Result<Receipt, LedgerError> {
        match command {
            LedgerCommand::Create(draft) => {
                self.check_new_id(&ProductId(draft.id.clone()))?;
                self.create(draft.into_new_product()?, caller)
            }
            LedgerCommand::Purchase { id, payment } => {
                let id = ProductId(id);
                self.lookup(&id)?;
                let payment =
                    currency::parse_amount(&payment).map_err(LedgerError::InvalidPayment)?;
                self.purchase(&id, payment, caller)
            }
            LedgerCommand::Transfer { id, recipient } => {
                let id = ProductId(id);
                if !self.lookup(&id)?.is_held_by(&caller) {
                    return Err(LedgerError::Unauthorized);
                }
                let recipient: HolderId = recipient.parse()?;
                self.transfer(&id, recipient, caller)
            }
            LedgerCommand::UpdateStatus { id, status } => {
                self.update_status(&ProductId(id), status, caller)
            }
        }
    }

    // ─── Reads ──────────────────────────────────────────────────────────────

    pub fn get(&self, id: &ProductId) -> Result<Product, LedgerError> {
        self.lookup(id).cloned()
    }

    /// All products, ordered by id.
    pub fn list(&self) -> Vec<Product> {
        self.products.values().cloned().collect()
    }

    /// Products whose current holder is `holder`.
    pub fn held_by(&self, holder: &HolderId) -> Vec<Product> {
        self.products
            .values()
            .filter(|p| p.is_held_by(holder))
            .cloned()
            .collect()
    }

    pub fn history(&self, id: &ProductId) -> Result<Vec<HolderId>, LedgerError> {
        self.lookup(id).map(|p| p.history.clone())
    }

    pub fn account(&self, holder: &HolderId) -> Account {
        self.accounts.get(holder).cloned().unwrap_or_default()
    }

    pub fn balance(&self, holder: &HolderId) -> Amount {
        self.accounts.get(holder).map_or(0, Account::balance)
    }

    /// Journal entries with `seq` greater than `seq`.
    pub fn events_since(&self, seq: u64) -> &[EventRecord] {
        let start = self.events.partition_point(|r| r.seq <= seq);
        self.events.get(start..).unwrap_or_default()
    }

    pub fn last_seq(&self) -> u64 {
        self.events.last().map_or(0, |r| r.seq)
    }

    // ─── Snapshots ──────────────────────────────────────────────────────────

    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            products: self.products.clone(),
            accounts: self.accounts.clone(),
            events: self.events.clone(),
            next_tx_id: self.next_tx_id,
        }
    }

    /// Rebuild a ledger from a snapshot, refusing any record that breaks the
    /// custody invariants.
    pub fn restore(snapshot: LedgerSnapshot, config: LedgerConfig) -> Result<Self, SnapshotError> {
        for (key, product) in &snapshot.products {
            if *key != product.id {
                return Err(SnapshotError::KeyMismatch {
                    key: key.clone(),
                    id: product.id.clone(),
                });
            }
            product
                .check_invariants()
                .map_err(|violation| SnapshotError::Invariant {
                    id: key.clone(),
                    violation,
                })?;
        }
        for (expected, record) in (1u64..).zip(&snapshot.events) {
            if record.seq != expected {
                return Err(SnapshotError::JournalOrder(record.seq));
            }
        }

        let highest_tx = snapshot
            .accounts
            .values()
            .flat_map(|a| a.entries.iter().map(|tx| tx.id))
            .max();
        let next_tx_id = match highest_tx {
            Some(id) => {
                let after = id
                    .checked_add(1)
                    .ok_or(SnapshotError::TransactionIdOverflow(id))?;
                snapshot.next_tx_id.max(after)
            }
            None => snapshot.next_tx_id,
        };

        Ok(Self {
            config,
            products: snapshot.products,
            accounts: snapshot.accounts,
            events: snapshot.events,
            next_tx_id,
        })
    }

    // ─── Internals ──────────────────────────────────────────────────────────

    /// `id` is usable for a new record: non-empty and not taken.
    fn check_new_id(&self, id: &ProductId) -> Result<(), LedgerError> {
        if id.as_str().is_empty() {
            return Err(LedgerError::InvalidIdentifier);
        }
        if self.products.contains_key(id) {
            return Err(LedgerError::DuplicateIdentifier(id.clone()));
        }
        Ok(())
    }

    fn lookup(&self, id: &ProductId) -> Result<&Product, LedgerError> {
        self.products
            .get(id)
            .ok_or_else(|| LedgerError::NotFound(id.clone()))
    }

    fn credit(
        &mut self,
        holder: HolderId,
        amount: Amount,
        product_id: &ProductId,
        counterparty: HolderId,
        memo: &str,
        now: DateTime<Utc>,
    ) {
        if amount == 0 {
            return;
        }
        let tx = WalletTransaction {
            id: self.next_tx_id,
            amount,
            product_id: product_id.clone(),
            counterparty,
            memo: memo.to_string(),
            timestamp: now,
        };
        self.next_tx_id += 1;
        self.accounts.entry(holder).or_default().record(tx);
    }

    fn emit(&mut self, at: DateTime<Utc>, event: LedgerEvent) -> EventRecord {
        let record = EventRecord {
            seq: self.last_seq() + 1,
            at,
            event,
        };
        debug!(
            product = %record.event.product_id(),
            event = record.event.kind(),
            seq = record.seq,
            "ledger event"
        );
        self.events.push(record.clone());
        record
    }
}
