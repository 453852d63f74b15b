use std::collections::BTreeMap;
use std::num::NonZeroUsize;

use custody_common::{
    EventRecord, HolderId, LedgerConfig, ProductLedger, Receipt, SignedCommand, SnapshotError,
};
use tokio::sync::{broadcast, watch, RwLock};
use tracing::{info, warn};

use crate::error::ApiError;
use crate::store::PersistedState;

/// The ledger plus everything that must change atomically with it.
#[derive(Debug)]
struct Guarded {
    ledger: ProductLedger,
    last_nonces: BTreeMap<HolderId, u64>,
}

impl Guarded {
    fn persisted(&self) -> PersistedState {
        PersistedState {
            ledger: self.ledger.snapshot(),
            last_nonces: self.last_nonces.clone(),
        }
    }
}

/// Shared node state. One writer at a time; readers see whole operations only.
#[derive(Debug)]
pub struct AppState {
    guarded: RwLock<Guarded>,
    events: broadcast::Sender<EventRecord>,
    /// Bumped after every accepted command.
    revision: watch::Sender<u64>,
}

impl AppState {
    pub fn new(ledger: ProductLedger, event_buffer: NonZeroUsize) -> Self {
        let (events, _) = broadcast::channel(event_buffer.get());
        let (revision, _) = watch::channel(0);
        Self {
            guarded: RwLock::new(Guarded {
                ledger,
                last_nonces: BTreeMap::new(),
            }),
            events,
            revision,
        }
    }

    /// Rebuild from a persisted snapshot.
    pub fn restore(
        persisted: PersistedState,
        config: LedgerConfig,
        event_buffer: NonZeroUsize,
    ) -> Result<Self, SnapshotError> {
        let ledger = ProductLedger::restore(persisted.ledger, config)?;
        let mut state = Self::new(ledger, event_buffer);
        state.guarded.get_mut().last_nonces = persisted.last_nonces;
        Ok(state)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EventRecord> {
        self.events.subscribe()
    }

    /// Notified with a new revision whenever a command is accepted.
    pub fn changes(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    /// Authenticate a signed command and apply it to the ledger.
    ///
    /// The nonce is consumed once the signature checks out, whether or not
    /// the ledger accepts the command, so a refused command can never be
    /// replayed later when the rules would let it through.
    pub async fn execute(&self, signed: SignedCommand) -> Result<Receipt, ApiError> {
        if !signed.verify() {
            warn!(caller = %signed.caller, op = signed.command.op(), "bad signature");
            return Err(ApiError::BadSignature);
        }
        let SignedCommand {
            command,
            caller,
            nonce,
            ..
        } = signed;
        let op = command.op();
        let product = command.product_id().to_string();

        let mut guarded = self.guarded.write().await;
        if let Some(&last) = guarded.last_nonces.get(&caller) {
            if nonce <= last {
                warn!(%caller, op, %product, nonce, last, "replayed nonce");
                return Err(ApiError::ReplayedNonce { nonce, last });
            }
        }
        guarded.last_nonces.insert(caller, nonce);

        let result = guarded.ledger.apply(command, caller);
        // Publish while still holding the lock so subscribers see events in seq order.
        match &result {
            Ok(receipt) => {
                info!(
                    %caller,
                    op,
                    %product,
                    event = receipt.event.event.kind(),
                    seq = receipt.event.seq,
                    "command applied"
                );
                // No subscribers is fine.
                self.events.send(receipt.event.clone()).ok();
                self.revision.send_modify(|r| *r += 1);
            }
            Err(e) => warn!(%caller, op, %product, error = e.code(), "command refused"),
        }
        drop(guarded);

        result.map_err(ApiError::from)
    }

    /// Run `f` against a consistent view of the ledger.
    pub async fn read<T>(&self, f: impl FnOnce(&ProductLedger) -> T) -> T {
        let guarded = self.guarded.read().await;
        f(&guarded.ledger)
    }

    pub async fn persisted(&self) -> PersistedState {
        self.guarded.read().await.persisted()
    }
}
