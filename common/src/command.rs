use ed25519_dalek::{Signature, Signer, SigningKey, Verifier};
use serde::{Deserialize, Serialize};

use crate::identity::HolderId;
use crate::product::ProductDraft;

/// A mutating request as a client sends it. Amounts and recipients are still
/// text; the ledger validates them when the command is applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum LedgerCommand {
    Create(ProductDraft),
    Purchase { id: String, payment: String },
    Transfer { id: String, recipient: String },
    UpdateStatus { id: String, status: String },
}

impl LedgerCommand {
    /// Operation name, as in the `op` tag.
    pub fn op(&self) -> &'static str {
        match self {
            LedgerCommand::Create(_) => "create",
            LedgerCommand::Purchase { .. } => "purchase",
            LedgerCommand::Transfer { .. } => "transfer",
            LedgerCommand::UpdateStatus { .. } => "update_status",
        }
    }

    pub fn product_id(&self) -> &str {
        match self {
            LedgerCommand::Create(draft) => &draft.id,
            LedgerCommand::Purchase { id, .. }
            | LedgerCommand::Transfer { id, .. }
            | LedgerCommand::UpdateStatus { id, .. } => id,
        }
    }
}

/// A command signed by its caller.
///
/// The nonce is a per-caller counter: each command must carry a nonce greater
/// than the last one the host accepted from the same caller. Gaps are fine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedCommand {
    pub command: LedgerCommand,
    pub caller: HolderId,
    pub nonce: u64,
    pub signature: Signature,
}

#[derive(Serialize)]
struct SignableCommand<'a> {
    command: &'a LedgerCommand,
    caller: &'a HolderId,
    nonce: u64,
}

fn signable_bytes(command: &LedgerCommand, caller: &HolderId, nonce: u64) -> Vec<u8> {
    let signable = SignableCommand {
        command,
        caller,
        nonce,
    };
    serde_json::to_vec(&signable).expect("serialization should not fail")
}

impl SignedCommand {
    pub fn sign(command: LedgerCommand, nonce: u64, key: &SigningKey) -> Self {
        let caller = HolderId(key.verifying_key());
        let signature = key.sign(&signable_bytes(&command, &caller, nonce));
        Self {
            command,
            caller,
            nonce,
            signature,
        }
    }

    /// Serialize everything except the signature for signing/verification.
    pub fn signable_bytes(&self) -> Vec<u8> {
        signable_bytes(&self.command, &self.caller, self.nonce)
    }

    pub fn verify(&self) -> bool {
        let msg = self.signable_bytes();
        self.caller.0.verify(&msg, &self.signature).is_ok()
    }
}
