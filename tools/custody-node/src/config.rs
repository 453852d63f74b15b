use std::net::SocketAddr;
use std::num::NonZeroUsize;
use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use custody_common::{LedgerConfig, OverpaymentPolicy};

#[derive(Debug, Parser)]
#[command(name = "custody-node", about = "Chain-of-custody ledger node")]
pub struct Cli {
    /// Address to serve the HTTP API on.
    #[arg(long, env = "CUSTODY_LISTEN", default_value = "127.0.0.1:3020")]
    pub listen: SocketAddr,

    /// Snapshot file (default: <data dir>/custody/ledger.json).
    #[arg(long, env = "CUSTODY_STATE_FILE")]
    pub state_file: Option<PathBuf>,

    /// Keep the ledger in memory only; nothing is read from or written to disk.
    #[arg(long, conflicts_with = "state_file")]
    pub ephemeral: bool,

    /// What to do with payments above the asking price.
    #[arg(long, env = "CUSTODY_OVERPAYMENT", value_enum, default_value_t = Overpayment::Refund)]
    pub overpayment: Overpayment,

    /// Live events buffered per WebSocket subscriber before it is dropped.
    #[arg(long, default_value = "256")]
    pub event_buffer: NonZeroUsize,

    /// Emit log lines as JSON.
    #[arg(long)]
    pub log_json: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Overpayment {
    /// Credit the excess back to the buyer.
    Refund,
    /// The seller keeps the whole payment.
    Forfeit,
    /// Refuse payments above the price.
    Reject,
}

impl From<Overpayment> for OverpaymentPolicy {
    fn from(value: Overpayment) -> Self {
        match value {
            Overpayment::Refund => OverpaymentPolicy::Refund,
            Overpayment::Forfeit => OverpaymentPolicy::Forfeit,
            Overpayment::Reject => OverpaymentPolicy::Reject,
        }
    }
}

impl Cli {
    pub fn ledger_config(&self) -> LedgerConfig {
        LedgerConfig {
            overpayment: self.overpayment.into(),
        }
    }

    /// Where snapshots live, or `None` when running ephemeral.
    pub fn state_path(&self) -> Option<PathBuf> {
        if self.ephemeral {
            return None;
        }
        Some(self.state_file.clone().unwrap_or_else(default_state_path))
    }
}

fn default_state_path() -> PathBuf {
    let data = dirs::data_dir().unwrap_or_else(|| PathBuf::from("."));
    data.join("custody").join("ledger.json")
}
