//! Snapshot persistence.
//!
//! The whole ledger is written as one JSON document. Writes go to a sibling
//! temp file first and are renamed into place, so a crash mid-write leaves the
//! previous snapshot intact.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use custody_common::{HolderId, LedgerSnapshot};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::state::AppState;

/// What a node writes to disk: the ledger plus the last nonce accepted from
/// each caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistedState {
    pub ledger: LedgerSnapshot,
    #[serde(default)]
    pub last_nonces: BTreeMap<HolderId, u64>,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode snapshot")]
    Encode(#[source] serde_json::Error),
}

#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `Ok(None)` when no snapshot has been written yet.
    pub async fn load(&self) -> Result<Option<PersistedState>, StoreError> {
        let data = match tokio::fs::read(&self.path).await {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(StoreError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        let state = serde_json::from_slice(&data).map_err(|source| StoreError::Parse {
            path: self.path.clone(),
            source,
        })?;
        info!(path = %self.path.display(), "loaded ledger snapshot");
        Ok(Some(state))
    }

    pub async fn save(&self, state: &PersistedState) -> Result<(), StoreError> {
        let write_err = |source| StoreError::Write {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
        }
        let data = serde_json::to_vec_pretty(state).map_err(StoreError::Encode)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, data).await.map_err(write_err)?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(write_err)?;
        Ok(())
    }
}

/// Write a snapshot of `state` after it changes, until aborted.
///
/// Changes that land while a write is in flight are coalesced into the next
/// one, so the snapshot is taken at most once per write.
pub fn spawn_writer(store: SnapshotStore, state: Arc<AppState>) -> JoinHandle<()> {
    let mut changes = state.changes();
    tokio::spawn(async move {
        while changes.changed().await.is_ok() {
            let revision = *changes.borrow_and_update();
            let snapshot = state.persisted().await;
            match store.save(&snapshot).await {
                Ok(()) => debug!(revision, "ledger snapshot written"),
                Err(e) => error!(error = %e, "failed to persist ledger snapshot"),
            }
        }
    })
}
