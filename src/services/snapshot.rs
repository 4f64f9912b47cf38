use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use crate::{
    error::{AppError, AppResult},
    models::MovieId,
    services::{
        matrix::{ItemIndex, UserIndex},
        neighbors::NeighborIndex,
    },
};

/// Bumped whenever the serialized layout changes
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

/// Everything the serving path needs from one training run
///
/// Immutable once built. A retrain produces a new snapshot that replaces
/// this one as a whole.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSnapshot {
    pub version: u32,
    pub trained_at: DateTime<Utc>,
    pub liked_threshold: f64,
    pub neighbors: NeighborIndex,
    pub users: UserIndex,
    pub items: ItemIndex,
    pub popularity: Vec<MovieId>,
}

impl ModelSnapshot {
    /// Checks that the parts of the snapshot agree with each other
    pub fn validate(&self) -> AppResult<()> {
        if self.version != SNAPSHOT_FORMAT_VERSION {
            return Err(AppError::Snapshot(format!(
                "unsupported snapshot version {} (expected {})",
                self.version, SNAPSHOT_FORMAT_VERSION
            )));
        }

        self.neighbors.validate()?;

        if self.neighbors.n_items() != self.items.len() {
            return Err(AppError::Snapshot(format!(
                "neighbor index covers {} items but the item index has {}",
                self.neighbors.n_items(),
                self.items.len()
            )));
        }

        if self.neighbors.n_users() != self.users.len() {
            return Err(AppError::Snapshot(format!(
                "neighbor index covers {} users but the user index has {}",
                self.neighbors.n_users(),
                self.users.len()
            )));
        }

        Ok(())
    }

    pub fn to_bytes(&self) -> AppResult<Vec<u8>> {
        serde_json::to_vec(self)
            .map_err(|e| AppError::Snapshot(format!("Snapshot serialization error: {}", e)))
    }

    pub fn from_slice(bytes: &[u8]) -> AppResult<Self> {
        let snapshot: ModelSnapshot = serde_json::from_slice(bytes)
            .map_err(|e| AppError::Snapshot(format!("Snapshot deserialization error: {}", e)))?;
        snapshot.validate()?;
        Ok(snapshot)
    }

    /// Writes the snapshot to `path`
    ///
    /// The bytes go to a sibling temp file first and are renamed into place,
    /// so a concurrent reader sees either the old file or the new one.
    pub fn save(&self, path: &Path) -> AppResult<()> {
        let bytes = self.to_bytes()?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| io_error("create directory for", parent, e))?;
        }

        let tmp_path = temp_path_for(path);
        fs::write(&tmp_path, &bytes).map_err(|e| io_error("write", &tmp_path, e))?;
        fs::rename(&tmp_path, path).map_err(|e| io_error("install", path, e))?;

        tracing::info!(
            path = %path.display(),
            bytes = bytes.len(),
            items = self.items.len(),
            "Model snapshot saved"
        );

        Ok(())
    }

    /// Reads a snapshot previously written by [`ModelSnapshot::save`]
    pub fn load(path: &Path) -> AppResult<Self> {
        if !path.exists() {
            return Err(AppError::ResourceNotFound(format!(
                "Model not found: {}",
                path.display()
            )));
        }

        let bytes = fs::read(path).map_err(|e| {
            AppError::ResourceNotFound(format!("Failed to read model {}: {}", path.display(), e))
        })?;
        let snapshot = Self::from_slice(&bytes)?;

        tracing::info!(
            path = %path.display(),
            trained_at = %snapshot.trained_at,
            items = snapshot.items.len(),
            users = snapshot.users.len(),
            "Model snapshot loaded"
        );

        Ok(snapshot)
    }
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

fn io_error(action: &str, path: &Path, e: std::io::Error) -> AppError {
    AppError::Snapshot(format!("Failed to {} {}: {}", action, path.display(), e))
}

/// Shared, swappable reference to the published snapshot
///
/// Readers take an `Arc` with [`ModelHandle::current`] and keep using it for
/// the rest of their request, even if a newer snapshot is published meanwhile.
#[derive(Clone)]
pub struct ModelHandle {
    inner: Arc<ArcSwap<ModelSnapshot>>,
}

impl ModelHandle {
    pub fn new(snapshot: ModelSnapshot) -> Self {
        Self {
            inner: Arc::new(ArcSwap::from_pointee(snapshot)),
        }
    }

    pub fn current(&self) -> Arc<ModelSnapshot> {
        self.inner.load_full()
    }

    /// Replaces the published snapshot for all subsequent readers
    pub fn publish(&self, snapshot: ModelSnapshot) {
        self.inner.store(Arc::new(snapshot));
    }
}
