//! JSON state file so a restarted bot resumes its plans

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::common::errors::{EngineError, Result};
use crate::engine::registry::PlanSnapshot;

#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the snapshots, `None` when no state file exists yet
    pub async fn load(&self) -> Result<Option<Vec<PlanSnapshot>>> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let snapshots = serde_json::from_str(&raw).map_err(|e| {
            EngineError::Persistence(format!("{}: {}", self.path.display(), e))
        })?;
        Ok(Some(snapshots))
    }

    /// Replace the state file atomically (write to a sibling, then rename)
    pub async fn save(&self, snapshots: &[PlanSnapshot]) -> Result<()> {
        let json = serde_json::to_string_pretty(snapshots)?;
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        debug!(path = %self.path.display(), plans = snapshots.len(), "State saved");
        Ok(())
    }
}
