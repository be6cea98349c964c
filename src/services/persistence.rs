// Snapshot persistence.
//
// All engine state (factor arenas, identifier mappings, content vector
// space, contextual strategy) is checkpointed as one JSON document and
// restored as one atomic unit. Writes go through a temp file + rename so
// a crashed save never leaves a torn snapshot behind.

use crate::error::{EngineError, Result};
use crate::services::collaborative::CollaborativeModel;
use crate::services::content::ContentModel;
use crate::services::context::ContextStrategy;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::info;

pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u32,
    pub saved_at: DateTime<Utc>,
    pub cf: CollaborativeModel,
    pub cb: ContentModel,
    pub context: ContextStrategy,
}

pub fn save_snapshot(path: &Path, snapshot: &Snapshot) -> Result<()> {
    let encoded = serde_json::to_vec(snapshot)?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let temp = path.with_extension("tmp");
    fs::write(&temp, &encoded)?;
    fs::rename(&temp, path)?;

    info!(
        path = %path.display(),
        bytes = encoded.len(),
        "Model snapshot saved"
    );
    Ok(())
}

pub fn load_snapshot(path: &Path) -> Result<Snapshot> {
    let data = fs::read(path)?;
    let snapshot: Snapshot = serde_json::from_slice(&data)?;
    if snapshot.version != SNAPSHOT_VERSION {
        return Err(EngineError::Persistence(format!(
            "unsupported snapshot version {} (expected {})",
            snapshot.version, SNAPSHOT_VERSION
        )));
    }
    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::context::RuleTable;

    fn snapshot() -> Snapshot {
        Snapshot {
            version: SNAPSHOT_VERSION,
            saved_at: Utc::now(),
            cf: CollaborativeModel::new(),
            cb: ContentModel::new(),
            context: ContextStrategy::Rules(RuleTable::default()),
        }
    }

    #[test]
    fn test_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.json");

        save_snapshot(&path, &snapshot()).unwrap();
        let restored = load_snapshot(&path).unwrap();
        assert_eq!(restored.version, SNAPSHOT_VERSION);
        assert!(!restored.context.is_learned());
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_snapshot(&dir.path().join("absent.json")).is_err());
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.json");
        fs::write(&path, b"{not json").unwrap();
        assert!(load_snapshot(&path).is_err());
    }

    #[test]
    fn test_save_creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/models/snapshot.json");
        save_snapshot(&path, &snapshot()).unwrap();
        assert!(path.exists());
    }
}
