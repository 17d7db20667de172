use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{ChildAccount, JournalEntry, PendingBonus, Task};

pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("snapshot json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported snapshot version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },
}

/// Whole-ledger save format. `version` is checked before the body is decoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u32,
    pub saved_at: DateTime<Utc>,
    /// Sequence number the next created task will use.
    pub next_task_seq: u64,
    pub children: Vec<ChildAccount>,
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub journal: Vec<JournalEntry>,
    #[serde(default)]
    pub pending_bonuses: Vec<PendingBonus>,
}

#[derive(Deserialize)]
struct VersionHeader {
    version: u32,
}

impl Snapshot {
    pub fn empty(saved_at: DateTime<Utc>) -> Self {
        Snapshot {
            version: SNAPSHOT_VERSION,
            saved_at,
            next_task_seq: 1,
            children: Vec::new(),
            tasks: Vec::new(),
            journal: Vec::new(),
            pending_bonuses: Vec::new(),
        }
    }

    pub fn to_json(&self) -> Result<String, SnapshotError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(text: &str) -> Result<Self, SnapshotError> {
        let header: VersionHeader = serde_json::from_str(text)?;
        if header.version != SNAPSHOT_VERSION {
            return Err(SnapshotError::UnsupportedVersion {
                found: header.version,
                expected: SNAPSHOT_VERSION,
            });
        }
        Ok(serde_json::from_str(text)?)
    }
}
