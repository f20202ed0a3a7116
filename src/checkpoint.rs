use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::warn;

/// Persisted resume point: cursor position plus the active session, if any.
///
/// Rewritten on most state transitions so the tool resumes exactly where it
/// left off after a crash or restart.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub line_index: usize,
    pub session: Option<String>,
    pub session_start: Option<DateTime<Utc>>,
}

/// On-disk forms: the current JSON object, or the bare line index written
/// by older versions.
#[derive(Deserialize)]
#[serde(untagged)]
enum StoredCheckpoint {
    Full(Checkpoint),
    Legacy(usize),
}

impl Checkpoint {
    /// Load the checkpoint, falling back to defaults (index 0, no session)
    /// when the file is missing or malformed.
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        let parsed = fs::read_to_string(path)
            .map_err(anyhow::Error::from)
            .and_then(|data| Ok(serde_json::from_str::<StoredCheckpoint>(&data)?));

        match parsed {
            Ok(StoredCheckpoint::Full(checkpoint)) => checkpoint,
            Ok(StoredCheckpoint::Legacy(line_index)) => Self {
                line_index,
                ..Self::default()
            },
            Err(e) => {
                warn!("Failed to load checkpoint, resetting: {}", e);
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let data = serde_json::to_string(self)?;
        fs::write(path, data)
            .with_context(|| format!("Failed to write checkpoint: {}", path.display()))
    }
}
