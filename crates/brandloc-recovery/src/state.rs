//! Recovery snapshots
//!
//! Snapshots live at `<state_dir>/<campaign_id>_<%Y%m%d_%H%M%S_%6f>.json`.
//! They are created with create-new semantics and never rewritten, so a
//! handle always refers to exactly the state that was saved.

use brandloc_core::{
    is_safe_segment, now_utc, precise_file_stamp, ErrorKind, LocalizerError, Result, Timestamp,
};
use brandloc_localize::MasterConfig;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};

const STATE_VERSION: &str = "1.0";
const STAMP_FORMAT: &str = "%Y%m%d_%H%M%S_%6f";
const STAMP_LEN: usize = 22;
const MAX_NAME_ATTEMPTS: u32 = 1000;

/// Reference to a saved snapshot
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateHandle(PathBuf);

impl StateHandle {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    pub fn path(&self) -> &Path {
        &self.0
    }

    /// Campaign id encoded in the file name
    pub fn campaign_id(&self) -> Option<&str> {
        split_name(self.stem()?).map(|(campaign, _)| campaign)
    }

    fn stem(&self) -> Option<&str> {
        self.0.file_stem().and_then(|s| s.to_str())
    }
}

impl fmt::Display for StateHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

/// The error that triggered a snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(default)]
    pub context: BTreeMap<String, String>,
}

impl ErrorInfo {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            context: BTreeMap::new(),
        }
    }

    pub fn with_context(mut self, key: &str, value: impl Into<String>) -> Self {
        self.context.insert(key.to_string(), value.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub total_regions: usize,
    pub processed_count: usize,
    pub pending_count: usize,
    pub processed_region_ids: Vec<String>,
    pub pending_region_ids: Vec<String>,
}

/// A saved campaign state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryState {
    pub version: String,
    pub saved_at: Timestamp,
    pub campaign_id: String,
    pub master_config: MasterConfig,
    pub progress: ProgressSnapshot,
    #[serde(default)]
    pub error_info: Option<ErrorInfo>,
}

impl RecoveryState {
    pub fn is_complete(&self) -> bool {
        self.progress.pending_region_ids.is_empty()
    }
}

/// File-based snapshot store
#[derive(Debug, Clone)]
pub struct RecoveryStore {
    state_dir: PathBuf,
}

impl RecoveryStore {
    pub fn new<P: AsRef<Path>>(state_dir: P) -> Self {
        Self {
            state_dir: state_dir.as_ref().to_path_buf(),
        }
    }

    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    /// Write a new snapshot and return its handle
    pub fn save_state(
        &self,
        campaign_id: &str,
        master: &MasterConfig,
        processed: &[String],
        pending: &[String],
        error: Option<&ErrorInfo>,
    ) -> Result<StateHandle> {
        if !is_safe_segment(campaign_id) {
            return Err(LocalizerError::Validation(format!(
                "invalid campaign id '{}'",
                campaign_id
            )));
        }
        std::fs::create_dir_all(&self.state_dir)?;

        let mut saved_at = now_utc();
        for _ in 0..MAX_NAME_ATTEMPTS {
            let path = self.state_dir.join(format!(
                "{}_{}.json",
                campaign_id,
                precise_file_stamp(&saved_at)
            ));
            let mut file = match std::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
            {
                Ok(file) => file,
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    saved_at += chrono::Duration::microseconds(1);
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            let state = RecoveryState {
                version: STATE_VERSION.to_string(),
                saved_at,
                campaign_id: campaign_id.to_string(),
                master_config: master.clone(),
                progress: ProgressSnapshot {
                    total_regions: processed.len() + pending.len(),
                    processed_count: processed.len(),
                    pending_count: pending.len(),
                    processed_region_ids: processed.to_vec(),
                    pending_region_ids: pending.to_vec(),
                },
                error_info: error.cloned(),
            };
            file.write_all(serde_json::to_string_pretty(&state)?.as_bytes())?;
            file.sync_all()?;

            tracing::info!(
                campaign = campaign_id,
                processed = processed.len(),
                pending = pending.len(),
                path = %path.display(),
                "Recovery state saved"
            );
            return Ok(StateHandle(path));
        }

        Err(LocalizerError::Recovery(format!(
            "could not find a free snapshot name for campaign '{}'",
            campaign_id
        )))
    }

    /// Load a snapshot
    pub fn load_state(&self, handle: &StateHandle) -> Result<RecoveryState> {
        if !handle.path().exists() {
            return Err(LocalizerError::NotFound(format!(
                "recovery state {}",
                handle
            )));
        }
        let content = std::fs::read_to_string(handle.path())?;
        serde_json::from_str(&content).map_err(|e| {
            LocalizerError::Recovery(format!("corrupt recovery state {}: {}", handle, e))
        })
    }

    /// Delete a snapshot once it is no longer needed
    pub fn delete_state(&self, handle: &StateHandle) -> Result<()> {
        if !handle.path().exists() {
            return Err(LocalizerError::NotFound(format!(
                "recovery state {}",
                handle
            )));
        }
        std::fs::remove_file(handle.path())?;
        tracing::info!(path = %handle, "Recovery state deleted");
        Ok(())
    }

    /// Snapshots, newest first, optionally for one campaign
    pub fn list_states(&self, campaign_id: Option<&str>) -> Result<Vec<StateHandle>> {
        let mut found: Vec<(String, StateHandle)> = Vec::new();
        if !self.state_dir.exists() {
            return Ok(Vec::new());
        }

        for entry in std::fs::read_dir(&self.state_dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let handle = StateHandle(path);
            let (campaign, stamp) = match handle.stem().and_then(split_name) {
                Some((campaign, stamp)) => (campaign.to_string(), stamp.to_string()),
                None => continue,
            };
            if campaign_id.is_some_and(|wanted| wanted != campaign) {
                continue;
            }
            found.push((stamp, handle));
        }

        found.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| b.1.path().cmp(a.1.path())));
        Ok(found.into_iter().map(|(_, handle)| handle).collect())
    }

    /// The newest snapshot for a campaign, if any
    pub fn get_latest_state(&self, campaign_id: &str) -> Result<Option<StateHandle>> {
        Ok(self.list_states(Some(campaign_id))?.into_iter().next())
    }
}

/// Split `<campaign>_<stamp>` into its parts
fn split_name(stem: &str) -> Option<(&str, &str)> {
    if stem.len() <= STAMP_LEN + 1 || !stem.is_char_boundary(stem.len() - STAMP_LEN) {
        return None;
    }
    let (head, stamp) = stem.split_at(stem.len() - STAMP_LEN);
    let campaign = head.strip_suffix('_')?;
    NaiveDateTime::parse_from_str(stamp, STAMP_FORMAT).ok()?;
    Some((campaign, stamp))
}
