//! Structured, append-only error log
//!
//! One JSON object per line in `<dir>/errors_<%Y%m%d>.jsonl`. The file is
//! picked from the entry's own timestamp. Every append is mirrored as a
//! `tracing` event at the matching level.

use brandloc_core::{now_utc, ErrorKind, LocalizerError, Result, Timestamp};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Debug => "DEBUG",
            Severity::Info => "INFO",
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
            Severity::Critical => "CRITICAL",
        };
        write!(f, "{}", s)
    }
}

/// One logged error
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEntry {
    pub timestamp: Timestamp,
    pub kind: ErrorKind,
    pub component: String,
    pub message: String,
    #[serde(default)]
    pub context: BTreeMap<String, serde_json::Value>,
    pub severity: Severity,
    #[serde(default)]
    pub recovery_action: Option<String>,
}

impl ErrorEntry {
    /// A new entry with `ERROR` severity, stamped now
    pub fn new(kind: ErrorKind, component: &str, message: impl Into<String>) -> Self {
        Self {
            timestamp: now_utc(),
            kind,
            component: component.to_string(),
            message: message.into(),
            context: BTreeMap::new(),
            severity: Severity::Error,
            recovery_action: None,
        }
    }

    /// An entry describing `error`, classified by its kind
    pub fn from_error(component: &str, error: &LocalizerError) -> Self {
        Self::new(error.kind(), component, error.to_string())
    }

    pub fn with_context(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.context.insert(key.to_string(), value.into());
        self
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_recovery_action(mut self, action: impl Into<String>) -> Self {
        self.recovery_action = Some(action.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: Timestamp) -> Self {
        self.timestamp = timestamp;
        self
    }

    fn mirror(&self) {
        let kind = self.kind.to_string();
        match self.severity {
            Severity::Debug => {
                tracing::debug!(kind = %kind, component = %self.component, "{}", self.message)
            }
            Severity::Info => {
                tracing::info!(kind = %kind, component = %self.component, "{}", self.message)
            }
            Severity::Warning => {
                tracing::warn!(kind = %kind, component = %self.component, "{}", self.message)
            }
            Severity::Error => {
                tracing::error!(kind = %kind, component = %self.component, "{}", self.message)
            }
            Severity::Critical => tracing::error!(
                kind = %kind,
                component = %self.component,
                critical = true,
                "{}",
                self.message
            ),
        }
    }
}

/// Day-partitioned JSONL error log
#[derive(Debug)]
pub struct ErrorLog {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl ErrorLog {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the day file for `timestamp`
    pub fn day_file(&self, timestamp: &Timestamp) -> PathBuf {
        self.dir
            .join(format!("errors_{}.jsonl", timestamp.format("%Y%m%d")))
    }

    /// Append one entry, returning the file it went to
    pub fn append(&self, entry: &ErrorEntry) -> Result<PathBuf> {
        entry.mirror();
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');

        let path = self.day_file(&entry.timestamp);
        let _guard = self.write_lock.lock();
        std::fs::create_dir_all(&self.dir)?;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?;
        file.write_all(line.as_bytes())?;
        Ok(path)
    }

    /// The newest `n` entries, newest first. Malformed lines, including
    /// ones that are not valid UTF-8, are skipped.
    pub fn recent(&self, n: usize) -> Result<Vec<ErrorEntry>> {
        let mut entries = Vec::new();
        if n == 0 || !self.dir.exists() {
            return Ok(entries);
        }

        let mut days: Vec<PathBuf> = std::fs::read_dir(&self.dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| n.starts_with("errors_") && n.ends_with(".jsonl"))
                    .unwrap_or(false)
            })
            .collect();
        days.sort();

        for day in days.iter().rev() {
            let file = std::fs::File::open(day)?;
            // split on raw bytes so one undecodable line does not end the scan
            let mut day_entries: Vec<ErrorEntry> = BufReader::new(file)
                .split(b'\n')
                .map_while(|line| line.ok())
                .filter_map(|line| serde_json::from_slice(&line).ok())
                .collect();
            day_entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
            for entry in day_entries {
                entries.push(entry);
                if entries.len() == n {
                    return Ok(entries);
                }
            }
        }
        Ok(entries)
    }
}
