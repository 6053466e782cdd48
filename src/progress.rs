use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use log::{debug, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::proctor::{WarningEntry, WarningLedger};

/// Key/value persistence seam for interview progress. Implementations must
/// tolerate concurrent callers.
pub trait StateStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> anyhow::Result<()>;
    fn remove(&self, key: &str);
}

/// In-process store used by tests and embedded hosts.
#[derive(Default)]
pub struct MemoryStateStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for MemoryStateStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        self.entries.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) {
        self.entries.lock().remove(key);
    }
}

/// Write-through store backed by a single JSON file, so progress survives
/// a process restart.
pub struct JsonFileStore {
    path: PathBuf,
    entries: Mutex<HashMap<String, String>>,
}

impl JsonFileStore {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = fs::read_to_string(&path)
            .ok()
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_default();
        Self {
            path,
            entries: Mutex::new(entries),
        }
    }

    fn flush(&self, entries: &HashMap<String, String>) -> anyhow::Result<()> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(&self.path, serde_json::to_string_pretty(entries)?)?;
        Ok(())
    }
}

impl StateStore for JsonFileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        let mut entries = self.entries.lock();
        entries.insert(key.to_string(), value.to_string());
        self.flush(&entries)
    }

    fn remove(&self, key: &str) {
        let mut entries = self.entries.lock();
        if entries.remove(key).is_some() {
            if let Err(err) = self.flush(&entries) {
                warn!("failed to persist state file: {err:#}");
            }
        }
    }
}

/// Storage key scoped to one interview/candidate pair. Missing ids fall
/// back to a literal "na" so malformed links still get a stable key.
pub fn progress_key(interview_id: &str, candidate_id: &str) -> String {
    let iid = if interview_id.is_empty() { "na" } else { interview_id };
    let cid = if candidate_id.is_empty() { "na" } else { candidate_id };
    format!("hirexpert_progress_{iid}_{cid}")
}

/// Persisted snapshot of where the candidate is in the interview.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressRecord {
    pub current_index: usize,
    pub tab_switch_count: u32,
    #[serde(default)]
    pub answer_meta: HashMap<String, QuestionMeta>,
    pub saved_at: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuestionMeta {
    #[serde(default)]
    pub warnings: Vec<WarningEntry>,
}

pub fn answer_meta_from_ledger(ledger: &WarningLedger) -> HashMap<String, QuestionMeta> {
    ledger
        .iter()
        .map(|(qid, warnings)| {
            (
                qid.clone(),
                QuestionMeta {
                    warnings: warnings.clone(),
                },
            )
        })
        .collect()
}

pub fn ledger_from_answer_meta(meta: &HashMap<String, QuestionMeta>) -> WarningLedger {
    meta.iter()
        .map(|(qid, m)| (qid.clone(), m.warnings.clone()))
        .collect()
}

/// Save/restore of per-session progress. Persistence failures are logged
/// and otherwise ignored; losing progress must never break the interview.
pub struct ProgressStore {
    store: Arc<dyn StateStore>,
    key: String,
}

impl ProgressStore {
    pub fn new(store: Arc<dyn StateStore>, interview_id: &str, candidate_id: &str) -> Self {
        Self {
            store,
            key: progress_key(interview_id, candidate_id),
        }
    }

    pub fn save(&self, record: &ProgressRecord) {
        match serde_json::to_string(record) {
            Ok(raw) => {
                if let Err(err) = self.store.set(&self.key, &raw) {
                    warn!("failed to save progress: {err:#}");
                }
            }
            Err(err) => warn!("failed to serialize progress: {err:#}"),
        }
    }

    /// Loads the saved record, clamping the index into the valid question
    /// range. Corrupt payloads are treated as absent.
    pub fn restore(&self, question_count: usize) -> Option<ProgressRecord> {
        let raw = self.store.get(&self.key)?;
        let mut record: ProgressRecord = match serde_json::from_str(&raw) {
            Ok(r) => r,
            Err(err) => {
                debug!("discarding unreadable progress record: {err:#}");
                return None;
            }
        };
        if question_count == 0 {
            record.current_index = 0;
        } else if record.current_index >= question_count {
            record.current_index = question_count - 1;
        }
        Some(record)
    }

    pub fn clear(&self) {
        self.store.remove(&self.key);
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

pub fn record_now(
    current_index: usize,
    tab_switch_count: u32,
    ledger: &WarningLedger,
) -> ProgressRecord {
    ProgressRecord {
        current_index,
        tab_switch_count,
        answer_meta: answer_meta_from_ledger(ledger),
        saved_at: Utc::now().timestamp_millis(),
    }
}
