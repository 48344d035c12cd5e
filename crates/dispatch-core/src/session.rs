//! Session persistence for multi-turn conversations.
//!
//! Each dispatch session is one JSON file under the session directory,
//! keyed by the dispatch-generated session id. The file maps agent
//! names to the native handles their CLIs reported, so one dispatch
//! session can span several agents. Writes go through a mutex so
//! concurrent invocations in the same process never interleave a
//! read-modify-write.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::DispatchError;

/// One stored session: dispatch id plus per-agent native handles.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Native handle per agent name, latest write wins.
    pub agents: HashMap<String, String>,
}

/// File-backed store of session records.
#[derive(Debug)]
pub struct SessionStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl SessionStore {
    pub fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            write_lock: Mutex::new(()),
        }
    }

    /// Fresh dispatch session id.
    pub fn generate_id() -> String {
        Uuid::new_v4().to_string()
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, session_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", session_id))
    }

    /// Load a full session record, `None` when it does not exist.
    pub async fn load(&self, session_id: &str) -> Result<Option<SessionRecord>, DispatchError> {
        let path = self.record_path(session_id);
        if !path.exists() {
            return Ok(None);
        }
        let content = tokio::fs::read_to_string(&path).await.map_err(|e| {
            DispatchError::Io(format!(
                "Failed to read session file '{}': {}",
                path.display(),
                e
            ))
        })?;
        let record: SessionRecord = serde_json::from_str(&content).map_err(|e| {
            DispatchError::Io(format!(
                "Failed to parse session file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Ok(Some(record))
    }

    /// Native handle stored for `agent` in `session_id`, if any.
    pub async fn get(
        &self,
        session_id: &str,
        agent: &str,
    ) -> Result<Option<String>, DispatchError> {
        Ok(self
            .load(session_id)
            .await?
            .and_then(|record| record.agents.get(agent).cloned()))
    }

    /// Store (or replace) an agent's native handle for a session.
    pub async fn put(
        &self,
        session_id: &str,
        agent: &str,
        handle: &str,
    ) -> Result<(), DispatchError> {
        let _guard = self.write_lock.lock().await;

        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            DispatchError::Io(format!(
                "Failed to create session directory '{}': {}",
                self.dir.display(),
                e
            ))
        })?;

        let now = Utc::now();
        let mut record = self
            .load(session_id)
            .await?
            .unwrap_or_else(|| SessionRecord {
                session_id: session_id.to_string(),
                created_at: now,
                updated_at: now,
                agents: HashMap::new(),
            });
        record.agents.insert(agent.to_string(), handle.to_string());
        record.updated_at = now;

        let path = self.record_path(session_id);
        let content = serde_json::to_string_pretty(&record).map_err(|e| {
            DispatchError::Io(format!("Failed to serialize session record: {}", e))
        })?;
        tokio::fs::write(&path, content).await.map_err(|e| {
            DispatchError::Io(format!(
                "Failed to write session file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Ok(())
    }

    /// All stored sessions, newest first. Unreadable files are skipped.
    pub async fn list(&self) -> Result<Vec<SessionRecord>, DispatchError> {
        let mut records: Vec<SessionRecord> = Vec::new();
        let pattern = format!("{}/*.json", self.dir.display());
        let paths = glob::glob(&pattern)
            .map_err(|e| DispatchError::Io(format!("Invalid session glob pattern: {}", e)))?;
        for path in paths.flatten() {
            let content = match std::fs::read_to_string(&path) {
                Ok(content) => content,
                Err(e) => {
                    tracing::warn!("[SessionStore] Skipping unreadable '{}': {}", path.display(), e);
                    continue;
                }
            };
            match serde_json::from_str::<SessionRecord>(&content) {
                Ok(record) => records.push(record),
                Err(e) => {
                    tracing::warn!("[SessionStore] Skipping malformed '{}': {}", path.display(), e);
                }
            }
        }
        records.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(records)
    }

    /// Delete sessions idle for more than `days` days. Returns deleted ids.
    pub async fn cleanup(&self, days: i64) -> Result<Vec<String>, DispatchError> {
        let _guard = self.write_lock.lock().await;

        let cutoff = Utc::now() - chrono::Duration::days(days);
        let mut removed = Vec::new();
        for record in self.list().await? {
            if record.updated_at < cutoff {
                let path = self.record_path(&record.session_id);
                tokio::fs::remove_file(&path).await.map_err(|e| {
                    DispatchError::Io(format!(
                        "Failed to delete session file '{}': {}",
                        path.display(),
                        e
                    ))
                })?;
                removed.push(record.session_id);
            }
        }
        Ok(removed)
    }
}
