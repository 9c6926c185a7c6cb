//! Durable key-value flags that record a running timer outside the database.
//!
//! The flags live in their own small JSON file so they can be read before the
//! SQLite store is opened. Each running timer owns three keys namespaced by
//! its task id: `timer.<task>.running`, `timer.<task>.start_time` and
//! `timer.<task>.open_entry_id`.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::TrackerError;
use crate::types::{EntryId, TaskId};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FlagValue {
    Bool(bool),
    Timestamp(DateTime<Utc>),
    Id(u32),
}

pub trait FlagStore {
    fn get(&self, key: &str) -> Option<FlagValue>;
    fn set(&mut self, key: &str, value: FlagValue) -> Result<()>;
    fn remove(&mut self, key: &str) -> Result<()>;
    fn keys(&self) -> Vec<String>;

    /// Re-reads the backing storage. Stores with no storage outside the
    /// process have nothing to do.
    fn reload(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Flag store persisted as a JSON object, rewritten on every change.
pub struct JsonFlagStore {
    path: PathBuf,
    values: BTreeMap<String, FlagValue>,
}

impl JsonFlagStore {
    /// Loads the store at `path`. A missing file is an empty store.
    pub fn open(path: &Path) -> Result<Self> {
        let values = Self::load(path)?;
        debug!(path = %path.display(), flags = values.len(), "opened flag store");
        Ok(Self {
            path: path.to_path_buf(),
            values,
        })
    }

    fn load(path: &Path) -> Result<BTreeMap<String, FlagValue>> {
        let values = match fs::read_to_string(path) {
            Ok(raw) if raw.trim().is_empty() => BTreeMap::new(),
            Ok(raw) => serde_json::from_str(&raw).map_err(|err| TrackerError::CorruptFlagStore {
                path: path.display().to_string(),
                reason: err.to_string(),
            })?,
            Err(err) if err.kind() == ErrorKind::NotFound => BTreeMap::new(),
            Err(err) => {
                return Err(err).with_context(|| format!("reading {}", path.display()));
            }
        };
        Ok(values)
    }

    fn persist(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let tmp = self.path.with_extension("json.tmp");
        let raw = serde_json::to_string_pretty(&self.values)?;
        fs::write(&tmp, raw).with_context(|| format!("writing {}", tmp.display()))?;
        fs::rename(&tmp, &self.path).with_context(|| format!("replacing {}", self.path.display()))?;
        trace!(path = %self.path.display(), "flag store written");
        Ok(())
    }
}

impl FlagStore for JsonFlagStore {
    fn get(&self, key: &str) -> Option<FlagValue> {
        self.values.get(key).cloned()
    }

    // Mutations start from the file so flags written by another process
    // are not overwritten with this process's copy.
    fn set(&mut self, key: &str, value: FlagValue) -> Result<()> {
        self.reload()?;
        self.values.insert(key.to_string(), value);
        self.persist()
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        self.reload()?;
        if self.values.remove(key).is_some() {
            self.persist()?;
        }
        Ok(())
    }

    fn keys(&self) -> Vec<String> {
        self.values.keys().cloned().collect()
    }

    fn reload(&mut self) -> Result<()> {
        self.values = Self::load(&self.path)?;
        trace!(path = %self.path.display(), flags = self.values.len(), "flag store reloaded");
        Ok(())
    }
}

#[cfg(test)]
#[derive(Default)]
pub struct MemoryFlagStore {
    values: BTreeMap<String, FlagValue>,
}

#[cfg(test)]
impl FlagStore for MemoryFlagStore {
    fn get(&self, key: &str) -> Option<FlagValue> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: FlagValue) -> Result<()> {
        self.values.insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        self.values.remove(key);
        Ok(())
    }

    fn keys(&self) -> Vec<String> {
        self.values.keys().cloned().collect()
    }
}

const PREFIX: &str = "timer.";
const RUNNING: &str = "running";
const START_TIME: &str = "start_time";
const OPEN_ENTRY_ID: &str = "open_entry_id";

fn key(task_id: TaskId, field: &str) -> String {
    format!("{PREFIX}{task_id}.{field}")
}

/// The three flags persisted for one task's timer.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TimerFlags {
    pub running: bool,
    pub start_time: Option<DateTime<Utc>>,
    pub open_entry_id: Option<EntryId>,
}

impl TimerFlags {
    pub fn read(store: &dyn FlagStore, task_id: TaskId) -> Self {
        let running = matches!(store.get(&key(task_id, RUNNING)), Some(FlagValue::Bool(true)));
        let start_time = match store.get(&key(task_id, START_TIME)) {
            Some(FlagValue::Timestamp(time)) => Some(time),
            _ => None,
        };
        let open_entry_id = match store.get(&key(task_id, OPEN_ENTRY_ID)) {
            Some(FlagValue::Id(id)) => Some(id),
            _ => None,
        };
        Self {
            running,
            start_time,
            open_entry_id,
        }
    }

    pub fn write(
        store: &mut dyn FlagStore,
        task_id: TaskId,
        start_time: DateTime<Utc>,
        entry_id: EntryId,
    ) -> Result<()> {
        store.set(&key(task_id, START_TIME), FlagValue::Timestamp(start_time))?;
        store.set(&key(task_id, OPEN_ENTRY_ID), FlagValue::Id(entry_id))?;
        // Written last so a crash in between never leaves `running` without its data.
        store.set(&key(task_id, RUNNING), FlagValue::Bool(true))
    }

    pub fn clear(store: &mut dyn FlagStore, task_id: TaskId) -> Result<()> {
        store.remove(&key(task_id, RUNNING))?;
        store.remove(&key(task_id, START_TIME))?;
        store.remove(&key(task_id, OPEN_ENTRY_ID))
    }

    /// Task ids that have at least one timer flag present.
    pub fn flagged_tasks(store: &dyn FlagStore) -> Vec<TaskId> {
        let mut tasks: Vec<TaskId> = store
            .keys()
            .iter()
            .filter_map(|key| key.strip_prefix(PREFIX))
            .filter_map(|rest| rest.split_once('.'))
            .filter_map(|(task, _)| task.parse().ok())
            .collect();
        tasks.sort_unstable();
        tasks.dedup();
        tasks
    }
}
