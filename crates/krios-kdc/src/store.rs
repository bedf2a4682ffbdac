//! Persisted principal store: the idempotence guard.
//!
//! Every principal the engine creates is recorded here. A principal already
//! recorded is never recreated, which turns "duplicate create" failures into
//! silent no-ops and makes the ensure-identities pass safely re-entrant
//! after a partial failure.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use krios_core::KriosError;

/// One created principal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrincipalRecord {
    pub principal: String,
    pub key_number: u32,
    pub service: bool,
    /// Path of a cached keytab, when the identity descriptor allows caching.
    #[serde(default)]
    pub cached_keytab_path: Option<String>,
}

/// Store of created principals, optionally backed by a JSON file.
#[derive(Debug, Default)]
pub struct PrincipalStore {
    path: Option<PathBuf>,
    records: Mutex<BTreeMap<String, PrincipalRecord>>,
}

impl PrincipalStore {
    /// A store with no backing file; records live for the process only.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Load (or initialize) a store backed by a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, KriosError> {
        let path = path.as_ref().to_path_buf();
        let records = if path.exists() {
            let content = fs::read_to_string(&path)?;
            serde_json::from_str(&content)?
        } else {
            BTreeMap::new()
        };
        Ok(Self {
            path: Some(path),
            records: Mutex::new(records),
        })
    }

    pub fn contains(&self, principal: &str) -> bool {
        self.records
            .lock()
            .expect("principal store lock poisoned")
            .contains_key(principal)
    }

    pub fn get(&self, principal: &str) -> Option<PrincipalRecord> {
        self.records
            .lock()
            .expect("principal store lock poisoned")
            .get(principal)
            .cloned()
    }

    pub fn record(&self, record: PrincipalRecord) -> Result<(), KriosError> {
        {
            let mut records = self.records.lock().expect("principal store lock poisoned");
            records.insert(record.principal.clone(), record);
        }
        self.flush()
    }

    pub fn remove(&self, principal: &str) -> Result<Option<PrincipalRecord>, KriosError> {
        let removed = {
            let mut records = self.records.lock().expect("principal store lock poisoned");
            records.remove(principal)
        };
        self.flush()?;
        Ok(removed)
    }

    pub fn len(&self) -> usize {
        self.records
            .lock()
            .expect("principal store lock poisoned")
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn flush(&self) -> Result<(), KriosError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let records = self.records.lock().expect("principal store lock poisoned");
        let content = serde_json::to_string_pretty(&*records)?;
        fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_record(principal: &str) -> PrincipalRecord {
        PrincipalRecord {
            principal: principal.to_string(),
            key_number: 1,
            service: true,
            cached_keytab_path: None,
        }
    }

    #[test]
    fn in_memory_record_and_remove() {
        let store = PrincipalStore::in_memory();
        assert!(!store.contains("nn/host1@EXAMPLE.COM"));

        store.record(create_test_record("nn/host1@EXAMPLE.COM")).unwrap();
        assert!(store.contains("nn/host1@EXAMPLE.COM"));
        assert_eq!(store.len(), 1);

        let removed = store.remove("nn/host1@EXAMPLE.COM").unwrap();
        assert!(removed.is_some());
        assert!(store.is_empty());
    }

    #[test]
    fn file_backed_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("principals.json");

        {
            let store = PrincipalStore::load(&path).unwrap();
            store.record(create_test_record("dn/host2@EXAMPLE.COM")).unwrap();
        }

        let reloaded = PrincipalStore::load(&path).unwrap();
        assert!(reloaded.contains("dn/host2@EXAMPLE.COM"));
        assert_eq!(reloaded.get("dn/host2@EXAMPLE.COM").unwrap().key_number, 1);
    }
}
