//! In-memory implementation of the store contract.
//!
//! The default backend. Records live in a sharded concurrent map keyed by
//! the rendered composite key, so prefix scans are a filtered walk followed
//! by a sort.

use dashmap::DashMap;
use hebb_core::error::StoreError;
use hebb_core::store::{AssociationStore, KeyPrefix, Record, RecordKey};

/// Concurrent map-backed record store. Nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: DashMap<String, (RecordKey, Record)>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Remove every record.
    pub fn clear(&self) {
        self.records.clear();
    }
}

impl AssociationStore for MemoryStore {
    fn get(&self, key: &RecordKey) -> Result<Option<Record>, StoreError> {
        Ok(self.records.get(&key.render()).map(|entry| entry.1.clone()))
    }

    fn upsert(&self, key: &RecordKey, record: Record) -> Result<(), StoreError> {
        if record.kind() != key.kind() {
            return Err(StoreError::Backend(format!(
                "record of kind {} cannot be stored under {}",
                record.kind().as_str(),
                key
            )));
        }
        self.records.insert(key.render(), (key.clone(), record));
        Ok(())
    }

    fn delete(&self, key: &RecordKey) -> Result<bool, StoreError> {
        Ok(self.records.remove(&key.render()).is_some())
    }

    fn scan_prefix(&self, prefix: &KeyPrefix) -> Result<Vec<(RecordKey, Record)>, StoreError> {
        let mut out: Vec<(RecordKey, Record)> = self
            .records
            .iter()
            .filter(|entry| prefix.matches(&entry.value().0))
            .map(|entry| entry.value().clone())
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(out)
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use hebb_core::records::Association;
    use hebb_core::store::RecordKind;
    use hebb_core::types::ContextType;

    fn association(term: &str, context: ContextType) -> Record {
        Record::Association(Association::new(term, context, Utc::now()))
    }

    #[test]
    fn missing_key_is_none_not_error() {
        let store = MemoryStore::new();
        let key = RecordKey::association("ngl", ContextType::CasualChat);
        assert_eq!(store.get(&key).unwrap(), None);
        assert!(!store.delete(&key).unwrap());
    }

    #[test]
    fn upsert_replaces_and_delete_removes() {
        let store = MemoryStore::new();
        let record = association("ngl", ContextType::CasualChat);
        let key = record.key();
        store.upsert(&key, record.clone()).unwrap();
        store.upsert(&key, record.clone()).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(&key).unwrap(), Some(record));
        assert!(store.delete(&key).unwrap());
        assert!(store.is_empty());
    }

    #[test]
    fn kind_mismatch_is_rejected() {
        let store = MemoryStore::new();
        let record = association("ngl", ContextType::CasualChat);
        let err = store.upsert(&RecordKey::pattern("mdp-x"), record).unwrap_err();
        assert!(matches!(err, StoreError::Backend(_)));
    }

    #[test]
    fn scan_prefix_selects_by_term_and_kind() {
        let store = MemoryStore::new();
        for (term, ctx) in [
            ("ngl", ContextType::CasualChat),
            ("ngl", ContextType::Debugging),
            ("nglx", ContextType::CasualChat),
        ] {
            let r = association(term, ctx);
            store.upsert(&r.key(), r).unwrap();
        }
        assert_eq!(store.scan_prefix(&KeyPrefix::term("ngl")).unwrap().len(), 2);
        assert_eq!(
            store.scan_prefix(&KeyPrefix::kind(RecordKind::Association)).unwrap().len(),
            3
        );
        assert!(store.scan_prefix(&KeyPrefix::kind(RecordKind::Pattern)).unwrap().is_empty());
    }
}
