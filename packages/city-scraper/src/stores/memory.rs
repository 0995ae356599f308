//! In-memory record store.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::types::{
    record::{NaturalKey, Record},
    target::SourceKind,
};

/// Counts from one [`RecordStore::ingest`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    /// Keys seen for the first time
    pub inserted: usize,

    /// Keys already present whose record was replaced
    pub replaced: usize,
}

impl IngestStats {
    pub fn total(&self) -> usize {
        self.inserted + self.replaced
    }
}

/// Deduplicating record store.
///
/// One record per natural key, last write wins. A replaced record keeps the
/// position of the first insertion, so iteration order is the order keys
/// were first seen. Ingesting the same batch twice leaves the store
/// unchanged.
///
/// Safe to share between workers; every `ingest` call is applied under a
/// single lock, so a batch is never interleaved with another.
#[derive(Debug, Default)]
pub struct RecordStore {
    records: Mutex<IndexMap<NaturalKey, Record>>,
}

impl RecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace each record by its natural key.
    pub fn ingest(&self, records: impl IntoIterator<Item = Record>) -> IngestStats {
        let mut stats = IngestStats::default();
        let mut store = self.lock();

        for record in records {
            match store.insert(record.key.clone(), record) {
                Some(_) => stats.replaced += 1,
                None => stats.inserted += 1,
            }
        }

        stats
    }

    pub fn get(&self, key: &NaturalKey) -> Option<Record> {
        self.lock().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Point-in-time copy of every record, in first-seen order.
    ///
    /// The store keeps its contents, so flushing repeatedly (checkpoints)
    /// is fine.
    pub fn flush(&self) -> Snapshot {
        Snapshot {
            records: self.lock().values().cloned().collect(),
            taken_at: Utc::now(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, IndexMap<NaturalKey, Record>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Immutable copy of the store's contents handed to sinks.
#[derive(Debug, Clone)]
pub struct Snapshot {
    records: Vec<Record>,
    taken_at: DateTime<Utc>,
}

impl Snapshot {
    pub fn new(records: Vec<Record>) -> Self {
        Self {
            records,
            taken_at: Utc::now(),
        }
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Records of one kind, in store order.
    pub fn by_kind(&self, kind: SourceKind) -> impl Iterator<Item = &Record> {
        self.records.iter().filter(move |r| r.kind() == kind)
    }

    pub fn count(&self, kind: SourceKind) -> usize {
        self.by_kind(kind).count()
    }

    pub fn taken_at(&self) -> DateTime<Utc> {
        self.taken_at
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::record::FieldValue;
    use proptest::prelude::*;

    fn property(id: &str, price: i64) -> Record {
        Record::new(
            NaturalKey::new(SourceKind::Property, [id]),
            "https://listings.example.com/p1",
        )
        .with_field("property_id", id)
        .with_field("price", price)
    }

    #[test]
    fn test_last_write_wins_keeps_first_position() {
        let store = RecordStore::new();

        let first = store.ingest([property("A", 1), property("B", 2)]);
        let second = store.ingest([property("A", 10)]);

        assert_eq!(first, IngestStats { inserted: 2, replaced: 0 });
        assert_eq!(second, IngestStats { inserted: 0, replaced: 1 });

        let snapshot = store.flush();
        let keys: Vec<_> = snapshot.records().iter().map(|r| r.key.value()).collect();
        assert_eq!(keys, vec!["A", "B"]);
        assert_eq!(snapshot.records()[0].get("price"), Some(&FieldValue::Integer(10)));
    }

    #[test]
    fn test_same_key_different_kind_kept_apart() {
        let store = RecordStore::new();
        store.ingest([
            property("X", 1),
            Record::new(NaturalKey::new(SourceKind::Environment, ["X"]), "https://api.test/w"),
        ]);

        let snapshot = store.flush();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.count(SourceKind::Property), 1);
        assert_eq!(snapshot.count(SourceKind::Environment), 1);
    }

    #[test]
    fn test_flush_does_not_drain() {
        let store = RecordStore::new();
        store.ingest([property("A", 1)]);

        assert_eq!(store.flush().len(), 1);
        assert_eq!(store.flush().len(), 1);
        assert!(!store.is_empty());
    }

    #[test]
    fn test_empty_store_flushes_empty_snapshot() {
        let snapshot = RecordStore::new().flush();
        assert!(snapshot.is_empty());
        assert_eq!(snapshot.by_kind(SourceKind::Property).count(), 0);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_ingest_is_idempotent(
            batch in prop::collection::vec(("[a-e]", 0i64..100), 0..20)
        ) {
            let records: Vec<Record> =
                batch.iter().map(|(id, price)| property(id, *price)).collect();

            let store = RecordStore::new();
            store.ingest(records.clone());
            let once: Vec<Record> = store.flush().records().to_vec();

            let stats = store.ingest(records.clone());
            let twice: Vec<Record> = store.flush().records().to_vec();

            prop_assert_eq!(stats.inserted, 0);
            prop_assert_eq!(stats.replaced, records.len());
            prop_assert_eq!(once, twice);
        }
    }
}
