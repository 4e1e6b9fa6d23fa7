//! Identity-mapped live records (spec §4.3): `(series, recnum) -> Record`,
//! never silently dropped — eviction is explicit via `free_record`. Same
//! `Mutex<HashMap<..>>` shape as [`crate::series_cache::SeriesCache`].

use std::collections::HashMap;
use std::sync::Mutex;

use drms_types::record::Record;

pub struct RecordCache {
    store: Mutex<HashMap<(String, i64), Record>>,
}

impl RecordCache {
    pub fn new() -> Self {
        Self {
            store: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, series: &str, recnum: i64) -> Option<Record> {
        self.store.lock().unwrap().get(&(series.to_string(), recnum)).cloned()
    }

    /// Inserts `record`, returning `true` if this is a fresh entry (the
    /// caller should bump the owning storage unit's refcount only then).
    pub fn insert(&self, record: Record) -> bool {
        let key = (record.series.clone(), record.recnum);
        let mut store = self.store.lock().unwrap();
        let is_new = !store.contains_key(&key);
        store.insert(key, record);
        is_new
    }

    /// Removes and returns the record, for `free_record` (spec §4.3).
    pub fn remove(&self, series: &str, recnum: i64) -> Option<Record> {
        self.store.lock().unwrap().remove(&(series.to_string(), recnum))
    }

    /// All cached, non-read-only records for `series` — the dirty set
    /// `close_all(INSERT)` batches into one bulk statement (spec §4.3).
    pub fn writable_for_series(&self, series: &str) -> Vec<Record> {
        self.store
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.series == series && !r.is_open())
            .cloned()
            .collect()
    }

    pub fn all_series(&self) -> Vec<String> {
        let store = self.store.lock().unwrap();
        let mut series: Vec<String> = store.keys().map(|(s, _)| s.clone()).collect();
        series.sort();
        series.dedup();
        series
    }

    /// Drains every cached record, for `close_all`'s final "free all cached
    /// records" step (spec §4.3).
    pub fn drain(&self) -> Vec<Record> {
        self.store.lock().unwrap().drain().map(|(_, v)| v).collect()
    }
}

impl Default for RecordCache {
    fn default() -> Self {
        Self::new()
    }
}
