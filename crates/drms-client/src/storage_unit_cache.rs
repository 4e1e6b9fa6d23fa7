//! Per-series storage-unit cache (spec §4.5): `SUNUM -> StorageUnit`,
//! evicted when a unit's refcount drops to zero (spec §4.3 `free_record`).

use std::collections::HashMap;
use std::sync::Mutex;

use drms_types::storage_unit::{StorageUnit, Sunum, UnitMode};

pub struct StorageUnitCache {
    store: Mutex<HashMap<String, HashMap<Sunum, StorageUnit>>>,
}

impl StorageUnitCache {
    pub fn new() -> Self {
        Self {
            store: Mutex::new(HashMap::new()),
        }
    }

    pub fn insert(&self, unit: StorageUnit) {
        let mut store = self.store.lock().unwrap();
        store.entry(unit.series.clone()).or_default().insert(unit.sunum, unit);
    }

    pub fn get(&self, series: &str, sunum: Sunum) -> Option<StorageUnit> {
        self.store.lock().unwrap().get(series).and_then(|m| m.get(&sunum).cloned())
    }

    /// The first READWRITE unit of `series` with at least one free slot
    /// (spec §4.5: "draw slots from an existing READWRITE unit that has
    /// `nfree > 0`").
    pub fn find_writable_with_free_slot(&self, series: &str) -> Option<Sunum> {
        let store = self.store.lock().unwrap();
        store.get(series)?.values().find(|u| u.mode == UnitMode::ReadWrite && u.nfree > 0).map(|u| u.sunum)
    }

    /// Applies `f` to the unit in place, returning its result.
    pub fn with_unit_mut<R>(&self, series: &str, sunum: Sunum, f: impl FnOnce(&mut StorageUnit) -> R) -> Option<R> {
        let mut store = self.store.lock().unwrap();
        let unit = store.get_mut(series)?.get_mut(&sunum)?;
        Some(f(unit))
    }

    pub fn increment_ref(&self, series: &str, sunum: Sunum) {
        self.with_unit_mut(series, sunum, |u| u.refcount += 1);
    }

    /// Decrements the unit's refcount; evicts it from the cache when it
    /// reaches zero (spec §4.3 `free_record`). Returns `true` if evicted.
    pub fn decrement_ref(&self, series: &str, sunum: Sunum) -> bool {
        let mut store = self.store.lock().unwrap();
        let Some(units) = store.get_mut(series) else {
            return false;
        };
        let Some(unit) = units.get_mut(&sunum) else {
            return false;
        };
        unit.refcount = unit.refcount.saturating_sub(1);
        if unit.refcount == 0 {
            units.remove(&sunum);
            true
        } else {
            false
        }
    }

    /// Every READWRITE unit of `series` with at least one committed slot —
    /// the set `close_all`'s commit path submits to the archive worker
    /// (spec §4.5 "On commit").
    pub fn committable_units(&self, series: &str) -> Vec<StorageUnit> {
        self.store
            .lock()
            .unwrap()
            .get(series)
            .map(|m| {
                m.values()
                    .filter(|u| u.mode == UnitMode::ReadWrite && u.has_committable_slot())
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Records the unit's on-disk directory once the archive worker hands
    /// one back (spec §4.5 "On slot allocation").
    pub fn set_directory(&self, series: &str, sunum: Sunum, directory: String) {
        self.with_unit_mut(series, sunum, |u| u.directory = Some(directory));
    }

    /// Flips a submitted unit to READONLY (spec §4.5 "On commit" — PUT
    /// status 0 means the archive manager now owns the unit).
    pub fn mark_readonly(&self, series: &str, sunum: Sunum) {
        self.with_unit_mut(series, sunum, |u| u.mode = UnitMode::ReadOnly);
    }
}

impl Default for StorageUnitCache {
    fn default() -> Self {
        Self::new()
    }
}
