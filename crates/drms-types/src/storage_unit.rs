//! Storage units and slot allocation (spec §3 "Storage unit", §4.5).

use serde::{Deserialize, Serialize};

/// A 64-bit storage-unit number. The top 16 bits encode the owning site;
/// the low 48 bits are unique within that site (spec §6 "Site-encoded
/// SUNUMs"). Sites 0..16383 are public sites under a master mirror,
/// 16384..32767 are import-only; negative site codes are invalid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Sunum(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SiteKind {
    Public,
    ImportOnly,
}

impl Sunum {
    pub fn new(site: u16, local_id: u64) -> Self {
        assert!(local_id <= 0x0000_FFFF_FFFF_FFFF, "local id exceeds 48 bits");
        Self(((site as u64) << 48) | local_id)
    }

    pub fn site_code(self) -> u16 {
        (self.0 >> 48) as u16
    }

    pub fn local_id(self) -> u64 {
        self.0 & 0x0000_FFFF_FFFF_FFFF
    }

    pub fn site_kind(self) -> Option<SiteKind> {
        match self.site_code() {
            0..=16383 => Some(SiteKind::Public),
            16384..=32767 => Some(SiteKind::ImportOnly),
            _ => None,
        }
    }

    pub fn is_local(self, local_site: u16) -> bool {
        self.site_code() == local_site
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotState {
    Free,
    Full,
    Temp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitMode {
    /// Fetched from the archive; may be empty if the fetch is still staging.
    ReadOnly,
    /// Just allocated, writable.
    ReadWrite,
}

/// An allocated directory tree holding up to `unitsize` record slots (spec
/// §3 "Storage unit", §4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageUnit {
    pub sunum: Sunum,
    pub series: String,
    pub unitsize: u32,
    pub mode: UnitMode,
    pub directory: Option<String>,
    pub state: Vec<SlotState>,
    pub recnum: Vec<Option<i64>>,
    pub nfree: u32,
    /// Number of live records referencing this unit; the unit is evicted
    /// from the storage-unit cache when this reaches zero (spec §4.3
    /// `free_record`).
    pub refcount: u32,
}

impl StorageUnit {
    pub fn new_readwrite(sunum: Sunum, series: String, unitsize: u32) -> Self {
        Self {
            sunum,
            series,
            unitsize,
            mode: UnitMode::ReadWrite,
            directory: None,
            state: vec![SlotState::Free; unitsize as usize],
            recnum: vec![None; unitsize as usize],
            nfree: unitsize,
            refcount: 0,
        }
    }

    /// Invariant 1 (spec §8): `nfree + |{i : state[i] != Free}| == unitsize`.
    pub fn check_invariant(&self) -> bool {
        let occupied = self.state.iter().filter(|s| **s != SlotState::Free).count() as u32;
        self.nfree + occupied == self.unitsize
    }

    /// Allocates the first free slot for `recnum`, transitioning it to
    /// `Full` (permanent) or `Temp` (transient) depending on the record's
    /// lifetime (spec §4.5 "On slot allocation"). Returns the slot index.
    pub fn allocate_slot(&mut self, recnum: i64, transient: bool) -> Option<usize> {
        let idx = self.state.iter().position(|s| *s == SlotState::Free)?;
        self.state[idx] = if transient { SlotState::Temp } else { SlotState::Full };
        self.recnum[idx] = Some(recnum);
        self.nfree -= 1;
        Some(idx)
    }

    /// A unit is archived as non-temporary iff at least one slot is `Full`
    /// (spec §3 "Storage unit" invariants).
    pub fn has_committable_slot(&self) -> bool {
        self.state.iter().any(|s| *s == SlotState::Full)
    }

    pub fn is_empty(&self) -> bool {
        self.state.iter().all(|s| *s == SlotState::Free)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sunum_round_trips_site_and_local_id() {
        let su = Sunum::new(42, 12345);
        assert_eq!(su.site_code(), 42);
        assert_eq!(su.local_id(), 12345);
    }

    #[test]
    fn slot_allocation_maintains_invariant() {
        let mut unit = StorageUnit::new_readwrite(Sunum::new(0, 1), "ns.series".into(), 4);
        unit.allocate_slot(100, false);
        unit.allocate_slot(101, true);
        assert!(unit.check_invariant());
        assert_eq!(unit.nfree, 2);
        assert!(unit.has_committable_slot());
    }
}
