//! Series templates (spec §3 "Series", §4.2 JSD synthesis outputs).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::keyword::Keyword;
use crate::link::LinkDef;
use crate::segment::SegmentDef;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchiveFlag {
    Off,
    Archive,
    OnDeleteDestroy,
}

impl ArchiveFlag {
    /// Archive flag outside {-1, 0, 1} is a warning, clamped to `Off`
    /// (spec §7 "Warnings").
    pub fn from_raw(n: i32) -> (Self, bool) {
        match n {
            -1 => (Self::OnDeleteDestroy, false),
            0 => (Self::Off, false),
            1 => (Self::Archive, false),
            _ => (Self::Off, true),
        }
    }
}

/// Distinguishes internal-prime (index keywords, used for the physical DB
/// index) from external-prime (the slotted keyword itself, used by callers
/// querying the series) views of a series' prime key (spec §3, §4.2 "Prime
/// key promotion").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimeKeyView {
    Internal,
    External,
}

/// The in-memory prototype of a series: its header, segments, links,
/// keywords, and prime/index key sets (spec §3 "Series", Glossary
/// "Template").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeriesTemplate {
    pub name: String,
    pub description: String,
    pub author: String,
    pub owner: String,
    /// Records per storage unit. Must be >= 1 if the series has any
    /// segments (spec §3 "Series").
    pub unitsize: u32,
    pub archive: ArchiveFlag,
    pub tapegroup: i32,
    pub retention_days: i32,
    /// Ordered external prime-key names, as declared (slotted keywords
    /// appear here by their externally-visible name).
    pub prime_keys_external: Vec<String>,
    /// Ordered internal prime-key names: slotted keywords are replaced by
    /// their synthesized `_index` companion (spec §4.2).
    pub prime_keys_internal: Vec<String>,
    /// The columns a physical-layer index is built over.
    pub db_index: Vec<String>,
    pub keywords: BTreeMap<String, Keyword>,
    pub links: BTreeMap<String, LinkDef>,
    pub segments: BTreeMap<String, SegmentDef>,
}

impl SeriesTemplate {
    pub fn prime_keys(&self, view: PrimeKeyView) -> &[String] {
        match view {
            PrimeKeyView::Internal => &self.prime_keys_internal,
            PrimeKeyView::External => &self.prime_keys_external,
        }
    }

    pub fn keyword(&self, name: &str) -> Option<&Keyword> {
        self.keywords.get(name)
    }

    pub fn link(&self, name: &str) -> Option<&LinkDef> {
        self.links.get(name)
    }
}
