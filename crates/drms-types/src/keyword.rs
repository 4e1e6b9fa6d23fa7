//! Keywords and recscope classification (spec §3 "Keyword").

use crate::value::{Value, ValueType};
use serde::{Deserialize, Serialize};

/// How a keyword's value relates to the records of its series (spec §3
/// "Recscope"). `Slotted` carries the sub-flavor that fixes where `base`
/// and `step` come from (spec §3, §9 supplement C.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecScope {
    Variable,
    Constant,
    Slotted(SlotFlavor),
    /// Auto-generated companion of a slotted keyword.
    Index,
}

/// Sub-flavors of a slotted keyword, fixing where `base`/`step`/`round`
/// come from (original `DRMS_RecScopeType_enum`: `TS_EQ`, `SLOT`, `ENUM`,
/// `CARR`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotFlavor {
    /// Time-equal: `base`/`step` come from companion constant keywords
    /// `<name>_epoch` (time or string) and `<name>_step` (seconds).
    TimeEqual,
    /// Generic real-valued slot: `base`/`step` come from companion constant
    /// keywords `<name>_base` (double/float/time) and `<name>_step`.
    Slot,
    /// Enumeration: like `Slot`, but the value space is a named set rather
    /// than a continuous quantity. `base` defaults to 0.
    Enum,
    /// Carrington rotation slotting: `base` is fixed by convention, only a
    /// companion `<name>_step` constant is required.
    Carrington,
}

impl SlotFlavor {
    /// The companion constant-keyword name suffixes this flavor requires,
    /// beyond the ubiquitous `_step` (spec §4.2 "Slotted-key expansion").
    pub fn required_companions(self) -> &'static [&'static str] {
        match self {
            SlotFlavor::TimeEqual => &["_epoch", "_step"],
            SlotFlavor::Slot => &["_base", "_step"],
            SlotFlavor::Enum => &["_base", "_step"],
            SlotFlavor::Carrington => &["_step"],
        }
    }
}

/// A fully-resolved keyword within a series template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Keyword {
    pub name: String,
    pub value_type: ValueType,
    pub default: Value,
    pub format: String,
    pub unit: String,
    pub description: String,
    pub recscope: RecScope,
    /// True if this keyword is materialized per-segment (`name_000`, …)
    /// rather than once per record (spec §4.2 "Per-segment keyword
    /// expansion").
    pub per_segment: bool,
    /// Set when this keyword's value is inherited through a link, rather
    /// than stored directly.
    pub link_info: Option<LinkKeywordInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkKeywordInfo {
    pub link_name: String,
    pub target_keyword: String,
}

impl Keyword {
    /// True if this keyword is internally prime: it appears in the DB
    /// index and in prime-key queries directly (spec §3 "Recscope"). Index
    /// keywords always are; everything else depends on explicit
    /// prime-key promotion, tracked separately by the series template.
    pub fn is_index(&self) -> bool {
        matches!(self.recscope, RecScope::Index)
    }

    pub fn is_slotted(&self) -> bool {
        matches!(self.recscope, RecScope::Slotted(_))
    }

    /// The name of this keyword's synthesized index companion, if slotted.
    pub fn index_name(&self) -> Option<String> {
        self.is_slotted().then(|| format!("{}_index", self.name))
    }
}

/// Slotting parameters resolved from a slotted keyword's companion
/// constants (spec §4.9 "Time / Slot Arithmetic").
#[derive(Debug, Clone, Copy)]
pub struct SlotParams {
    pub base: f64,
    pub step: f64,
    pub round: f64,
}

/// `floor((v − base + round/2) / step)` (spec §3, §4.9, testable scenario
/// S2). `round` is an optional per-series bias from a companion `_round`
/// constant and defaults to `0.0` when absent, which is what makes S2's
/// three sample values land on slots 0, 1, 0.
pub fn slot_index(v: f64, params: SlotParams) -> i64 {
    ((v - params.base + params.round / 2.0) / params.step).floor() as i64
}

/// The inverse of [`slot_index`]: the canonical slot value for an index.
pub fn slot_value(index: i64, params: SlotParams) -> f64 {
    params.base + index as f64 * params.step
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_index_matches_scenario_s2() {
        let params = SlotParams {
            base: 0.0,
            step: 60.0,
            round: 0.0,
        };
        assert_eq!(slot_index(30.0, params), 0);
        assert_eq!(slot_index(90.0, params), 1);
        assert_eq!(slot_index(29.0, params), 0);
    }

    #[test]
    fn index_then_value_is_canonical() {
        let params = SlotParams {
            base: 100.0,
            step: 10.0,
            round: 10.0,
        };
        assert_eq!(slot_value(slot_index(135.0, params), params), 130.0);
    }
}
