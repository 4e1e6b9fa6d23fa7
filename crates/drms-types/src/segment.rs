//! Segments: named files attached to a record (spec §3 "Segment").

use serde::{Deserialize, Serialize};

use crate::value::ValueType;

/// Storage protocol for a segment's bytes. Bit-layouts of these formats are
/// explicitly out of scope (spec §1); only the tag and its scaling/blocking
/// metadata are modeled here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Protocol {
    Binary,
    BinaryGzip,
    Fits,
    FitsCompressed,
    Tas,
    Generic,
}

impl Protocol {
    /// Compression-parameter and bzero/bscale keyword synthesis applies to
    /// these protocols (spec §4.2 "Compression-parameter synthesis").
    pub fn needs_cparms(self) -> bool {
        matches!(self, Protocol::Fits | Protocol::FitsCompressed | Protocol::Tas)
    }

    pub fn needs_bzero_bscale(self) -> bool {
        matches!(self, Protocol::Fits | Protocol::FitsCompressed | Protocol::Tas)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentScope {
    /// Shared structure and values across all records of the series.
    Constant,
    /// Structure fixed, values per record.
    Variable,
    /// Even axis lengths vary per record.
    VarDim,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentDef {
    pub name: String,
    pub scope: SegmentScope,
    pub value_type: ValueType,
    /// Axis lengths, or blocking dimensions for tiled protocols. Rank is
    /// `axes.len()`, capped at 16 (spec §3 "Segment").
    pub axes: Vec<i64>,
    pub protocol: Protocol,
    pub unit: String,
    pub description: String,
    /// Present only for protocols where `needs_bzero_bscale` is true.
    pub bzero: Option<f64>,
    pub bscale: Option<f64>,
    /// Compression parameter string, synthesized for JSD version >= 2.1
    /// (spec §4.2 "Version-gated features"), else `None`.
    pub cparms: Option<String>,
}

pub const MAX_SEGMENT_RANK: usize = 16;
