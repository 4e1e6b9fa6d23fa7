//! Links between records (spec §3 "Link", §4.4).

use crate::value::{Value, ValueType};
use serde::{Deserialize, Serialize};

/// The maximum number of hops `LinkResolver` will follow before declaring a
/// cycle (spec §3 invariants, testable property 5).
pub const MAX_LINK_DEPTH: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkKind {
    Static,
    Dynamic,
}

/// A link definition as it appears in a series template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkDef {
    pub name: String,
    pub target_series: String,
    pub kind: LinkKind,
    pub description: String,
}

/// A link's stored value on one particular record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum LinkValue {
    /// Static link: the literal target record number.
    Static(i64),
    /// Dynamic link: the target's prime-key values, typed so resolution
    /// doesn't need to re-derive types from the target template (though it
    /// revalidates them lazily; spec §4.4 invariants).
    Dynamic {
        pidx_types: Vec<ValueType>,
        pidx_values: Vec<Value>,
        /// When true, `resolve` returns every matching record rather than
        /// only the highest recnum (the `_followall` variant).
        follow_all: bool,
    },
}
