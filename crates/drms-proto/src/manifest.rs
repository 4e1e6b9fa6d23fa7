//! The `Records.txt` manifest committed alongside every storage unit (spec
//! §6): an optional `DELETE_SLOTS_RECORDS` marker line, a `series=<name>`
//! line, a `slot<TAB>recnum` column header, then one `(slot, recnum)` pair
//! per line. Grounded on the line-oriented, tag-prefixed text formats the
//! JSD parser (`drms-jsd::header`) already reads — the same tokenize-a-
//! line-at-a-time approach applies here, just for a much smaller grammar.

use crate::error::{ProtoError, Result};

const DELETE_SLOTS_MARKER: &str = "DELETE_SLOTS_RECORDS";
const COLUMN_HEADER: &str = "slot\trecnum";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    pub series: String,
    pub delete_slots_records: bool,
    pub slots: Vec<(i32, i64)>,
}

pub fn parse_manifest(text: &str) -> Result<Manifest> {
    let mut lines = text.lines().map(str::trim).filter(|l| !l.is_empty());

    let mut first = lines
        .next()
        .ok_or_else(|| ProtoError::MalformedManifest("empty manifest".into()))?;

    let delete_slots_records = if first == DELETE_SLOTS_MARKER {
        first = lines
            .next()
            .ok_or_else(|| ProtoError::MalformedManifest("missing series= line".into()))?;
        true
    } else {
        false
    };

    let series = first
        .strip_prefix("series=")
        .ok_or_else(|| ProtoError::MalformedManifest(format!("expected series= line, got {first:?}")))?
        .to_string();
    if series.is_empty() {
        return Err(ProtoError::MalformedManifest("empty series name".into()));
    }

    let header = lines
        .next()
        .ok_or_else(|| ProtoError::MalformedManifest("missing slot/recnum header".into()))?;
    if header != COLUMN_HEADER {
        return Err(ProtoError::MalformedManifest(format!(
            "expected {COLUMN_HEADER:?} header, got {header:?}"
        )));
    }

    let mut slots = Vec::new();
    for line in lines {
        let (slot_tok, recnum_tok) = line
            .split_once('\t')
            .ok_or_else(|| ProtoError::MalformedManifest(format!("malformed slot line {line:?}")))?;
        let slot: i32 = slot_tok
            .trim()
            .parse()
            .map_err(|_| ProtoError::MalformedManifest(format!("bad slot number {slot_tok:?}")))?;
        let recnum: i64 = recnum_tok
            .trim()
            .parse()
            .map_err(|_| ProtoError::MalformedManifest(format!("bad record number {recnum_tok:?}")))?;
        slots.push((slot, recnum));
    }

    Ok(Manifest {
        series,
        delete_slots_records,
        slots,
    })
}

pub fn format_manifest(m: &Manifest) -> String {
    let mut out = String::new();
    if m.delete_slots_records {
        out.push_str(DELETE_SLOTS_MARKER);
        out.push('\n');
    }
    out.push_str("series=");
    out.push_str(&m.series);
    out.push('\n');
    out.push_str(COLUMN_HEADER);
    out.push('\n');
    for (slot, recnum) in &m.slots {
        out.push_str(&format!("{slot}\t{recnum}\n"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_plain_manifest() {
        let m = Manifest {
            series: "su.prod.fd_m_96".into(),
            delete_slots_records: false,
            slots: vec![(0, 1001), (1, 1002), (2, 1004)],
        };
        let text = format_manifest(&m);
        let back = parse_manifest(&text).unwrap();
        assert_eq!(m, back);
    }

    #[test]
    fn round_trips_delete_slots_manifest() {
        let m = Manifest {
            series: "su.prod.fd_m_96".into(),
            delete_slots_records: true,
            slots: vec![(3, 1010)],
        };
        let text = format_manifest(&m);
        let back = parse_manifest(&text).unwrap();
        assert_eq!(m, back);
    }

    #[test]
    fn rejects_missing_header() {
        let bad = "series=su.prod.fd_m_96\n0\t1001\n";
        assert!(parse_manifest(bad).is_err());
    }

    #[test]
    fn rejects_empty_manifest() {
        assert!(parse_manifest("").is_err());
    }
}
