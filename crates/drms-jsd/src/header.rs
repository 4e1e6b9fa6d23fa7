//! The JSD header block: `Seriesname`, `Description`, `Author`, `Owner`,
//! `Unitsize`, `Archive`, `Retention`, `Tapegroup`, `Version`,
//! `PrimeKeys`/`Index`, `DBIndex` (spec §4.2). Grounded on the header field
//! set read in `drms_parser.c`'s `drms_template_record` / `parse_*` helpers.

use crate::error::{JsdError, Result};
use crate::lexer::tokenize;

#[derive(Debug, Default)]
pub struct HeaderFields {
    pub seriesname: Option<String>,
    pub description: Option<String>,
    pub author: Option<String>,
    pub owner: Option<String>,
    pub unitsize: Option<u32>,
    pub archive: Option<i32>,
    pub retention: Option<i32>,
    pub tapegroup: Option<i32>,
    /// JSD grammar version, gating segment bzero/bscale/cparms synthesis
    /// (spec §4.2 "Version-gated features"). Absent defaults to `(0, 0)`,
    /// below every gated threshold.
    pub version: (u32, u32),
    pub prime_keys: Vec<String>,
    pub db_index: Vec<String>,
}

fn name_list(rest: &str) -> Vec<String> {
    tokenize(rest)
}

/// Consumes one header line (`Key: value` or `Key: value, value, …`),
/// mutating `fields`. Unrecognized `Key:` lines are ignored, matching the
/// original's tolerance of forward-compatible header extensions.
pub fn parse_header_line(line: &str, line_no: usize, fields: &mut HeaderFields) -> Result<()> {
    let Some(colon) = line.find(':') else {
        return Ok(());
    };
    let key = line[..colon].trim();
    let rest = line[colon + 1..].trim();

    match key {
        "Seriesname" => fields.seriesname = Some(rest.trim_matches(&['"', '\''][..]).to_string()),
        "Description" => fields.description = Some(rest.trim_matches(&['"', '\''][..]).to_string()),
        "Author" => fields.author = Some(rest.trim_matches(&['"', '\''][..]).to_string()),
        "Owner" => fields.owner = Some(rest.trim_matches(&['"', '\''][..]).to_string()),
        "Unitsize" => {
            fields.unitsize = Some(
                rest.parse()
                    .map_err(|_| JsdError::syntax(line_no, format!("invalid Unitsize '{rest}'")))?,
            )
        }
        "Archive" => {
            fields.archive = Some(
                rest.parse()
                    .map_err(|_| JsdError::syntax(line_no, format!("invalid Archive '{rest}'")))?,
            )
        }
        "Retention" => {
            fields.retention = Some(
                rest.parse()
                    .map_err(|_| JsdError::syntax(line_no, format!("invalid Retention '{rest}'")))?,
            )
        }
        "Tapegroup" => {
            fields.tapegroup = Some(
                rest.parse()
                    .map_err(|_| JsdError::syntax(line_no, format!("invalid Tapegroup '{rest}'")))?,
            )
        }
        "Version" => {
            let (major, minor) = rest
                .split_once('.')
                .ok_or_else(|| JsdError::syntax(line_no, format!("invalid Version '{rest}'")))?;
            fields.version = (
                major
                    .parse()
                    .map_err(|_| JsdError::syntax(line_no, format!("invalid Version '{rest}'")))?,
                minor
                    .parse()
                    .map_err(|_| JsdError::syntax(line_no, format!("invalid Version '{rest}'")))?,
            );
        }
        "PrimeKeys" | "Index" => fields.prime_keys = name_list(rest),
        "DBIndex" => fields.db_index = name_list(rest),
        _ => {}
    }
    Ok(())
}

impl HeaderFields {
    /// JSD version >= 2.0 (spec §4.2 "Version-gated features": compression
    /// parameter string replaces tile-block sizes).
    pub fn has_cparms_grammar(&self) -> bool {
        self.version >= (2, 0)
    }

    /// JSD version >= 2.1 (spec §4.2: segment bzero/bscale synthesis).
    pub fn has_bzero_bscale_grammar(&self) -> bool {
        self.version >= (2, 1)
    }
}
