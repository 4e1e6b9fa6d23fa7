//! The two-phase JSD parser (spec §4.2). Phase 1 ([`parse_lines`]) walks
//! the text once, classifying each line and collecting header fields,
//! links, raw keyword declarations, and segments. Phase 2
//! ([`synthesize`]) validates slotted-key companions, expands
//! per-segment keywords, synthesizes index/compression keywords, and
//! resolves prime-key promotion — all of which need the complete
//! keyword/segment set to be in hand first.
//!
//! Grounded on `drms_parser.c`'s `parse_link`/`parse_keyword`/`parse_seg`/
//! `parse_primaryindex`/`parse_dbindex`, restructured as collect-then-
//! validate instead of mutating the template container in place.

use std::collections::BTreeMap;

use drms_types::keyword::{Keyword, LinkKeywordInfo, RecScope, SlotFlavor};
use drms_types::link::{LinkDef, LinkKind};
use drms_types::segment::{Protocol, SegmentDef, SegmentScope};
use drms_types::series::{ArchiveFlag, SeriesTemplate};
use drms_types::value::{self, Value, ValueType};

use crate::error::{JsdError, Result};
use crate::header::{parse_header_line, HeaderFields};
use crate::lexer::{strip_comment, TokenStream};

enum RawKeyword {
    Link {
        name: String,
        line: usize,
        linkname: String,
        target_key: String,
        description: String,
    },
    Simple {
        name: String,
        line: usize,
        value_type: ValueType,
        recscope_tok: String,
        per_segment: bool,
        default_tok: String,
        format: String,
        unit: String,
        description: String,
    },
}

struct Phase1 {
    header: HeaderFields,
    links: Vec<LinkDef>,
    keywords: Vec<RawKeyword>,
    segments: Vec<SegmentDef>,
}

fn value_type_from_str(s: &str) -> Result<ValueType> {
    Ok(match s.to_lowercase().as_str() {
        "char" => ValueType::Char,
        "short" => ValueType::Short,
        "int" => ValueType::Int,
        "long" | "longlong" => ValueType::Long,
        "float" => ValueType::Float,
        "double" => ValueType::Double,
        "time" => ValueType::Time,
        "string" => ValueType::String,
        other => return Err(JsdError::semantic(format!("unknown keyword type '{other}'"))),
    })
}

fn protocol_from_str(s: &str) -> Result<Protocol> {
    Ok(match s.to_lowercase().as_str() {
        "binary" => Protocol::Binary,
        "binary_gzip" | "bingzip" => Protocol::BinaryGzip,
        "fits" => Protocol::Fits,
        "fitz" | "fits_compressed" | "compressed_fits" => Protocol::FitsCompressed,
        "tas" => Protocol::Tas,
        "generic" => Protocol::Generic,
        other => return Err(JsdError::semantic(format!("unknown segment protocol '{other}'"))),
    })
}

fn segment_scope_from_str(s: &str) -> Result<SegmentScope> {
    Ok(match s.to_lowercase().as_str() {
        "constant" => SegmentScope::Constant,
        "variable" => SegmentScope::Variable,
        "vardim" => SegmentScope::VarDim,
        other => return Err(JsdError::semantic(format!("unknown segment scope '{other}'"))),
    })
}

fn parse_link_line(mut toks: TokenStream, line_no: usize) -> Result<LinkDef> {
    let name = toks
        .next()
        .ok_or_else(|| JsdError::syntax(line_no, "Link: line missing name"))?
        .to_string();
    let target_series = toks
        .next()
        .ok_or_else(|| JsdError::syntax(line_no, "Link: line missing target series"))?
        .to_string();
    let kind_tok = toks
        .next()
        .ok_or_else(|| JsdError::syntax(line_no, "Link: line missing static|dynamic"))?
        .to_lowercase();
    let kind = match kind_tok.as_str() {
        "static" => LinkKind::Static,
        "dynamic" => LinkKind::Dynamic,
        other => {
            return Err(JsdError::syntax(
                line_no,
                format!("Link: kind must be 'static' or 'dynamic', got '{other}'"),
            ))
        }
    };
    let description = toks.rest_joined();
    Ok(LinkDef {
        name,
        target_series,
        kind,
        description,
    })
}

fn parse_keyword_line(mut toks: TokenStream, line_no: usize) -> Result<RawKeyword> {
    let name = toks
        .next()
        .ok_or_else(|| JsdError::syntax(line_no, "Keyword: line missing name"))?
        .to_string();
    let type_tok = toks
        .next()
        .ok_or_else(|| JsdError::syntax(line_no, "Keyword: line missing type"))?
        .to_string();

    if type_tok.eq_ignore_ascii_case("link") {
        let linkname = toks
            .next()
            .ok_or_else(|| JsdError::syntax(line_no, "link keyword missing link name"))?
            .to_string();
        let target_key = toks
            .next()
            .ok_or_else(|| JsdError::syntax(line_no, "link keyword missing target key"))?
            .to_string();
        let description = toks.rest_joined();
        return Ok(RawKeyword::Link {
            name,
            line: line_no,
            linkname,
            target_key,
            description,
        });
    }

    let value_type = value_type_from_str(&type_tok).map_err(|e| match e {
        JsdError::Semantic(m) => JsdError::syntax(line_no, m),
        other => other,
    })?;
    let recscope_tok = toks
        .next()
        .ok_or_else(|| JsdError::syntax(line_no, "keyword missing constant|variable|recscope"))?
        .to_lowercase();
    let scope_tok = toks
        .next()
        .ok_or_else(|| JsdError::syntax(line_no, "keyword missing record|segment scope"))?
        .to_lowercase();
    let per_segment = match scope_tok.as_str() {
        "record" => false,
        "segment" => true,
        other => {
            return Err(JsdError::syntax(
                line_no,
                format!("keyword scope must be 'record' or 'segment', got '{other}'"),
            ))
        }
    };
    let default_tok = toks
        .next()
        .ok_or_else(|| JsdError::syntax(line_no, "keyword missing default value"))?
        .to_string();
    let format = toks
        .next()
        .ok_or_else(|| JsdError::syntax(line_no, "keyword missing format"))?
        .to_string();
    let unit = toks
        .next()
        .ok_or_else(|| JsdError::syntax(line_no, "keyword missing unit"))?
        .to_string();
    let description = toks.rest_joined();

    Ok(RawKeyword::Simple {
        name,
        line: line_no,
        value_type,
        recscope_tok,
        per_segment,
        default_tok,
        format,
        unit,
        description,
    })
}

fn parse_data_line(mut toks: TokenStream, line_no: usize, header: &HeaderFields) -> Result<SegmentDef> {
    let name = toks
        .next()
        .ok_or_else(|| JsdError::syntax(line_no, "Data: line missing name"))?
        .to_string();
    let scope = segment_scope_from_str(
        toks.next()
            .ok_or_else(|| JsdError::syntax(line_no, "Data: line missing scope"))?,
    )
    .map_err(|e| match e {
        JsdError::Semantic(m) => JsdError::syntax(line_no, m),
        other => other,
    })?;
    let value_type = value_type_from_str(
        toks.next()
            .ok_or_else(|| JsdError::syntax(line_no, "Data: line missing type"))?,
    )
    .map_err(|e| match e {
        JsdError::Semantic(m) => JsdError::syntax(line_no, m),
        other => other,
    })?;
    let naxis: usize = toks
        .next()
        .ok_or_else(|| JsdError::syntax(line_no, "Data: line missing naxis"))?
        .parse()
        .map_err(|_| JsdError::syntax(line_no, "Data: naxis is not an integer"))?;
    if naxis > drms_types::segment::MAX_SEGMENT_RANK {
        return Err(JsdError::syntax(
            line_no,
            format!("Data: naxis {naxis} exceeds MAX_SEGMENT_RANK"),
        ));
    }
    let mut axes = Vec::with_capacity(naxis);
    for _ in 0..naxis {
        let axis: i64 = toks
            .next()
            .ok_or_else(|| JsdError::syntax(line_no, "Data: line has fewer axis values than naxis"))?
            .parse()
            .map_err(|_| JsdError::syntax(line_no, "Data: axis value is not an integer"))?;
        axes.push(axis);
    }
    let unit = toks
        .next()
        .ok_or_else(|| JsdError::syntax(line_no, "Data: line missing unit"))?
        .to_string();
    let protocol = protocol_from_str(
        toks.next()
            .ok_or_else(|| JsdError::syntax(line_no, "Data: line missing protocol"))?,
    )
    .map_err(|e| match e {
        JsdError::Semantic(m) => JsdError::syntax(line_no, m),
        other => other,
    })?;

    // Whatever remains before the trailing quoted description is the
    // optional cparms/bzero/bscale tail (spec §4.2 "Version-gated
    // features"); its length alone tells us which fields are present.
    let mut tail: Vec<String> = Vec::new();
    while !toks.is_empty() {
        tail.push(toks.next().unwrap().to_string());
    }
    let description = tail.pop().unwrap_or_default();

    let (cparms, bzero, bscale) = match tail.len() {
        0 => (None, None, None),
        1 if header.has_cparms_grammar() && protocol.needs_cparms() => (Some(tail[0].clone()), None, None),
        2 if header.has_bzero_bscale_grammar() && protocol.needs_bzero_bscale() => (
            None,
            Some(parse_f64(&tail[0], line_no)?),
            Some(parse_f64(&tail[1], line_no)?),
        ),
        3 if header.has_cparms_grammar() && protocol.needs_cparms() => (
            Some(tail[0].clone()),
            Some(parse_f64(&tail[1], line_no)?),
            Some(parse_f64(&tail[2], line_no)?),
        ),
        n => {
            return Err(JsdError::syntax(
                line_no,
                format!("Data: line has {n} unexpected trailing fields before the description"),
            ))
        }
    };

    Ok(SegmentDef {
        name,
        scope,
        value_type,
        axes,
        protocol,
        unit,
        description,
        bzero,
        bscale,
        cparms,
    })
}

fn parse_f64(s: &str, line_no: usize) -> Result<f64> {
    s.parse()
        .map_err(|_| JsdError::syntax(line_no, format!("'{s}' is not a number")))
}

fn phase1(text: &str) -> Result<Phase1> {
    let mut header = HeaderFields::default();
    let mut links = Vec::new();
    let mut keywords = Vec::new();
    let mut segments = Vec::new();

    for (idx, raw_line) in text.lines().enumerate() {
        let line_no = idx + 1;
        let line = strip_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }

        if let Some(rest) = line.strip_prefix("Link:") {
            links.push(parse_link_line(TokenStream::new(rest), line_no)?);
        } else if let Some(rest) = line.strip_prefix("Keyword:") {
            keywords.push(parse_keyword_line(TokenStream::new(rest), line_no)?);
        } else if let Some(rest) = line.strip_prefix("Data:") {
            // Data: lines need the header's version to decide the tail
            // grammar, but the header may not be fully read yet on a
            // single forward pass; we run phase1 in the textual order the
            // spec's header-first layout implies, so by the time `Data:`
            // lines appear the relevant header fields are already set.
            segments.push(parse_data_line(TokenStream::new(rest), line_no, &header)?);
        } else {
            parse_header_line(line, line_no, &mut header)?;
        }
    }

    Ok(Phase1 {
        header,
        links,
        keywords,
        segments,
    })
}

fn default_value(value_type: ValueType, tok: &str) -> Result<Value> {
    if tok.eq_ignore_ascii_case("missing") || tok.eq_ignore_ascii_case("drms_missing_value") {
        return Ok(Value::missing(value_type));
    }
    Ok(value::sscanf_value(value_type, tok)?)
}

fn check_format(line_no: usize, value_type: ValueType, format: &str, name: &str) {
    let ok = if value_type == ValueType::Time {
        value::parse_time_precision(format).is_ok()
    } else {
        value::parse_format(format)
            .and_then(|spec| value::validate_format_for_type(value_type, &spec))
            .is_ok()
    };
    if !ok {
        tracing::warn!(line = line_no, keyword = name, format, "format specifier incompatible with declared type");
    }
}

fn recscope_from_token(tok: &str, line_no: usize, name: &str) -> Result<RecScope> {
    Ok(match tok {
        "constant" => RecScope::Constant,
        "variable" => RecScope::Variable,
        "ts_eq" | "timeequal" => RecScope::Slotted(SlotFlavor::TimeEqual),
        "slot" => RecScope::Slotted(SlotFlavor::Slot),
        "enum" => RecScope::Slotted(SlotFlavor::Enum),
        "carr" | "carrington" => RecScope::Slotted(SlotFlavor::Carrington),
        other => {
            return Err(JsdError::syntax(
                line_no,
                format!("keyword '{name}': unrecognized recscope '{other}'"),
            ))
        }
    })
}

const ALLOWED_SLOT_UNITS: &[&str] = &["none", "degree", "radian", "second", "day", "carrington_rotation"];

fn segment_count_keyword_suffix(idx: usize) -> String {
    format!("_{idx:03}")
}

/// Phase 2: turns the raw collected entries into a complete
/// [`SeriesTemplate`] (spec §4.2's expansion/synthesis/promotion rules).
fn synthesize(p1: Phase1) -> Result<SeriesTemplate> {
    let Phase1 {
        header,
        links,
        keywords: raw_keywords,
        segments: raw_segments,
    } = p1;

    let name = header
        .seriesname
        .clone()
        .ok_or_else(|| JsdError::semantic("missing Seriesname header"))?;

    let mut segments: BTreeMap<String, SegmentDef> = BTreeMap::new();
    let mut cparm_keywords = Vec::new();
    for (idx, seg) in raw_segments.into_iter().enumerate() {
        if seg.protocol.needs_cparms() && header.has_cparms_grammar() {
            if let Some(cparms) = &seg.cparms {
                cparm_keywords.push(Keyword {
                    name: format!("cparms_sg{idx:03}"),
                    value_type: ValueType::String,
                    default: Value::String(cparms.clone().into_bytes()),
                    format: "%s".into(),
                    unit: "none".into(),
                    description: format!("compression parameters for segment {}", seg.name),
                    recscope: RecScope::Constant,
                    per_segment: false,
                    link_info: None,
                });
            }
        }
        if seg.protocol.needs_bzero_bscale() && header.has_bzero_bscale_grammar() {
            if let (Some(bzero), Some(bscale)) = (seg.bzero, seg.bscale) {
                for (suffix, v) in [("_bzero", bzero), ("_bscale", bscale)] {
                    cparm_keywords.push(Keyword {
                        name: format!("{}{suffix}", seg.name),
                        value_type: ValueType::Double,
                        default: Value::Double(v),
                        format: "%lf".into(),
                        unit: "none".into(),
                        description: format!("{suffix} for segment {}", seg.name),
                        recscope: RecScope::Constant,
                        per_segment: false,
                        link_info: None,
                    });
                }
            }
        }
        segments.insert(seg.name.clone(), seg);
    }

    let mut keywords: BTreeMap<String, Keyword> = BTreeMap::new();
    for kw in cparm_keywords {
        keywords.insert(kw.name.clone(), kw);
    }

    let mut per_segment_names: Vec<(String, usize)> = Vec::new();
    for raw in &raw_keywords {
        if let RawKeyword::Simple { name, line, per_segment, .. } = raw {
            if *per_segment {
                per_segment_names.push((name.clone(), *line));
            }
        }
    }
    if !per_segment_names.is_empty() && segments.is_empty() {
        let (name, line) = &per_segment_names[0];
        return Err(JsdError::syntax(
            *line,
            format!("keyword '{name}' declared per-segment scope, but the series has no segments"),
        ));
    }

    for raw in raw_keywords {
        match raw {
            RawKeyword::Link {
                name,
                linkname,
                target_key,
                description,
                ..
            } => {
                keywords.insert(
                    name.clone(),
                    Keyword {
                        name,
                        value_type: ValueType::Int,
                        default: Value::Int(0),
                        format: String::new(),
                        unit: String::new(),
                        description,
                        recscope: RecScope::Variable,
                        per_segment: false,
                        link_info: Some(LinkKeywordInfo {
                            link_name: linkname,
                            target_keyword: target_key,
                        }),
                    },
                );
            }
            RawKeyword::Simple {
                name,
                line,
                value_type,
                recscope_tok,
                per_segment,
                default_tok,
                format,
                unit,
                description,
            } => {
                let recscope = recscope_from_token(&recscope_tok, line, &name)?;
                check_format(line, value_type, &format, &name);
                let default = default_value(value_type, &default_tok)?;

                if per_segment {
                    for idx in 0..segments.len() {
                        let seg_name = format!("{name}{}", segment_count_keyword_suffix(idx));
                        keywords.insert(
                            seg_name.clone(),
                            Keyword {
                                name: seg_name,
                                value_type,
                                default: default.clone(),
                                format: format.clone(),
                                unit: unit.clone(),
                                description: description.clone(),
                                recscope,
                                per_segment: true,
                                link_info: None,
                            },
                        );
                    }
                } else {
                    keywords.insert(
                        name.clone(),
                        Keyword {
                            name,
                            value_type,
                            default,
                            format,
                            unit,
                            description,
                            recscope,
                            per_segment: false,
                            link_info: None,
                        },
                    );
                }
            }
        }
    }

    // Slotted-key expansion: synthesize `<name>_index`, validate companions.
    let slotted_names: Vec<String> = keywords
        .iter()
        .filter(|(_, k)| k.is_slotted())
        .map(|(n, _)| n.clone())
        .collect();

    let mut index_keywords = Vec::new();
    for slot_name in &slotted_names {
        let flavor = match keywords[slot_name].recscope {
            RecScope::Slotted(f) => f,
            _ => unreachable!(),
        };
        for suffix in flavor.required_companions() {
            let companion_name = format!("{slot_name}{suffix}");
            let companion = keywords.get(&companion_name).ok_or_else(|| {
                JsdError::semantic(format!("missing required ancillary keyword '{companion_name}'"))
            })?;
            if !matches!(companion.recscope, RecScope::Constant) {
                return Err(JsdError::semantic(format!(
                    "ancillary keyword '{companion_name}' must be constant"
                )));
            }
            match *suffix {
                "_epoch" => {
                    if !matches!(companion.value_type, ValueType::Time | ValueType::String) {
                        return Err(JsdError::semantic(format!(
                            "ancillary keyword '{companion_name}' must be time or string"
                        )));
                    }
                }
                "_base" => {
                    if !matches!(companion.value_type, ValueType::Double | ValueType::Float | ValueType::Time) {
                        return Err(JsdError::semantic(format!(
                            "ancillary keyword '{companion_name}' must be double, float, or time"
                        )));
                    }
                }
                "_step" => {}
                _ => {}
            }
            let unit_name = format!("{slot_name}_unit");
            if let Some(unit_kw) = keywords.get(&unit_name) {
                if unit_kw.value_type != ValueType::String || !matches!(unit_kw.recscope, RecScope::Constant) {
                    return Err(JsdError::semantic(format!(
                        "ancillary keyword '{unit_name}' must be a constant string"
                    )));
                }
                if let Value::String(bytes) = &unit_kw.default {
                    let s = String::from_utf8_lossy(bytes).to_lowercase();
                    if !ALLOWED_SLOT_UNITS.contains(&s.as_str()) {
                        return Err(JsdError::semantic(format!("slot keyword unit '{s}' is not valid")));
                    }
                }
            }
        }

        index_keywords.push(Keyword {
            name: format!("{slot_name}_index"),
            value_type: ValueType::Long,
            default: Value::Long(i64::MIN),
            format: "%lld".into(),
            unit: "none".into(),
            description: format!("slot index for {slot_name}"),
            recscope: RecScope::Index,
            per_segment: false,
            link_info: None,
        });
    }
    for kw in index_keywords {
        keywords.insert(kw.name.clone(), kw);
    }

    // Prime-key promotion.
    let mut prime_keys_external = Vec::new();
    let mut prime_keys_internal = Vec::new();
    for pk_name in &header.prime_keys {
        let kw = keywords
            .get(pk_name)
            .ok_or_else(|| JsdError::semantic(format!("invalid keyword '{pk_name}' in primary index")))?;
        if kw.per_segment {
            continue;
        }
        if kw.is_slotted() {
            prime_keys_external.push(pk_name.clone());
        } else {
            prime_keys_external.push(pk_name.clone());
            prime_keys_internal.push(pk_name.clone());
        }
    }
    for slot_name in &slotted_names {
        if !header.prime_keys.contains(slot_name) {
            return Err(JsdError::semantic(format!(
                "slotted key '{slot_name}' was not declared prime"
            )));
        }
        prime_keys_internal.push(format!("{slot_name}_index"));
    }

    let mut db_index = prime_keys_internal.clone();
    for extra in &header.db_index {
        if !keywords.contains_key(extra) {
            return Err(JsdError::semantic(format!("invalid keyword '{extra}' in db index")));
        }
        if !db_index.contains(extra) {
            db_index.push(extra.clone());
        }
    }

    let (archive, _warn) = ArchiveFlag::from_raw(header.archive.unwrap_or(0));

    Ok(SeriesTemplate {
        name,
        description: header.description.unwrap_or_default(),
        author: header.author.unwrap_or_default(),
        owner: header.owner.unwrap_or_default(),
        unitsize: header.unitsize.unwrap_or(1),
        archive,
        tapegroup: header.tapegroup.unwrap_or(0),
        retention_days: header.retention.unwrap_or(0),
        prime_keys_external,
        prime_keys_internal,
        db_index,
        keywords,
        links: links.into_iter().map(|l| (l.name.clone(), l)).collect(),
        segments,
    })
}

/// Parses a complete JSD document into a [`SeriesTemplate`] (spec §4.2).
pub fn parse_jsd(text: &str) -> Result<SeriesTemplate> {
    let p1 = phase1(text)?;
    synthesize(p1)
}
