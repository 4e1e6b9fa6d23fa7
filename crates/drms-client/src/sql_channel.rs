//! The opaque SQL channel (spec §1): everything record/series caches need
//! from the catalog, behind one trait. `drms_env.c`'s query fragments
//! (`select seriesname from <ns>.drms_series`) ground the catalog-table
//! naming convention `PgSqlChannel` targets: a `<ns>.drms_series` /
//! `drms_keyword` / `drms_link` / `drms_segment` catalog, and one
//! `<ns>.<series>` data table per series. That schema itself is out of
//! scope (spec §1 Non-goals); this just needs *a* concrete target to make
//! the trait more than a stub.

use std::collections::BTreeMap;

use async_trait::async_trait;
use drms_types::keyword::{Keyword, LinkKeywordInfo, RecScope, SlotFlavor};
use drms_types::link::{LinkDef, LinkKind, LinkValue};
use drms_types::record::{Record, RecordLifetime, RecordState};
use drms_types::segment::{Protocol, SegmentDef, SegmentScope};
use drms_types::storage_unit::Sunum;
use drms_types::value::{sscanf_value, Value, ValueType};
use drms_types::SeriesTemplate;
use sqlx::Row;

use crate::error::{ClientError, Result};

/// The header fields of a series, as stored in `<ns>.drms_series` (spec
/// §4.3 "on miss, queries the catalog for header ... (three separate
/// queries)" — this is query #1).
#[derive(Debug, Clone)]
pub struct SeriesHeader {
    pub name: String,
    pub description: String,
    pub author: String,
    pub owner: String,
    pub unitsize: u32,
    pub archive_raw: i32,
    pub tapegroup: i32,
    pub retention_days: i32,
    pub prime_keys_external: Vec<String>,
    pub prime_keys_internal: Vec<String>,
    pub db_index: Vec<String>,
}

#[async_trait]
pub trait SqlChannel: Send + Sync {
    /// Query #1 of `template()`'s three (spec §4.3).
    async fn fetch_series_header(&self, series: &str) -> Result<SeriesHeader>;
    /// Query #2: the segment list.
    async fn fetch_segments(&self, series: &str) -> Result<Vec<SegmentDef>>;
    /// Query #2, continued: the link list (same round trip as segments in
    /// the original; kept a separate method here so each concern stays a
    /// one-purpose function).
    async fn fetch_links(&self, series: &str) -> Result<Vec<LinkDef>>;
    /// Query #3: the keyword list.
    async fn fetch_keywords(&self, series: &str) -> Result<Vec<Keyword>>;

    /// `retrieve_record`'s "single keyed query" (spec §4.3).
    async fn fetch_record(&self, template: &SeriesTemplate, recnum: i64) -> Result<Record>;

    /// `close_all(INSERT)`'s "one prepared multi-row statement per series"
    /// (spec §4.3).
    async fn bulk_insert(&self, series: &str, records: &[Record]) -> Result<()>;

    /// The temp-record registry's commit-time cleanup: "a single `DELETE …
    /// WHERE recnum IN (…)` per series" (spec §4.3).
    async fn delete_temp_records(&self, series: &str, recnums: &[i64]) -> Result<()>;

    /// Dynamic link resolution (spec §4.4): binds `pidx_values` in order
    /// against the target series' prime-key columns and returns every
    /// matching recnum, highest first. Callers wanting only the highest
    /// take `[0]`; `_followall` callers keep the whole list.
    async fn resolve_dynamic_link(
        &self,
        target_series: &str,
        pidx_values: &[Value],
    ) -> Result<Vec<i64>>;

    async fn alloc_recnum(&self, series: &str) -> Result<i64>;
}

pub struct PgSqlChannel {
    pool: sqlx::PgPool,
    namespace: String,
}

impl PgSqlChannel {
    pub fn new(pool: sqlx::PgPool, namespace: impl Into<String>) -> Self {
        Self {
            pool,
            namespace: namespace.into(),
        }
    }

    fn data_table(&self, series: &str) -> String {
        format!("{}.{}", self.namespace, series)
    }
}

fn recscope_from_row(kind: &str, flavor: Option<&str>) -> Result<RecScope> {
    Ok(match kind {
        "variable" => RecScope::Variable,
        "constant" => RecScope::Constant,
        "index" => RecScope::Index,
        "slotted" => {
            let flavor = flavor.ok_or_else(|| {
                ClientError::Drms(drms_types::DrmsError::BadQueryResult(
                    "slotted keyword row missing flavor column".into(),
                ))
            })?;
            RecScope::Slotted(match flavor {
                "ts_eq" => SlotFlavor::TimeEqual,
                "slot" => SlotFlavor::Slot,
                "enum" => SlotFlavor::Enum,
                "carr" => SlotFlavor::Carrington,
                other => {
                    return Err(ClientError::Drms(drms_types::DrmsError::BadQueryResult(
                        format!("unknown slot flavor {other}"),
                    )))
                }
            })
        }
        other => {
            return Err(ClientError::Drms(drms_types::DrmsError::BadQueryResult(
                format!("unknown recscope {other}"),
            )))
        }
    })
}

fn value_type_from_row(s: &str) -> Result<ValueType> {
    Ok(match s {
        "char" => ValueType::Char,
        "short" => ValueType::Short,
        "int" => ValueType::Int,
        "long" => ValueType::Long,
        "float" => ValueType::Float,
        "double" => ValueType::Double,
        "time" => ValueType::Time,
        "string" => ValueType::String,
        other => {
            return Err(ClientError::Drms(drms_types::DrmsError::BadQueryResult(
                format!("unknown value type {other}"),
            )))
        }
    })
}

#[async_trait]
impl SqlChannel for PgSqlChannel {
    #[tracing::instrument(skip(self))]
    async fn fetch_series_header(&self, series: &str) -> Result<SeriesHeader> {
        let row = sqlx::query(
            "select description, author, owner, unitsize, archive, tapegroup, \
             retention_days, prime_keys_external, prime_keys_internal, db_index \
             from drms_series where seriesname = $1",
        )
        .bind(series)
        .fetch_one(&self.pool)
        .await?;

        Ok(SeriesHeader {
            name: series.to_string(),
            description: row.try_get("description")?,
            author: row.try_get("author")?,
            owner: row.try_get("owner")?,
            unitsize: row.try_get::<i32, _>("unitsize")? as u32,
            archive_raw: row.try_get("archive")?,
            tapegroup: row.try_get("tapegroup")?,
            retention_days: row.try_get("retention_days")?,
            prime_keys_external: row.try_get("prime_keys_external")?,
            prime_keys_internal: row.try_get("prime_keys_internal")?,
            db_index: row.try_get("db_index")?,
        })
    }

    #[tracing::instrument(skip(self))]
    async fn fetch_segments(&self, series: &str) -> Result<Vec<SegmentDef>> {
        let rows = sqlx::query(
            "select name, scope, value_type, axes, protocol, unit, description, \
             bzero, bscale, cparms from drms_segment where seriesname = $1 order by name",
        )
        .bind(series)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let scope: String = row.try_get("scope")?;
                let protocol: String = row.try_get("protocol")?;
                Ok(SegmentDef {
                    name: row.try_get("name")?,
                    scope: match scope.as_str() {
                        "constant" => SegmentScope::Constant,
                        "variable" => SegmentScope::Variable,
                        "vardim" => SegmentScope::VarDim,
                        other => {
                            return Err(ClientError::Drms(drms_types::DrmsError::BadQueryResult(
                                format!("unknown segment scope {other}"),
                            )))
                        }
                    },
                    value_type: value_type_from_row(&row.try_get::<String, _>("value_type")?)?,
                    axes: row.try_get("axes")?,
                    protocol: match protocol.as_str() {
                        "binary" => Protocol::Binary,
                        "binary_gzip" => Protocol::BinaryGzip,
                        "fits" => Protocol::Fits,
                        "fitz" => Protocol::FitsCompressed,
                        "tas" => Protocol::Tas,
                        "generic" => Protocol::Generic,
                        other => {
                            return Err(ClientError::Drms(drms_types::DrmsError::BadQueryResult(
                                format!("unknown protocol {other}"),
                            )))
                        }
                    },
                    unit: row.try_get("unit")?,
                    description: row.try_get("description")?,
                    bzero: row.try_get("bzero")?,
                    bscale: row.try_get("bscale")?,
                    cparms: row.try_get("cparms")?,
                })
            })
            .collect()
    }

    #[tracing::instrument(skip(self))]
    async fn fetch_links(&self, series: &str) -> Result<Vec<LinkDef>> {
        let rows = sqlx::query(
            "select name, target_series, kind, description from drms_link \
             where seriesname = $1 order by name",
        )
        .bind(series)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let kind: String = row.try_get("kind")?;
                Ok(LinkDef {
                    name: row.try_get("name")?,
                    target_series: row.try_get("target_series")?,
                    kind: match kind.as_str() {
                        "static" => LinkKind::Static,
                        "dynamic" => LinkKind::Dynamic,
                        other => {
                            return Err(ClientError::Drms(drms_types::DrmsError::BadQueryResult(
                                format!("unknown link kind {other}"),
                            )))
                        }
                    },
                    description: row.try_get("description")?,
                })
            })
            .collect()
    }

    #[tracing::instrument(skip(self))]
    async fn fetch_keywords(&self, series: &str) -> Result<Vec<Keyword>> {
        let rows = sqlx::query(
            "select name, value_type, default_text, format, unit, description, \
             recscope, slot_flavor, per_segment, link_name, link_keyword \
             from drms_keyword where seriesname = $1 order by name",
        )
        .bind(series)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let value_type = value_type_from_row(&row.try_get::<String, _>("value_type")?)?;
                let default_text: String = row.try_get("default_text")?;
                let link_name: Option<String> = row.try_get("link_name")?;
                let link_keyword: Option<String> = row.try_get("link_keyword")?;
                Ok(Keyword {
                    name: row.try_get("name")?,
                    value_type,
                    default: sscanf_value(value_type, &default_text).map_err(ClientError::Drms)?,
                    format: row.try_get("format")?,
                    unit: row.try_get("unit")?,
                    description: row.try_get("description")?,
                    recscope: recscope_from_row(
                        &row.try_get::<String, _>("recscope")?,
                        row.try_get::<Option<String>, _>("slot_flavor")?.as_deref(),
                    )?,
                    per_segment: row.try_get("per_segment")?,
                    link_info: match (link_name, link_keyword) {
                        (Some(link_name), Some(target_keyword)) => Some(LinkKeywordInfo {
                            link_name,
                            target_keyword,
                        }),
                        _ => None,
                    },
                })
            })
            .collect()
    }

    #[tracing::instrument(skip(self, template))]
    async fn fetch_record(&self, template: &SeriesTemplate, recnum: i64) -> Result<Record> {
        let table = self.data_table(&template.name);
        let row = sqlx::query(&format!(
            "select * from {table} where recnum = $1"
        ))
        .bind(recnum)
        .fetch_one(&self.pool)
        .await?;

        let mut keywords = BTreeMap::new();
        for (name, kw) in &template.keywords {
            if kw.link_info.is_some() || kw.is_index() {
                continue;
            }
            let text: String = row.try_get(name.as_str())?;
            keywords.insert(name.clone(), sscanf_value(kw.value_type, &text).map_err(ClientError::Drms)?);
        }

        let mut links = BTreeMap::new();
        for (name, link) in &template.links {
            match link.kind {
                LinkKind::Static => {
                    let target: Option<i64> = row.try_get(format!("{name}_recnum").as_str())?;
                    if let Some(target) = target {
                        links.insert(name.clone(), LinkValue::Static(target));
                    }
                }
                LinkKind::Dynamic => {
                    let raw: Option<String> = row.try_get(format!("{name}_pidx").as_str())?;
                    if let Some(raw) = raw {
                        let pidx_values = raw
                            .split('\x01')
                            .map(|s| Value::String(s.as_bytes().to_vec()))
                            .collect();
                        links.insert(
                            name.clone(),
                            LinkValue::Dynamic {
                                pidx_types: vec![ValueType::String; raw.matches('\x01').count() + 1],
                                pidx_values,
                                follow_all: false,
                            },
                        );
                    }
                }
            }
        }

        Ok(Record {
            series: template.name.clone(),
            recnum,
            sunum: row.try_get::<Option<i64>, _>("sunum")?.map(|v| Sunum(v as u64)),
            slot: row.try_get::<Option<i32>, _>("slot")?.map(|v| v as u32),
            creator_session: row.try_get("creator_session")?,
            state: RecordState::Open,
            lifetime: RecordLifetime::Permanent,
            keywords,
            links,
            segments: template.segments.keys().cloned().collect(),
        })
    }

    #[tracing::instrument(skip(self, records))]
    async fn bulk_insert(&self, series: &str, records: &[Record]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let table = self.data_table(series);
        let mut tx = self.pool.begin().await?;
        for rec in records {
            sqlx::query(&format!(
                "insert into {table} (recnum, creator_session, sunum, slot) values ($1, $2, $3, $4)"
            ))
            .bind(rec.recnum)
            .bind(rec.creator_session)
            .bind(rec.sunum.map(|s| s.0 as i64))
            .bind(rec.slot.map(|s| s as i32))
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn delete_temp_records(&self, series: &str, recnums: &[i64]) -> Result<()> {
        if recnums.is_empty() {
            return Ok(());
        }
        let table = self.data_table(series);
        sqlx::query(&format!("delete from {table} where recnum = any($1)"))
            .bind(recnums)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn resolve_dynamic_link(
        &self,
        target_series: &str,
        pidx_values: &[Value],
    ) -> Result<Vec<i64>> {
        let table = self.data_table(target_series);
        let header = self.fetch_series_header(target_series).await?;
        if header.prime_keys_internal.len() != pidx_values.len() {
            return Err(ClientError::Drms(drms_types::DrmsError::BadFieldCount {
                query: format!("resolve_dynamic_link({target_series})"),
                expected: header.prime_keys_internal.len(),
                got: pidx_values.len(),
            }));
        }
        let mut sql = format!("select recnum from {table} where ");
        for (i, col) in header.prime_keys_internal.iter().enumerate() {
            if i > 0 {
                sql.push_str(" and ");
            }
            sql.push_str(&format!("{col} = ${}", i + 1));
        }
        sql.push_str(" order by recnum desc");

        let mut query = sqlx::query(&sql);
        for v in pidx_values {
            query = match v {
                Value::Char(n) => query.bind(*n as i32),
                Value::Short(n) => query.bind(*n as i32),
                Value::Int(n) => query.bind(*n),
                Value::Long(n) => query.bind(*n),
                Value::Float(n) => query.bind(*n as f64),
                Value::Double(n) | Value::Time(n) => query.bind(*n),
                Value::String(bytes) => query.bind(String::from_utf8_lossy(bytes).into_owned()),
            };
        }
        let rows = query.fetch_all(&self.pool).await?;
        rows.into_iter().map(|r| Ok(r.try_get("recnum")?)).collect()
    }

    #[tracing::instrument(skip(self))]
    async fn alloc_recnum(&self, series: &str) -> Result<i64> {
        let seq = format!("{}.{series}_recnum_seq", self.namespace);
        let row = sqlx::query(&format!("select nextval('{seq}') as recnum"))
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("recnum")?)
    }
}
