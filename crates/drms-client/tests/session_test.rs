//! Exercises `ClientSession` against an in-memory fake channel rather than
//! a live Postgres connection — there is no running database in this
//! environment, and `SqlChannel` exists precisely so the cache/session
//! layer doesn't need one to be testable.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use drms_client::{ClientSession, Result, SeriesHeader, SqlChannel};
use drms_types::keyword::{Keyword, LinkKeywordInfo, RecScope};
use drms_types::link::{LinkDef, LinkKind, LinkValue};
use drms_types::record::{Record, RecordLifetime, RecordState};
use drms_types::segment::SegmentDef;
use drms_types::value::{Value, ValueType};
use drms_types::{DrmsError, SessionInfo};

struct FakeSqlChannel {
    headers: HashMap<String, SeriesHeader>,
    links: HashMap<String, Vec<LinkDef>>,
    keywords: HashMap<String, Vec<Keyword>>,
    records: Mutex<HashMap<(String, i64), Record>>,
}

impl FakeSqlChannel {
    fn new() -> Self {
        Self {
            headers: HashMap::new(),
            links: HashMap::new(),
            keywords: HashMap::new(),
            records: Mutex::new(HashMap::new()),
        }
    }

    fn add_series(&mut self, name: &str, keywords: Vec<Keyword>, links: Vec<LinkDef>) {
        self.headers.insert(
            name.to_string(),
            SeriesHeader {
                name: name.to_string(),
                description: "test series".into(),
                author: "tester".into(),
                owner: "tester".into(),
                unitsize: 4,
                archive_raw: 0,
                tapegroup: 1,
                retention_days: 30,
                prime_keys_external: vec![],
                prime_keys_internal: vec![],
                db_index: vec![],
            },
        );
        self.keywords.insert(name.to_string(), keywords);
        self.links.insert(name.to_string(), links);
    }

    fn add_record(&self, record: Record) {
        self.records.lock().unwrap().insert((record.series.clone(), record.recnum), record);
    }
}

#[async_trait]
impl SqlChannel for FakeSqlChannel {
    async fn fetch_series_header(&self, series: &str) -> Result<SeriesHeader> {
        self.headers
            .get(series)
            .cloned()
            .ok_or_else(|| DrmsError::UnknownSeries(series.to_string()).into())
    }

    async fn fetch_segments(&self, _series: &str) -> Result<Vec<SegmentDef>> {
        Ok(Vec::new())
    }

    async fn fetch_links(&self, series: &str) -> Result<Vec<LinkDef>> {
        Ok(self.links.get(series).cloned().unwrap_or_default())
    }

    async fn fetch_keywords(&self, series: &str) -> Result<Vec<Keyword>> {
        Ok(self.keywords.get(series).cloned().unwrap_or_default())
    }

    async fn fetch_record(&self, template: &drms_types::SeriesTemplate, recnum: i64) -> Result<Record> {
        self.records
            .lock()
            .unwrap()
            .get(&(template.name.clone(), recnum))
            .cloned()
            .ok_or_else(|| DrmsError::BadQueryResult(format!("no record {recnum} in {}", template.name)).into())
    }

    async fn bulk_insert(&self, _series: &str, records: &[Record]) -> Result<()> {
        let mut store = self.records.lock().unwrap();
        for r in records {
            store.insert((r.series.clone(), r.recnum), r.clone());
        }
        Ok(())
    }

    async fn delete_temp_records(&self, series: &str, recnums: &[i64]) -> Result<()> {
        let mut store = self.records.lock().unwrap();
        for recnum in recnums {
            store.remove(&(series.to_string(), *recnum));
        }
        Ok(())
    }

    async fn resolve_dynamic_link(&self, _target_series: &str, _pidx_values: &[Value]) -> Result<Vec<i64>> {
        Ok(Vec::new())
    }

    async fn alloc_recnum(&self, _series: &str) -> Result<i64> {
        Ok(1)
    }
}

fn obs_time_keyword() -> Keyword {
    Keyword {
        name: "OBS_TIME".into(),
        value_type: ValueType::Time,
        default: Value::missing(ValueType::Time),
        format: "%f".into(),
        unit: "s".into(),
        description: "observation time".into(),
        recscope: RecScope::Variable,
        per_segment: false,
        link_info: None,
    }
}

#[tokio::test]
async fn retrieves_record_and_looks_up_plain_keyword() {
    let mut fake = FakeSqlChannel::new();
    fake.add_series("t.s", vec![obs_time_keyword()], vec![]);

    let mut record = Record {
        series: "t.s".into(),
        recnum: 1001,
        sunum: None,
        slot: None,
        creator_session: 1,
        state: RecordState::Open,
        lifetime: RecordLifetime::Permanent,
        keywords: BTreeMap::new(),
        links: BTreeMap::new(),
        segments: vec![],
    };
    record.keywords.insert("OBS_TIME".into(), Value::Time(30.0));
    fake.add_record(record.clone());

    let session = ClientSession::new(SessionInfo::new(1, "ns"), fake);
    let template = session.template("t.s").await.unwrap();
    let fetched = session.retrieve_record("t.s", 1001).await.unwrap();

    let value = session.keyword(&template, &fetched, "OBS_TIME").await.unwrap();
    assert_eq!(value, Value::Time(30.0));
}

#[tokio::test]
async fn unknown_keyword_lookup_fails() {
    let mut fake = FakeSqlChannel::new();
    fake.add_series("t.s", vec![obs_time_keyword()], vec![]);
    fake.add_record(Record {
        series: "t.s".into(),
        recnum: 1,
        sunum: None,
        slot: None,
        creator_session: 1,
        state: RecordState::Open,
        lifetime: RecordLifetime::Permanent,
        keywords: BTreeMap::new(),
        links: BTreeMap::new(),
        segments: vec![],
    });

    let session = ClientSession::new(SessionInfo::new(1, "ns"), fake);
    let template = session.template("t.s").await.unwrap();
    let record = session.retrieve_record("t.s", 1).await.unwrap();

    let err = session.keyword(&template, &record, "NOT_A_KEYWORD").await;
    assert!(err.is_err());
}

/// S6: a static link cycle between two series must terminate with
/// `LinkDepthExceeded`, never loop forever.
#[tokio::test]
async fn link_cycle_terminates_with_depth_exceeded() {
    let proxy_keyword = Keyword {
        name: "PROXY".into(),
        value_type: ValueType::Int,
        default: Value::missing(ValueType::Int),
        format: "%d".into(),
        unit: "none".into(),
        description: "proxies through L".into(),
        recscope: RecScope::Variable,
        per_segment: false,
        link_info: Some(LinkKeywordInfo {
            link_name: "L".into(),
            target_keyword: "PROXY".into(),
        }),
    };

    let mut fake = FakeSqlChannel::new();
    fake.add_series(
        "a",
        vec![proxy_keyword.clone()],
        vec![LinkDef {
            name: "L".into(),
            target_series: "b".into(),
            kind: LinkKind::Static,
            description: "a to b".into(),
        }],
    );
    fake.add_series(
        "b",
        vec![proxy_keyword],
        vec![LinkDef {
            name: "L".into(),
            target_series: "a".into(),
            kind: LinkKind::Static,
            description: "b to a".into(),
        }],
    );

    let mut rec_a = Record {
        series: "a".into(),
        recnum: 1,
        sunum: None,
        slot: None,
        creator_session: 1,
        state: RecordState::Open,
        lifetime: RecordLifetime::Permanent,
        keywords: BTreeMap::new(),
        links: BTreeMap::new(),
        segments: vec![],
    };
    rec_a.links.insert("L".into(), LinkValue::Static(1));
    let mut rec_b = rec_a.clone();
    rec_b.series = "b".into();

    fake.add_record(rec_a.clone());
    fake.add_record(rec_b);

    let session = ClientSession::new(SessionInfo::new(1, "ns"), fake);
    let template_a = session.template("a").await.unwrap();

    let err = session.keyword(&template_a, &rec_a, "PROXY").await;
    assert!(matches!(
        err,
        Err(drms_client::ClientError::Drms(DrmsError::LinkDepthExceeded(_)))
    ));
}
