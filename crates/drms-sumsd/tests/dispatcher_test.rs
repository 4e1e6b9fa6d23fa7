//! Exercises `Dispatcher` end to end against an in-memory `SqlChannel` and
//! `ArchiveClient`, mirroring `drms-client/tests/session_test.rs`'s
//! fake-over-live-dependency approach (no Postgres, no archive manager
//! running in this environment).

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use drms_client::{Result as ClientResult, SeriesHeader, SqlChannel};
use drms_proto::{Opcode, RINFO_SUCCESS};
use drms_sumsd::{ArchiveClient, ArchiveUnit, ArchiveWorker, Dispatcher, GetOutcome, Result as SumsResult, SubmitMode};
use drms_types::keyword::Keyword;
use drms_types::link::LinkDef;
use drms_types::record::Record;
use drms_types::segment::SegmentDef;
use drms_types::storage_unit::Sunum;
use drms_types::value::Value;
use drms_types::DrmsError;
use tempfile::TempDir;

struct FakeSqlChannel {
    headers: HashMap<String, SeriesHeader>,
    records: Mutex<HashMap<(String, i64), Record>>,
    next_recnum: AtomicI64,
}

impl FakeSqlChannel {
    fn new() -> Self {
        Self {
            headers: HashMap::new(),
            records: Mutex::new(HashMap::new()),
            next_recnum: AtomicI64::new(1),
        }
    }

    fn add_series(&mut self, name: &str, tapegroup: i32) {
        self.headers.insert(
            name.to_string(),
            SeriesHeader {
                name: name.to_string(),
                description: "test series".into(),
                author: "tester".into(),
                owner: "tester".into(),
                unitsize: 4,
                archive_raw: 1,
                tapegroup,
                retention_days: 30,
                prime_keys_external: vec![],
                prime_keys_internal: vec![],
                db_index: vec![],
            },
        );
    }
}

#[async_trait]
impl SqlChannel for FakeSqlChannel {
    async fn fetch_series_header(&self, series: &str) -> ClientResult<SeriesHeader> {
        self.headers
            .get(series)
            .cloned()
            .ok_or_else(|| DrmsError::UnknownSeries(series.to_string()).into())
    }

    async fn fetch_segments(&self, _series: &str) -> ClientResult<Vec<SegmentDef>> {
        Ok(Vec::new())
    }

    async fn fetch_links(&self, _series: &str) -> ClientResult<Vec<LinkDef>> {
        Ok(Vec::new())
    }

    async fn fetch_keywords(&self, _series: &str) -> ClientResult<Vec<Keyword>> {
        Ok(Vec::new())
    }

    async fn fetch_record(&self, template: &drms_types::SeriesTemplate, recnum: i64) -> ClientResult<Record> {
        self.records
            .lock()
            .unwrap()
            .get(&(template.name.clone(), recnum))
            .cloned()
            .ok_or_else(|| DrmsError::BadQueryResult(format!("no record {recnum}")).into())
    }

    async fn bulk_insert(&self, _series: &str, records: &[Record]) -> ClientResult<()> {
        let mut store = self.records.lock().unwrap();
        for r in records {
            store.insert((r.series.clone(), r.recnum), r.clone());
        }
        Ok(())
    }

    async fn delete_temp_records(&self, series: &str, recnums: &[i64]) -> ClientResult<()> {
        let mut store = self.records.lock().unwrap();
        for recnum in recnums {
            store.remove(&(series.to_string(), *recnum));
        }
        Ok(())
    }

    async fn resolve_dynamic_link(&self, _target_series: &str, _pidx_values: &[Value]) -> ClientResult<Vec<i64>> {
        Ok(Vec::new())
    }

    async fn alloc_recnum(&self, _series: &str) -> ClientResult<i64> {
        Ok(self.next_recnum.fetch_add(1, Ordering::SeqCst))
    }
}

/// Answers every call locally: `alloc`/`alloc2` hand out a fresh local-site
/// sunum with a directory under a real temporary root (slot allocation
/// now does actual `tokio::fs::create_dir_all` calls, so `/SUM/{id}`-style
/// placeholder paths from an earlier revision would fail); `get`/`info`
/// echo the same mapping back so a unit allocated through one call
/// round-trips through another.
struct FakeArchiveClient {
    site: u16,
    root: TempDir,
    next_local_id: AtomicU64,
    dirs: Mutex<HashSet<u64>>,
}

impl FakeArchiveClient {
    fn new(site: u16) -> Self {
        Self {
            site,
            root: TempDir::new().unwrap(),
            next_local_id: AtomicU64::new(1),
            dirs: Mutex::new(HashSet::new()),
        }
    }

    fn path_for(&self, id: u64) -> String {
        self.root.path().join(id.to_string()).to_string_lossy().into_owned()
    }

    fn directory_for(&self, sunum: Sunum) -> Option<String> {
        self.dirs
            .lock()
            .unwrap()
            .contains(&sunum.local_id())
            .then(|| self.path_for(sunum.local_id()))
    }
}

#[async_trait]
impl ArchiveClient for FakeArchiveClient {
    async fn alloc(&mut self, _series: &str, _tapegroup: i32, _bytes: u64) -> SumsResult<ArchiveUnit> {
        let id = self.next_local_id.fetch_add(1, Ordering::SeqCst);
        let sunum = Sunum::new(self.site, id);
        self.dirs.lock().unwrap().insert(id);
        Ok(ArchiveUnit {
            sunum,
            directory: Some(self.path_for(id)),
        })
    }

    async fn alloc2(&mut self, sunum: Sunum, _series: &str, _tapegroup: i32, _bytes: u64) -> SumsResult<ArchiveUnit> {
        self.dirs.lock().unwrap().insert(sunum.local_id());
        Ok(ArchiveUnit {
            sunum,
            directory: Some(self.path_for(sunum.local_id())),
        })
    }

    async fn get(&mut self, sunums: &[Sunum], _retention_days: i32) -> SumsResult<GetOutcome> {
        Ok(GetOutcome::Ready(
            sunums
                .iter()
                .map(|s| ArchiveUnit {
                    sunum: *s,
                    directory: self.directory_for(*s),
                })
                .collect(),
        ))
    }

    async fn wait(&mut self, _sunums: &[Sunum], _timeout: Duration) -> SumsResult<Option<Vec<ArchiveUnit>>> {
        Ok(None)
    }

    async fn put(&mut self, sunum: Sunum, _directory: &str, _mode: SubmitMode, _retention_days: i32) -> SumsResult<()> {
        self.dirs.lock().unwrap().insert(sunum.local_id());
        Ok(())
    }

    async fn info(&mut self, sunums: &[Sunum]) -> SumsResult<Vec<ArchiveUnit>> {
        Ok(sunums
            .iter()
            .map(|s| ArchiveUnit {
                sunum: *s,
                directory: self.directory_for(*s),
            })
            .collect())
    }

    async fn close(&mut self) -> SumsResult<()> {
        Ok(())
    }
}

fn new_dispatcher(site: u16) -> Dispatcher<FakeSqlChannel> {
    let worker = ArchiveWorker::spawn(FakeArchiveClient::new(site));
    Dispatcher::new(worker, site)
}

fn find<'a>(kv: &'a [(String, Value)], key: &str) -> &'a Value {
    &kv.iter().find(|(k, _)| k == key).unwrap().1
}

#[tokio::test]
async fn new_slots_then_get_unit_round_trips_the_directory() {
    let mut fake = FakeSqlChannel::new();
    fake.add_series("t.s", 7);
    let dispatcher = new_dispatcher(5);
    dispatcher.open(1, "ns", fake).await.unwrap();

    let (rinfo, reply) = dispatcher
        .dispatch(1, Opcode::NewSlots, vec![("series".to_string(), Value::String(b"t.s".to_vec()))])
        .await;
    assert_eq!(rinfo, RINFO_SUCCESS);
    let Value::Long(sunum_raw) = find(&reply, "sunum") else { panic!("expected sunum") };
    let sunum = *sunum_raw;

    let (rinfo, reply) = dispatcher
        .dispatch(
            1,
            Opcode::GetUnit,
            vec![
                ("series".to_string(), Value::String(b"t.s".to_vec())),
                ("sunum".to_string(), Value::Long(sunum)),
            ],
        )
        .await;
    assert_eq!(rinfo, RINFO_SUCCESS);
    assert_eq!(find(&reply, "sunum"), &Value::Long(sunum));
    let Value::String(sudir) = find(&reply, "sudir") else { panic!("expected sudir") };
    assert!(!sudir.is_empty());
}

#[tokio::test]
async fn calls_against_an_unopened_uid_fail() {
    let dispatcher = new_dispatcher(5);
    let (rinfo, _reply) = dispatcher.dispatch(99, Opcode::AllocRecnum, vec![]).await;
    assert_ne!(rinfo, RINFO_SUCCESS);
}

#[tokio::test]
async fn shutdown_reports_unsafe_while_sessions_remain_open_then_safe_after_disconnect() {
    let mut fake = FakeSqlChannel::new();
    fake.add_series("t.s", 1);
    let dispatcher = new_dispatcher(5);
    dispatcher.open(1, "ns", fake).await.unwrap();

    let (rinfo, reply) = dispatcher
        .dispatch(1, Opcode::Shutdown, vec![("query".to_string(), Value::Int(0))])
        .await;
    assert_eq!(rinfo, RINFO_SUCCESS);
    assert_eq!(find(&reply, "safe_to_halt"), &Value::Char(0));

    let (rinfo, _) = dispatcher.dispatch(1, Opcode::Disconnect, vec![]).await;
    assert_eq!(rinfo, RINFO_SUCCESS);

    let (rinfo, reply) = dispatcher
        .dispatch(1, Opcode::Shutdown, vec![("query".to_string(), Value::Int(0))])
        .await;
    assert_eq!(rinfo, RINFO_SUCCESS);
    assert_eq!(find(&reply, "safe_to_halt"), &Value::Char(1));
}

#[tokio::test]
async fn open_is_rejected_once_shutdown_has_run() {
    let dispatcher = new_dispatcher(5);
    dispatcher
        .dispatch(1, Opcode::Shutdown, vec![("query".to_string(), Value::Int(0))])
        .await;

    let fake = FakeSqlChannel::new();
    assert!(dispatcher.open(2, "ns", fake).await.is_err());
}
