//! Exercises the commit-time archive hand-off (spec §4.5 "On commit"):
//! `Records.txt` gets written under the unit's directory, the submitter
//! sees the right `SubmitRequest`, and the unit flips to READONLY —
//! mirroring scenario S3 (3 records in a unitsize>=2 archived series
//! commit through exactly one submission per dirty unit).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use drms_client::{ArchiveSubmitter, ClientSession, CloseAction, Result, SeriesHeader, SqlChannel, SubmitRequest};
use drms_proto::parse_manifest;
use drms_types::record::Record;
use drms_types::segment::SegmentDef;
use drms_types::storage_unit::{Sunum, UnitMode};
use drms_types::value::Value;
use drms_types::{DrmsError, SessionInfo};

struct FakeSqlChannel {
    header: SeriesHeader,
    records: Mutex<HashMap<(String, i64), Record>>,
    next_recnum: Mutex<i64>,
}

impl FakeSqlChannel {
    fn new(header: SeriesHeader) -> Self {
        Self {
            header,
            records: Mutex::new(HashMap::new()),
            next_recnum: Mutex::new(1),
        }
    }
}

#[async_trait]
impl SqlChannel for FakeSqlChannel {
    async fn fetch_series_header(&self, series: &str) -> Result<SeriesHeader> {
        if series == self.header.name {
            Ok(self.header.clone())
        } else {
            Err(DrmsError::UnknownSeries(series.to_string()).into())
        }
    }

    async fn fetch_segments(&self, _series: &str) -> Result<Vec<SegmentDef>> {
        Ok(Vec::new())
    }

    async fn fetch_links(&self, _series: &str) -> Result<Vec<drms_types::link::LinkDef>> {
        Ok(Vec::new())
    }

    async fn fetch_keywords(&self, _series: &str) -> Result<Vec<drms_types::keyword::Keyword>> {
        Ok(Vec::new())
    }

    async fn fetch_record(&self, template: &drms_types::SeriesTemplate, recnum: i64) -> Result<Record> {
        self.records
            .lock()
            .unwrap()
            .get(&(template.name.clone(), recnum))
            .cloned()
            .ok_or_else(|| DrmsError::BadQueryResult(format!("no record {recnum}")).into())
    }

    async fn bulk_insert(&self, _series: &str, records: &[Record]) -> Result<()> {
        let mut store = self.records.lock().unwrap();
        for r in records {
            store.insert((r.series.clone(), r.recnum), r.clone());
        }
        Ok(())
    }

    async fn delete_temp_records(&self, _series: &str, _recnums: &[i64]) -> Result<()> {
        Ok(())
    }

    async fn resolve_dynamic_link(&self, _target_series: &str, _pidx_values: &[Value]) -> Result<Vec<i64>> {
        Ok(Vec::new())
    }

    async fn alloc_recnum(&self, _series: &str) -> Result<i64> {
        let mut next = self.next_recnum.lock().unwrap();
        let recnum = *next;
        *next += 1;
        Ok(recnum)
    }
}

/// Records every `SubmitRequest` it receives, standing in for the archive
/// worker (spec §4.5's `ArchiveSubmitter` seam — the real implementation
/// is `drms-sumsd::WorkerHandle`).
#[derive(Default)]
struct RecordingSubmitter {
    requests: Mutex<Vec<SubmitRequest>>,
}

#[async_trait]
impl ArchiveSubmitter for RecordingSubmitter {
    async fn submit(&self, request: SubmitRequest) -> Result<()> {
        self.requests.lock().unwrap().push(request);
        Ok(())
    }
}

fn header(name: &str, unitsize: u32, archive_raw: i32) -> SeriesHeader {
    SeriesHeader {
        name: name.to_string(),
        description: "test series".into(),
        author: "tester".into(),
        owner: "tester".into(),
        unitsize,
        archive_raw,
        tapegroup: 1,
        retention_days: 14,
        prime_keys_external: vec![],
        prime_keys_internal: vec![],
        db_index: vec![],
    }
}

/// S3: 3 records into a unitsize=2, archive=1 series commit through
/// exactly 2 units — the second allocated on the 3rd record — each
/// submitted once with its own `Records.txt` and flipped to READONLY.
#[tokio::test]
async fn committing_writes_manifest_submits_unit_and_flips_readonly() {
    let tmp = tempfile::tempdir().unwrap();
    let fake = FakeSqlChannel::new(header("t.s", 2, 1));
    let submitter = Arc::new(RecordingSubmitter::default());
    let session = ClientSession::with_submitter(SessionInfo::new(1, "ns"), fake, submitter.clone());

    let mut next_unit_id = 0u64;
    let mut dir_of_unit = HashMap::new();

    let mut sunums = Vec::new();
    for _ in 0..3 {
        let tmp_path = tmp.path().to_path_buf();
        let record = session
            .new_record("t.s", false, || {
                next_unit_id += 1;
                let dir = tmp_path.join(format!("unit{next_unit_id}"));
                let dir_str = dir.to_string_lossy().into_owned();
                dir_of_unit.insert(next_unit_id, dir_str.clone());
                (Sunum::new(0, next_unit_id), 2, dir_str)
            })
            .await
            .unwrap();
        sunums.push(record.sunum.unwrap());
    }
    assert_eq!(sunums[0], sunums[1], "second record reuses the first unit's free slot");
    assert_ne!(sunums[1], sunums[2], "third record rolls into a fresh unit");

    session.close_all(CloseAction::Insert).await.unwrap();

    let requests = submitter.requests.lock().unwrap();
    assert_eq!(requests.len(), 2, "exactly one submission per committable unit");
    for request in requests.iter() {
        assert!(request.archive, "archive=1 series submits with archive=true");
        assert_eq!(request.retention_days, 14);

        let manifest_text = tokio::fs::read_to_string(format!("{}/Records.txt", request.directory)).await.unwrap();
        let manifest = parse_manifest(&manifest_text).unwrap();
        assert_eq!(manifest.series, "t.s");
        assert!(!manifest.delete_slots_records, "archive=1 (not -1) never sets the delete marker");
        assert!(!manifest.slots.is_empty());
    }

    drop(requests);
    assert!(tokio::fs::try_exists(tmp.path().join("unit1").join("S00")).await.unwrap());
}

/// testable property 6: once a unit is submitted and accepted, it's
/// READONLY — later slot allocation must skip it even if it still has
/// free slots.
#[tokio::test]
async fn submitted_unit_is_readonly_and_not_reused() {
    let tmp = tempfile::tempdir().unwrap();
    let fake = FakeSqlChannel::new(header("t.s", 4, 0));
    let submitter = Arc::new(RecordingSubmitter::default());
    let session = ClientSession::with_submitter(SessionInfo::new(1, "ns"), fake, submitter.clone());

    let tmp_path = tmp.path().to_path_buf();
    let first = session
        .new_record("t.s", false, || (Sunum::new(0, 1), 4, tmp_path.join("u1").to_string_lossy().into_owned()))
        .await
        .unwrap();
    session.close_all(CloseAction::Insert).await.unwrap();

    let requests = submitter.requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    assert!(!requests[0].archive, "archive=0 series submits with archive=false");
    drop(requests);

    let second = session
        .new_record("t.s", false, || (Sunum::new(0, 2), 4, tmp_path.join("u2").to_string_lossy().into_owned()))
        .await
        .unwrap();

    // The first unit still has 3 free slots but is now READONLY, so the
    // second record must land in a freshly allocated unit rather than
    // reusing it.
    assert_ne!(first.sunum, second.sunum);
}
