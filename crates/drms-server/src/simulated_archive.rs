//! The `--simulate` archive backend (spec §6 "simulation flag"): answers
//! every archive-manager call locally under a real directory tree instead
//! of dialing out to a tape robot, so the daemon can be exercised without
//! one. Grounded on `drms-sumsd/tests/dispatcher_test.rs`'s
//! `FakeArchiveClient` fixture — same shape, promoted from a test double
//! to a CLI-selectable backend.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use drms_sumsd::{ArchiveClient, ArchiveUnit, GetOutcome, Result, SubmitMode};
use drms_types::storage_unit::Sunum;

pub struct SimulatedArchiveClient {
    root: PathBuf,
    local_site: u16,
    next_local_id: AtomicU64,
    known: Mutex<HashSet<u64>>,
}

impl SimulatedArchiveClient {
    pub fn new(root: PathBuf, local_site: u16) -> Self {
        Self {
            root,
            local_site,
            next_local_id: AtomicU64::new(1),
            known: Mutex::new(HashSet::new()),
        }
    }

    fn path_for(&self, local_id: u64) -> String {
        self.root.join(local_id.to_string()).to_string_lossy().into_owned()
    }

    fn directory_for(&self, sunum: Sunum) -> Option<String> {
        self.known.lock().unwrap().contains(&sunum.local_id()).then(|| self.path_for(sunum.local_id()))
    }
}

#[async_trait]
impl ArchiveClient for SimulatedArchiveClient {
    async fn alloc(&mut self, _series: &str, _tapegroup: i32, _bytes: u64) -> Result<ArchiveUnit> {
        let id = self.next_local_id.fetch_add(1, Ordering::SeqCst);
        self.known.lock().unwrap().insert(id);
        Ok(ArchiveUnit {
            sunum: Sunum::new(self.local_site, id),
            directory: Some(self.path_for(id)),
        })
    }

    async fn alloc2(&mut self, sunum: Sunum, _series: &str, _tapegroup: i32, _bytes: u64) -> Result<ArchiveUnit> {
        self.known.lock().unwrap().insert(sunum.local_id());
        Ok(ArchiveUnit {
            sunum,
            directory: Some(self.path_for(sunum.local_id())),
        })
    }

    async fn get(&mut self, sunums: &[Sunum], _retention_days: i32) -> Result<GetOutcome> {
        Ok(GetOutcome::Ready(
            sunums.iter().map(|s| ArchiveUnit { sunum: *s, directory: self.directory_for(*s) }).collect(),
        ))
    }

    async fn wait(&mut self, _sunums: &[Sunum], _timeout: std::time::Duration) -> Result<Option<Vec<ArchiveUnit>>> {
        Ok(None)
    }

    async fn put(&mut self, sunum: Sunum, _directory: &str, _mode: SubmitMode, _retention_days: i32) -> Result<()> {
        self.known.lock().unwrap().insert(sunum.local_id());
        Ok(())
    }

    async fn info(&mut self, sunums: &[Sunum]) -> Result<Vec<ArchiveUnit>> {
        Ok(sunums.iter().map(|s| ArchiveUnit { sunum: *s, directory: self.directory_for(*s) }).collect())
    }

    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}
