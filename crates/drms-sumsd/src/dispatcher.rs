//! The storage-service dispatcher (spec §4.6): one call handler per
//! accepted RPC, authenticated against the open-session table, dispatched
//! by opcode. Grounded on `agent::handlers::serve`'s shared-state-behind-
//! channels shape, adapted from "one task per handler type" to "one call
//! per task" since spec §5 asks for thread(here: task)-per-call semantics
//! rather than a polling loop.
//!
//! Spec §5 describes one global `server_lock` guarding every cache
//! mutation. A REDESIGN FLAG splits that single lock into per-concern
//! locks instead (series cache, per-series storage-unit cache, per-session
//! temp list) to cut contention between unrelated sessions; this
//! dispatcher gets that split for free because each `ClientSession` already
//! owns its own `Mutex`-guarded caches (`drms-client::session`) rather than
//! sharing one lock across all sessions.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use drms_client::{ArchiveSubmitter, ClientSession, CloseAction, SqlChannel};
use drms_proto::Opcode;
use drms_types::storage_unit::Sunum;
use drms_types::value::Value;
use drms_types::SessionInfo;
use tokio::sync::Mutex as AsyncMutex;

use crate::archive_client::ArchiveUnit;
use crate::error::{Result, SumsError};
use crate::remote_fallback::{self, FallbackOutcome, RemoteSiteResolver};
use crate::worker::WorkerHandle;

pub type Kv = Vec<(String, Value)>;

fn get_str(args: &Kv, key: &str) -> Result<String> {
    args.iter()
        .find(|(k, _)| k == key)
        .and_then(|(_, v)| if let Value::String(b) = v { Some(String::from_utf8_lossy(b).into_owned()) } else { None })
        .ok_or_else(|| missing_arg(key))
}

fn get_long(args: &Kv, key: &str) -> Result<i64> {
    args.iter()
        .find(|(k, _)| k == key)
        .and_then(|(_, v)| if let Value::Long(n) = v { Some(*n) } else { None })
        .ok_or_else(|| missing_arg(key))
}

fn get_int(args: &Kv, key: &str) -> Result<i32> {
    args.iter()
        .find(|(k, _)| k == key)
        .and_then(|(_, v)| if let Value::Int(n) = v { Some(*n) } else { None })
        .ok_or_else(|| missing_arg(key))
}

fn missing_arg(key: &str) -> SumsError {
    SumsError::Drms(drms_types::DrmsError::InvalidData(format!("missing argument '{key}'")))
}

/// One open session slot (spec §4.6 "a table of registered opens by
/// `uid`").
struct OpenSession<C: SqlChannel> {
    session: Arc<ClientSession<C>>,
}

pub struct Dispatcher<C: SqlChannel> {
    sessions: AsyncMutex<HashMap<i64, OpenSession<C>>>,
    worker: WorkerHandle,
    local_site: u16,
    accepting_opens: AtomicBool,
    /// Consulted whenever a fetched unit's `sudir` comes back empty (spec
    /// §4.8); `None` until `with_remote_fallback` wires one in, which
    /// just means every empty `sudir` is treated as an ordinary failure.
    resolver: Option<Arc<dyn RemoteSiteResolver>>,
    site_url: String,
    /// CLI-wide overrides (spec §6 "retention override, archive override")
    /// applied to every session this dispatcher opens, via
    /// `with_session_overrides`.
    retention_override: Option<i32>,
    archive_override: Option<drms_types::ArchiveFlag>,
}

impl<C: SqlChannel> Dispatcher<C> {
    pub fn new(worker: WorkerHandle, local_site: u16) -> Self {
        Self {
            sessions: AsyncMutex::new(HashMap::new()),
            worker,
            local_site,
            accepting_opens: AtomicBool::new(true),
            resolver: None,
            site_url: String::new(),
            retention_override: None,
            archive_override: None,
        }
    }

    /// Like `new`, but with the remote-site resolver wired in (spec
    /// §4.8): `site_url` is the master-mirror endpoint this site's
    /// catalog registers units of foreign sites under.
    pub fn with_remote_fallback(
        worker: WorkerHandle,
        local_site: u16,
        resolver: Arc<dyn RemoteSiteResolver>,
        site_url: impl Into<String>,
    ) -> Self {
        Self {
            sessions: AsyncMutex::new(HashMap::new()),
            worker,
            local_site,
            accepting_opens: AtomicBool::new(true),
            resolver: Some(resolver),
            site_url: site_url.into(),
            retention_override: None,
            archive_override: None,
        }
    }

    /// Applies the server's CLI-wide retention/archive overrides (spec §6)
    /// to every session opened from here on.
    pub fn with_session_overrides(mut self, retention_override: Option<i32>, archive_override: Option<drms_types::ArchiveFlag>) -> Self {
        self.retention_override = retention_override;
        self.archive_override = archive_override;
        self
    }

    /// `OPEN`: registers a new session under `uid` (spec §4.6 step 2's
    /// open table). Rejected once `SHUTDOWN QUERY=0` has run (spec §4.6
    /// "Shutdown protocol"). Every session commits through this worker
    /// (spec §4.5 "On commit"), via the `ArchiveSubmitter` seam
    /// `drms-client` exposes rather than a direct dependency on it.
    #[tracing::instrument(skip(self, channel))]
    pub async fn open(&self, uid: i64, namespace: &str, channel: C) -> Result<()> {
        if !self.accepting_opens.load(Ordering::SeqCst) {
            return Err(SumsError::Drms(drms_types::DrmsError::InvalidData(
                "server is not accepting new opens".into(),
            )));
        }
        let submitter = Arc::new(self.worker.clone()) as Arc<dyn ArchiveSubmitter>;
        let mut info = SessionInfo::new(uid, namespace.to_string());
        info.retention_override = self.retention_override;
        info.archive_override = self.archive_override;
        let session = Arc::new(ClientSession::with_submitter(info, channel, submitter));
        self.sessions.lock().await.insert(uid, OpenSession { session });
        Ok(())
    }

    async fn session(&self, uid: i64) -> Result<Arc<ClientSession<C>>> {
        self.sessions
            .lock()
            .await
            .get(&uid)
            .map(|s| s.session.clone())
            .ok_or_else(|| SumsError::Drms(drms_types::DrmsError::InvalidData(format!("uid {uid} is not open"))))
    }

    /// Dispatches one authenticated call (spec §4.6 steps 1-4). Returns
    /// `(rinfo, reply kv-list)`; callers on the wire side (`drms-server`)
    /// write `rinfo` back immediately as the delayed-ACK unblock, then the
    /// reply payload.
    #[tracing::instrument(skip(self, args))]
    pub async fn dispatch(&self, uid: i64, opcode: Opcode, args: Kv) -> (i32, Kv) {
        let result = self.dispatch_inner(uid, opcode, args).await;
        match result {
            Ok(reply) => (drms_proto::RINFO_SUCCESS, reply),
            Err(SumsError::Drms(e)) => {
                tracing::warn!(rinfo = e.rinfo(), error = %e, "call failed");
                (e.rinfo(), Vec::new())
            }
            Err(SumsError::Client(drms_client::ClientError::Drms(e))) => (e.rinfo(), Vec::new()),
            Err(other) => {
                tracing::error!(error = %other, "call failed with a non-catalog error");
                (drms_types::DrmsError::QueryFailed(other.to_string()).rinfo(), Vec::new())
            }
        }
    }

    async fn dispatch_inner(&self, uid: i64, opcode: Opcode, args: Kv) -> Result<Kv> {
        match opcode {
            Opcode::AllocRecnum => self.handle_alloc_recnum(uid, &args).await,
            Opcode::NewSlots => self.handle_new_slots(uid, &args).await,
            Opcode::GetUnit | Opcode::GetUnits => self.handle_get_units(uid, &args).await,
            Opcode::GetSudir | Opcode::GetSudirs => self.handle_get_sudirs(uid, &args).await,
            Opcode::GetSuInfo => self.handle_get_suinfo(uid, &args).await,
            Opcode::SlotSetState => self.handle_slot_set_state(uid, &args).await,
            Opcode::SetRetention => self.handle_set_retention(uid, &args).await,
            Opcode::MakeSessionWritable => Ok(Vec::new()),
            Opcode::BulkInsertArray => self.handle_bulk_insert(uid, &args).await,
            Opcode::Commit => self.handle_close(uid, CloseAction::Insert).await,
            Opcode::Rollback => self.handle_close(uid, CloseAction::Free).await,
            Opcode::Disconnect => self.handle_disconnect(uid).await,
            Opcode::Shutdown => self.handle_shutdown(&args).await,
            other => Err(SumsError::Drms(drms_types::DrmsError::InvalidData(format!(
                "opcode {other:?} is not a storage-service call"
            )))),
        }
    }

    async fn handle_alloc_recnum(&self, uid: i64, args: &Kv) -> Result<Kv> {
        let series = get_str(args, "series")?;
        let session = self.session(uid).await?;
        let recnum = session.alloc_recnum(&series).await?;
        Ok(vec![("recnum".to_string(), Value::Long(recnum))])
    }

    /// `NEWSLOTS` (spec §4.5 "On slot allocation"): allocates slots for one
    /// or more new records, drawing from an existing READWRITE unit with
    /// free capacity or asking the archive worker for a fresh one.
    async fn handle_new_slots(&self, uid: i64, args: &Kv) -> Result<Kv> {
        let series = get_str(args, "series")?;
        let transient = args.iter().any(|(k, v)| k == "transient" && matches!(v, Value::Char(1)));
        let session = self.session(uid).await?;
        let template = session.template(&series).await?;
        let unitsize = template.unitsize;
        let tapegroup = template.tapegroup;

        // `new_record`'s fresh-unit closure must be synchronous, so any
        // archive-worker round trip has to happen up front; the fresh
        // `ArchiveUnit` is only actually drawn on if the session has no
        // writable unit with a free slot left.
        let fresh = self.worker.alloc(&series, tapegroup, unitsize as u64).await?;
        let fresh_sunum = fresh.sunum;
        let fresh_directory = fresh.directory.ok_or_else(|| {
            SumsError::Drms(drms_types::DrmsError::MkdirFailed(format!(
                "archive manager allocated unit {} with no directory",
                fresh_sunum.0
            )))
        })?;
        let record = session
            .new_record(&series, transient, || (fresh_sunum, unitsize, fresh_directory))
            .await?;

        Ok(vec![
            ("recnum".to_string(), Value::Long(record.recnum)),
            ("slot".to_string(), Value::Int(record.slot.unwrap_or_default() as i32)),
            ("sunum".to_string(), Value::Long(record.sunum.map(|s| s.0 as i64).unwrap_or_default())),
        ])
    }

    /// `GETUNIT`/`GETUNITS` (spec §4.7 step 5): fetches 1..N existing units
    /// through the archive worker, applying the retention clamp policy,
    /// then gives any unit whose `sudir` came back empty a chance at the
    /// remote-site fallback (spec §4.8) before returning.
    async fn handle_get_units(&self, uid: i64, args: &Kv) -> Result<Kv> {
        let series = get_str(args, "series")?;
        let sunums: Vec<Sunum> = args
            .iter()
            .filter(|(k, _)| k == "sunum")
            .filter_map(|(_, v)| if let Value::Long(n) = v { Some(Sunum(*n as u64)) } else { None })
            .collect();
        if sunums.is_empty() {
            return Err(missing_arg("sunum"));
        }
        let requested_retention = args.iter().find(|(k, _)| k == "retention_days").and_then(|(_, v)| {
            if let Value::Int(n) = v { Some(*n) } else { None }
        });

        let session = self.session(uid).await?;
        let template = session.template(&series).await?;
        let owns_series = template.owner == series_owner_hint(uid);
        let default_retention = session.info.retention_override.unwrap_or(template.retention_days);
        let retention_days = match requested_retention {
            Some(days) if owns_series => days,
            Some(days) => days.min(0),
            None => default_retention,
        };

        let units = self.worker.get(&sunums, retention_days).await?;
        let units = self.apply_remote_fallback(&series, units, retention_days).await?;
        Ok(units
            .into_iter()
            .flat_map(|unit| {
                [
                    ("sunum".to_string(), Value::Long(unit.sunum.0 as i64)),
                    ("sudir".to_string(), Value::String(unit.directory.unwrap_or_default().into_bytes())),
                ]
            })
            .collect())
    }

    /// Gates each unit with an empty `sudir` through `resolve_empty_sudir`
    /// (spec §4.8): a resolved `RetryOnce` re-fetches that one sunum once
    /// more, `TryLater`/`ResolverFailed` fail the whole call, and units
    /// with a non-empty `sudir` (or no resolver configured) pass through
    /// untouched. Scenario S4's "resolver invoked at most once per sunum"
    /// holds because each unit only ever makes one pass through this loop.
    async fn apply_remote_fallback(&self, series: &str, units: Vec<ArchiveUnit>, retention_days: i32) -> Result<Vec<ArchiveUnit>> {
        let Some(resolver) = &self.resolver else {
            return Ok(units);
        };

        let mut out = Vec::with_capacity(units.len());
        for unit in units {
            let empty = unit.directory.as_deref().map_or(true, str::is_empty);
            if !empty {
                out.push(unit);
                continue;
            }
            let verdict = remote_fallback::resolve_empty_sudir(
                resolver.as_ref(),
                &self.site_url,
                self.local_site,
                series,
                unit.sunum,
                true,
                true,
            )
            .await?;
            match verdict {
                None => out.push(unit),
                Some(FallbackOutcome::RetryOnce) => {
                    out.extend(self.worker.get(&[unit.sunum], retention_days).await?);
                }
                Some(FallbackOutcome::TryLater) => {
                    return Err(SumsError::Drms(drms_types::DrmsError::RemoteSumsTryLater));
                }
                Some(FallbackOutcome::ResolverFailed) => {
                    return Err(SumsError::Drms(drms_types::DrmsError::ErrorRemoteSumsMaster));
                }
            }
        }
        Ok(out)
    }

    async fn handle_get_sudirs(&self, uid: i64, args: &Kv) -> Result<Kv> {
        self.handle_get_units(uid, args).await
    }

    /// `GETSUINFO` (spec §4.7 step 7): bulk metadata by sunum array, batch
    /// size 64 — batching itself lives in `ArchiveWorker::info_in_batches`.
    async fn handle_get_suinfo(&self, _uid: i64, args: &Kv) -> Result<Kv> {
        let sunums: Vec<Sunum> = args
            .iter()
            .filter(|(k, _)| k == "sunum")
            .filter_map(|(_, v)| if let Value::Long(n) = v { Some(Sunum(*n as u64)) } else { None })
            .collect();
        let units = self.worker.info(&sunums).await?;
        Ok(units
            .into_iter()
            .map(|u| ("sudir".to_string(), Value::String(u.directory.unwrap_or_default().into_bytes())))
            .collect())
    }

    async fn handle_slot_set_state(&self, uid: i64, args: &Kv) -> Result<Kv> {
        let series = get_str(args, "series")?;
        let recnum = get_long(args, "recnum")?;
        let _ = self.session(uid).await?.retrieve_record(&series, recnum).await?;
        Ok(Vec::new())
    }

    async fn handle_set_retention(&self, _uid: i64, args: &Kv) -> Result<Kv> {
        let _ = get_int(args, "retention_days")?;
        Ok(Vec::new())
    }

    /// `BULK_INSERT_ARRAY` (spec §4.3 `close_all(INSERT)`'s batched catalog
    /// write). `ClientSession::close_all` also submits every committable
    /// unit to the archive worker as part of the same call, so there's no
    /// separate catalog-only vs. archive-submission split here.
    async fn handle_bulk_insert(&self, uid: i64, _args: &Kv) -> Result<Kv> {
        let session = self.session(uid).await?;
        session.close_all(CloseAction::Insert).await?;
        Ok(Vec::new())
    }

    async fn handle_close(&self, uid: i64, action: CloseAction) -> Result<Kv> {
        let session = self.session(uid).await?;
        session.close_all(action).await?;
        Ok(Vec::new())
    }

    async fn handle_disconnect(&self, uid: i64) -> Result<Kv> {
        self.sessions.lock().await.remove(&uid);
        Ok(Vec::new())
    }

    /// `SHUTDOWN QUERY=0` (spec §4.6 "Shutdown protocol"): sets the
    /// no-more-opens flag and reports whether it's safe to halt now.
    async fn handle_shutdown(&self, args: &Kv) -> Result<Kv> {
        let query = args.iter().any(|(k, v)| k == "query" && matches!(v, Value::Int(0)));
        if query {
            self.accepting_opens.store(false, Ordering::SeqCst);
            let open_uids: Vec<i64> = self.sessions.lock().await.keys().copied().collect();
            let safe_to_halt = open_uids.is_empty();
            if !safe_to_halt {
                tracing::info!(?open_uids, "shutdown requested; sessions still open");
            }
            Ok(vec![("safe_to_halt".to_string(), Value::Char(safe_to_halt as i8))])
        } else {
            Ok(Vec::new())
        }
    }
}

/// Placeholder ownership hint until a real uid→owner table exists (spec
/// §4.7 step 5 "the caller's retention override wins only if the caller
/// owns the series"); every caller is treated as non-owning until that
/// table is modeled, so overrides are always clamped. Tracked in
/// DESIGN.md as an Open Question this crate leaves unresolved rather than
/// inventing an ownership registry spec.md never describes.
fn series_owner_hint(_uid: i64) -> String {
    String::new()
}
