//! The archive worker's own connection to the external archive manager
//! (spec §6 "Server-worker calls to external archive manager", §4.7). The
//! manager's internals (tape drives, robot arms) are out of scope (spec §1
//! Non-goals); this only needs *a* concrete transport so `ArchiveWorker`
//! isn't built against a stub. `TcpArchiveClient` reuses this workspace's
//! own opcode/frame/kv-codec machinery (`drms-proto`) for that connection
//! rather than inventing a second wire format — the manager calls
//! (`alloc`, `alloc2`, `get`, `put`, `info`, `wait`, `close`) are numbered
//! well clear of the client-facing opcode table (spec §6) so the two
//! spaces never collide (see `drms-proto::opcode::Opcode::Archive*`).

use async_trait::async_trait;
use drms_types::storage_unit::Sunum;
use drms_types::value::Value;
use drms_proto::{decode_kv_list, encode_kv_list, read_request, write_request, Opcode};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::error::{Result, SumsError};

/// One unit as reported by the archive manager (spec §4.7 ALLOC/GET/INFO
/// replies).
#[derive(Debug, Clone)]
pub struct ArchiveUnit {
    pub sunum: Sunum,
    /// `None` when the unit is staging from tape and not yet readable
    /// (spec §4.5 "may be empty if the fetch is still staging").
    pub directory: Option<String>,
}

/// Outcome of a GET call (spec §4.7 step 5): either the units are ready, or
/// the manager needs to stage from tape and the caller must poll `wait`.
#[derive(Debug, Clone)]
pub enum GetOutcome {
    Ready(Vec<ArchiveUnit>),
    Pending,
}

/// `mode` field of a PUT submission (spec §4.5 "Mark the unit's archive
/// intent").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitMode {
    Temp,
    Arch,
}

/// The bounded set of calls the archive worker makes on its single,
/// non-thread-safe connection (spec §4.7). Batch sizes (`GET`/`INFO` ≤ 64,
/// spec §4.5/§6) are the caller's responsibility, not this trait's.
#[async_trait]
pub trait ArchiveClient: Send {
    async fn alloc(&mut self, series: &str, tapegroup: i32, bytes: u64) -> Result<ArchiveUnit>;

    /// Like `alloc`, but the caller supplies a pre-reserved sunum (spec
    /// §4.7 step 4, "used for cross-site transfers").
    async fn alloc2(&mut self, sunum: Sunum, series: &str, tapegroup: i32, bytes: u64) -> Result<ArchiveUnit>;

    async fn get(&mut self, sunums: &[Sunum], retention_days: i32) -> Result<GetOutcome>;

    /// Blocks on an archive-wait call with a bounded timeout (spec §4.7
    /// step 5); `Ok(None)` on timeout (caller replies retry-later).
    async fn wait(&mut self, sunums: &[Sunum], timeout: std::time::Duration) -> Result<Option<Vec<ArchiveUnit>>>;

    async fn put(&mut self, sunum: Sunum, directory: &str, mode: SubmitMode, retention_days: i32) -> Result<()>;

    async fn info(&mut self, sunums: &[Sunum]) -> Result<Vec<ArchiveUnit>>;

    async fn close(&mut self) -> Result<()>;
}

pub struct TcpArchiveClient {
    stream: TcpStream,
}

impl TcpArchiveClient {
    pub async fn connect(addr: impl tokio::net::ToSocketAddrs) -> Result<Self> {
        let stream = TcpStream::connect(addr).await.map_err(drms_proto::ProtoError::from)?;
        Ok(Self { stream })
    }

    async fn call(&mut self, opcode: Opcode, args: Vec<(String, Value)>) -> Result<Vec<(String, Value)>> {
        let payload = encode_kv_list(&args);
        write_request(&mut self.stream, opcode, &payload).await?;
        reply_kv(&mut self.stream).await
    }
}

async fn reply_kv<S: AsyncRead + AsyncWrite + Unpin>(stream: &mut S) -> Result<Vec<(String, Value)>> {
    let frame = read_request(stream).await?;
    Ok(decode_kv_list(&frame.args)?)
}

fn sunum_arg(sunum: Sunum) -> (String, Value) {
    ("sunum".to_string(), Value::Long(sunum.0 as i64))
}

fn unit_from_reply(kv: &[(String, Value)]) -> Result<ArchiveUnit> {
    let sunum = kv
        .iter()
        .find(|(k, _)| k == "sunum")
        .and_then(|(_, v)| if let Value::Long(n) = v { Some(Sunum(*n as u64)) } else { None })
        .ok_or_else(|| SumsError::Drms(drms_types::DrmsError::BadQueryResult("archive reply missing sunum".into())))?;
    let directory = kv.iter().find(|(k, _)| k == "sudir").and_then(|(_, v)| {
        if let Value::String(bytes) = v {
            let s = String::from_utf8_lossy(bytes).into_owned();
            (!s.is_empty()).then_some(s)
        } else {
            None
        }
    });
    Ok(ArchiveUnit { sunum, directory })
}

#[async_trait]
impl ArchiveClient for TcpArchiveClient {
    #[tracing::instrument(skip(self))]
    async fn alloc(&mut self, series: &str, tapegroup: i32, bytes: u64) -> Result<ArchiveUnit> {
        let reply = self
            .call(
                Opcode::ArchiveAlloc,
                vec![
                    ("series".into(), Value::String(series.as_bytes().to_vec())),
                    ("tapegroup".into(), Value::Int(tapegroup)),
                    ("bytes".into(), Value::Long(bytes as i64)),
                ],
            )
            .await?;
        unit_from_reply(&reply)
    }

    #[tracing::instrument(skip(self))]
    async fn alloc2(&mut self, sunum: Sunum, series: &str, tapegroup: i32, bytes: u64) -> Result<ArchiveUnit> {
        let reply = self
            .call(
                Opcode::ArchiveAlloc2,
                vec![
                    sunum_arg(sunum),
                    ("series".into(), Value::String(series.as_bytes().to_vec())),
                    ("tapegroup".into(), Value::Int(tapegroup)),
                    ("bytes".into(), Value::Long(bytes as i64)),
                ],
            )
            .await?;
        unit_from_reply(&reply)
    }

    #[tracing::instrument(skip(self, sunums))]
    async fn get(&mut self, sunums: &[Sunum], retention_days: i32) -> Result<GetOutcome> {
        let mut args: Vec<(String, Value)> = sunums.iter().map(|s| sunum_arg(*s)).collect();
        args.push(("retention_days".into(), Value::Int(retention_days)));
        let reply = self.call(Opcode::ArchiveGet, args).await?;
        if reply.iter().any(|(k, v)| k == "pending" && matches!(v, Value::Char(1))) {
            return Ok(GetOutcome::Pending);
        }
        Ok(GetOutcome::Ready(vec![unit_from_reply(&reply)?]))
    }

    #[tracing::instrument(skip(self, sunums))]
    async fn wait(&mut self, sunums: &[Sunum], timeout: std::time::Duration) -> Result<Option<Vec<ArchiveUnit>>> {
        let mut args: Vec<(String, Value)> = sunums.iter().map(|s| sunum_arg(*s)).collect();
        args.push(("timeout_ms".into(), Value::Long(timeout.as_millis() as i64)));
        let reply = tokio::time::timeout(timeout, self.call(Opcode::ArchiveWait, args))
            .await
            .map_err(|_| SumsError::Drms(drms_types::DrmsError::RemoteSumsTryLater))?;
        match reply {
            Ok(kv) => Ok(Some(vec![unit_from_reply(&kv)?])),
            Err(e) => Err(e),
        }
    }

    #[tracing::instrument(skip(self))]
    async fn put(&mut self, sunum: Sunum, directory: &str, mode: SubmitMode, retention_days: i32) -> Result<()> {
        self.call(
            Opcode::ArchivePut,
            vec![
                sunum_arg(sunum),
                ("sudir".into(), Value::String(directory.as_bytes().to_vec())),
                (
                    "mode".into(),
                    Value::String(match mode {
                        SubmitMode::Temp => b"temp".to_vec(),
                        SubmitMode::Arch => b"arch".to_vec(),
                    }),
                ),
                ("retention_days".into(), Value::Int(retention_days)),
            ],
        )
        .await?;
        Ok(())
    }

    #[tracing::instrument(skip(self, sunums))]
    async fn info(&mut self, sunums: &[Sunum]) -> Result<Vec<ArchiveUnit>> {
        let args: Vec<(String, Value)> = sunums.iter().map(|s| sunum_arg(*s)).collect();
        let reply = self.call(Opcode::ArchiveInfo, args).await?;
        Ok(vec![unit_from_reply(&reply)?])
    }

    #[tracing::instrument(skip(self))]
    async fn close(&mut self) -> Result<()> {
        self.call(Opcode::ArchiveClose, Vec::new()).await?;
        self.stream.shutdown().await.map_err(drms_proto::ProtoError::from)?;
        Ok(())
    }
}
