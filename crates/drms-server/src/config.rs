//! CLI surface (spec §6: "log directory, database name (required),
//! session namespace, retention override, archive override, simulation
//! flag"). Grounded on `agent::main::Args`'s `clap::Parser` derive struct
//! with `#[clap(long, env, default_value)]` attributes.

use clap::Parser;
use drms_types::ArchiveFlag;

#[derive(Parser, Debug)]
#[clap(author, version, about = "DRMS/SUMS storage-unit service daemon", long_about = None)]
pub struct Args {
    /// Directory `tracing-subscriber` writes logs under; stderr if unset.
    #[clap(long = "log-dir", env = "DRMS_LOG_DIR")]
    pub log_dir: Option<std::path::PathBuf>,

    /// Postgres connection string for the catalog (spec §1 "opaque SQL
    /// channel").
    #[clap(long = "database", env = "DATABASE_URL")]
    pub database: String,

    /// Default session namespace assumed for an `OPEN` call that doesn't
    /// specify one.
    #[clap(long = "namespace", env = "DRMS_NAMESPACE", default_value = "public")]
    pub namespace: String,

    /// Caller-wide retention override (spec §4.7 "On opcode GET"); applied
    /// to every session this daemon opens unless the caller's own request
    /// (and series ownership) supersedes it.
    #[clap(long = "retention-override")]
    pub retention_override: Option<i32>,

    /// Caller-wide archive-flag override: -1 = delete-on-destroy, 0 = off,
    /// 1 = archive (spec §7 "archive flag outside {-1,0,1} ... clamped").
    #[clap(long = "archive-override")]
    pub archive_override: Option<i32>,

    /// Run against an in-process simulated archive manager instead of
    /// dialing `archive_addr` (spec §6 "simulation flag").
    #[clap(long = "simulate")]
    pub simulate: bool,

    /// TCP address the external archive manager listens on; required
    /// unless `--simulate` is set.
    #[clap(long = "archive-addr", env = "DRMS_ARCHIVE_ADDR")]
    pub archive_addr: Option<String>,

    /// Address this daemon's client-facing listener binds.
    #[clap(long = "listen", env = "DRMS_LISTEN_ADDR", default_value = "127.0.0.1:6200")]
    pub listen_addr: String,

    /// This site's SUNUM site code (spec §6 "Site-encoded SUNUMs").
    #[clap(long = "local-site", env = "DRMS_LOCAL_SITE", default_value_t = 0)]
    pub local_site: u16,
}

impl Args {
    pub fn archive_flag(&self) -> Option<ArchiveFlag> {
        self.archive_override.map(|raw| ArchiveFlag::from_raw(raw).0)
    }
}

/// Per-connection settings threaded through `connection::handle_connection`
/// (the parts of `Args` the request loop itself needs, separated from
/// database/listener bring-up).
pub struct ServerConfig {
    pub server_version: String,
    pub default_namespace: String,
}

impl ServerConfig {
    pub fn from_args(args: &Args) -> Self {
        Self {
            server_version: env!("CARGO_PKG_VERSION").to_string(),
            default_namespace: args.namespace.clone(),
        }
    }
}
