//! ftpvfsd — a minimal standalone FTP VFS daemon.
//!
//! Mounts a single `FtpBackend` from command-line flags and drives a
//! non-interactive demonstration of `enumerate`/`query-info`/
//! `open-for-read` against it, logging every step. Stands in for the
//! DBus job dispatcher and volume-monitor machinery that spec.md §1
//! explicitly places out of scope — there is no bus name to claim and
//! no long-running mount table here, only the FTP backend core and
//! (optionally) one attached metadata tree.
//!
//! Exit codes: `0` on a clean run, `1` on mount or I/O failure.

use clap::Parser;
use ftpvfs::ftp::{Backend, FtpBackend, FtpPath, MountConfig};
use ftpvfs::metadata::MetaTree;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Default password sent for anonymous logins, following the
/// convention of embedding a contact address (spec §4.1 "anonymous"
/// bootstrap path).
fn default_password() -> String {
    format!("ftpvfs-{}@example.com", env!("CARGO_PKG_VERSION"))
}

#[derive(Parser)]
#[command(
    name = "ftpvfsd",
    about = "Mount one FTP server and exercise its VFS backend",
    long_about = "ftpvfsd dials an FTP server, logs in, and drives enumerate/\
                  query-info/open-for-read against a single mounted path, \
                  logging each step. It does not expose any IPC surface."
)]
struct Cli {
    /// FTP server hostname or address
    #[arg(long)]
    host: String,

    /// FTP server port
    #[arg(long, default_value_t = 21)]
    port: u16,

    /// Login username
    #[arg(long, default_value = "anonymous")]
    user: String,

    /// Login password (defaults to an anonymous contact address)
    #[arg(long)]
    password: Option<String>,

    /// Path to enumerate and probe after mounting
    #[arg(long, default_value = "/")]
    path: String,

    /// Maximum pooled connections
    #[arg(long, default_value_t = 4)]
    pool_size: usize,

    /// Attach a metadata tree image at this path, creating it if absent
    #[arg(long)]
    metadata_tree: Option<PathBuf>,

    /// Increase log verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => log::LevelFilter::Info,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::new().filter_level(level).init();

    if let Err(e) = run(cli).await {
        log::error!("{}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), String> {
    let metadata = match cli.metadata_tree.clone() {
        Some(path) => {
            let tree = MetaTree::open(path, true).map_err(|e| format!("open metadata tree: {e}"))?;
            log::info!("attached metadata tree at {:?}", tree.path());
            Some(Arc::new(tree))
        }
        None => None,
    };

    let config = MountConfig {
        host: cli.host.clone(),
        port: cli.port,
        user: cli.user.clone(),
        password: Some(cli.password.clone().unwrap_or_else(default_password)),
        connect_timeout: Duration::from_secs(15),
        data_timeout: Duration::from_secs(30),
    };

    log::info!("mounting ftp://{}@{}:{}", cli.user, cli.host, cli.port);
    let backend = FtpBackend::mount_with_metadata(config, cli.pool_size, metadata)
        .await
        .map_err(|e| format!("mount failed: {e}"))?;
    log::info!("mount {:?} established", backend.mount_id());

    let path = FtpPath::new(&cli.path);

    let info = backend
        .query_info(&path)
        .await
        .map_err(|e| format!("query-info {path}: {e}"))?;
    log::info!(
        "query-info {}: kind={:?} size={} attributes={}",
        path,
        info.kind,
        info.size,
        info.attributes.len()
    );

    let entries = backend
        .enumerate(&path)
        .await
        .map_err(|e| format!("enumerate {path}: {e}"))?;
    log::info!("enumerate {}: {} entries", path, entries.len());
    for entry in &entries {
        log::debug!(
            "  {} kind={:?} size={} hidden={}",
            entry.name,
            entry.kind,
            entry.size,
            entry.is_hidden
        );
    }

    if let Some(first_file) = entries
        .iter()
        .find(|e| matches!(e.kind, ftpvfs::ftp::FileKind::RegularFile))
    {
        log::info!("open-for-read {}", first_file.path);
        let mut handle = backend
            .open_for_read(&first_file.path)
            .await
            .map_err(|e| format!("open-for-read {}: {e}", first_file.path))?;
        let mut buf = [0u8; 4096];
        let mut total = 0usize;
        loop {
            let n = handle
                .read_chunk(&mut buf)
                .await
                .map_err(|e| format!("read {}: {e}", first_file.path))?;
            if n == 0 {
                break;
            }
            total += n;
        }
        handle.close().await;
        log::info!("read {} bytes from {}", total, first_file.path);
    } else {
        log::info!("no regular file under {} to demonstrate open-for-read", path);
    }

    log::info!("done");
    Ok(())
}
