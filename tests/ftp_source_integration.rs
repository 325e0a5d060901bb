//! Integration tests for the FTP source against a scripted loopback server.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{TimeZone, Utc};
use pubsync_core::fetch::FetchEngine;
use pubsync_core::{
    ChecksumKind, Credentials, FtpSource, RemoteSource, TransferError, list_files,
    list_files_with_size_and_date,
};
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};

mod support;
use support::corpus::{gzip, md5_sidecar, two_record_document};
use support::socket_guard::should_skip_socket_bound_test;

const DIR: &str = "/pubmed/updatefiles/";
const ARCHIVE: &str = "pubmed25n1275.xml.gz";
const MDTM_STAMP: &str = "20250914140200";

#[derive(Default)]
struct ServerState {
    files: HashMap<String, Vec<u8>>,
    commands: Mutex<Vec<String>>,
    sessions: AtomicUsize,
    /// Archive transfers still to cut off halfway.
    drops_left: AtomicUsize,
}

impl ServerState {
    fn take_drop(&self) -> bool {
        self.drops_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn listing(&self, detailed: bool) -> String {
        let mut names: Vec<&str> = self.files.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
            .into_iter()
            .map(|name| {
                if detailed {
                    format!(
                        "-r--r--r--   1 ftp      anonymous {:>9} Sep 14 14:02 {name}\r\n",
                        self.files[name].len()
                    )
                } else {
                    format!("{name}\r\n")
                }
            })
            .collect()
    }
}

struct ScriptedFtp {
    port: u16,
    state: Arc<ServerState>,
}

impl ScriptedFtp {
    async fn start(files: HashMap<String, Vec<u8>>, drops: usize) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let state = Arc::new(ServerState {
            files,
            drops_left: AtomicUsize::new(drops),
            ..ServerState::default()
        });

        let accepting = Arc::clone(&state);
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                accepting.sessions.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(serve(stream, Arc::clone(&accepting)));
            }
        });
        Self { port, state }
    }

    fn source(&self) -> FtpSource {
        FtpSource::with_credentials("127.0.0.1", self.port, Credentials::anonymous())
    }

    fn commands(&self) -> Vec<String> {
        self.state.commands.lock().unwrap().clone()
    }

    fn count(&self, command: &str) -> usize {
        self.commands().iter().filter(|c| c.as_str() == command).count()
    }

    fn sessions(&self) -> usize {
        self.state.sessions.load(Ordering::SeqCst)
    }
}

async fn reply(control: &mut OwnedWriteHalf, line: &str) -> std::io::Result<()> {
    control.write_all(format!("{line}\r\n").as_bytes()).await
}

async fn send_data(listener: Option<TcpListener>, bytes: &[u8]) {
    let Some(listener) = listener else {
        return;
    };
    if let Ok((mut data, _)) = listener.accept().await {
        let _ = data.write_all(bytes).await;
        let _ = data.shutdown().await;
    }
}

/// One control connection. Returning closes it.
async fn serve(stream: TcpStream, state: Arc<ServerState>) {
    let (read_half, mut control) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();
    let mut passive: Option<TcpListener> = None;

    if reply(&mut control, "220 scripted archive ready").await.is_err() {
        return;
    }

    while let Ok(Some(line)) = lines.next_line().await {
        state.commands.lock().unwrap().push(line.clone());
        let (verb, arg) = line.split_once(' ').unwrap_or((line.as_str(), ""));

        let response = match verb {
            "USER" => "331 password required".to_string(),
            "PASS" => "230 logged in".to_string(),
            "TYPE" => "200 binary mode".to_string(),
            "CWD" if arg == DIR => "250 directory changed".to_string(),
            "CWD" => "550 no such directory".to_string(),
            "PASV" => {
                let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
                let port = listener.local_addr().unwrap().port();
                passive = Some(listener);
                // Advertise an unroutable address; clients must use the control peer.
                format!(
                    "227 Entering Passive Mode (10,0,0,1,{},{})",
                    port / 256,
                    port % 256
                )
            }
            "NLST" | "LIST" => {
                let body = state.listing(verb == "LIST");
                if reply(&mut control, "150 opening data connection").await.is_err() {
                    return;
                }
                send_data(passive.take(), body.as_bytes()).await;
                "226 transfer complete".to_string()
            }
            "MDTM" if state.files.contains_key(arg) => format!("213 {MDTM_STAMP}"),
            "MDTM" => "550 not found".to_string(),
            "RETR" => match state.files.get(arg) {
                None => "550 not found".to_string(),
                Some(bytes) => {
                    if reply(&mut control, "150 opening data connection").await.is_err() {
                        return;
                    }
                    if arg == ARCHIVE && state.take_drop() {
                        send_data(passive.take(), &bytes[..bytes.len() / 2]).await;
                        return;
                    }
                    send_data(passive.take(), bytes).await;
                    "226 transfer complete".to_string()
                }
            },
            "QUIT" => {
                let _ = reply(&mut control, "221 goodbye").await;
                return;
            }
            _ => "502 command not implemented".to_string(),
        };

        if reply(&mut control, &response).await.is_err() {
            return;
        }
    }
}

fn corpus_files() -> (Vec<u8>, HashMap<String, Vec<u8>>) {
    let bytes = gzip(&two_record_document());
    let mut files = HashMap::new();
    files.insert(format!("{ARCHIVE}.md5"), md5_sidecar(ARCHIVE, &bytes));
    files.insert(ARCHIVE.to_string(), bytes.clone());
    files.insert("README.txt".to_string(), b"corpus readme".to_vec());
    (bytes, files)
}

fn read(path: &Path) -> Vec<u8> {
    std::fs::read(path).unwrap()
}

// ==================== Catalog ====================

#[tokio::test]
async fn test_list_files_logs_in_lists_and_reads_mdtm() {
    if should_skip_socket_bound_test() {
        return;
    }
    let (_, files) = corpus_files();
    let server = ScriptedFtp::start(files, 0).await;
    let source = server.source();

    let entries = list_files(&source, DIR).await.unwrap();

    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].name, ARCHIVE);
    assert_eq!(entries[0].checksum_kind, ChecksumKind::Md5);
    assert_eq!(
        entries[0].last_modified,
        Utc.with_ymd_and_hms(2025, 9, 14, 14, 2, 0).single()
    );

    let commands = server.commands();
    assert_eq!(
        &commands[..3],
        &["USER anonymous", "PASS anonymous@", "TYPE I"]
    );
    assert_eq!(server.count(&format!("CWD {DIR}")), 1);
    assert_eq!(server.count("NLST"), 1);
    assert_eq!(server.count(&format!("MDTM {ARCHIVE}")), 1);
    assert_eq!(server.sessions(), 1);
}

#[tokio::test]
async fn test_detail_listing_reads_sizes_and_dates() {
    if should_skip_socket_bound_test() {
        return;
    }
    let (bytes, files) = corpus_files();
    let server = ScriptedFtp::start(files, 0).await;
    let source = server.source();

    let entries = list_files_with_size_and_date(&source, DIR).await.unwrap();

    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].size, Some(bytes.len() as u64));
    assert_eq!(entries[0].checksum_kind, ChecksumKind::Md5);
    assert_eq!(
        entries[0].last_modified,
        Utc.with_ymd_and_hms(2025, 9, 14, 14, 2, 0).single()
    );
    assert_eq!(server.count("LIST"), 1);
    assert_eq!(server.count(&format!("MDTM {ARCHIVE}")), 0);
}

#[tokio::test]
async fn test_unknown_directory_keeps_session() {
    if should_skip_socket_bound_test() {
        return;
    }
    let (_, files) = corpus_files();
    let server = ScriptedFtp::start(files, 0).await;
    let source = server.source();

    let error = source.list_names("/pubmed/nowhere/").await.unwrap_err();
    assert!(matches!(error, TransferError::Protocol { code: 550, .. }));

    let names = source.list_names(DIR).await.unwrap();
    assert_eq!(names.len(), 3);
    assert_eq!(server.sessions(), 1);
}

// ==================== Transfers ====================

#[tokio::test]
async fn test_retrieve_uses_pasv_then_retr_and_caches_directory() {
    if should_skip_socket_bound_test() {
        return;
    }
    let (bytes, files) = corpus_files();
    let server = ScriptedFtp::start(files, 0).await;
    let source = server.source();
    let dir = TempDir::new().unwrap();

    let written = source
        .retrieve(DIR, ARCHIVE, &dir.path().join(ARCHIVE))
        .await
        .unwrap();
    source
        .retrieve(DIR, &format!("{ARCHIVE}.md5"), &dir.path().join("sidecar"))
        .await
        .unwrap();

    assert_eq!(written, bytes.len() as u64);
    assert_eq!(read(&dir.path().join(ARCHIVE)), bytes);

    let commands = server.commands();
    let position = |wanted: &str| commands.iter().position(|c| c == wanted).unwrap();
    assert!(position(&format!("CWD {DIR}")) < position("PASV"));
    assert!(position("PASV") < position(&format!("RETR {ARCHIVE}")));
    assert_eq!(server.count("PASV"), 2);
    assert_eq!(server.count(&format!("CWD {DIR}")), 1);
    assert_eq!(server.sessions(), 1);
}

#[tokio::test]
async fn test_dropped_transfer_reconnects_within_one_batch() {
    if should_skip_socket_bound_test() {
        return;
    }
    let (bytes, files) = corpus_files();
    let server = ScriptedFtp::start(files, 1).await;
    let source: Arc<dyn RemoteSource> = Arc::new(server.source());
    let dir = TempDir::new().unwrap();

    let entries = list_files(source.as_ref(), DIR).await.unwrap();
    let report = FetchEngine::new(1)
        .unwrap()
        .fetch_batch(entries, Arc::clone(&source), DIR, dir.path(), 3)
        .await
        .unwrap();

    assert!(report.is_complete());
    assert_eq!(report.attempts, 2);
    assert_eq!(report.succeeded.len(), 1);
    assert_eq!(read(&dir.path().join(ARCHIVE)), bytes);
    assert_eq!(server.count(&format!("RETR {ARCHIVE}")), 2);
    // The cut-off control connection was replaced by a fresh login.
    assert_eq!(server.sessions(), 2);
    assert_eq!(server.count(&format!("CWD {DIR}")), 2);
}

#[tokio::test]
async fn test_every_transfer_dropped_exhausts_attempts() {
    if should_skip_socket_bound_test() {
        return;
    }
    let (_, files) = corpus_files();
    let server = ScriptedFtp::start(files, 2).await;
    let source: Arc<dyn RemoteSource> = Arc::new(server.source());
    let dir = TempDir::new().unwrap();

    let entries = list_files(source.as_ref(), DIR).await.unwrap();
    let report = FetchEngine::new(1)
        .unwrap()
        .fetch_batch(entries, Arc::clone(&source), DIR, dir.path(), 2)
        .await
        .unwrap();

    assert!(!report.is_complete());
    assert_eq!(report.failed_names(), vec![ARCHIVE]);
    assert!(!dir.path().join(ARCHIVE).exists());
    assert_eq!(server.count(&format!("RETR {ARCHIVE}")), 2);
    assert_eq!(server.sessions(), 2);
}
