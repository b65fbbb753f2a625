use std::fs;
use std::sync::Mutex;
use std::time::{Duration, SystemTime};

use assert_matches::assert_matches;
use camino::{Utf8Path, Utf8PathBuf};

use gw_data_fetch::checksum::sha256_hex;
use gw_data_fetch::config::SearchTable;
use gw_data_fetch::error::GwError;
use gw_data_fetch::frame::{DEFAULT_SERVER, FrameQuery};
use gw_data_fetch::progress::{FrameStatus, classify};
use gw_data_fetch::remote::{CommandOutput, RemoteShell};
use gw_data_fetch::store::{RiderKind, Store};
use gw_data_fetch::transfer::{ChecksumState, TransferEngine, TransferOutcome};

const REMOTE_PATH: &str = "/hdfs/frames/O2/raw/H1/H-H1_R-11869/H-H1_R-1186959360-4096.gwf";
const PAYLOAD: &[u8] = b"frame bytes";

struct MockRemote {
    datafind: CommandOutput,
    payload: Vec<u8>,
    remote_digest: Option<String>,
    copy_fails: bool,
    copy_writes: bool,
    launch_fails: bool,
    calls: Mutex<Vec<String>>,
}

impl MockRemote {
    fn serving(locator: &str) -> Self {
        Self {
            datafind: CommandOutput::ok(format!("file://localhost{locator}\n")),
            payload: PAYLOAD.to_vec(),
            remote_digest: Some(sha256_hex(PAYLOAD)),
            copy_fails: false,
            copy_writes: true,
            launch_fails: false,
            calls: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn copies(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| call.starts_with("copy "))
            .count()
    }
}

impl RemoteShell for MockRemote {
    fn execute(&self, server: &str, command: &str) -> Result<CommandOutput, GwError> {
        self.calls.lock().unwrap().push(command.to_string());
        if self.launch_fails {
            return Err(GwError::RemoteExec {
                server: server.to_string(),
                message: "gsissh: No such file or directory".to_string(),
            });
        }
        if command.starts_with("gw_data_find") {
            return Ok(self.datafind.clone());
        }
        if command.starts_with("sha256sum") {
            return Ok(match &self.remote_digest {
                Some(digest) => CommandOutput::ok(format!("{digest}  {REMOTE_PATH}\n")),
                None => CommandOutput::failed("sha256sum: permission denied"),
            });
        }
        Ok(CommandOutput::ok(""))
    }

    fn copy(
        &self,
        _server: &str,
        remote_path: &str,
        local_path: &Utf8Path,
    ) -> Result<CommandOutput, GwError> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("copy {remote_path}"));
        if self.copy_fails {
            return Ok(CommandOutput::failed("lost connection"));
        }
        if self.copy_writes {
            fs::write(local_path, &self.payload).unwrap();
        }
        Ok(CommandOutput::ok(""))
    }
}

fn outdir(temp: &tempfile::TempDir) -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap()
}

fn query(outdir: &Utf8Path) -> FrameQuery {
    FrameQuery::new("H", "H1_R", 1_186_959_360, 4096, DEFAULT_SERVER, outdir)
}

fn backdate(path: &Utf8Path, by: Duration) {
    let file = fs::File::options().write(true).open(path).unwrap();
    file.set_modified(SystemTime::now() - by).unwrap();
}

fn plant_corrupt_file(query: &FrameQuery) -> Utf8PathBuf {
    let path = query.estimated_fullpath();
    fs::write(&path, b"truncated").unwrap();
    let riders = query.estimated_riders();
    Store::write_text_atomic(&riders.remote_sha256, "aaaa").unwrap();
    Store::write_text_atomic(&riders.local_sha256, "bbbb").unwrap();
    path
}

#[test]
fn download_writes_every_rider() {
    let temp = tempfile::tempdir().unwrap();
    let query = query(&outdir(&temp));
    let remote = MockRemote::serving(REMOTE_PATH);
    let table = SearchTable::default();
    let engine = TransferEngine::new(&remote, &table);

    let outcome = engine.fetch_if_missing(&query).unwrap();
    assert_eq!(
        outcome,
        TransferOutcome::Downloaded {
            path: query.estimated_fullpath()
        }
    );

    let riders = query.estimated_riders();
    for kind in [
        RiderKind::RemoteSha256,
        RiderKind::LocalSha256,
        RiderKind::QueryRepr,
        RiderKind::RemoteUrl,
    ] {
        assert!(riders.exists(kind), "missing {kind:?} rider");
    }
    assert!(!riders.exists(RiderKind::ErrorMsg));
    assert_eq!(
        Store::read_text(&riders.remote_url).unwrap(),
        REMOTE_PATH
    );
    assert_eq!(Store::read_text(&riders.query_repr).unwrap(), query.repr());
    assert_eq!(classify(&query), FrameStatus::Downloaded);
}

#[test]
fn second_pass_makes_no_remote_calls() {
    let temp = tempfile::tempdir().unwrap();
    let query = query(&outdir(&temp));
    let remote = MockRemote::serving(REMOTE_PATH);
    let table = SearchTable::default();
    let engine = TransferEngine::new(&remote, &table);

    engine.fetch_if_missing(&query).unwrap();
    let calls_after_first = remote.calls().len();
    let riders = query.estimated_riders();
    let before = RiderKind::ALL.map(|kind| Store::read_text(riders.get(kind)));

    let outcome = engine.fetch_if_missing(&query).unwrap();
    assert_matches!(outcome, TransferOutcome::AlreadyDownloaded { .. });
    assert_eq!(remote.calls().len(), calls_after_first);
    let after = RiderKind::ALL.map(|kind| Store::read_text(riders.get(kind)));
    assert_eq!(before, after);
}

#[test]
fn stale_corrupt_file_is_replaced() {
    let temp = tempfile::tempdir().unwrap();
    let query = query(&outdir(&temp));
    let path = plant_corrupt_file(&query);
    backdate(&path, Duration::from_secs(120));
    assert_eq!(classify(&query), FrameStatus::Corrupted);

    let remote = MockRemote::serving(REMOTE_PATH);
    let table = SearchTable::default();
    let engine = TransferEngine::new(&remote, &table);
    let outcome = engine.fetch_if_missing(&query).unwrap();

    assert_matches!(outcome, TransferOutcome::Downloaded { .. });
    assert_eq!(remote.copies(), 1);
    assert_eq!(fs::read(&path).unwrap(), PAYLOAD);
    let log = Store::read_text(&query.estimated_riders().error_msg).unwrap();
    assert!(log.contains("CORRUPT FILE at"), "{log}");
    assert_eq!(classify(&query), FrameStatus::Downloaded);
}

#[test]
fn recently_modified_corrupt_file_is_kept() {
    let temp = tempfile::tempdir().unwrap();
    let query = query(&outdir(&temp));
    let path = plant_corrupt_file(&query);

    let remote = MockRemote::serving(REMOTE_PATH);
    let table = SearchTable::default();
    let engine = TransferEngine::new(&remote, &table);
    let outcome = engine.fetch_if_missing(&query).unwrap();

    assert_eq!(
        outcome,
        TransferOutcome::Present {
            path: path.clone(),
            state: ChecksumState::Corrupted
        }
    );
    assert_eq!(remote.copies(), 0);
    assert_eq!(fs::read(&path).unwrap(), b"truncated");
    assert!(!query.estimated_riders().exists(RiderKind::ErrorMsg));
}

#[test]
fn file_without_checksums_is_left_alone() {
    let temp = tempfile::tempdir().unwrap();
    let query = query(&outdir(&temp));
    let path = query.estimated_fullpath();
    fs::write(&path, b"partial").unwrap();
    backdate(&path, Duration::from_secs(600));

    let remote = MockRemote::serving(REMOTE_PATH);
    let table = SearchTable::default();
    let engine = TransferEngine::new(&remote, &table);
    let outcome = engine.download(&query).unwrap();

    assert_matches!(
        outcome,
        TransferOutcome::Present {
            state: ChecksumState::MaybeCorrupt,
            ..
        }
    );
    assert_eq!(fs::read(&path).unwrap(), b"partial");
}

#[test]
fn copy_failure_is_logged_and_aborts() {
    let temp = tempfile::tempdir().unwrap();
    let query = query(&outdir(&temp));
    let mut remote = MockRemote::serving(REMOTE_PATH);
    remote.copy_fails = true;
    let table = SearchTable::default();
    let engine = TransferEngine::new(&remote, &table);

    let err = engine.fetch_if_missing(&query).unwrap_err();
    assert_matches!(err, GwError::Transfer(_));

    let riders = query.estimated_riders();
    let log = Store::read_text(&riders.error_msg).unwrap();
    assert!(log.contains("DOWNLOAD ERROR at"), "{log}");
    assert!(log.contains("lost connection"), "{log}");
    assert!(!riders.exists(RiderKind::RemoteSha256));
    assert_eq!(classify(&query), FrameStatus::RemoteFound);
}

#[test]
fn remote_checksum_failure_leaves_remote_found() {
    let temp = tempfile::tempdir().unwrap();
    let query = query(&outdir(&temp));
    let mut remote = MockRemote::serving(REMOTE_PATH);
    remote.remote_digest = None;
    let table = SearchTable::default();
    let engine = TransferEngine::new(&remote, &table);

    let err = engine.fetch_if_missing(&query).unwrap_err();
    assert_matches!(err, GwError::RemoteChecksum(_));
    let log = Store::read_text(&query.estimated_riders().error_msg).unwrap();
    assert!(log.contains("REMOTE_SHA256 ERROR"), "{log}");
    assert_eq!(classify(&query), FrameStatus::RemoteFound);
}

#[test]
fn actual_name_from_remote_is_used() {
    let temp = tempfile::tempdir().unwrap();
    let outdir = outdir(&temp);
    let query = FrameQuery::new("H", "H1_R", 1_186_959_360, 64, DEFAULT_SERVER, &outdir);
    let remote = MockRemote::serving(REMOTE_PATH);
    let table = SearchTable::default();
    let engine = TransferEngine::new(&remote, &table);

    let outcome = engine.fetch_if_missing(&query).unwrap();
    let actual = outdir.join("H-H1_R-1186959360-4096.gwf");
    assert_eq!(outcome, TransferOutcome::Downloaded { path: actual });
    assert!(!query.estimated_fullpath_exists());
    assert_eq!(classify(&query), FrameStatus::NotStarted);
}

#[test]
fn malformed_remote_name_is_logged() {
    let temp = tempfile::tempdir().unwrap();
    let query = query(&outdir(&temp));
    let remote = MockRemote::serving("/hdfs/frames/junk.gwf");
    let table = SearchTable::default();
    let engine = TransferEngine::new(&remote, &table);

    let err = engine.fetch_if_missing(&query).unwrap_err();
    assert!(err.is_query_local());
    let log = Store::read_text(&query.estimated_riders().error_msg).unwrap();
    assert!(log.starts_with("MALFORMED NAME at "), "{log}");
    assert!(log.contains("Cannot get GPS start time from filename: junk.gwf"));
    assert_eq!(remote.copies(), 0);
}

#[test]
fn unknown_file_is_recorded_as_no_remote() {
    let temp = tempfile::tempdir().unwrap();
    let query = query(&outdir(&temp));
    let mut remote = MockRemote::serving(REMOTE_PATH);
    remote.datafind = CommandOutput::ok("");
    let table = SearchTable::default();
    let engine = TransferEngine::new(&remote, &table);

    assert_eq!(
        engine.fetch_if_missing(&query).unwrap(),
        TransferOutcome::NoRemote
    );
    let log = Store::read_text(&query.estimated_riders().error_msg).unwrap();
    assert!(log.starts_with("NO REMOTE FILE FOUND at"));
    assert_eq!(classify(&query), FrameStatus::Error);
}

#[test]
fn unreadable_local_copy_is_local_checksum_error() {
    let temp = tempfile::tempdir().unwrap();
    let query = query(&outdir(&temp));
    let mut remote = MockRemote::serving(REMOTE_PATH);
    remote.copy_writes = false;
    let table = SearchTable::default();
    let engine = TransferEngine::new(&remote, &table);

    let err = engine.fetch_if_missing(&query).unwrap_err();
    assert_matches!(err, GwError::LocalChecksum(_));
    let riders = query.estimated_riders();
    let log = Store::read_text(&riders.error_msg).unwrap();
    assert!(log.contains("LOCAL_SHA256 ERROR at"), "{log}");
    assert!(riders.exists(RiderKind::RemoteSha256));
    assert!(!riders.exists(RiderKind::LocalSha256));
    assert_eq!(classify(&query), FrameStatus::RemoteHashed);
}

#[test]
fn unreachable_server_is_logged_before_aborting() {
    let temp = tempfile::tempdir().unwrap();
    let query = query(&outdir(&temp));
    let mut remote = MockRemote::serving(REMOTE_PATH);
    remote.launch_fails = true;
    let table = SearchTable::default();
    let engine = TransferEngine::new(&remote, &table);

    let err = engine.fetch_if_missing(&query).unwrap_err();
    assert_matches!(err, GwError::RemoteExec { .. });
    let log = Store::read_text(&query.estimated_riders().error_msg).unwrap();
    assert!(log.starts_with("ERROR at "), "{log}");
    assert!(log.contains("gsissh: No such file or directory"), "{log}");
    assert_eq!(classify(&query), FrameStatus::Error);
}
