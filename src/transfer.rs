//! Download and verification of a single frame query.
//!
//! A query's progress lives only in its rider files. Each step below writes
//! its rider as the last thing it does, so an interrupted run leaves a state
//! that the next run (or the progress tracker) can read back:
//!
//! 1. locate the remote file; an empty answer is logged to the error rider
//! 2. resolve the local name from the remote basename
//! 3. delete a stale local copy whose two checksum riders disagree
//! 4. if nothing is on disk: record the locator and query, copy, then record
//!    the remote and local checksums

use std::time::Duration;

use camino::Utf8PathBuf;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::checksum;
use crate::config::SearchTable;
use crate::error::GwError;
use crate::frame::{FrameQuery, RemoteFileInfo};
use crate::locator::Locator;
use crate::remote::{RemoteShell, shell_quote};
use crate::store::{RiderPaths, Store};

/// Files modified more recently than this may still be downloading.
pub const CORRUPTION_GRACE: Duration = Duration::from_secs(60);

pub fn utc_stamp() -> String {
    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
}

/// What the checksum riders say about a local file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChecksumState {
    Verified,
    /// At least one checksum rider is missing.
    MaybeCorrupt,
    Corrupted,
}

pub fn checksum_state(riders: &RiderPaths) -> ChecksumState {
    let remote = Store::read_text(&riders.remote_sha256);
    let local = Store::read_text(&riders.local_sha256);
    match (remote, local) {
        (Some(remote), Some(local)) if remote.trim() == local.trim() => ChecksumState::Verified,
        (Some(_), Some(_)) => ChecksumState::Corrupted,
        _ => ChecksumState::MaybeCorrupt,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TransferOutcome {
    /// The estimated local file already exists; nothing was contacted.
    AlreadyDownloaded { path: Utf8PathBuf },
    /// No remote file could be located.
    NoRemote,
    /// A local copy under the actual name exists and was left in place.
    Present {
        path: Utf8PathBuf,
        state: ChecksumState,
    },
    Downloaded { path: Utf8PathBuf },
}

pub struct TransferEngine<'a, R: RemoteShell> {
    remote: &'a R,
    locator: Locator<'a, R>,
    grace: Duration,
}

impl<'a, R: RemoteShell> TransferEngine<'a, R> {
    pub fn new(remote: &'a R, table: &'a SearchTable) -> Self {
        Self {
            remote,
            locator: Locator::new(remote, table),
            grace: CORRUPTION_GRACE,
        }
    }

    pub fn with_datafind_program(mut self, program: impl Into<String>) -> Self {
        self.locator = self.locator.with_datafind_program(program);
        self
    }

    /// Download `query` unless its estimated file is already on disk. A file
    /// whose checksum riders disagree still goes through `download`, which
    /// decides whether to replace it.
    pub fn fetch_if_missing(&self, query: &FrameQuery) -> Result<TransferOutcome, GwError> {
        if query.estimated_fullpath_exists()
            && checksum_state(&query.estimated_riders()) != ChecksumState::Corrupted
        {
            debug!(%query, "already downloaded");
            return Ok(TransferOutcome::AlreadyDownloaded {
                path: query.estimated_fullpath(),
            });
        }
        self.download(query)
    }

    pub fn download(&self, query: &FrameQuery) -> Result<TransferOutcome, GwError> {
        let locator = self
            .locator
            .locate(query)
            .or_else(|err| record_stamped(&query.estimated_riders(), err))?;
        if locator.is_empty() {
            let estimated = query.estimated_riders();
            Store::append_text(
                &estimated.error_msg,
                &format!("NO REMOTE FILE FOUND at {}\n", utc_stamp()),
            )?;
            return Ok(TransferOutcome::NoRemote);
        }

        let local_path = match query.local_fullpath_from_remote(&locator) {
            Ok(path) => path,
            Err(err) => {
                Store::append_text(
                    &query.estimated_riders().error_msg,
                    &format!("MALFORMED NAME at {}. {err}\n", utc_stamp()),
                )?;
                return Err(err);
            }
        };
        let riders = query.riders_from_remote(&locator)?;

        if Store::is_file(&local_path) {
            self.discard_if_corrupt(&local_path, &riders)
                .or_else(|err| record_stamped(&riders, err))?;
        }
        if Store::is_file(&local_path) {
            return Ok(TransferOutcome::Present {
                state: checksum_state(&riders),
                path: local_path,
            });
        }

        Store::ensure_dir(&query.outdir)
            .and_then(|()| Store::write_text_atomic(&riders.remote_url, &locator))
            .and_then(|()| Store::write_text_atomic(&riders.query_repr, &query.repr()))
            .or_else(|err| record_stamped(&riders, err))?;

        let remote_path = RemoteFileInfo::new(&locator).fullpath().to_string();
        info!(%query, remote_path, local = %local_path, "downloading");
        let copied = self
            .remote
            .copy(&query.server, &remote_path, &local_path)
            .and_then(|output| {
                if output.success {
                    Ok(())
                } else {
                    Err(GwError::Transfer(format!(
                        "DOWNLOAD ERROR at {}. STDERR: \n{}\n",
                        utc_stamp(),
                        output.stderr.trim_end()
                    )))
                }
            });
        if let Err(err) = copied {
            let err = match err {
                GwError::Transfer(_) => err,
                other => GwError::Transfer(format!(
                    "DOWNLOAD ERROR at {}. STDERR: \n{other}\n",
                    utc_stamp()
                )),
            };
            Store::append_text(&riders.error_msg, &err.to_string())?;
            return Err(err);
        }

        let remote_digest = self
            .remote_sha256(query, &remote_path)
            .or_else(|err| record_failure(&riders, err))?;
        Store::write_text_atomic(&riders.remote_sha256, &remote_digest)
            .or_else(|err| record_stamped(&riders, err))?;

        let local_digest = checksum::local_sha256(&local_path)
            .and_then(|line| {
                checksum::parse_digest(&line).map(str::to_string).ok_or_else(|| {
                    GwError::LocalChecksum(format!(
                        "LOCAL_SHA256 ERROR at {}. STDERR: \nempty digest\n",
                        utc_stamp()
                    ))
                })
            })
            .or_else(|err| record_failure(&riders, err))?;
        Store::write_text_atomic(&riders.local_sha256, &local_digest)
            .or_else(|err| record_stamped(&riders, err))?;

        info!(%query, path = %local_path, "downloaded");
        Ok(TransferOutcome::Downloaded { path: local_path })
    }

    /// Remove `local_path` when both checksum riders exist and disagree and
    /// the file has not been touched within the grace window.
    fn discard_if_corrupt(
        &self,
        local_path: &Utf8PathBuf,
        riders: &RiderPaths,
    ) -> Result<(), GwError> {
        match checksum_state(riders) {
            ChecksumState::Verified => Ok(()),
            ChecksumState::MaybeCorrupt => {
                debug!(path = %local_path, "checksum riders incomplete; leaving file alone");
                Ok(())
            }
            ChecksumState::Corrupted => {
                let age = Store::modified_age(local_path)?;
                if age <= self.grace {
                    info!(path = %local_path, ?age, "corrupt file modified recently; leaving it");
                    return Ok(());
                }
                warn!(path = %local_path, "corrupt file; deleting and proceeding");
                Store::append_text(
                    &riders.error_msg,
                    &format!("CORRUPT FILE at {}. DELETING AND PROCEEDING.\n", utc_stamp()),
                )?;
                Store::remove_file(local_path)
            }
        }
    }

    fn remote_sha256(&self, query: &FrameQuery, remote_path: &str) -> Result<String, GwError> {
        let command = format!("sha256sum {}", shell_quote(remote_path));
        let output = self.remote.execute(&query.server, &command)?;
        if !output.success {
            return Err(GwError::RemoteChecksum(format!(
                "REMOTE_SHA256 ERROR at {}. STDERR: \n{}\n",
                utc_stamp(),
                output.stderr.trim_end()
            )));
        }
        checksum::parse_digest(&output.stdout)
            .map(str::to_string)
            .ok_or_else(|| {
                GwError::RemoteChecksum(format!(
                    "REMOTE_SHA256 ERROR at {}. STDERR: \nempty digest\n",
                    utc_stamp()
                ))
            })
    }
}

/// For errors whose message already carries a timestamp.
fn record_failure<T>(riders: &RiderPaths, err: GwError) -> Result<T, GwError> {
    Store::append_text(&riders.error_msg, &err.to_string())?;
    Err(err)
}

fn record_stamped<T>(riders: &RiderPaths, err: GwError) -> Result<T, GwError> {
    Store::append_text(&riders.error_msg, &format!("ERROR at {}. {err}\n", utc_stamp()))?;
    Err(err)
}
