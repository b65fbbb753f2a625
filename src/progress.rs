use std::fmt::Write as _;

use serde::Serialize;

use crate::frame::FrameQuery;
use crate::store::{RiderKind, Store};
use crate::transfer::{ChecksumState, checksum_state};

pub const PROGRESS_BAR_WIDTH: usize = 40;
const NO_REMOTE_MARKER: &str = "NO REMOTE FILE FOUND";
const MALFORMED_EMPTY_MARKER: &str = "Cannot get GPS start time from filename: ";
const MALFORMED_MARKER: &str = "MALFORMED NAME at ";

/// Mutually exclusive progress buckets, in classification priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameStatus {
    Downloaded,
    MaybeCorrupt,
    Corrupted,
    RemoteHashed,
    RemoteFound,
    NameGuessed,
    Error,
    NotStarted,
}

impl FrameStatus {
    pub const ALL: [FrameStatus; 8] = [
        FrameStatus::Downloaded,
        FrameStatus::MaybeCorrupt,
        FrameStatus::Corrupted,
        FrameStatus::RemoteHashed,
        FrameStatus::RemoteFound,
        FrameStatus::NameGuessed,
        FrameStatus::Error,
        FrameStatus::NotStarted,
    ];

    pub fn label(self) -> &'static str {
        match self {
            FrameStatus::Downloaded => "downloaded",
            FrameStatus::MaybeCorrupt => "maybe_corrupt",
            FrameStatus::Corrupted => "corrupted",
            FrameStatus::RemoteHashed => "remote_hashed",
            FrameStatus::RemoteFound => "remote_found",
            FrameStatus::NameGuessed => "name_guessed",
            FrameStatus::Error => "error",
            FrameStatus::NotStarted => "not_started",
        }
    }
}

/// Classify a query from its estimated rider files alone. Only stats and
/// reads riders; never writes.
pub fn classify(query: &FrameQuery) -> FrameStatus {
    let riders = query.estimated_riders();
    if riders.exists(RiderKind::LocalSha256) {
        return match checksum_state(&riders) {
            ChecksumState::Verified => FrameStatus::Downloaded,
            ChecksumState::Corrupted => FrameStatus::Corrupted,
            ChecksumState::MaybeCorrupt => FrameStatus::MaybeCorrupt,
        };
    }
    if riders.exists(RiderKind::RemoteSha256) {
        FrameStatus::RemoteHashed
    } else if riders.exists(RiderKind::RemoteUrl) {
        FrameStatus::RemoteFound
    } else if riders.exists(RiderKind::QueryRepr) {
        FrameStatus::NameGuessed
    } else if riders.exists(RiderKind::ErrorMsg) {
        FrameStatus::Error
    } else {
        FrameStatus::NotStarted
    }
}

/// Whether the last line of the query's error rider says no remote file
/// could be found.
pub fn no_remote_found(query: &FrameQuery) -> bool {
    let Some(log) = Store::read_text(&query.estimated_riders().error_msg) else {
        return false;
    };
    log.lines()
        .rev()
        .find(|line| !line.trim().is_empty())
        .map(|line| {
            line.starts_with(NO_REMOTE_MARKER)
                || line == MALFORMED_EMPTY_MARKER
                || (line.starts_with(MALFORMED_MARKER) && line.ends_with(MALFORMED_EMPTY_MARKER))
        })
        .unwrap_or(false)
}

#[derive(Debug, Clone, Serialize)]
pub struct BucketCount {
    pub status: FrameStatus,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct FrameProgress {
    pub total: usize,
    pub buckets: Vec<BucketCount>,
    /// Subset of the `error` bucket.
    pub no_remote_found: usize,
}

impl FrameProgress {
    pub fn check(queries: &[FrameQuery]) -> Self {
        let mut buckets = FrameStatus::ALL
            .iter()
            .map(|&status| BucketCount { status, count: 0 })
            .collect::<Vec<_>>();
        let mut no_remote = 0;
        for query in queries {
            let status = classify(query);
            if let Some(bucket) = buckets.iter_mut().find(|bucket| bucket.status == status) {
                bucket.count += 1;
            }
            if status == FrameStatus::Error && no_remote_found(query) {
                no_remote += 1;
            }
        }
        Self {
            total: queries.len(),
            buckets,
            no_remote_found: no_remote,
        }
    }

    pub fn count(&self, status: FrameStatus) -> usize {
        self.buckets
            .iter()
            .find(|bucket| bucket.status == status)
            .map(|bucket| bucket.count)
            .unwrap_or(0)
    }

    /// One bar per bucket, the total first and the `no_remote_found`
    /// sub-bucket last.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let mut row = |label: &str, count: usize| {
            let _ = writeln!(out, "{}", render_row(label, count, self.total));
        };
        row("all_queries", self.total);
        for bucket in &self.buckets {
            row(bucket.status.label(), bucket.count);
        }
        row("no_remote_found", self.no_remote_found);
        out
    }
}

fn render_row(label: &str, count: usize, total: usize) -> String {
    let percent = if total == 0 {
        0.0
    } else {
        100.0 * count as f64 / total as f64
    };
    let ticks = ((percent / 100.0) * PROGRESS_BAR_WIDTH as f64) as usize;
    let ticks = ticks.min(PROGRESS_BAR_WIDTH);
    let lead = if count == 0 { '-' } else { '#' };
    let bar = format!(
        "{lead}{}{}",
        "#".repeat(ticks),
        "-".repeat(PROGRESS_BAR_WIDTH - ticks)
    );
    format!("{label:<16} {bar} {count:>4}/{total:<4} ({percent:>7.3}%)")
}
