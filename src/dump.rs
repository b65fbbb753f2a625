use std::collections::BTreeSet;
use std::process::Command;

use camino::Utf8PathBuf;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::error::GwError;
use crate::job::{ChannelQuery, Job};
use crate::series::{DEFAULT_PAD, SeriesFormat, TimeSeries};
use crate::store::Store;

pub const DEFAULT_FETCHER: &str = "gwfetch-nds";

/// Source of channel samples, e.g. an NDS2 server.
pub trait ChannelSource: Send + Sync {
    fn fetch(&self, channel: &str, start: i64, end: i64) -> Result<TimeSeries, GwError>;
}

/// Runs `<program> <channel> <start> <end>` and reads two-column
/// `time value` lines from its stdout. Missing samples are expected to be
/// padded by the program itself.
#[derive(Debug, Clone)]
pub struct SystemChannelSource {
    program: String,
}

impl SystemChannelSource {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for SystemChannelSource {
    fn default() -> Self {
        Self::new(DEFAULT_FETCHER)
    }
}

impl ChannelSource for SystemChannelSource {
    fn fetch(&self, channel: &str, start: i64, end: i64) -> Result<TimeSeries, GwError> {
        debug!(program = %self.program, channel, start, end, "fetching channel");
        let output = Command::new(&self.program)
            .arg(channel)
            .arg(start.to_string())
            .arg(end.to_string())
            .output()
            .map_err(|err| GwError::ChannelFetch(format!("{}: {err}", self.program)))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let message = if stderr.is_empty() {
                format!("command failed: {}", self.program)
            } else {
                stderr
            };
            return Err(GwError::ChannelFetch(message));
        }
        SeriesFormat::Txt.decode(&String::from_utf8_lossy(&output.stdout))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkOutcome {
    AlreadyPresent,
    Saved,
    Failed,
}

/// Fetch and save `query` unless its file exists. A failed fetch leaves an
/// error marker next to where the file would be; it is not an error here.
pub fn download_if_missing<S: ChannelSource + ?Sized>(
    source: &S,
    query: &ChannelQuery,
) -> Result<ChunkOutcome, GwError> {
    debug!(%query, path = %query.path(), "checking chunk");
    if query.file_exists() {
        return Ok(ChunkOutcome::AlreadyPresent);
    }
    let fetched = source
        .fetch(&query.channel, query.start, query.end)
        .and_then(|series| SeriesFormat::write(&query.path(), &series));
    match fetched {
        Ok(()) => {
            info!(%query, "query succeeded; saved to file");
            Ok(ChunkOutcome::Saved)
        }
        Err(err) => {
            warn!(%query, error = %err, "error while downloading");
            Store::write_text_atomic(&query.error_path(), &format!("Download failed: {err}"))?;
            Ok(ChunkOutcome::Failed)
        }
    }
}

/// Read a saved chunk. A missing file is `ChunkFailed` when a download was
/// attempted and failed, and `NeverAttempted` otherwise.
pub fn read_chunk(query: &ChannelQuery) -> Result<TimeSeries, GwError> {
    match SeriesFormat::read(&query.path()) {
        Ok(series) => Ok(series),
        Err(err) if query.query_failed() => {
            warn!(%query, error = %err, "encountered failed query while reading; padding");
            Err(GwError::ChunkFailed(query.to_string()))
        }
        Err(err) => {
            error!(%query, error = %err, "no download attempt seems to have been made");
            Err(GwError::NeverAttempted(query.to_string()))
        }
    }
}

/// Fold chunks in order: start from the first readable chunk, append later
/// readable chunks with gaps padded, skip failed ones. Any other error
/// aborts. `None` when every chunk failed.
pub fn fold_chunks<I>(chunks: I, pad: f64) -> Result<Option<TimeSeries>, GwError>
where
    I: IntoIterator<Item = Result<TimeSeries, GwError>>,
{
    let mut merged: Option<TimeSeries> = None;
    for chunk in chunks {
        let series = match chunk {
            Ok(series) => series,
            Err(GwError::ChunkFailed(_)) => continue,
            Err(err) => return Err(err),
        };
        match merged.as_mut() {
            Some(data) => data.append_padded(&series, pad)?,
            None => merged = Some(series),
        }
    }
    Ok(merged)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ConcatOutcome {
    AlreadyConcatenated { path: Utf8PathBuf },
    Written { path: Utf8PathBuf },
    NoData { path: Utf8PathBuf },
}

/// Concatenate each joblet's chunks into its final output file.
pub fn concatenate_files(job: &Job) -> Result<Vec<ConcatOutcome>, GwError> {
    let mut outcomes = Vec::new();
    for joblet in job.joblets() {
        let Some(full_query) = joblet.full_query() else {
            continue;
        };
        let path = full_query.path();
        if full_query.file_exists() {
            info!(path = %path, "joblet already concatenated; skipping");
            outcomes.push(ConcatOutcome::AlreadyConcatenated { path });
            continue;
        }
        debug!(channel = %full_query.channel, "concatenating time series");
        let chunks = joblet.queries().into_iter().map(|query| read_chunk(&query));
        let Some(merged) = fold_chunks(chunks, DEFAULT_PAD)? else {
            warn!(path = %path, "every chunk failed; nothing to write");
            outcomes.push(ConcatOutcome::NoData { path });
            continue;
        };
        if !full_query.file_exists() {
            SeriesFormat::write(&path, &merged)?;
        }
        debug!(path = %path, "done concatenating");
        outcomes.push(ConcatOutcome::Written { path });
    }
    Ok(outcomes)
}

#[derive(Debug, Clone, Serialize)]
pub struct ChannelProgress {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub in_progress: usize,
    pub failed_spans: Vec<(i64, i64)>,
}

impl ChannelProgress {
    pub fn check(job: &Job) -> Self {
        let queries = job.queries();
        let successful = queries.iter().filter(|query| query.file_exists()).count();
        let failed = queries
            .iter()
            .filter(|query| !query.file_exists() && query.query_failed())
            .collect::<Vec<_>>();
        let failed_spans = failed
            .iter()
            .map(|query| (query.start, query.end))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        Self {
            total: queries.len(),
            successful,
            failed: failed.len(),
            in_progress: queries.len() - successful - failed.len(),
            failed_spans,
        }
    }

    fn percent(&self, count: usize) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            count as f64 * 100.0 / self.total as f64
        }
    }

    pub fn render(&self) -> String {
        let mut lines = vec![
            format!("Total downloads needed: {}", self.total),
            format!("Successful downloads: {}", self.successful),
            format!("Failed downloads: {}", self.failed),
            "Failed timespans:".to_string(),
        ];
        lines.extend(
            self.failed_spans
                .iter()
                .map(|(start, end)| format!("    ({start}, {end})")),
        );
        lines.push(format!("In progress downloads: {}", self.in_progress));
        lines.push(format!(
            "SUMMARY:\n{:.3}% done\n{:.3}% failed\n{:.3}% remains",
            self.percent(self.successful),
            self.percent(self.failed),
            self.percent(self.in_progress)
        ));
        lines.join("\n")
    }
}
