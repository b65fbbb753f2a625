//! Channel dump jobs: a time window and a set of channels, split into
//! bounded chunks that can be fetched independently and stitched together
//! afterwards.

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;

use crate::error::GwError;
use crate::gps;

pub const SEC_PER_DAY: i64 = 86_400;
pub const DEFAULT_MAX_CHUNK: i64 = SEC_PER_DAY;
pub const ALLOWED_EXTENSIONS: [&str; 2] = ["csv", "txt"];
pub const MINUTE_TREND_MARKER: &str = "m-trend";

pub fn default_extensions() -> Vec<String> {
    vec!["txt".to_string()]
}

/// Full data, i.e. no trend suffix.
pub fn default_trends() -> Vec<String> {
    vec![String::new()]
}

/// One channel over one chunk, saved to one file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ChannelQuery {
    pub start: i64,
    pub end: i64,
    pub channel: String,
    pub ext: String,
    pub outdir: Utf8PathBuf,
}

impl ChannelQuery {
    pub fn new(
        start: i64,
        end: i64,
        channel: impl Into<String>,
        ext: impl Into<String>,
        outdir: impl Into<Utf8PathBuf>,
    ) -> Self {
        Self {
            start,
            end,
            channel: channel.into(),
            ext: ext.into(),
            outdir: outdir.into(),
        }
    }

    /// Channel name usable in a filename: `:` becomes `..`, `,` becomes `--`.
    pub fn sanitized_channel(&self) -> String {
        sanitize_channel(&self.channel)
    }

    pub fn filename(&self) -> String {
        format!(
            "{}__{}__{}.{}",
            self.start,
            self.end,
            self.sanitized_channel(),
            self.ext
        )
    }

    pub fn path(&self) -> Utf8PathBuf {
        self.outdir.join(self.filename())
    }

    /// Marker written when fetching this chunk failed.
    pub fn error_path(&self) -> Utf8PathBuf {
        self.outdir.join(format!("{}.ERROR", self.filename()))
    }

    pub fn file_exists(&self) -> bool {
        self.path().as_std_path().is_file()
    }

    pub fn query_failed(&self) -> bool {
        self.error_path().as_std_path().is_file()
    }
}

impl std::fmt::Display for ChannelQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "start: {}, end: {}, channel: {}, ext: {}",
            self.start, self.end, self.channel, self.ext
        )
    }
}

pub fn sanitize_channel(channel: &str) -> String {
    channel.replace(':', "..").replace(',', "--")
}

/// Contiguous `[start, end)` spans covering `[start, end)` exactly once.
/// Interior boundaries fall on multiples of `max_chunk_length`, so only the
/// first and last spans can be shorter than a full chunk.
pub fn subspans(start: i64, end: i64, max_chunk_length: i64) -> Vec<(i64, i64)> {
    if end <= start || max_chunk_length <= 0 {
        return Vec::new();
    }
    let mut spans = Vec::new();
    let mut lower = start;
    while lower < end {
        let next_boundary = (lower.div_euclid(max_chunk_length) + 1) * max_chunk_length;
        let upper = next_boundary.min(end);
        spans.push((lower, upper));
        lower = upper;
    }
    spans
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Job {
    pub start: i64,
    pub end: i64,
    pub channels: Vec<String>,
    pub exts: Vec<String>,
    pub trends: Vec<String>,
    pub max_chunk_length: i64,
    pub outdir: Utf8PathBuf,
}

impl Job {
    /// Validate a job. When any channel is a minute trend, the window is
    /// widened outwards to whole minutes.
    pub fn new(
        start: i64,
        end: i64,
        channels: Vec<String>,
        exts: Vec<String>,
        trends: Vec<String>,
        max_chunk_length: i64,
        outdir: &Utf8Path,
    ) -> Result<Self, GwError> {
        if let Some(ext) = exts
            .iter()
            .find(|ext| !ALLOWED_EXTENSIONS.contains(&ext.as_str()))
        {
            return Err(GwError::InvalidJob(format!(
                "extension {ext} not allowed; pick from {ALLOWED_EXTENSIONS:?}"
            )));
        }
        if exts.len() != 1 {
            return Err(GwError::InvalidJob(format!(
                "exactly one file extension per job is supported; got {exts:?}"
            )));
        }
        if max_chunk_length <= 0 || max_chunk_length % 60 != 0 {
            return Err(GwError::InvalidJob(format!(
                "max_chunk_length must be a positive multiple of 60; got {max_chunk_length}"
            )));
        }
        if end < start {
            return Err(GwError::InvalidJob(format!(
                "end {end} is before start {start}"
            )));
        }
        let trends = if trends.is_empty() {
            default_trends()
        } else {
            trends
        };
        let mut job = Self {
            start,
            end,
            channels,
            exts,
            trends,
            max_chunk_length,
            outdir: outdir.to_path_buf(),
        };
        if job
            .channels_with_trends()
            .iter()
            .any(|channel| channel.contains(MINUTE_TREND_MARKER))
        {
            job.start = job.start.div_euclid(60) * 60;
            job.end = -((-job.end).div_euclid(60)) * 60;
        }
        Ok(job)
    }

    /// Every channel with every trend suffix appended.
    pub fn channels_with_trends(&self) -> Vec<String> {
        self.channels
            .iter()
            .flat_map(|channel| self.trends.iter().map(move |trend| format!("{channel}{trend}")))
            .collect()
    }

    pub fn subspans(&self) -> Vec<(i64, i64)> {
        subspans(self.start, self.end, self.max_chunk_length)
    }

    /// Cross product channel × span × extension, in that nesting order.
    pub fn queries(&self) -> Vec<ChannelQuery> {
        let spans = self.subspans();
        let mut queries = Vec::new();
        for channel in self.channels_with_trends() {
            for &(start, end) in &spans {
                for ext in &self.exts {
                    queries.push(ChannelQuery::new(
                        start,
                        end,
                        channel.as_str(),
                        ext.as_str(),
                        self.outdir.as_path(),
                    ));
                }
            }
        }
        queries
    }

    /// Single channel/extension/trend jobs that together make up this job.
    pub fn joblets(&self) -> Vec<Job> {
        let mut joblets = Vec::new();
        for channel in &self.channels {
            for ext in &self.exts {
                for trend in &self.trends {
                    joblets.push(Job {
                        start: self.start,
                        end: self.end,
                        channels: vec![channel.clone()],
                        exts: vec![ext.clone()],
                        trends: vec![trend.clone()],
                        max_chunk_length: self.max_chunk_length,
                        outdir: self.outdir.clone(),
                    });
                }
            }
        }
        joblets
    }

    /// The query whose file holds this job's fully concatenated output.
    /// Only meaningful for joblets.
    pub fn full_query(&self) -> Option<ChannelQuery> {
        let channel = self.channels_with_trends().into_iter().next()?;
        let ext = self.exts.first()?;
        Some(ChannelQuery::new(
            self.start,
            self.end,
            channel,
            ext.as_str(),
            self.outdir.as_path(),
        ))
    }

    pub fn output_filenames(&self) -> Vec<Utf8PathBuf> {
        self.joblets()
            .iter()
            .filter_map(Job::full_query)
            .map(|query| query.path())
            .collect()
    }

    pub fn start_iso(&self) -> Result<String, GwError> {
        gps::gps_to_iso(self.start)
    }

    pub fn end_iso(&self) -> Result<String, GwError> {
        gps::gps_to_iso(self.end)
    }
}
