use std::time::Duration;

use rayon::prelude::*;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::config::SearchTable;
use crate::dump::{self, ChannelProgress, ChannelSource, ChunkOutcome, ConcatOutcome};
use crate::error::GwError;
use crate::frame::FrameQuery;
use crate::job::{ChannelQuery, Job};
use crate::progress::FrameProgress;
use crate::remote::RemoteShell;
use crate::transfer::{TransferEngine, TransferOutcome};

/// How the fetch phase walks its queries. Concatenation is always
/// sequential.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    Sequential,
    Pool(usize),
}

impl Schedule {
    pub fn from_jobs(jobs: usize) -> Self {
        if jobs > 1 {
            Schedule::Pool(jobs)
        } else {
            Schedule::Sequential
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FetchOptions {
    /// Extra passes after a failed one; negative retries forever.
    pub retries: i64,
    pub schedule: Schedule,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            retries: 0,
            schedule: Schedule::Sequential,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FetchItemResult {
    pub query: String,
    pub outcome: Option<TransferOutcome>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FetchResult {
    pub passes: usize,
    pub completed: bool,
    pub items: Vec<FetchItemResult>,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink: Send + Sync {
    fn event(&self, event: ProgressEvent);
}

/// Forwards progress events to the tracing subscriber.
pub struct LogSink;

impl ProgressSink for LogSink {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => info!(elapsed_ms = elapsed.as_millis() as u64, "{}", event.message),
            None => info!("{}", event.message),
        }
    }
}

fn build_pool(threads: usize) -> Result<rayon::ThreadPool, GwError> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build()
        .map_err(|err| GwError::WorkerPool(err.to_string()))
}

/// Frame-file fetching against one remote shell.
pub struct FrameApp<R: RemoteShell> {
    remote: R,
    table: SearchTable,
    datafind_program: Option<String>,
}

impl<R: RemoteShell> FrameApp<R> {
    pub fn new(remote: R, table: SearchTable) -> Self {
        Self {
            remote,
            table,
            datafind_program: None,
        }
    }

    pub fn with_datafind_program(mut self, program: impl Into<String>) -> Self {
        self.datafind_program = Some(program.into());
        self
    }

    pub fn remote(&self) -> &R {
        &self.remote
    }

    pub fn progress(&self, queries: &[FrameQuery]) -> FrameProgress {
        FrameProgress::check(queries)
    }

    /// Run full passes over `queries` until one finishes without a
    /// pass-aborting error or the retry budget runs out.
    pub fn fetch(
        &self,
        queries: &[FrameQuery],
        options: FetchOptions,
        sink: &dyn ProgressSink,
    ) -> Result<FetchResult, GwError> {
        let mut engine = TransferEngine::new(&self.remote, &self.table);
        if let Some(program) = &self.datafind_program {
            engine = engine.with_datafind_program(program.as_str());
        }
        let pool = match options.schedule {
            Schedule::Pool(threads) => Some(build_pool(threads)?),
            Schedule::Sequential => None,
        };

        let mut tries_left = if options.retries >= 0 {
            options.retries.saturating_add(1)
        } else {
            -1
        };
        let mut passes = 0;
        loop {
            passes += 1;
            sink.event(ProgressEvent {
                message: format!("phase=Fetch; pass {passes} over {} queries", queries.len()),
                elapsed: None,
            });
            let start = std::time::Instant::now();
            let pass = match &pool {
                Some(pool) => pool.install(|| {
                    queries
                        .par_iter()
                        .map(|query| fetch_one(&engine, query, sink))
                        .collect::<Result<Vec<_>, GwError>>()
                }),
                None => queries
                    .iter()
                    .map(|query| fetch_one(&engine, query, sink))
                    .collect::<Result<Vec<_>, GwError>>(),
            };
            match pass {
                Ok(items) => {
                    sink.event(ProgressEvent {
                        message: format!("phase=Fetch; pass {passes} complete"),
                        elapsed: Some(start.elapsed()),
                    });
                    return Ok(FetchResult {
                        passes,
                        completed: true,
                        items,
                        last_error: None,
                    });
                }
                Err(err) => {
                    error!(error = %err, pass = passes, "fetch pass aborted");
                    if tries_left > 0 {
                        tries_left -= 1;
                    }
                    if tries_left == 0 {
                        return Ok(FetchResult {
                            passes,
                            completed: false,
                            items: Vec::new(),
                            last_error: Some(err.to_string()),
                        });
                    }
                    if tries_left < 0 {
                        warn!("retrying; will keep trying until interrupted");
                    } else {
                        warn!(tries_left, "retrying");
                    }
                }
            }
        }
    }
}

fn fetch_one<R: RemoteShell>(
    engine: &TransferEngine<'_, R>,
    query: &FrameQuery,
    sink: &dyn ProgressSink,
) -> Result<FetchItemResult, GwError> {
    match engine.fetch_if_missing(query) {
        Ok(outcome) => {
            if !matches!(outcome, TransferOutcome::AlreadyDownloaded { .. }) {
                sink.event(ProgressEvent {
                    message: format!("phase=Fetch; {query}: {outcome:?}"),
                    elapsed: None,
                });
            }
            Ok(FetchItemResult {
                query: query.repr(),
                outcome: Some(outcome),
                error: None,
            })
        }
        Err(err) if err.is_query_local() => {
            warn!(%query, error = %err, "filename parse error; skipping");
            Ok(FetchItemResult {
                query: query.repr(),
                outcome: None,
                error: Some(err.to_string()),
            })
        }
        Err(err) => Err(err),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DumpResult {
    pub saved: usize,
    pub present: usize,
    pub failed: usize,
    pub concatenated: Vec<ConcatOutcome>,
}

/// Channel dumps: chunked fetch followed by concatenation.
pub struct DumpApp<S: ChannelSource> {
    source: S,
}

impl<S: ChannelSource> DumpApp<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn progress(&self, job: &Job) -> ChannelProgress {
        ChannelProgress::check(job)
    }

    /// Fetch every chunk that is not on disk yet.
    pub fn run_queries(
        &self,
        job: &Job,
        schedule: Schedule,
        sink: &dyn ProgressSink,
    ) -> Result<Vec<ChunkOutcome>, GwError> {
        let queries = job.queries();
        sink.event(ProgressEvent {
            message: format!("phase=Fetch; {} chunk queries", queries.len()),
            elapsed: None,
        });
        let run = |query: &ChannelQuery| dump::download_if_missing(&self.source, query);
        let outcomes = match schedule {
            Schedule::Pool(threads) => build_pool(threads)?.install(|| {
                queries
                    .par_iter()
                    .map(run)
                    .collect::<Result<Vec<_>, GwError>>()
            })?,
            Schedule::Sequential => queries
                .iter()
                .map(run)
                .collect::<Result<Vec<_>, GwError>>()?,
        };
        info!("done downloading data");
        Ok(outcomes)
    }

    pub fn run(
        &self,
        job: &Job,
        schedule: Schedule,
        sink: &dyn ProgressSink,
    ) -> Result<DumpResult, GwError> {
        let outcomes = self.run_queries(job, schedule, sink)?;
        let count = |wanted: ChunkOutcome| outcomes.iter().filter(|&&o| o == wanted).count();
        sink.event(ProgressEvent {
            message: "phase=Concatenate; merging chunks".to_string(),
            elapsed: None,
        });
        let concatenated = dump::concatenate_files(job)?;
        Ok(DumpResult {
            saved: count(ChunkOutcome::Saved),
            present: count(ChunkOutcome::AlreadyPresent),
            failed: count(ChunkOutcome::Failed),
            concatenated,
        })
    }
}
