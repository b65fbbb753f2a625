use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum GwError {
    #[error("invalid job specification: {0}")]
    InvalidJob(String),

    #[error("invalid time: {0}")]
    InvalidTime(String),

    #[error("failed to read job file at {0}")]
    JobRead(PathBuf),

    #[error("failed to parse job file: {0}")]
    JobParse(String),

    #[error("failed to read search table at {0}")]
    SearchTableRead(PathBuf),

    #[error("failed to parse search table: {0}")]
    SearchTableParse(String),

    #[error("must provide either --times or both of --start and --deltat")]
    #[diagnostic(help("pass a single window with -t/-d, or pipe `start stop` lines with -T"))]
    MissingTimeWindow,

    #[error("could not run remote command on {server}: {message}")]
    RemoteExec { server: String, message: String },

    #[error("data-find lookup failed: {0}")]
    DataFind(String),

    #[error("targeted search failed: {0}")]
    TargetedSearch(String),

    #[error("{0}")]
    MalformedName(String),

    #[error("{0}")]
    Transfer(String),

    #[error("{0}")]
    RemoteChecksum(String),

    #[error("{0}")]
    LocalChecksum(String),

    #[error("channel fetch failed: {0}")]
    ChannelFetch(String),

    #[error("failed to parse time series: {0}")]
    SeriesParse(String),

    #[error("incompatible time series: {0}")]
    SeriesMismatch(String),

    #[error("unsupported output extension: {0}")]
    UnsupportedExtension(String),

    #[error("this query seems to have failed downloading: {0}")]
    ChunkFailed(String),

    #[error(
        "aborting concatenation; neither an error marker nor a saved time series was found for: {0}"
    )]
    NeverAttempted(String),

    #[error("could not start worker pool: {0}")]
    WorkerPool(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}

impl GwError {
    /// Errors that only concern the query that raised them; a fetch pass
    /// logs these and moves on to the next query.
    pub fn is_query_local(&self) -> bool {
        matches!(self, GwError::MalformedName(_))
    }
}
