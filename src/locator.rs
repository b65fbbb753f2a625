use tracing::{debug, info, warn};

use crate::config::SearchTable;
use crate::error::GwError;
use crate::frame::FrameQuery;
use crate::remote::{RemoteShell, shell_quote};

pub const DEFAULT_DATAFIND_PROGRAM: &str = "gw_data_find";
const FILE_URL_PREFIX: &str = "file://localhost";

/// Finds the remote path of a query's frame file.
pub struct Locator<'a, R: RemoteShell> {
    remote: &'a R,
    table: &'a SearchTable,
    datafind_program: String,
}

impl<'a, R: RemoteShell> Locator<'a, R> {
    pub fn new(remote: &'a R, table: &'a SearchTable) -> Self {
        Self {
            remote,
            table,
            datafind_program: DEFAULT_DATAFIND_PROGRAM.to_string(),
        }
    }

    pub fn with_datafind_program(mut self, program: impl Into<String>) -> Self {
        self.datafind_program = program.into();
        self
    }

    /// Remote path for `query`, or an empty string when neither the
    /// data-find service nor the targeted search knows the file.
    pub fn locate(&self, query: &FrameQuery) -> Result<String, GwError> {
        match self.datafind(query) {
            Ok(path) if !path.is_empty() => return Ok(path),
            Ok(_) => info!(%query, "not found using data-find; trying targeted search"),
            Err(err @ GwError::DataFind(_)) => {
                warn!(%query, error = %err, "data-find failed; trying targeted search")
            }
            Err(err) => return Err(err),
        }
        match self.targeted_search(query) {
            Ok(path) => {
                info!(%query, path, "targeted search found file");
                Ok(path)
            }
            Err(err @ GwError::TargetedSearch(_)) => {
                warn!(%query, error = %err, "targeted search failed; returning empty locator");
                Ok(String::new())
            }
            Err(err) => Err(err),
        }
    }

    pub fn datafind_command(&self, query: &FrameQuery) -> String {
        format!(
            "{} --observatory {} --type {} --gps-start-time {} --gps-end-time {} --url-type file",
            self.datafind_program,
            shell_quote(&query.detector),
            shell_quote(&query.frametype),
            query.gpstime,
            query.gpstime
        )
    }

    fn datafind(&self, query: &FrameQuery) -> Result<String, GwError> {
        let command = self.datafind_command(query);
        debug!(server = %query.server, command, "running data-find");
        let output = self.remote.execute(&query.server, &command)?;
        if !output.success {
            return Err(GwError::DataFind(format!(
                "Something went wrong: {}",
                output.stderr.trim()
            )));
        }
        Ok(first_line(&output.stdout).replace(FILE_URL_PREFIX, ""))
    }

    /// Look for the estimated filename in the directory registered for the
    /// query's epoch, frame type and server.
    pub fn targeted_search(&self, query: &FrameQuery) -> Result<String, GwError> {
        let epoch = self
            .table
            .epoch_for(query.gpstime)
            .ok_or_else(|| GwError::TargetedSearch("Cannot determine run.".to_string()))?;
        let directory = self
            .table
            .directory(epoch, &query.frametype, &query.server)
            .ok_or_else(|| GwError::TargetedSearch("No search target dir defined.".to_string()))?;
        let command = format!(
            "find {} -name {}",
            shell_quote(directory),
            shell_quote(&query.estimated_filename())
        );
        let output = self.remote.execute(&query.server, &command)?;
        if !output.success {
            return Err(GwError::TargetedSearch(format!(
                "Something went wrong: {}",
                output.stderr.trim()
            )));
        }
        let found = first_line(&output.stdout);
        if found.is_empty() {
            return Err(GwError::TargetedSearch("No remote file found.".to_string()));
        }
        Ok(found.to_string())
    }
}

fn first_line(text: &str) -> &str {
    text.lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("")
}
