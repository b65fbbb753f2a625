use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use directories::BaseDirs;
use serde::{Deserialize, Serialize};

use crate::error::GwError;
use crate::gps::TimeSpec;
use crate::job::Job;

pub const DEFAULT_JOB_FILE: &str = "jobspec.json";
pub const SEARCH_TABLE_FILE: &str = "search-table.json";

/// A job file as written by the user.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct JobFile {
    pub start: TimeSpec,
    pub end: TimeSpec,
    pub channels: Vec<String>,
    #[serde(default, alias = "extensions")]
    pub exts: Option<Vec<String>>,
    #[serde(default)]
    pub trends: Option<Vec<String>>,
    #[serde(default)]
    pub max_chunk_length: Option<i64>,
}

pub struct JobLoader;

impl JobLoader {
    pub fn resolve(path: Option<&Utf8Path>, outdir: &Utf8Path) -> Result<Job, GwError> {
        let path = path.unwrap_or(Utf8Path::new(DEFAULT_JOB_FILE));
        let content = fs::read_to_string(path.as_std_path())
            .map_err(|_| GwError::JobRead(path.as_std_path().to_path_buf()))?;
        let file: JobFile =
            serde_json::from_str(&content).map_err(|err| GwError::JobParse(err.to_string()))?;
        Self::resolve_file(file, outdir)
    }

    pub fn resolve_file(file: JobFile, outdir: &Utf8Path) -> Result<Job, GwError> {
        Job::new(
            file.start.to_gps()?,
            file.end.to_gps()?,
            file.channels,
            file.exts.unwrap_or_else(crate::job::default_extensions),
            file.trends.unwrap_or_else(crate::job::default_trends),
            file.max_chunk_length.unwrap_or(crate::job::DEFAULT_MAX_CHUNK),
            outdir,
        )
    }
}

/// A named observing epoch covering `[start, end)` in GPS seconds.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Epoch {
    pub name: String,
    pub start: i64,
    pub end: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SearchDirectory {
    pub epoch: String,
    pub frametype: String,
    pub server: String,
    pub path: String,
}

/// Where frame files live on each server, for lookups that the data-find
/// service cannot answer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct SearchTable {
    #[serde(default)]
    pub epochs: Vec<Epoch>,
    #[serde(default)]
    pub directories: Vec<SearchDirectory>,
}

impl SearchTable {
    pub fn epoch_for(&self, gpstime: i64) -> Option<&str> {
        self.epochs
            .iter()
            .find(|epoch| epoch.start <= gpstime && gpstime < epoch.end)
            .map(|epoch| epoch.name.as_str())
    }

    pub fn directory(&self, epoch: &str, frametype: &str, server: &str) -> Option<&str> {
        self.directories
            .iter()
            .find(|dir| dir.epoch == epoch && dir.frametype == frametype && dir.server == server)
            .map(|dir| dir.path.as_str())
    }

    /// ER8, O1 and O2 with the Caltech cluster layout.
    pub fn builtin() -> Self {
        let epochs = vec![
            Epoch {
                name: "ER8".to_string(),
                start: 1_126_051_217,
                end: 1_126_627_217,
            },
            Epoch {
                name: "O1".to_string(),
                start: 1_126_627_217,
                end: 1_137_258_496,
            },
            Epoch {
                name: "O2".to_string(),
                start: 1_164_556_817,
                end: 1_187_733_618,
            },
        ];
        let frametypes = [
            ("H1_HOFT_C02", "hoft_C02/H1"),
            ("L1_HOFT_C02", "hoft_C02/L1"),
            ("H1_R", "raw/H1"),
            ("L1_R", "raw/L1"),
        ];
        let mut directories = Vec::new();
        for run in ["O1", "O2"] {
            for host in 1..=5 {
                let server = format!("ldas-pcdev{host}.ligo.caltech.edu");
                for (frametype, subdir) in frametypes {
                    directories.push(SearchDirectory {
                        epoch: run.to_string(),
                        frametype: frametype.to_string(),
                        server: server.clone(),
                        path: format!("/hdfs/frames/{run}/{subdir}"),
                    });
                }
            }
        }
        Self {
            epochs,
            directories,
        }
    }
}

pub struct SearchTableLoader;

impl SearchTableLoader {
    /// An explicit path must exist; otherwise the per-user config file is
    /// used when present, else the built-in table.
    pub fn resolve(path: Option<&Utf8Path>) -> Result<SearchTable, GwError> {
        if let Some(path) = path {
            return Self::load(path);
        }
        match Self::user_config_path() {
            Some(path) if path.as_std_path().is_file() => Self::load(&path),
            _ => Ok(SearchTable::builtin()),
        }
    }

    pub fn load(path: &Utf8Path) -> Result<SearchTable, GwError> {
        let content = fs::read_to_string(path.as_std_path())
            .map_err(|_| GwError::SearchTableRead(path.as_std_path().to_path_buf()))?;
        serde_json::from_str(&content).map_err(|err| GwError::SearchTableParse(err.to_string()))
    }

    pub fn user_config_path() -> Option<Utf8PathBuf> {
        BaseDirs::new().and_then(|dirs| {
            Utf8PathBuf::from_path_buf(dirs.config_dir().join("gwfetch").join(SEARCH_TABLE_FILE))
                .ok()
        })
    }
}
