use std::fs::{self, OpenOptions};
use std::io::Write;
use std::time::{Duration, SystemTime};

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;

use crate::error::GwError;

/// The five sidecar files kept next to every frame file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RiderKind {
    RemoteSha256,
    LocalSha256,
    QueryRepr,
    ErrorMsg,
    RemoteUrl,
}

impl RiderKind {
    pub const ALL: [RiderKind; 5] = [
        RiderKind::RemoteSha256,
        RiderKind::LocalSha256,
        RiderKind::QueryRepr,
        RiderKind::ErrorMsg,
        RiderKind::RemoteUrl,
    ];

    pub fn tag(self) -> &'static str {
        match self {
            RiderKind::RemoteSha256 => "remote_sha256",
            RiderKind::LocalSha256 => "local_sha256",
            RiderKind::QueryRepr => "query_repr",
            RiderKind::ErrorMsg => "error_msg",
            RiderKind::RemoteUrl => "remote_url",
        }
    }
}

/// Rider file locations derived from one resolved local frame filename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RiderPaths {
    pub remote_sha256: Utf8PathBuf,
    pub local_sha256: Utf8PathBuf,
    pub query_repr: Utf8PathBuf,
    pub error_msg: Utf8PathBuf,
    pub remote_url: Utf8PathBuf,
}

impl RiderPaths {
    pub fn for_file(outdir: &Utf8Path, filename: &str) -> Self {
        let path = |kind: RiderKind| outdir.join(format!("{filename}.{}.txt", kind.tag()));
        Self {
            remote_sha256: path(RiderKind::RemoteSha256),
            local_sha256: path(RiderKind::LocalSha256),
            query_repr: path(RiderKind::QueryRepr),
            error_msg: path(RiderKind::ErrorMsg),
            remote_url: path(RiderKind::RemoteUrl),
        }
    }

    pub fn get(&self, kind: RiderKind) -> &Utf8Path {
        match kind {
            RiderKind::RemoteSha256 => &self.remote_sha256,
            RiderKind::LocalSha256 => &self.local_sha256,
            RiderKind::QueryRepr => &self.query_repr,
            RiderKind::ErrorMsg => &self.error_msg,
            RiderKind::RemoteUrl => &self.remote_url,
        }
    }

    pub fn exists(&self, kind: RiderKind) -> bool {
        self.get(kind).as_std_path().is_file()
    }
}

/// Filesystem helpers shared by the transfer engine, the progress tracker
/// and the channel dump.
pub struct Store;

impl Store {
    pub fn ensure_dir(dir: &Utf8Path) -> Result<(), GwError> {
        fs::create_dir_all(dir.as_std_path()).map_err(|err| GwError::Filesystem(err.to_string()))
    }

    /// Replace `path` with `content` through a temp file in the same
    /// directory, so readers never observe a half-written rider.
    pub fn write_text_atomic(path: &Utf8Path, content: &str) -> Result<(), GwError> {
        let parent = path
            .parent()
            .ok_or_else(|| GwError::Filesystem(format!("invalid rider path {path}")))?;
        let parent = if parent.as_str().is_empty() {
            Utf8Path::new(".")
        } else {
            parent
        };
        Self::ensure_dir(parent)?;
        let mut temp = tempfile::Builder::new()
            .prefix(".gwfetch-rider")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| GwError::Filesystem(err.to_string()))?;
        temp.write_all(content.as_bytes())
            .map_err(|err| GwError::Filesystem(err.to_string()))?;
        temp.persist(path.as_std_path())
            .map_err(|err| GwError::Filesystem(err.to_string()))?;
        Ok(())
    }

    pub fn append_text(path: &Utf8Path, content: &str) -> Result<(), GwError> {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_str().is_empty()) {
            Self::ensure_dir(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path.as_std_path())
            .map_err(|err| GwError::Filesystem(format!("open {path}: {err}")))?;
        file.write_all(content.as_bytes())
            .map_err(|err| GwError::Filesystem(err.to_string()))
    }

    /// `None` when the file does not exist or cannot be read.
    pub fn read_text(path: &Utf8Path) -> Option<String> {
        fs::read_to_string(path.as_std_path()).ok()
    }

    pub fn is_file(path: &Utf8Path) -> bool {
        path.as_std_path().is_file()
    }

    /// Time since `path` was last modified. Modification times in the
    /// future count as zero.
    pub fn modified_age(path: &Utf8Path) -> Result<Duration, GwError> {
        let modified = fs::metadata(path.as_std_path())
            .and_then(|meta| meta.modified())
            .map_err(|err| GwError::Filesystem(format!("stat {path}: {err}")))?;
        Ok(SystemTime::now()
            .duration_since(modified)
            .unwrap_or(Duration::ZERO))
    }

    pub fn remove_file(path: &Utf8Path) -> Result<(), GwError> {
        fs::remove_file(path.as_std_path())
            .map_err(|err| GwError::Filesystem(format!("remove {path}: {err}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rider_paths_follow_tag_grammar() {
        let riders = RiderPaths::for_file(Utf8Path::new("out"), "H-H1_R-1186959360-4096.gwf");
        assert_eq!(
            riders.remote_sha256,
            Utf8PathBuf::from("out/H-H1_R-1186959360-4096.gwf.remote_sha256.txt")
        );
        assert_eq!(
            riders.get(RiderKind::ErrorMsg),
            Utf8Path::new("out/H-H1_R-1186959360-4096.gwf.error_msg.txt")
        );
    }

    #[test]
    fn append_accumulates() {
        let temp = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(temp.path().join("log.txt")).unwrap();
        Store::append_text(&path, "one\n").unwrap();
        Store::append_text(&path, "two\n").unwrap();
        assert_eq!(Store::read_text(&path).unwrap(), "one\ntwo\n");
    }

    #[test]
    fn atomic_write_replaces() {
        let temp = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(temp.path().join("x.txt")).unwrap();
        Store::write_text_atomic(&path, "a").unwrap();
        Store::write_text_atomic(&path, "b").unwrap();
        assert_eq!(Store::read_text(&path).unwrap(), "b");
    }
}
