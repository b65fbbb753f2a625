//! Frame queries and the names derived from them.
//!
//! A query's *estimated* identity assumes every remote frame file lasts
//! `frame_length` seconds. The *actual* identity is rebuilt from the
//! basename the remote lookup returned, whose start and duration may differ.

use std::io::BufRead;
use std::sync::OnceLock;

use camino::{Utf8Path, Utf8PathBuf};
use regex::Regex;
use serde::Serialize;

use crate::error::GwError;
use crate::store::RiderPaths;

pub const DEFAULT_FRAME_LENGTH: i64 = 64;
pub const DEFAULT_SERVER: &str = "ldas-pcdev2.ligo.caltech.edu";
pub const FRAME_EXTENSION: &str = "gwf";
const FILE_URL_PREFIX: &str = "file://localhost";

fn frame_name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[^-]+-[^-]+-(\d+)-(\d+)(?:\.|$)").expect("frame name pattern is valid")
    })
}

pub fn frame_filename(detector: &str, frametype: &str, start: i64, duration: i64) -> String {
    format!("{detector}-{frametype}-{start}-{duration}.{FRAME_EXTENSION}")
}

/// A remote frame file as reported by a lookup, e.g.
/// `file://localhost/hdfs/frames/O2/hoft_C02/H1/H-H1_HOFT_C02-11869/H-H1_HOFT_C02-1186959360-4096.gwf`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFileInfo {
    locator: String,
}

impl RemoteFileInfo {
    pub fn new(locator: &str) -> Self {
        Self {
            locator: locator.trim().to_string(),
        }
    }

    pub fn locator(&self) -> &str {
        &self.locator
    }

    /// Path on the remote server, without the `file://localhost` prefix.
    pub fn fullpath(&self) -> &str {
        self.locator
            .strip_prefix(FILE_URL_PREFIX)
            .unwrap_or(&self.locator)
    }

    pub fn filename(&self) -> &str {
        let path = self.fullpath();
        path.rsplit('/').next().unwrap_or(path)
    }

    /// `(gps start, duration)` parsed positionally from the basename.
    pub fn span(&self) -> Result<(i64, i64), GwError> {
        let malformed = || {
            GwError::MalformedName(format!(
                "Cannot get GPS start time from filename: {}",
                self.filename()
            ))
        };
        let captures = frame_name_regex()
            .captures(self.filename())
            .ok_or_else(malformed)?;
        let start = captures[1].parse::<i64>().map_err(|_| malformed())?;
        let duration = captures[2].parse::<i64>().map_err(|_| malformed())?;
        Ok((start, duration))
    }

    pub fn gps_start_time(&self) -> Result<i64, GwError> {
        self.span().map(|(start, _)| start)
    }

    pub fn frame_duration(&self) -> Result<i64, GwError> {
        self.span().map(|(_, duration)| duration)
    }
}

/// One frame file to fetch: detector, frame type, start time and where it
/// comes from and goes to. Never mutated after construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct FrameQuery {
    pub detector: String,
    pub frametype: String,
    pub gpstime: i64,
    pub frame_length: i64,
    pub server: String,
    pub outdir: Utf8PathBuf,
}

impl FrameQuery {
    pub fn new(
        detector: impl Into<String>,
        frametype: impl Into<String>,
        gpstime: i64,
        frame_length: i64,
        server: impl Into<String>,
        outdir: impl Into<Utf8PathBuf>,
    ) -> Self {
        Self {
            detector: detector.into(),
            frametype: frametype.into(),
            gpstime,
            frame_length,
            server: server.into(),
            outdir: outdir.into(),
        }
    }

    /// Stable textual form, persisted in the `query_repr` rider.
    pub fn repr(&self) -> String {
        format!(
            "FrameQuery(detector={:?}, frametype={:?}, gpstime={}, frame_length={}, server={:?}, outdir={:?})",
            self.detector,
            self.frametype,
            self.gpstime,
            self.frame_length,
            self.server,
            self.outdir.as_str()
        )
    }

    pub fn estimated_filename(&self) -> String {
        frame_filename(&self.detector, &self.frametype, self.gpstime, self.frame_length)
    }

    pub fn estimated_fullpath(&self) -> Utf8PathBuf {
        self.outdir.join(self.estimated_filename())
    }

    pub fn estimated_fullpath_exists(&self) -> bool {
        self.estimated_fullpath().as_std_path().is_file()
    }

    pub fn estimated_riders(&self) -> RiderPaths {
        RiderPaths::for_file(&self.outdir, &self.estimated_filename())
    }

    pub fn local_filename_from_remote(&self, locator: &str) -> Result<String, GwError> {
        let (start, duration) = RemoteFileInfo::new(locator).span()?;
        Ok(frame_filename(&self.detector, &self.frametype, start, duration))
    }

    pub fn local_fullpath_from_remote(&self, locator: &str) -> Result<Utf8PathBuf, GwError> {
        Ok(self.outdir.join(self.local_filename_from_remote(locator)?))
    }

    pub fn riders_from_remote(&self, locator: &str) -> Result<RiderPaths, GwError> {
        Ok(RiderPaths::for_file(
            &self.outdir,
            &self.local_filename_from_remote(locator)?,
        ))
    }
}

impl std::fmt::Display for FrameQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.repr())
    }
}

/// Frame start times covering `[start, start + deltat]`: `start` is rounded
/// down to a multiple of `frame_length` and the frame holding the end of the
/// window is included.
pub fn frame_times(start: i64, deltat: i64, frame_length: i64) -> Vec<i64> {
    if frame_length <= 0 || deltat < 0 {
        return Vec::new();
    }
    let first = start.div_euclid(frame_length) * frame_length;
    let last = (start + deltat).div_euclid(frame_length) * frame_length;
    (0..)
        .map(|index| first + index * frame_length)
        .take_while(|time| *time <= last)
        .collect()
}

/// Frame types requested for each detector.
#[derive(Debug, Clone, Default)]
pub struct FrameTypes {
    pub hanford: Vec<String>,
    pub livingston: Vec<String>,
    pub virgo: Vec<String>,
}

impl FrameTypes {
    fn by_detector(&self) -> [(&'static str, &[String]); 3] {
        [
            ("H", self.hanford.as_slice()),
            ("L", self.livingston.as_slice()),
            ("V", self.virgo.as_slice()),
        ]
    }
}

#[derive(Debug, Clone)]
pub struct FrameWindow {
    pub start: i64,
    pub deltat: i64,
}

/// Every query for every detector/frame type combination within `window`.
pub fn build_queries(
    window: &FrameWindow,
    frame_length: i64,
    server: &str,
    outdir: &Utf8Path,
    frametypes: &FrameTypes,
) -> Vec<FrameQuery> {
    let times = frame_times(window.start, window.deltat, frame_length);
    let mut queries = Vec::new();
    for (detector, types) in frametypes.by_detector() {
        for frametype in types {
            queries.extend(times.iter().map(|&time| {
                FrameQuery::new(detector, frametype.as_str(), time, frame_length, server, outdir)
            }));
        }
    }
    queries
}

/// Read `start stop` pairs, one per line, as `(start, stop - start)` windows.
pub fn read_windows(reader: impl BufRead) -> Result<Vec<FrameWindow>, GwError> {
    let mut windows = Vec::new();
    for line in reader.lines() {
        let line = line.map_err(|err| GwError::Filesystem(err.to_string()))?;
        let fields = line.split_whitespace().collect::<Vec<_>>();
        if fields.is_empty() {
            continue;
        }
        let &[start, stop] = fields.as_slice() else {
            return Err(GwError::InvalidTime(format!(
                "expected `start stop`, got: {line}"
            )));
        };
        let start = start
            .parse::<i64>()
            .map_err(|_| GwError::InvalidTime(start.to_string()))?;
        let stop = stop
            .parse::<i64>()
            .map_err(|_| GwError::InvalidTime(stop.to_string()))?;
        windows.push(FrameWindow {
            start,
            deltat: stop - start,
        });
    }
    Ok(windows)
}
