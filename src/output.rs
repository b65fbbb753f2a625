use std::io::{self, Write};

use camino::Utf8PathBuf;
use crossterm::style::Stylize;
use serde::Serialize;

use crate::app::{DumpResult, FetchResult};
use crate::dump::ChannelProgress;
use crate::progress::FrameProgress;

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_frame_progress(result: &FrameProgress) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_channel_progress(result: &ChannelProgress) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_fetch(result: &FetchResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_dump(result: &DumpResult) -> io::Result<()> {
        Self::print_json(result)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl crate::app::ProgressSink for JsonOutput {
    fn event(&self, _event: crate::app::ProgressEvent) {}
}

/// `[ EXISTS ] -> path` or `[ MISSING ] -> path` for each final output.
pub fn render_output_listing(paths: &[Utf8PathBuf], colored: bool) -> Vec<String> {
    paths
        .iter()
        .map(|path| {
            let marker = match (path.as_std_path().is_file(), colored) {
                (true, true) => format!("[{}] ", " EXISTS ".green()),
                (true, false) => "[ EXISTS ] ".to_string(),
                (false, true) => format!("[{}]", " MISSING ".red()),
                (false, false) => "[ MISSING ]".to_string(),
            };
            format!("{marker} -> {path}")
        })
        .collect()
}
