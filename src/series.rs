use std::fmt::Write as _;
use std::fs;

use camino::Utf8Path;

use crate::error::GwError;

/// Value written over samples no chunk could provide.
pub const DEFAULT_PAD: f64 = -1.0;

/// Evenly sampled data starting at `t0` (GPS seconds) with spacing `dt`.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeries {
    pub t0: f64,
    pub dt: f64,
    pub values: Vec<f64>,
}

impl TimeSeries {
    pub fn new(t0: f64, dt: f64, values: Vec<f64>) -> Self {
        Self { t0, dt, values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// GPS time just past the last sample.
    pub fn end(&self) -> f64 {
        self.t0 + self.dt * self.values.len() as f64
    }

    /// Append `other`, filling any gap between the two with `pad`. Samples
    /// of `other` that overlap data already held are dropped.
    pub fn append_padded(&mut self, other: &TimeSeries, pad: f64) -> Result<(), GwError> {
        if other.is_empty() {
            return Ok(());
        }
        if (other.dt - self.dt).abs() > self.dt * 1e-9 {
            return Err(GwError::SeriesMismatch(format!(
                "sample spacing {} does not match {}",
                other.dt, self.dt
            )));
        }
        let offset = ((other.t0 - self.end()) / self.dt).round() as i64;
        if offset >= 0 {
            self.values
                .extend(std::iter::repeat_n(pad, offset as usize));
            self.values.extend_from_slice(&other.values);
        } else {
            let skip = offset.unsigned_abs() as usize;
            if skip < other.values.len() {
                self.values.extend_from_slice(&other.values[skip..]);
            }
        }
        Ok(())
    }

    pub fn times(&self) -> impl Iterator<Item = f64> + '_ {
        (0..self.values.len()).map(move |index| self.t0 + self.dt * index as f64)
    }
}

/// Two-column `time value` text, whitespace separated for `txt` and comma
/// separated for `csv`. A leading `# dt=` comment records the sample
/// spacing so single-sample files read back exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeriesFormat {
    Txt,
    Csv,
}

impl SeriesFormat {
    pub fn from_extension(ext: &str) -> Result<Self, GwError> {
        match ext {
            "txt" => Ok(SeriesFormat::Txt),
            "csv" => Ok(SeriesFormat::Csv),
            other => Err(GwError::UnsupportedExtension(other.to_string())),
        }
    }

    pub fn from_path(path: &Utf8Path) -> Result<Self, GwError> {
        Self::from_extension(path.extension().unwrap_or(""))
    }

    fn separator(self) -> &'static str {
        match self {
            SeriesFormat::Txt => " ",
            SeriesFormat::Csv => ",",
        }
    }

    pub fn encode(self, series: &TimeSeries) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "# dt={}", series.dt);
        for (time, value) in series.times().zip(&series.values) {
            let _ = writeln!(out, "{time}{}{value}", self.separator());
        }
        out
    }

    pub fn decode(self, text: &str) -> Result<TimeSeries, GwError> {
        let mut dt = None;
        let mut times = Vec::new();
        let mut values = Vec::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if let Some(comment) = line.strip_prefix('#') {
                if let Some(value) = comment.trim().strip_prefix("dt=") {
                    dt = Some(parse_number(value)?);
                }
                continue;
            }
            let mut fields = match self {
                SeriesFormat::Txt => line.split_whitespace().collect::<Vec<_>>(),
                SeriesFormat::Csv => line.split(',').map(str::trim).collect::<Vec<_>>(),
            }
            .into_iter();
            let (Some(time), Some(value), None) = (fields.next(), fields.next(), fields.next())
            else {
                return Err(GwError::SeriesParse(format!("expected two columns: {line}")));
            };
            times.push(parse_number(time)?);
            values.push(parse_number(value)?);
        }
        let t0 = *times
            .first()
            .ok_or_else(|| GwError::SeriesParse("no samples".to_string()))?;
        if let Some(pair) = times.windows(2).find(|pair| pair[1] <= pair[0]) {
            return Err(GwError::SeriesParse(format!(
                "sample times not increasing: {} then {}",
                pair[0], pair[1]
            )));
        }
        let dt = match dt {
            Some(dt) => dt,
            None => times
                .windows(2)
                .map(|pair| pair[1] - pair[0])
                .reduce(f64::min)
                .unwrap_or(1.0),
        };
        if dt <= 0.0 {
            return Err(GwError::SeriesParse(format!("non-positive sample spacing {dt}")));
        }
        place_on_grid(t0, dt, &times, &values)
    }

    pub fn read(path: &Utf8Path) -> Result<TimeSeries, GwError> {
        let format = Self::from_path(path)?;
        let text = fs::read_to_string(path.as_std_path())
            .map_err(|err| GwError::Filesystem(format!("read {path}: {err}")))?;
        format.decode(&text)
    }

    pub fn write(path: &Utf8Path, series: &TimeSeries) -> Result<(), GwError> {
        let format = Self::from_path(path)?;
        crate::store::Store::write_text_atomic(path, &format.encode(series))
    }
}

/// Lay samples on the `t0 + i * dt` grid, padding rows the file skipped.
fn place_on_grid(
    t0: f64,
    dt: f64,
    times: &[f64],
    values: &[f64],
) -> Result<TimeSeries, GwError> {
    let tolerance = dt * 1e-6;
    let mut grid = Vec::with_capacity(values.len());
    for (&time, &value) in times.iter().zip(values) {
        let slot = ((time - t0) / dt).round();
        if (t0 + slot * dt - time).abs() > tolerance {
            return Err(GwError::SeriesParse(format!(
                "sample time {time} is off the {dt} s grid starting at {t0}"
            )));
        }
        let slot = slot as usize;
        if slot > grid.len() {
            grid.resize(slot, DEFAULT_PAD);
        }
        grid.push(value);
    }
    Ok(TimeSeries::new(t0, dt, grid))
}

fn parse_number(text: &str) -> Result<f64, GwError> {
    text.trim()
        .parse::<f64>()
        .map_err(|_| GwError::SeriesParse(format!("not a number: {text}")))
}
