//! Append-only CSV files, one per plugin.
//!
//! The first line of each file is the header of the committed schema. It is
//! written only when the file is created (or found empty) and never
//! rewritten afterwards; an existing header is adopted as the schema.

use std::collections::{HashMap, HashSet};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use ::csv::{ReaderBuilder, WriterBuilder};
use chrono::Utc;
use tracing::{debug, error, info};

use super::{Sink, SinkError};
use crate::parser::MetricRecord;
use crate::pipeline::Tick;
use crate::schema::{Resolution, Schema, SchemaPolicy, SchemaReconciler};

/// Default file name for a plugin's CSV file.
pub fn default_file_name(plugin: &str) -> String {
    format!("ldms_{}_full.csv", plugin)
}

/// `true` if the file exists and has at least one byte.
fn has_content(path: &Path) -> Result<bool, SinkError> {
    match fs::metadata(path) {
        Ok(meta) => Ok(meta.len() > 0),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(source) => Err(SinkError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Reads the header row of an existing non-empty CSV file.
fn read_header(path: &Path) -> Result<Option<Schema>, SinkError> {
    if !has_content(path)? {
        return Ok(None);
    }

    let csv_err = |source| SinkError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .map_err(csv_err)?;
    let header = reader.headers().map_err(csv_err)?;
    let schema = Schema::from_columns(header.iter());

    Ok((!schema.is_empty()).then_some(schema))
}

/// `true` if the file has content whose last byte is not a newline.
fn missing_final_newline(path: &Path) -> io::Result<bool> {
    let mut file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e),
    };
    if file.metadata()?.len() == 0 {
        return Ok(false);
    }

    let mut last = [0u8; 1];
    file.seek(SeekFrom::End(-1))?;
    file.read_exact(&mut last)?;
    Ok(last[0] != b'\n')
}

/// Moves a file aside as `<stem>.<unix-seconds>.<ext>`, adding a `-<n>`
/// counter to the suffix if that name is taken.
fn rotate_file(path: &Path) -> Result<Option<PathBuf>, SinkError> {
    if !has_content(path)? {
        return Ok(None);
    }

    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let rotated = |suffix: &str| {
        let mut name = format!("{}.{}", stem, suffix);
        if let Some(ext) = path.extension() {
            name.push('.');
            name.push_str(&ext.to_string_lossy());
        }
        path.with_file_name(name)
    };

    let secs = Utc::now().timestamp();
    let mut target = rotated(&secs.to_string());
    let mut n = 1;
    while target.exists() {
        target = rotated(&format!("{}-{}", secs, n));
        n += 1;
    }

    fs::rename(path, &target).map_err(|source| SinkError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(Some(target))
}

/// Appends `records` to `path`. The header is written first when `fresh`
/// is set (the schema was just established or rotated) or the file is
/// absent or empty; the file then starts over, as anything it held had no
/// readable header. The handle is closed before returning.
fn append_rows(
    path: &Path,
    schema: &Schema,
    records: &[&MetricRecord],
    fresh: bool,
) -> Result<(), SinkError> {
    let io_err = |source| SinkError::Io {
        path: path.to_path_buf(),
        source,
    };

    let write_header = fresh || !has_content(path)?;
    let unterminated = !write_header && missing_final_newline(path).map_err(io_err)?;

    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .append(!write_header)
        .truncate(write_header)
        .open(path)
        .map_err(io_err)?;
    if unterminated {
        debug!("{}: last line was not terminated", path.display());
        file.write_all(b"\n").map_err(io_err)?;
    }

    let csv_err = |source| SinkError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut writer = WriterBuilder::new().has_headers(false).from_writer(file);
    if write_header {
        writer.write_record(schema.fields()).map_err(csv_err)?;
    }
    for record in records {
        writer.write_record(schema.project(record)).map_err(csv_err)?;
    }
    writer.flush().map_err(io_err)
}

/// Writes each plugin's datasets to its own CSV file.
#[derive(Debug)]
pub struct CsvSink {
    output_dir: PathBuf,
    outfiles: HashMap<String, PathBuf>,
    reconciler: SchemaReconciler,
    include_inconsistent: bool,
    /// Destinations disabled after a write failure.
    failed: HashSet<PathBuf>,
    rows_written: u64,
}

impl CsvSink {
    /// Creates a sink writing `ldms_<plugin>_full.csv` files into
    /// `output_dir`.
    pub fn new(output_dir: impl Into<PathBuf>, policy: SchemaPolicy) -> Self {
        Self {
            output_dir: output_dir.into(),
            outfiles: HashMap::new(),
            reconciler: SchemaReconciler::new(policy),
            include_inconsistent: false,
            failed: HashSet::new(),
            rows_written: 0,
        }
    }

    /// Sends `plugin` to an explicit file instead of the default name.
    pub fn with_outfile(mut self, plugin: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.outfiles.insert(plugin.into(), path.into());
        self
    }

    /// Also record datasets the daemon flagged as inconsistent.
    pub fn include_inconsistent(mut self, include: bool) -> Self {
        self.include_inconsistent = include;
        self
    }

    pub fn path_for(&self, plugin: &str) -> PathBuf {
        self.outfiles
            .get(plugin)
            .cloned()
            .unwrap_or_else(|| self.output_dir.join(default_file_name(plugin)))
    }

    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }

    pub fn is_disabled(&self, path: &Path) -> bool {
        self.failed.contains(path)
    }

    /// Writes one plugin's batch of records.
    pub fn write_batch(&mut self, plugin: &str, records: &[&MetricRecord]) -> Result<usize, SinkError> {
        let path = self.path_for(plugin);
        let sink_id = path.to_string_lossy().into_owned();

        if self.reconciler.committed(&sink_id).is_none()
            && let Some(existing) = read_header(&path)?
        {
            info!(
                "{}: appending to existing file with {} columns",
                path.display(),
                existing.len()
            );
            self.reconciler.adopt(&sink_id, existing);
        }

        let resolution = self.reconciler.resolve(&sink_id, records.iter().copied())?;
        if let Resolution::Rotated(_) = resolution
            && let Some(old) = rotate_file(&path)?
        {
            info!("{}: schema changed, moved old file to {}", path.display(), old.display());
        }

        let fresh = !matches!(resolution, Resolution::Committed(_));
        append_rows(&path, resolution.schema(), records, fresh)?;
        self.rows_written += records.len() as u64;
        debug!("{}: appended {} rows", path.display(), records.len());
        Ok(records.len())
    }
}

impl Sink for CsvSink {
    fn name(&self) -> &str {
        "csv"
    }

    fn consume(&mut self, tick: &Tick) -> Result<(), SinkError> {
        // Group by plugin, keeping first-seen order.
        let mut batches: Vec<(&str, Vec<&MetricRecord>)> = Vec::new();
        for dataset in &tick.datasets {
            if !dataset.header.consistent && !self.include_inconsistent {
                debug!("skipping inconsistent dataset {}", dataset.header.path);
                continue;
            }
            let plugin = dataset.identity.plugin.as_str();
            match batches.iter_mut().find(|(p, _)| *p == plugin) {
                Some((_, records)) => records.push(&dataset.record),
                None => batches.push((plugin, vec![&dataset.record])),
            }
        }

        let mut first_error = None;
        for (plugin, records) in batches {
            let path = self.path_for(plugin);
            if self.failed.contains(&path) {
                debug!("{}: destination disabled, skipping {} rows", path.display(), records.len());
                continue;
            }

            if let Err(e) = self.write_batch(plugin, &records) {
                error!("{}: disabling destination for this run", path.display());
                self.failed.insert(path);
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn close(&mut self) -> Result<(), SinkError> {
        info!("csv: {} rows written", self.rows_written);
        Ok(())
    }
}
