//! Consumers of parsed ticks.
//!
//! - `CsvSink`: appends one row per dataset to a per-plugin CSV file
//! - `LiveView`: renders a filtered, truncated view to a terminal

mod csv;
mod live;

pub use self::csv::CsvSink;
pub use self::live::LiveView;

use std::io;
use std::path::PathBuf;

use crate::pipeline::Tick;
use crate::schema::SchemaError;

/// Errors raised while writing a tick to a sink.
#[derive(Debug)]
pub enum SinkError {
    /// Opening, renaming or writing a destination file failed.
    Io { path: PathBuf, source: io::Error },
    /// CSV encoding or header read-back failed.
    Csv { path: PathBuf, source: ::csv::Error },
    /// The batch does not fit the destination's committed schema.
    Schema(SchemaError),
    /// Writing to the terminal failed.
    Render(io::Error),
}

impl std::fmt::Display for SinkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SinkError::Io { path, source } => write!(f, "{}: {}", path.display(), source),
            SinkError::Csv { path, source } => write!(f, "{}: {}", path.display(), source),
            SinkError::Schema(e) => write!(f, "{}", e),
            SinkError::Render(e) => write!(f, "render error: {}", e),
        }
    }
}

impl std::error::Error for SinkError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SinkError::Io { source, .. } => Some(source),
            SinkError::Csv { source, .. } => Some(source),
            SinkError::Schema(e) => Some(e),
            SinkError::Render(e) => Some(e),
        }
    }
}

impl From<SchemaError> for SinkError {
    fn from(e: SchemaError) -> Self {
        SinkError::Schema(e)
    }
}

/// A destination for parsed ticks.
///
/// Sinks see every tick, including ticks whose fetch failed, and decide
/// themselves what to do with them.
pub trait Sink {
    /// Short name used in log messages.
    fn name(&self) -> &str;

    /// Handles one tick.
    fn consume(&mut self, tick: &Tick) -> Result<(), SinkError>;

    /// Releases resources at shutdown.
    fn close(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}
