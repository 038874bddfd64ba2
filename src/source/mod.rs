//! Report sources: where the raw `ldms_ls` text comes from.
//!
//! The `ReportSource` trait lets the pipeline run against the real
//! `ldms_ls` binary or against a scripted in-memory source in tests.

pub mod mock;

use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, trace};

/// Default location of the `ldms_ls` binary in an OVIS install.
pub const DEFAULT_LDMS_LS: &str = "/opt/ovis/sbin/ldms_ls";

/// Default transport passed to `ldms_ls -x`.
pub const DEFAULT_TRANSPORT: &str = "sock";

/// Reasons a report could not be obtained.
#[derive(Debug)]
pub enum FetchError {
    /// The listing command could not be started.
    Launch { command: PathBuf, source: io::Error },
    /// The command exited unsuccessfully without producing a report.
    Exit { status: Option<i32>, stderr: String },
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchError::Launch { command, source } => {
                write!(f, "failed to run {}: {}", command.display(), source)
            }
            FetchError::Exit { status, stderr } => {
                match status {
                    Some(code) => write!(f, "ldms_ls exited with status {}", code)?,
                    None => write!(f, "ldms_ls terminated by signal")?,
                }
                if !stderr.is_empty() {
                    write!(f, ": {}", stderr)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for FetchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FetchError::Launch { source, .. } => Some(source),
            FetchError::Exit { .. } => None,
        }
    }
}

/// Something that can produce one raw daemon report per call.
///
/// Implementations must not panic on failure; every problem is reported
/// through `FetchError` so the poll loop can treat it as "no data".
pub trait ReportSource {
    /// Fetches one full report. An empty string means the daemon had
    /// nothing to list.
    fn fetch(&mut self) -> Result<String, FetchError>;

    /// Short human-readable description of the upstream (e.g. `host:port`).
    fn describe(&self) -> String;
}

/// Runs the external `ldms_ls` command against one daemon.
#[derive(Debug, Clone)]
pub struct LdmsLs {
    program: PathBuf,
    host: String,
    port: u16,
    transport: String,
}

impl LdmsLs {
    /// Creates a source for `host:port` using the given `ldms_ls` binary.
    pub fn new(program: impl AsRef<Path>, host: impl Into<String>, port: u16) -> Self {
        Self {
            program: program.as_ref().to_path_buf(),
            host: host.into(),
            port,
            transport: DEFAULT_TRANSPORT.to_string(),
        }
    }

    /// Overrides the transport (`-x`), e.g. `rdma` or `ugni`.
    pub fn with_transport(mut self, transport: impl Into<String>) -> Self {
        self.transport = transport.into();
        self
    }

    /// Arguments passed to `ldms_ls`, in order.
    pub fn args(&self) -> Vec<String> {
        vec![
            "-l".to_string(),
            "-x".to_string(),
            self.transport.clone(),
            "-h".to_string(),
            self.host.clone(),
            "-p".to_string(),
            self.port.to_string(),
        ]
    }
}

impl ReportSource for LdmsLs {
    fn fetch(&mut self) -> Result<String, FetchError> {
        debug!(
            "running {} {}",
            self.program.display(),
            self.args().join(" ")
        );

        let output = Command::new(&self.program)
            .args(self.args())
            .output()
            .map_err(|source| FetchError::Launch {
                command: self.program.clone(),
                source,
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let report = stdout.trim_end();

        if !output.status.success() {
            if report.is_empty() {
                return Err(FetchError::Exit {
                    status: output.status.code(),
                    stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
                });
            }
            debug!(
                "ldms_ls exited with {:?} but produced {} bytes, using them",
                output.status.code(),
                report.len()
            );
        }

        trace!("ldms_ls returned {} bytes", report.len());
        Ok(report.to_string())
    }

    fn describe(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
