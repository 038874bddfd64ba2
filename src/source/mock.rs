//! Scripted report source for testing the pipeline without `ldmsd`.

use std::collections::VecDeque;
use std::io;
use std::path::PathBuf;

use super::{FetchError, ReportSource};

/// One scripted outcome of a `fetch()` call.
#[derive(Debug, Clone)]
pub enum Scripted {
    Report(String),
    LaunchFailure,
}

/// Replays a fixed sequence of reports.
///
/// Once the script is exhausted the last entry is repeated, which models
/// an unchanging upstream.
#[derive(Debug, Clone, Default)]
pub struct ScriptedSource {
    script: VecDeque<Scripted>,
    last: Option<Scripted>,
    calls: usize,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// A source that always returns the same report.
    pub fn repeating(report: impl Into<String>) -> Self {
        let mut src = Self::new();
        src.push_report(report);
        src
    }

    pub fn push_report(&mut self, report: impl Into<String>) -> &mut Self {
        self.script.push_back(Scripted::Report(report.into()));
        self
    }

    pub fn push_failure(&mut self) -> &mut Self {
        self.script.push_back(Scripted::LaunchFailure);
        self
    }

    /// Number of times `fetch()` has been called.
    pub fn calls(&self) -> usize {
        self.calls
    }
}

impl ReportSource for ScriptedSource {
    fn fetch(&mut self) -> Result<String, FetchError> {
        self.calls += 1;
        if let Some(next) = self.script.pop_front() {
            self.last = Some(next);
        }
        match &self.last {
            Some(Scripted::Report(text)) => Ok(text.clone()),
            Some(Scripted::LaunchFailure) => Err(FetchError::Launch {
                command: PathBuf::from("ldms_ls"),
                source: io::Error::new(io::ErrorKind::NotFound, "scripted failure"),
            }),
            None => Ok(String::new()),
        }
    }

    fn describe(&self) -> String {
        "scripted".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repeats_last_entry() {
        let mut src = ScriptedSource::new();
        src.push_report("a").push_failure().push_report("b");

        assert_eq!(src.fetch().unwrap(), "a");
        assert!(src.fetch().is_err());
        assert_eq!(src.fetch().unwrap(), "b");
        assert_eq!(src.fetch().unwrap(), "b");
        assert_eq!(src.calls(), 4);
    }

    #[test]
    fn test_empty_script_yields_empty_report() {
        let mut src = ScriptedSource::new();
        assert_eq!(src.fetch().unwrap(), "");
    }
}
