//! Live terminal view of the latest report.

use std::io::Write;
use std::time::Duration;

use crossterm::cursor::MoveTo;
use crossterm::queue;
use crossterm::terminal::{Clear, ClearType};
use regex::Regex;

use super::{Sink, SinkError};
use crate::parser::Dataset;
use crate::pipeline::Tick;

/// Default number of body lines shown per dataset.
pub const DEFAULT_MAX_LINES: usize = 20;

/// Renders each tick as plain text: a run header, then every matching
/// dataset's header line followed by its (possibly truncated) body.
pub struct LiveView<W: Write> {
    out: W,
    upstream: String,
    interval: Duration,
    filter: Option<Regex>,
    include_inconsistent: bool,
    max_lines: Option<usize>,
    clear_screen: bool,
}

impl<W: Write> LiveView<W> {
    /// Creates a view for `upstream` (shown in the run header).
    pub fn new(out: W, upstream: impl Into<String>, interval: Duration) -> Self {
        Self {
            out,
            upstream: upstream.into(),
            interval,
            filter: None,
            include_inconsistent: true,
            max_lines: Some(DEFAULT_MAX_LINES),
            clear_screen: true,
        }
    }

    /// Only show datasets whose path matches `filter`.
    pub fn with_filter(mut self, filter: Option<Regex>) -> Self {
        self.filter = filter;
        self
    }

    pub fn include_inconsistent(mut self, include: bool) -> Self {
        self.include_inconsistent = include;
        self
    }

    /// Caps body lines per dataset; `None` shows everything.
    pub fn max_lines(mut self, max_lines: Option<usize>) -> Self {
        self.max_lines = max_lines;
        self
    }

    pub fn clear_screen(mut self, clear: bool) -> Self {
        self.clear_screen = clear;
        self
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn matches(&self, dataset: &Dataset) -> bool {
        if !dataset.header.consistent && !self.include_inconsistent {
            return false;
        }
        self.filter
            .as_ref()
            .is_none_or(|re| re.is_match(&dataset.header.path))
    }

    fn render_dataset(&mut self, dataset: &Dataset) -> std::io::Result<()> {
        writeln!(self.out, "{}", dataset.header_line)?;

        let lines: Vec<&str> = dataset.body_lines().collect();
        let shown = self.max_lines.map_or(lines.len(), |max| max.min(lines.len()));
        for line in &lines[..shown] {
            writeln!(self.out, "{}", line)?;
        }

        let hidden = lines.len() - shown;
        if hidden > 0 {
            writeln!(self.out, "  ... ({} more lines)", hidden)?;
        }
        writeln!(self.out)
    }

    /// Renders one full tick.
    pub fn render(&mut self, tick: &Tick) -> std::io::Result<()> {
        if self.clear_screen {
            queue!(self.out, Clear(ClearType::All), MoveTo(0, 0))?;
        }

        writeln!(
            self.out,
            "ldms {} | every {}s | {}",
            self.upstream,
            self.interval.as_secs_f64(),
            tick.timestamp
        )?;
        if let Some(re) = &self.filter {
            writeln!(self.out, "filter: {}", re.as_str())?;
        }
        writeln!(self.out)?;

        match &tick.report {
            Err(e) => writeln!(self.out, "[ERROR] {}", e)?,
            Ok(raw) if raw.is_empty() => writeln!(
                self.out,
                "[WARN] No output from ldms_ls (is ldmsd running & reachable?)"
            )?,
            Ok(_) if tick.datasets.is_empty() => writeln!(self.out, "(no datasets in report)")?,
            Ok(_) => {
                let mut shown = 0;
                for dataset in &tick.datasets {
                    if self.matches(dataset) {
                        self.render_dataset(dataset)?;
                        shown += 1;
                    }
                }
                if shown == 0 {
                    writeln!(
                        self.out,
                        "(none of {} datasets match)",
                        tick.datasets.len()
                    )?;
                }
            }
        }

        self.out.flush()
    }
}

impl<W: Write> Sink for LiveView<W> {
    fn name(&self) -> &str {
        "live"
    }

    fn consume(&mut self, tick: &Tick) -> Result<(), SinkError> {
        self.render(tick).map_err(SinkError::Render)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{PluginTable, parse_report};
    use crate::source::mock::ScriptedSource;
    use crate::source::ReportSource;

    const REPORT: &str = "\
netmon_instance/eth0: consistent, last update: x
  M char[] device \"eth0\"
  D u64 rx_bytes 10
  D u64 tx_bytes 11
  D u64 rx_drop 0
memmon_instance: inconsistent, last update: x
  D u64 MemFree 4096
";

    fn tick(report: &str) -> Tick {
        Tick {
            timestamp: "2024-10-14 10:00:00".to_string(),
            report: Ok(report.to_string()),
            datasets: parse_report(report, &PluginTable::default(), "2024-10-14 10:00:00"),
        }
    }

    fn view() -> LiveView<Vec<u8>> {
        LiveView::new(Vec::new(), "localhost:412", Duration::from_secs(2)).clear_screen(false)
    }

    fn render(view: LiveView<Vec<u8>>, tick: &Tick) -> String {
        let mut view = view;
        view.consume(tick).unwrap();
        String::from_utf8(view.into_inner()).unwrap()
    }

    #[test]
    fn test_renders_header_and_blocks() {
        let out = render(view(), &tick(REPORT));
        assert!(out.starts_with("ldms localhost:412 | every 2s | 2024-10-14 10:00:00\n"));
        assert!(out.contains("netmon_instance/eth0: consistent, last update: x\n"));
        assert!(out.contains("  D u64 rx_drop 0\n"));
        assert!(out.contains("memmon_instance: inconsistent"));
        assert!(!out.contains("more lines"));
    }

    #[test]
    fn test_truncates_long_blocks() {
        let out = render(view().max_lines(Some(2)), &tick(REPORT));
        assert!(out.contains("  D u64 rx_bytes 10\n"));
        assert!(!out.contains("tx_bytes"));
        assert!(out.contains("  ... (2 more lines)\n"));
    }

    #[test]
    fn test_filter_and_inconsistent() {
        let re = Regex::new("^netmon").unwrap();
        let out = render(view().with_filter(Some(re)), &tick(REPORT));
        assert!(out.contains("filter: ^netmon"));
        assert!(out.contains("netmon_instance/eth0"));
        assert!(!out.contains("memmon_instance"));

        let out = render(view().include_inconsistent(false), &tick(REPORT));
        assert!(out.contains("netmon_instance/eth0"));
        assert!(!out.contains("MemFree"));

        let re = Regex::new("nothing").unwrap();
        let out = render(view().with_filter(Some(re)), &tick(REPORT));
        assert!(out.contains("(none of 2 datasets match)"));
    }

    #[test]
    fn test_renders_fetch_errors() {
        let mut src = ScriptedSource::new();
        src.push_failure();
        let t = Tick {
            timestamp: "t".to_string(),
            report: src.fetch(),
            datasets: Vec::new(),
        };
        let out = render(view(), &t);
        assert!(out.contains("[ERROR] failed to run ldms_ls"));

        let out = render(view(), &tick(""));
        assert!(out.contains("[WARN] No output from ldms_ls"));

        let out = render(view(), &tick("Total Sets: 0\n"));
        assert!(out.contains("(no datasets in report)"));
    }

    #[test]
    fn test_clears_screen() {
        let mut v = LiveView::new(Vec::new(), "h:1", Duration::from_secs(1));
        v.render(&tick(REPORT)).unwrap();
        let out = v.into_inner();
        assert_eq!(out.first(), Some(&0x1b));
    }
}
