//! The poll loop: fetch → split → parse → resolve → sinks, once per tick.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Local;
use tracing::{debug, error, info, warn};

use crate::parser::{Dataset, PluginTable, parse_report};
use crate::sink::{Sink, SinkError};
use crate::source::{FetchError, ReportSource};

/// Format of the `timestamp` column.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Granularity at which the interval sleep checks the shutdown flag.
const SLEEP_SLICE: Duration = Duration::from_millis(100);

/// Everything one poll produced. Sinks receive it by reference.
#[derive(Debug)]
pub struct Tick {
    /// Capture time shared by every record of this tick.
    pub timestamp: String,
    /// Raw report text, or why it could not be fetched.
    pub report: Result<String, FetchError>,
    pub datasets: Vec<Dataset>,
}

/// Counters from one tick, mostly for logging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickSummary {
    pub fetched: bool,
    pub datasets: usize,
    pub sink_errors: usize,
}

/// Describes the datasets of a tick per plugin, e.g.
/// `3 datasets (procnetdev=2, meminfo=1)`.
pub fn describe_datasets(datasets: &[Dataset]) -> String {
    let mut counts: Vec<(&str, usize)> = Vec::new();
    for dataset in datasets {
        let plugin = dataset.identity.plugin.as_str();
        match counts.iter_mut().find(|(p, _)| *p == plugin) {
            Some((_, n)) => *n += 1,
            None => counts.push((plugin, 1)),
        }
    }

    let parts: Vec<String> = counts
        .iter()
        .map(|(plugin, n)| format!("{}={}", plugin, n))
        .collect();
    format!("{} datasets ({})", datasets.len(), parts.join(", "))
}

/// One daemon, one set of sinks. Each pipeline owns its schema state
/// through its sinks, so several pipelines never interfere.
pub struct Pipeline<S: ReportSource> {
    source: S,
    plugins: PluginTable,
    sinks: Vec<Box<dyn Sink>>,
    ticks: u64,
}

impl<S: ReportSource> Pipeline<S> {
    pub fn new(source: S, plugins: PluginTable) -> Self {
        Self {
            source,
            plugins,
            sinks: Vec::new(),
            ticks: 0,
        }
    }

    pub fn with_sink(mut self, sink: Box<dyn Sink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Number of ticks run so far.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Runs one tick stamped with the current local time.
    pub fn tick(&mut self) -> TickSummary {
        let timestamp = Local::now().format(TIMESTAMP_FORMAT).to_string();
        self.tick_at(timestamp)
    }

    /// Runs one tick with an explicit timestamp.
    pub fn tick_at(&mut self, timestamp: String) -> TickSummary {
        self.ticks += 1;

        let report = self.source.fetch();
        let datasets = match &report {
            Ok(raw) if raw.is_empty() => {
                warn!("No output from ldms_ls (is ldmsd running & reachable?)");
                Vec::new()
            }
            Ok(raw) => parse_report(raw, &self.plugins, &timestamp),
            Err(e) => {
                warn!("{}: {}", self.source.describe(), e);
                Vec::new()
            }
        };

        let tick = Tick {
            timestamp,
            report,
            datasets,
        };

        if !tick.datasets.is_empty() {
            info!("Tick #{}: {}", self.ticks, describe_datasets(&tick.datasets));
        }

        let mut sink_errors = 0;
        for sink in &mut self.sinks {
            if let Err(e) = sink.consume(&tick) {
                error!("{} sink: {}", sink.name(), e);
                sink_errors += 1;
            }
        }

        TickSummary {
            fetched: tick.report.is_ok(),
            datasets: tick.datasets.len(),
            sink_errors,
        }
    }

    /// Ticks every `interval` until `running` is cleared.
    ///
    /// The flag is checked between ticks and during the sleep, so an
    /// interrupt never cuts a tick short.
    pub fn run(&mut self, interval: Duration, running: &AtomicBool) {
        info!(
            "Polling {} every {}s",
            self.source.describe(),
            interval.as_secs_f64()
        );

        while running.load(Ordering::SeqCst) {
            self.tick();

            let mut remaining = interval;
            while remaining > Duration::ZERO && running.load(Ordering::SeqCst) {
                let slice = remaining.min(SLEEP_SLICE);
                std::thread::sleep(slice);
                remaining = remaining.saturating_sub(slice);
            }
        }

        debug!("poll loop exited after {} ticks", self.ticks);
    }

    /// Closes every sink, returning the first error.
    pub fn shutdown(&mut self) -> Result<(), SinkError> {
        let mut first_error = None;
        for sink in &mut self.sinks {
            if let Err(e) = sink.close() {
                error!("{} sink: close failed: {}", sink.name(), e);
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
