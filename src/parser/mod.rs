//! Text-to-record parsing of `ldms_ls -l` reports.
//!
//! These are pure functions over string input:
//! - `split`: report → per-dataset blocks
//! - `record`: block body → metric fields
//! - `identity`: dataset path → instance, sub-label and plugin key

pub mod identity;
pub mod record;
pub mod split;

pub use identity::{Identity, PluginTable};
pub use record::{IDENTITY_FIELDS, MetricRecord, build_record, parse_metric_line, parse_metrics};
pub use split::{Blocks, DatasetBlock, DatasetHeader, parse_header, split_blocks};

use tracing::debug;

/// One parsed dataset of a tick, owning copies of everything a sink needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dataset {
    pub header: DatasetHeader,
    pub header_line: String,
    pub body: String,
    pub identity: Identity,
    pub record: MetricRecord,
}

impl Dataset {
    /// Non-blank lines of the block body.
    pub fn body_lines(&self) -> impl Iterator<Item = &str> {
        self.body.lines().filter(|l| !l.trim().is_empty())
    }
}

/// Parses every block of a report into datasets stamped with `timestamp`.
pub fn parse_report(text: &str, plugins: &PluginTable, timestamp: &str) -> Vec<Dataset> {
    let blocks = split_blocks(text);
    if !blocks.preamble().trim().is_empty() {
        debug!("ignoring {} bytes before the first dataset header", blocks.preamble().len());
    }

    blocks
        .map(|block| {
            let identity = plugins.resolve(&block.header.path);
            let record = build_record(&block.header.path, &identity, block.body, timestamp);
            Dataset {
                header_line: block.header_line.to_string(),
                body: block.body.to_string(),
                header: block.header,
                identity,
                record,
            }
        })
        .collect()
}
