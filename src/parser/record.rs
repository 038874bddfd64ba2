//! Metric row tokenizer and per-block record construction.
//!
//! Metric rows in `ldms_ls -l` output look like:
//!
//! ```text
//!   M char[]     device              "eth2"
//!   D u64        rx_bytes            123
//!   D f32        reads_comp.rate#sda 0.000000
//! ```
//!
//! Anything else in a block body (blank lines, arrays, comments, lines cut
//! off mid-way) is skipped.

use std::collections::BTreeMap;

use tracing::trace;

use super::identity::Identity;

pub const FIELD_TIMESTAMP: &str = "timestamp";
pub const FIELD_DATASET: &str = "dataset";
pub const FIELD_INSTANCE: &str = "instance";
pub const FIELD_IFACE: &str = "iface";

/// Identity columns, in the order they lead every schema.
pub const IDENTITY_FIELDS: [&str; 4] = [FIELD_TIMESTAMP, FIELD_DATASET, FIELD_INSTANCE, FIELD_IFACE];

/// One successfully tokenized metric line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricRow<'a> {
    /// `M` (meta) or `D` (data), when present.
    pub marker: Option<char>,
    /// Declared value type, e.g. `u64` or `char[]`.
    pub kind: &'a str,
    pub name: &'a str,
    /// Value text with the outer quotes of string values removed.
    pub value: &'a str,
}

/// Field name → value for one dataset in one tick.
///
/// Values stay textual: numbers keep the exact formatting the daemon
/// printed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricRecord {
    fields: BTreeMap<String, String>,
}

impl MetricRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }
}

fn is_type_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '#')
}

/// Splits off the next whitespace-delimited token. The token must be
/// followed by at least one whitespace character.
fn next_token(s: &str) -> Option<(&str, &str)> {
    let end = s.find(char::is_whitespace)?;
    if end == 0 {
        return None;
    }
    Some((&s[..end], s[end..].trim_start()))
}

fn valid_type(token: &str) -> bool {
    let base = token.strip_suffix("[]").unwrap_or(token);
    !base.is_empty() && base.chars().all(is_type_char)
}

fn valid_number(token: &str) -> bool {
    let digits = token.strip_prefix('-').unwrap_or(token);
    let (int, frac) = match digits.split_once('.') {
        Some((int, frac)) => (int, Some(frac)),
        None => (digits, None),
    };
    let all_digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
    all_digits(int) && frac.is_none_or(all_digits)
}

/// Tokenizes one body line as a metric row.
///
/// Returns `None` for every line that does not fully match
/// `[M|D] <type>[[]] <name> <"string"|number>`.
pub fn parse_metric_line(line: &str) -> Option<MetricRow<'_>> {
    let rest = line.trim();

    let (first, after_first) = next_token(rest)?;
    let (marker, kind, rest) = if first == "M" || first == "D" {
        let (kind, rest) = next_token(after_first)?;
        (first.chars().next(), kind, rest)
    } else {
        (None, first, after_first)
    };
    if !valid_type(kind) {
        return None;
    }

    let (name, raw_value) = next_token(rest)?;
    if !name.chars().all(is_name_char) {
        return None;
    }

    let value = if let Some(quoted) = raw_value.strip_prefix('"') {
        quoted.strip_suffix('"')?
    } else if valid_number(raw_value) {
        raw_value
    } else {
        return None;
    };

    Some(MetricRow {
        marker,
        kind,
        name,
        value,
    })
}

/// Extracts all metric fields from a block body. Later duplicates
/// overwrite earlier ones.
pub fn parse_metrics(body: &str) -> MetricRecord {
    let mut record = MetricRecord::new();
    for line in body.lines() {
        match parse_metric_line(line) {
            Some(row) => record.insert(row.name, row.value),
            None if !line.trim().is_empty() => trace!("skipping unparsed line: {:?}", line),
            None => {}
        }
    }
    record
}

/// Builds the full record for one dataset: metric fields plus the
/// identity columns. Identity columns win over same-named metrics.
pub fn build_record(
    dataset_path: &str,
    identity: &Identity,
    body: &str,
    timestamp: &str,
) -> MetricRecord {
    let mut record = parse_metrics(body);
    record.insert(FIELD_DATASET, dataset_path);
    record.insert(FIELD_INSTANCE, identity.instance.as_str());
    record.insert(FIELD_IFACE, identity.sub_label.as_str());
    record.insert(FIELD_TIMESTAMP, timestamp);
    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::identity::PluginTable;

    #[test]
    fn test_parse_metric_line() {
        let row = parse_metric_line("  D u64        rx_bytes            123").unwrap();
        assert_eq!(row.marker, Some('D'));
        assert_eq!(row.kind, "u64");
        assert_eq!(row.name, "rx_bytes");
        assert_eq!(row.value, "123");

        let row = parse_metric_line("M char[] device \"eth2\"").unwrap();
        assert_eq!(row.kind, "char[]");
        assert_eq!(row.value, "eth2");

        let row = parse_metric_line("D f32 reads_comp.rate#sda 0.000000").unwrap();
        assert_eq!(row.name, "reads_comp.rate#sda");
        assert_eq!(row.value, "0.000000");

        let row = parse_metric_line("u64 component_id -7").unwrap();
        assert_eq!(row.marker, None);
        assert_eq!(row.value, "-7");
    }

    #[test]
    fn test_quoted_values_keep_inner_text() {
        let row = parse_metric_line("M char[] label \"a \"quoted\" b\"   ").unwrap();
        assert_eq!(row.value, "a \"quoted\" b");

        let row = parse_metric_line("M char[] empty \"\"").unwrap();
        assert_eq!(row.value, "");
    }

    #[test]
    fn test_rejects_malformed_lines() {
        let bad = [
            "",
            "   ",
            "D u64 rx_bytes",
            "D u64 rx_bytes 12a",
            "D u64 rx_bytes 1.",
            "D u64 rx_bytes .5",
            "D u64 rx_bytes 1e5",
            "D u64 rx-bytes 1",
            "D u64 rx_bytes \"unterminated",
            "D u64[] values 1,2,3",
            "D u-64 rx_bytes 1",
            "netmon_instance/eth2: consistent, last update: x",
            "Total Sets: 5, Meta Data (kB): 1.2, Data (kB) 0.3, Memory (kB): 1.5",
        ];
        for line in bad {
            assert!(parse_metric_line(line).is_none(), "accepted {:?}", line);
        }
    }

    #[test]
    fn test_parse_metrics_body() {
        let record = parse_metrics("D u64 rx_bytes 123\nD char[] device \"eth2\"");
        assert_eq!(record.len(), 2);
        assert_eq!(record.get("rx_bytes"), Some("123"));
        assert_eq!(record.get("device"), Some("eth2"));
    }

    #[test]
    fn test_duplicates_last_wins() {
        let record = parse_metrics("D u64 a 1\ngarbage here\nD u64 a 2\n");
        assert_eq!(record.get("a"), Some("2"));
        assert_eq!(record.len(), 1);
    }

    #[test]
    fn test_build_record_identity_fields() {
        let table = PluginTable::default();
        let identity = table.resolve("netmon_instance/eth2");
        let record = build_record(
            "netmon_instance/eth2",
            &identity,
            "  D u64 rx_bytes 123\n  D u64 instance 9\n",
            "2024-10-14 10:00:00",
        );

        assert_eq!(record.get("timestamp"), Some("2024-10-14 10:00:00"));
        assert_eq!(record.get("dataset"), Some("netmon_instance/eth2"));
        assert_eq!(record.get("instance"), Some("netmon_instance"));
        assert_eq!(record.get("iface"), Some("eth2"));
        assert_eq!(record.get("rx_bytes"), Some("123"));
        assert_eq!(record.len(), 5);
    }
}
