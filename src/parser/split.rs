//! Splits an `ldms_ls -l` report into per-dataset blocks.
//!
//! A dataset starts with a header line such as
//! `netmon_instance/eth2: consistent, last update: Mon Oct 14 ...`
//! at column 0. Everything up to the next header belongs to that dataset.

/// Identity line of one dataset as reported by the daemon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetHeader {
    /// Daemon-internal dataset name, e.g. `netmon_instance/eth2` or
    /// `node1/meminfo:1234`.
    pub path: String,
    /// `false` when the daemon flagged the snapshot as inconsistent.
    pub consistent: bool,
}

/// One dataset's slice of the raw report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetBlock<'a> {
    pub header: DatasetHeader,
    /// The header line itself, without its line terminator.
    pub header_line: &'a str,
    /// Text between the end of the header line and the next header.
    pub body: &'a str,
}

/// Parses a single line as a dataset header.
///
/// Returns `None` for anything that is not `<path>: <consistent|inconsistent>...`
/// starting at column 0.
pub fn parse_header(line: &str) -> Option<DatasetHeader> {
    let line = line.strip_suffix('\r').unwrap_or(line);
    if line.is_empty() || line.starts_with(char::is_whitespace) {
        return None;
    }

    for (pos, _) in line.match_indices(':') {
        let path = &line[..pos];
        if path.is_empty() || path.contains(char::is_whitespace) {
            return None;
        }

        let rest = &line[pos + 1..];
        if !rest.starts_with([' ', '\t']) {
            // Part of the path, e.g. the `:1234` secondary id.
            continue;
        }

        let flag = rest.trim_start_matches([' ', '\t']);
        let (consistent, tail) = if let Some(tail) = flag.strip_prefix("inconsistent") {
            (false, tail)
        } else if let Some(tail) = flag.strip_prefix("consistent") {
            (true, tail)
        } else {
            return None;
        };

        if tail.starts_with(|c: char| c.is_alphanumeric() || c == '_') {
            return None;
        }

        return Some(DatasetHeader {
            path: path.to_string(),
            consistent,
        });
    }

    None
}

#[derive(Debug, Clone)]
struct HeaderMatch {
    start: usize,
    end: usize,
    header: DatasetHeader,
}

/// Finds the first header line at or after byte offset `from`, which must
/// be the start of a line.
fn find_header(text: &str, from: usize) -> Option<HeaderMatch> {
    let mut offset = from;
    for line in text[from..].split_inclusive('\n') {
        let content = line.strip_suffix('\n').unwrap_or(line);
        let content = content.strip_suffix('\r').unwrap_or(content);
        if let Some(header) = parse_header(content) {
            return Some(HeaderMatch {
                start: offset,
                end: offset + content.len(),
                header,
            });
        }
        offset += line.len();
    }
    None
}

/// Offset of the line following the one containing `pos`.
fn next_line_start(text: &str, pos: usize) -> usize {
    text[pos..]
        .find('\n')
        .map(|i| pos + i + 1)
        .unwrap_or(text.len())
}

/// Lazy iterator over the dataset blocks of one report.
#[derive(Debug, Clone)]
pub struct Blocks<'a> {
    text: &'a str,
    preamble_end: usize,
    pending: Option<HeaderMatch>,
}

impl<'a> Blocks<'a> {
    /// Text before the first header (usually empty).
    pub fn preamble(&self) -> &'a str {
        &self.text[..self.preamble_end]
    }
}

impl<'a> Iterator for Blocks<'a> {
    type Item = DatasetBlock<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.pending.take()?;
        let following = find_header(self.text, next_line_start(self.text, current.end));
        let body_end = following.as_ref().map_or(self.text.len(), |h| h.start);
        self.pending = following;

        Some(DatasetBlock {
            header: current.header,
            header_line: &self.text[current.start..current.end],
            body: &self.text[current.end..body_end],
        })
    }
}

/// Splits a raw report into dataset blocks, in the order they appear.
pub fn split_blocks(text: &str) -> Blocks<'_> {
    let pending = find_header(text, 0);
    let preamble_end = pending.as_ref().map_or(text.len(), |h| h.start);
    Blocks {
        text,
        preamble_end,
        pending,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPORT: &str = "\
netmon_instance/eth2: consistent, last update: Mon Oct 14 10:00:00 2024 [1234us]
  M char[]     device           \"eth2\"
  D u64        rx_bytes         123
memmon_instance: inconsistent, last update: Mon Oct 14 10:00:00 2024 [88us]
  D u64        MemFree          1024
diskmon_instance/sda:17: consistent, last update: Mon Oct 14 10:00:00 2024
  D f32        reads_comp.rate#sda 0.000000
";

    #[test]
    fn test_parse_header() {
        let h = parse_header("netmon_instance/eth2: consistent, last update: x").unwrap();
        assert_eq!(h.path, "netmon_instance/eth2");
        assert!(h.consistent);

        let h = parse_header("memmon_instance: inconsistent, last update: x").unwrap();
        assert_eq!(h.path, "memmon_instance");
        assert!(!h.consistent);

        let h = parse_header("weirdplugin_instance/x:123: consistent, last update: x").unwrap();
        assert_eq!(h.path, "weirdplugin_instance/x:123");

        let h = parse_header("loadavg_instance:\tconsistent").unwrap();
        assert_eq!(h.path, "loadavg_instance");
    }

    #[test]
    fn test_parse_header_rejects_non_headers() {
        assert!(parse_header("  netmon_instance: consistent, x").is_none());
        assert!(parse_header("\tnetmon_instance: consistent, x").is_none());
        assert!(parse_header("netmon_instance: consistently, x").is_none());
        assert!(parse_header("netmon_instance: something else").is_none());
        assert!(parse_header("net mon: consistent, x").is_none());
        assert!(parse_header(": consistent, x").is_none());
        assert!(parse_header("netmon_instance:consistent").is_none());
        assert!(parse_header("  D u64 rx_bytes 123").is_none());
        assert!(parse_header("").is_none());
    }

    #[test]
    fn test_no_headers_no_blocks() {
        assert_eq!(split_blocks("").count(), 0);
        assert_eq!(split_blocks("ldms_ls: connection refused\n").count(), 0);
        assert_eq!(split_blocks("  indented: consistent, x\n").count(), 0);
    }

    #[test]
    fn test_split_blocks() {
        let blocks: Vec<_> = split_blocks(REPORT).collect();
        assert_eq!(blocks.len(), 3);

        assert_eq!(blocks[0].header.path, "netmon_instance/eth2");
        assert!(blocks[0].body.contains("rx_bytes"));
        assert!(!blocks[0].body.contains("MemFree"));

        assert_eq!(blocks[1].header.path, "memmon_instance");
        assert!(!blocks[1].header.consistent);
        assert_eq!(blocks[1].body.lines().count(), 1);

        assert_eq!(blocks[2].header.path, "diskmon_instance/sda:17");
        assert!(blocks[2].body.ends_with("0.000000\n"));
    }

    #[test]
    fn test_blocks_reconstruct_input() {
        let inputs = [
            REPORT,
            "preamble line\nmemmon_instance: consistent, x\n D u64 a 1",
            "a: consistent\nb: consistent\n",
            "a: consistent\r\n D u64 x 1\r\nb: inconsistent\r\n",
        ];

        for input in inputs {
            let blocks = split_blocks(input);
            let mut rebuilt = blocks.preamble().to_string();
            for block in blocks {
                rebuilt.push_str(block.header_line);
                rebuilt.push_str(block.body);
            }
            assert_eq!(rebuilt, input);
        }
    }

    #[test]
    fn test_header_count_matches_blocks() {
        let text = "a: consistent, x\nb: consistent, x\n  c: consistent, x\nd: inconsistent\n";
        let paths: Vec<_> = split_blocks(text).map(|b| b.header.path).collect();
        assert_eq!(paths, vec!["a", "b", "d"]);
    }
}
