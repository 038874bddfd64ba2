//! Parsers for `KEY=VALUE` style command-line arguments.

use std::path::PathBuf;

/// Splits `key=value`, trimming both sides. Both parts must be non-empty.
pub fn parse_assignment(input: &str) -> Result<(String, String), String> {
    let (key, value) = input
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", input))?;
    let (key, value) = (key.trim(), value.trim());
    if key.is_empty() || value.is_empty() {
        return Err(format!("expected KEY=VALUE, got '{}'", input));
    }
    Ok((key.to_string(), value.to_string()))
}

/// `plugin=path` for `--outfile`.
pub fn parse_outfile(input: &str) -> Result<(String, PathBuf), String> {
    parse_assignment(input).map(|(plugin, path)| (plugin, PathBuf::from(path)))
}

/// `instance=plugin` for `--plugin`. The plugin key must be usable as a
/// file name component.
pub fn parse_plugin_mapping(input: &str) -> Result<(String, String), String> {
    let (instance, plugin) = parse_assignment(input)?;
    if plugin.contains(['/', '\\']) {
        return Err(format!("plugin key '{}' must not contain path separators", plugin));
    }
    Ok((instance, plugin))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_assignment() {
        assert_eq!(
            parse_assignment("meminfo=/data/mem.csv"),
            Ok(("meminfo".to_string(), "/data/mem.csv".to_string()))
        );
        assert_eq!(
            parse_assignment(" a = b=c "),
            Ok(("a".to_string(), "b=c".to_string()))
        );
        assert!(parse_assignment("meminfo").is_err());
        assert!(parse_assignment("=x").is_err());
        assert!(parse_assignment("x=").is_err());
    }

    #[test]
    fn test_parse_outfile() {
        let (plugin, path) = parse_outfile("vmstat=out/vm.csv").unwrap();
        assert_eq!(plugin, "vmstat");
        assert_eq!(path, PathBuf::from("out/vm.csv"));
    }

    #[test]
    fn test_parse_plugin_mapping() {
        assert_eq!(
            parse_plugin_mapping("node1=meminfo"),
            Ok(("node1".to_string(), "meminfo".to_string()))
        );
        assert!(parse_plugin_mapping("node1=../etc").is_err());
    }
}
