//! Dataset identity: display identity (instance, sub-label) and routing
//! key (plugin) derived from a dataset path.

use std::collections::HashMap;

/// Built-in instance name → plugin key mapping.
const DEFAULT_PLUGINS: &[(&str, &str)] = &[
    ("netmon_instance", "procnetdev"),
    ("netstat_instance", "procnetdev"),
    ("memmon_instance", "meminfo"),
    ("vmmon_instance", "vmstat"),
    ("loadavg_instance", "loadavg"),
    ("diskmon_instance", "procdiskstats"),
];

/// Resolved identity of one dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// First path segment, e.g. `netmon_instance`.
    pub instance: String,
    /// Remaining path segments joined by `/` (e.g. an interface name), or
    /// empty for single-segment paths.
    pub sub_label: String,
    /// Routing key selecting the output sink.
    pub plugin: String,
}

/// Strips the `:<id>` secondary identifier suffix, if any.
pub fn strip_suffix_id(path: &str) -> &str {
    path.split_once(':').map_or(path, |(head, _)| head)
}

/// Maps leading path segments to plugin keys.
///
/// Lookups are case-insensitive on the segment; unmapped segments route to
/// their own lower-cased name so every dataset lands somewhere.
#[derive(Debug, Clone)]
pub struct PluginTable {
    entries: HashMap<String, String>,
}

impl Default for PluginTable {
    fn default() -> Self {
        let entries = DEFAULT_PLUGINS
            .iter()
            .map(|(instance, plugin)| (instance.to_string(), plugin.to_string()))
            .collect();
        Self { entries }
    }
}

impl PluginTable {
    /// A table with no mappings at all: every dataset falls back to its
    /// lower-cased leading segment.
    pub fn empty() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Adds or replaces a mapping. The instance name is matched
    /// case-insensitively.
    pub fn insert(&mut self, instance: &str, plugin: impl Into<String>) {
        self.entries.insert(instance.to_lowercase(), plugin.into());
    }

    pub fn with(mut self, instance: &str, plugin: impl Into<String>) -> Self {
        self.insert(instance, plugin);
        self
    }

    /// Plugin key for a dataset path.
    pub fn plugin_for(&self, path: &str) -> String {
        let base = strip_suffix_id(path)
            .split('/')
            .next()
            .unwrap_or_default()
            .to_lowercase();
        match self.entries.get(&base) {
            Some(plugin) => plugin.clone(),
            None => base,
        }
    }

    /// Full identity for a dataset path.
    pub fn resolve(&self, path: &str) -> Identity {
        let path_only = strip_suffix_id(path);
        let (instance, sub_label) = match path_only.split_once('/') {
            Some((instance, rest)) => (instance, rest),
            None => (path_only, ""),
        };

        Identity {
            instance: instance.to_string(),
            sub_label: sub_label.to_string(),
            plugin: self.plugin_for(path),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_network_interface() {
        let id = PluginTable::default().resolve("netmon_instance/eth2");
        assert_eq!(id.instance, "netmon_instance");
        assert_eq!(id.sub_label, "eth2");
        assert_eq!(id.plugin, "procnetdev");
    }

    #[test]
    fn test_resolve_single_segment() {
        let id = PluginTable::default().resolve("memmon_instance");
        assert_eq!(id.instance, "memmon_instance");
        assert_eq!(id.sub_label, "");
        assert_eq!(id.plugin, "meminfo");
    }

    #[test]
    fn test_resolve_fallback_and_suffix() {
        let id = PluginTable::default().resolve("weirdplugin_instance/x:123");
        assert_eq!(id.instance, "weirdplugin_instance");
        assert_eq!(id.sub_label, "x");
        assert_eq!(id.plugin, "weirdplugin_instance");
    }

    #[test]
    fn test_resolve_deep_path() {
        let id = PluginTable::default().resolve("node1/diskmon/sda/part1");
        assert_eq!(id.instance, "node1");
        assert_eq!(id.sub_label, "diskmon/sda/part1");
        assert_eq!(id.plugin, "node1");
    }

    #[test]
    fn test_plugin_lookup_is_case_insensitive() {
        let table = PluginTable::default();
        assert_eq!(table.plugin_for("NetStat_Instance/eth0"), "procnetdev");
        assert_eq!(table.plugin_for("VMMON_INSTANCE"), "vmstat");
        assert_eq!(table.plugin_for("LoadAvg_Instance:9"), "loadavg");
        assert_eq!(table.plugin_for("DiskMon_Instance/sda"), "procdiskstats");
        assert_eq!(table.plugin_for("Node7/meminfo"), "node7");
    }

    #[test]
    fn test_custom_mappings_override_defaults() {
        let table = PluginTable::default()
            .with("node1", "meminfo")
            .with("memmon_instance", "memory");
        assert_eq!(table.plugin_for("node1/meminfo"), "meminfo");
        assert_eq!(table.plugin_for("memmon_instance"), "memory");

        let table = PluginTable::empty();
        assert_eq!(table.plugin_for("memmon_instance"), "memmon_instance");
    }

    #[test]
    fn test_interfaces_share_plugin() {
        let table = PluginTable::default();
        let a = table.resolve("netmon_instance/eth0");
        let b = table.resolve("netmon_instance/eth1");
        assert_eq!(a.plugin, b.plugin);
        assert_ne!(a.sub_label, b.sub_label);
    }
}
