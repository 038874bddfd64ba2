//! ldmspoll - LDMS multi-plugin CSV recorder.
//!
//! Polls `ldms_ls` at a fixed interval, splits the report into datasets and
//! appends each dataset as a row to its plugin's CSV file
//! (procnetdev, meminfo, vmstat, loadavg, procdiskstats, ...).
//!
//! Usage:
//!   ldmspoll                           # localhost:412 every 2s into /data
//!   ldmspoll -i 10 -o ./csv            # custom interval and directory
//!   ldmspoll --outfile meminfo=mem.csv # explicit file for one plugin
//!   ldmspoll --echo                    # also print each report

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use clap::Parser;
use tracing::{Level, info, warn};

use ldmspoll::parser::PluginTable;
use ldmspoll::pipeline::Pipeline;
use ldmspoll::schema::SchemaPolicy;
use ldmspoll::sink::{CsvSink, LiveView};
use ldmspoll::source::{DEFAULT_LDMS_LS, DEFAULT_TRANSPORT, LdmsLs};
use ldmspoll::util::{init_logging, parse_outfile, parse_plugin_mapping};

/// LDMS multi-plugin CSV recorder.
#[derive(Parser)]
#[command(name = "ldmspoll", about = "Record LDMS datasets into per-plugin CSV files", version)]
struct Args {
    /// Polling interval in seconds.
    #[arg(short, long, default_value = "2")]
    interval: u64,

    /// Path to the ldms_ls binary.
    #[arg(long, env = "LDMS_LS", default_value = DEFAULT_LDMS_LS)]
    ldms_ls: PathBuf,

    /// ldmsd host.
    #[arg(long, env = "LDMSD_HOST", default_value = "localhost")]
    host: String,

    /// ldmsd port.
    #[arg(short, long, env = "LDMSD_PORT", default_value = "412")]
    port: u16,

    /// ldms_ls transport (-x).
    #[arg(long, default_value = DEFAULT_TRANSPORT)]
    transport: String,

    /// Directory for ldms_<plugin>_full.csv files.
    #[arg(short, long, default_value = "/data")]
    output_dir: PathBuf,

    /// Explicit CSV file for a plugin (PLUGIN=PATH). Repeatable.
    #[arg(long = "outfile", value_name = "PLUGIN=PATH", value_parser = parse_outfile)]
    outfiles: Vec<(String, PathBuf)>,

    /// Route datasets of an instance to a plugin key (INSTANCE=PLUGIN). Repeatable.
    #[arg(long = "plugin", value_name = "INSTANCE=PLUGIN", value_parser = parse_plugin_mapping)]
    plugins: Vec<(String, String)>,

    /// What to do when a dataset gains fields after its file's header was
    /// written: drop, fail or rotate.
    #[arg(long, default_value = "drop")]
    on_schema_change: SchemaPolicy,

    /// Also record datasets flagged inconsistent.
    #[arg(long)]
    include_inconsistent: bool,

    /// Print every report to stdout as well.
    #[arg(long)]
    echo: bool,

    /// With --echo, do not clear the screen before each report.
    #[arg(long)]
    no_clear: bool,

    /// Increase logging verbosity (-v for debug, -vv for trace). Default is info level.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode - only show errors.
    #[arg(short, long)]
    quiet: bool,
}

fn main() {
    let args = Args::parse();

    init_logging(Level::INFO, args.verbose, args.quiet);

    if args.interval == 0 {
        eprintln!("Error: interval must be at least 1 second");
        std::process::exit(1);
    }

    if let Err(e) = std::fs::create_dir_all(&args.output_dir) {
        eprintln!(
            "Error: cannot create output directory '{}': {}",
            args.output_dir.display(),
            e
        );
        std::process::exit(1);
    }

    info!("ldmspoll {} starting", env!("CARGO_PKG_VERSION"));
    info!(
        "Config: interval={}s, ldms_ls={}, daemon={}:{}, output={}, on_schema_change={}",
        args.interval,
        args.ldms_ls.display(),
        args.host,
        args.port,
        args.output_dir.display(),
        args.on_schema_change
    );

    let mut plugins = PluginTable::default();
    for (instance, plugin) in &args.plugins {
        plugins.insert(instance, plugin.clone());
    }

    let mut csv = CsvSink::new(&args.output_dir, args.on_schema_change)
        .include_inconsistent(args.include_inconsistent);
    for (plugin, path) in &args.outfiles {
        info!("{} -> {}", plugin, path.display());
        csv = csv.with_outfile(plugin.clone(), path.clone());
    }

    let interval = Duration::from_secs(args.interval);
    let source = LdmsLs::new(&args.ldms_ls, &args.host, args.port).with_transport(&args.transport);

    let mut pipeline = Pipeline::new(source, plugins).with_sink(Box::new(csv));
    if args.echo {
        let view = LiveView::new(io::stdout(), format!("{}:{}", args.host, args.port), interval)
            .max_lines(None)
            .clear_screen(!args.no_clear);
        pipeline = pipeline.with_sink(Box::new(view));
    }

    // Setup graceful shutdown
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();

    if let Err(e) = ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    }) {
        warn!("Failed to set Ctrl-C handler: {}", e);
    }

    println!("Starting LDMS multi-plugin monitoring (Ctrl+C to stop)");
    pipeline.run(interval, &running);

    info!("Shutting down...");
    if let Err(e) = pipeline.shutdown() {
        warn!("Shutdown incomplete: {}", e);
    }
    println!("\nMonitoring stopped.");
}

#[cfg(test)]
mod tests {
    use super::Args;
    use clap::{CommandFactory, Parser};
    use ldmspoll::schema::SchemaPolicy;

    #[test]
    fn args_are_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn args_parse_repeated_assignments() {
        let args = Args::try_parse_from([
            "ldmspoll",
            "--outfile",
            "meminfo=/tmp/mem.csv",
            "--outfile",
            "vmstat=/tmp/vm.csv",
            "--plugin",
            "node1=meminfo",
            "--on-schema-change",
            "rotate",
        ])
        .unwrap();
        assert_eq!(args.outfiles.len(), 2);
        assert_eq!(args.plugins[0], ("node1".to_string(), "meminfo".to_string()));
        assert_eq!(args.on_schema_change, SchemaPolicy::Rotate);
        assert_eq!(args.interval, 2);
    }

    #[test]
    fn args_reject_bad_assignment() {
        assert!(Args::try_parse_from(["ldmspoll", "--outfile", "meminfo"]).is_err());
        assert!(Args::try_parse_from(["ldmspoll", "--on-schema-change", "merge"]).is_err());
    }
}
