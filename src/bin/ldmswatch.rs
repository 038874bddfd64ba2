//! ldmswatch - live view of LDMS datasets.
//!
//! Usage:
//!   ldmswatch                        # localhost:412, refresh every 2s
//!   ldmswatch 5                      # refresh every 5s
//!   ldmswatch --filter 'netmon'      # only datasets whose path matches
//!   ldmswatch --max-lines 5 --once   # one short snapshot, then exit

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use clap::Parser;
use regex::Regex;
use tracing::{Level, debug, warn};

use ldmspoll::parser::PluginTable;
use ldmspoll::pipeline::Pipeline;
use ldmspoll::sink::LiveView;
use ldmspoll::source::{DEFAULT_LDMS_LS, DEFAULT_TRANSPORT, LdmsLs};
use ldmspoll::util::init_logging;

/// Live view of LDMS datasets.
#[derive(Parser)]
#[command(name = "ldmswatch", about = "Live view of LDMS datasets", version)]
struct Args {
    /// Refresh interval in seconds (default: 2).
    #[arg(value_name = "INTERVAL")]
    interval: Option<u64>,

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

    /// Regular expression matched against dataset paths.
    #[arg(short, long, value_name = "REGEX")]
    filter: Option<String>,

    /// Hide datasets flagged inconsistent.
    #[arg(long)]
    hide_inconsistent: bool,

    /// Maximum body lines shown per dataset (0 shows all).
    #[arg(short = 'n', long, default_value = "20")]
    max_lines: usize,

    /// Do not clear the screen between refreshes.
    #[arg(long)]
    no_clear: bool,

    /// Render a single snapshot and exit.
    #[arg(long)]
    once: bool,

    /// Increase logging verbosity (-v for debug, -vv for trace). Default is warn level.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode - only show errors.
    #[arg(short, long)]
    quiet: bool,
}

fn main() {
    let args = Args::parse();

    init_logging(Level::WARN, args.verbose, args.quiet);

    let interval = Duration::from_secs(args.interval.unwrap_or(2));
    if interval.is_zero() {
        eprintln!("Error: interval must be at least 1 second");
        std::process::exit(1);
    }

    let filter = match args.filter.as_deref().map(Regex::new).transpose() {
        Ok(filter) => filter,
        Err(e) => {
            eprintln!("Error: invalid --filter: {}", e);
            std::process::exit(1);
        }
    };

    let max_lines = (args.max_lines > 0).then_some(args.max_lines);
    let source = LdmsLs::new(&args.ldms_ls, &args.host, args.port).with_transport(&args.transport);
    let view = LiveView::new(io::stdout(), format!("{}:{}", args.host, args.port), interval)
        .with_filter(filter)
        .include_inconsistent(!args.hide_inconsistent)
        .max_lines(max_lines)
        .clear_screen(!args.no_clear && !args.once);

    let mut pipeline = Pipeline::new(source, PluginTable::default()).with_sink(Box::new(view));

    if args.once {
        let summary = pipeline.tick();
        debug!("{:?}", summary);
        std::process::exit(if summary.fetched { 0 } else { 1 });
    }

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    }) {
        warn!("Failed to set Ctrl-C handler: {}", e);
    }

    pipeline.run(interval, &running);

    if let Err(e) = pipeline.shutdown() {
        warn!("Shutdown incomplete: {}", e);
    }
    println!("\nStopped.");
}
