//! Tracing subscriber setup shared by the binaries.

use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Log level for the `-v` count and `-q` flag.
pub fn level_for(default: Level, verbose: u8, quiet: bool) -> Level {
    if quiet {
        return Level::ERROR;
    }
    match verbose {
        0 => default,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Installs the global `fmt` subscriber. `RUST_LOG` directives are kept;
/// the chosen level applies to this crate's targets.
pub fn init_logging(default: Level, verbose: u8, quiet: bool) {
    let level = level_for(default, verbose, quiet);

    let mut filter = EnvFilter::from_default_env();
    for target in ["ldmspoll", "ldmswatch"] {
        if let Ok(directive) = format!("{}={}", target, level).parse() {
            filter = filter.add_directive(directive);
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_for() {
        assert_eq!(level_for(Level::INFO, 0, false), Level::INFO);
        assert_eq!(level_for(Level::WARN, 0, false), Level::WARN);
        assert_eq!(level_for(Level::WARN, 1, false), Level::DEBUG);
        assert_eq!(level_for(Level::INFO, 5, false), Level::TRACE);
        assert_eq!(level_for(Level::INFO, 2, true), Level::ERROR);
    }
}
