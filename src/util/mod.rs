//! Utility modules shared by the binaries.

mod args;
mod logging;

pub use args::{parse_assignment, parse_outfile, parse_plugin_mapping};
pub use logging::{init_logging, level_for};
