//! ldmspoll - LDMS dataset poller library.
//!
//! Turns the text report of `ldms_ls -l` into per-dataset records and feeds
//! them to sinks. Shared by:
//! - `ldmspoll` - records every plugin's datasets into CSV files
//! - `ldmswatch` - live filtered view of the datasets in a terminal

pub mod parser;
pub mod pipeline;
pub mod schema;
pub mod sink;
pub mod source;
pub mod util;
