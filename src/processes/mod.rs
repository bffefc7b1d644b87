//! Module for the process status of the profiled daemon.
//!
//! Every iteration, the collector runs the equivalent of `ps aux | grep <process name>`.
//! Each line of the output is cut off at the command line marker (when present), split on whitespace,
//! and the first ten fields (USER up to TIME) become a [ProcessRow].
//!
//! The parsing is positional: ps doesn't provide a structured format here.
//! Because the fields are taken from the start of the line, and the command column is the last one,
//! a command line with spaces does not shift the fields. A line with fewer than ten fields is dropped.
//!
mod structs;
mod functions;

pub use structs::*;
pub use functions::*;
