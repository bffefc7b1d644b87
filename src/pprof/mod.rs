//! Module for the rows of the pprof web interface top table.
//!
//! `go tool pprof --http` serves a page `/ui/top`, which holds a table with id `toptable`.
//! Every row of the table body describes the memory attributed to one function:
//! flat (the function itself), sum% (running total) and cum (the function and everything it calls).
//!
//! This module:
//! - parses the top table into [ProfilerRow]s, tagged with the iteration they were scraped at.
//! - writes and reads the rows as `pprof.csv`.
//! - converts the textual values (`"12.3MB"`, `"45.12%"`) into numbers.
//!
mod structs;
mod functions;

pub use structs::*;
pub use functions::*;
