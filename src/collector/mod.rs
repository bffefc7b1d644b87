//! Module for sampling the profiled daemon.
//!
//! For every iteration, the collector:
//! - starts `go tool pprof --http` against the profile endpoint of the daemon.
//! - waits for the pprof web interface to answer.
//! - reads the top page via a [PageSource] (a headless browser via WebDriver, or plain http).
//! - stops the pprof web interface.
//! - parses the top table into [crate::pprof::ProfilerRow]s.
//! - reads the process status of the daemon into [crate::processes::ProcessRow]s.
//! - sleeps for the interval.
//!
//! The rows are kept in memory, and written to `pprof.csv` and `top.csv` after the last iteration.
//! Any error stops the run, and nothing is written then.
//!
mod structs;
mod functions;

pub use structs::*;
pub use functions::*;
