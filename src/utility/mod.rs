//! Utilities shared by the collector and the visuals generator.
//!
//! - resolve a setting from the command line, the environment (which can be filled from `.env`) or a default.
//! - write the settings that were explicitly set back to `.env`.
//! - fetch a page over http, and wait for an http endpoint to answer.
//!
mod functions;

pub use functions::*;
