extern crate serde;
extern crate serde_json;
#[macro_use]
extern crate serde_derive;
extern crate csv;

pub mod utility;
pub mod pprof;
pub mod processes;
pub mod collector;
pub mod visuals;

/// The profile endpoint of the daemon that `go tool pprof` reads.
pub const DEFAULT_PROFILE_URL: &str = "http://localhost:6060/debug/pprof/allocs";
/// The binary providing the `tool pprof` subcommand.
pub const DEFAULT_GO_BINARY: &str = "go";
/// The local port the pprof web interface binds to.
pub const DEFAULT_UI_PORT: &str = "8082";
/// The page of the pprof web interface holding the top table.
pub const DEFAULT_UI_PATH: &str = "ui/top";
/// The element id of the top table.
pub const DEFAULT_TABLE_ID: &str = "toptable";
pub const DEFAULT_PROCESS_NAME: &str = "lnd";
/// The command line text after which a ps line is cut off.
pub const DEFAULT_PROCESS_MARKER: &str = "lnd --profile=";
/// Seconds between two samples.
pub const DEFAULT_INTERVAL: &str = "1";
pub const DEFAULT_WEBDRIVER_URL: &str = "http://localhost:4444";
pub const DEFAULT_PAGE_SOURCE: &str = "webdriver";
/// Seconds to wait for the pprof web interface to answer.
pub const DEFAULT_READY_TIMEOUT: &str = "10";
pub const DEFAULT_OUTPUT_DIRECTORY: &str = ".";

pub const DEFAULT_BASE_DIRECTORY: &str = ".";
pub const DEFAULT_VISUALS_DIRECTORY: &str = "visuals";
pub const DEFAULT_PIE_CASES: &str = "1-10";
pub const DEFAULT_LINE_CASES: &str = "11-13";
pub const DEFAULT_PIE_ITERATION: &str = "4";
pub const DEFAULT_THRESHOLD: &str = "3.0";
pub const DEFAULT_LINE_FUNCTION: &str = "golang.org/x/crypto/scrypt.Key";
pub const DEFAULT_LINE_ITERATION: &str = "0";
pub const DEFAULT_BAR_ITERATION: &str = "0";
