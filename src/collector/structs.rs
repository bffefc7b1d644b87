use std::{path::PathBuf, time::Duration};
use clap::Parser;
use nix::unistd::Pid;
use crate::{pprof::AllProfilerRows, processes::AllProcessRows};

#[derive(Debug, Parser)]
#[command(author, version, about = "Sample the pprof top table and the process status of a daemon into pprof.csv and top.csv", long_about = None)]
pub struct CollectorOpts {
    /// Number of samples to take
    #[arg(allow_negative_numbers = true)]
    pub iterations: i64,
    /// Profile endpoint of the daemon read by go tool pprof
    #[arg(long, value_name = "url")]
    pub profile_url: Option<String>,
    /// Binary providing 'tool pprof'
    #[arg(long, value_name = "path")]
    pub go_binary: Option<String>,
    /// Local port for the pprof web interface
    #[arg(long, value_name = "port")]
    pub ui_port: Option<String>,
    /// Element id of the top table
    #[arg(long, value_name = "id")]
    pub table_id: Option<String>,
    /// Process name to grep for in ps output
    #[arg(long, value_name = "name")]
    pub process_name: Option<String>,
    /// Command line text after which a ps line is cut off
    #[arg(long, value_name = "text")]
    pub process_marker: Option<String>,
    /// Seconds between samples
    #[arg(short, long, value_name = "seconds")]
    pub interval: Option<String>,
    /// WebDriver (geckodriver) URL
    #[arg(long, value_name = "url")]
    pub webdriver_url: Option<String>,
    /// How to read the top page: webdriver or http
    #[arg(long, value_name = "source")]
    pub page_source: Option<String>,
    /// Seconds to wait for the pprof web interface to answer
    #[arg(long, value_name = "seconds")]
    pub ready_timeout: Option<String>,
    /// Directory for pprof.csv and top.csv
    #[arg(short, long, value_name = "directory")]
    pub output_directory: Option<String>,
    /// Write the options that are set to .env
    #[arg(long)]
    pub write_dotenv: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageSourceKind {
    WebDriver,
    Http,
}

#[derive(Debug, Clone)]
pub struct CollectorConfig {
    pub profile_url: String,
    pub go_binary: String,
    pub ui_port: u16,
    pub ui_path: String,
    pub table_id: String,
    pub process_name: String,
    pub process_marker: String,
    pub interval: Duration,
    pub webdriver_url: String,
    pub page_source: PageSourceKind,
    pub ready_timeout: Duration,
    pub output_directory: PathBuf,
}

/// Reads pages with a headless firefox, driven via WebDriver.
/// The top table of the pprof web interface is filled in by javascript, so it needs a browser.
#[derive(Debug, Clone)]
pub struct WebDriverPage {
    pub webdriver_url: String,
}

/// Reads pages with a plain http GET.
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpPage;

/// A running `go tool pprof --http` process, leading its own process group.
#[derive(Debug)]
pub struct ProfilerUi {
    pub(crate) child: tokio::process::Child,
    pub(crate) group: Pid,
    pub(crate) stopped: bool,
}

pub struct Collector<'a, P> {
    pub(crate) config: &'a CollectorConfig,
    pub(crate) page_source: P,
    pub allprofilerrows: AllProfilerRows,
    pub allprocessrows: AllProcessRows,
}
