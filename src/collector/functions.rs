//! The impls and functions
//!
use std::{collections::HashMap, path::PathBuf, process::Stdio, str::FromStr, time::{Duration, Instant}};
use tokio::process::Command;
use fantoccini::ClientBuilder;
use nix::{errno::Errno, sys::signal::{killpg, Signal}, unistd::Pid};
use log::*;
use anyhow::{anyhow, bail, Context, Result};
use crate::collector::{Collector, CollectorConfig, CollectorOpts, HttpPage, PageSourceKind, ProfilerUi, WebDriverPage};
use crate::{pprof::AllProfilerRows, processes::AllProcessRows, utility};
use crate::{DEFAULT_GO_BINARY, DEFAULT_INTERVAL, DEFAULT_OUTPUT_DIRECTORY, DEFAULT_PAGE_SOURCE, DEFAULT_PROCESS_MARKER, DEFAULT_PROCESS_NAME, DEFAULT_PROFILE_URL, DEFAULT_READY_TIMEOUT, DEFAULT_TABLE_ID, DEFAULT_UI_PATH, DEFAULT_UI_PORT, DEFAULT_WEBDRIVER_URL};

/// How long a stopped pprof web interface gets to exit before it is killed.
const STOP_TIMEOUT: Duration = Duration::from_secs(5);

impl FromStr for PageSourceKind {
    type Err = anyhow::Error;

    fn from_str(source: &str) -> Result<Self> {
        match source.to_lowercase().as_str() {
            "webdriver" => Ok(PageSourceKind::WebDriver),
            "http" => Ok(PageSourceKind::Http),
            _ => bail!("Unknown page source: {} (expected webdriver or http)", source),
        }
    }
}

impl CollectorConfig {
    /// Resolve every setting from the command line, the environment or the default.
    pub fn from_opts(
        options: &CollectorOpts,
        changed_options: &mut HashMap<&'static str, String>,
    ) -> Result<Self>
    {
        let page_source = utility::set_option(&options.page_source, "MEMSTATS_PAGE_SOURCE", DEFAULT_PAGE_SOURCE, changed_options);
        let interval: f64 = utility::set_parsed_option(&options.interval, "MEMSTATS_INTERVAL", DEFAULT_INTERVAL, changed_options)?;
        let ready_timeout: f64 = utility::set_parsed_option(&options.ready_timeout, "MEMSTATS_READY_TIMEOUT", DEFAULT_READY_TIMEOUT, changed_options)?;
        Ok(CollectorConfig {
            profile_url: utility::set_option(&options.profile_url, "MEMSTATS_PROFILE_URL", DEFAULT_PROFILE_URL, changed_options),
            go_binary: utility::set_option(&options.go_binary, "MEMSTATS_GO_BINARY", DEFAULT_GO_BINARY, changed_options),
            ui_port: utility::set_parsed_option(&options.ui_port, "MEMSTATS_UI_PORT", DEFAULT_UI_PORT, changed_options)?,
            ui_path: DEFAULT_UI_PATH.to_string(),
            table_id: utility::set_option(&options.table_id, "MEMSTATS_TABLE_ID", DEFAULT_TABLE_ID, changed_options),
            process_name: utility::set_option(&options.process_name, "MEMSTATS_PROCESS_NAME", DEFAULT_PROCESS_NAME, changed_options),
            process_marker: utility::set_option(&options.process_marker, "MEMSTATS_PROCESS_MARKER", DEFAULT_PROCESS_MARKER, changed_options),
            interval: Duration::try_from_secs_f64(interval)
                .with_context(|| format!("Invalid interval: {}", interval))?,
            webdriver_url: utility::set_option(&options.webdriver_url, "MEMSTATS_WEBDRIVER_URL", DEFAULT_WEBDRIVER_URL, changed_options),
            page_source: page_source.parse()?,
            ready_timeout: Duration::try_from_secs_f64(ready_timeout)
                .with_context(|| format!("Invalid ready timeout: {}", ready_timeout))?,
            output_directory: PathBuf::from(utility::set_option(&options.output_directory, "MEMSTATS_OUTPUT_DIRECTORY", DEFAULT_OUTPUT_DIRECTORY, changed_options)),
        })
    }
    /// The URL of the top page of the pprof web interface.
    pub fn ui_url(&self) -> String {
        format!("http://localhost:{}/{}", self.ui_port, self.ui_path)
    }
}

/// Something that returns the html source of a page.
#[allow(async_fn_in_trait)]
pub trait PageSource {
    async fn page_source(&self, url: &str) -> Result<String>;
}

impl WebDriverPage {
    pub fn new(webdriver_url: &str) -> Self {
        WebDriverPage { webdriver_url: webdriver_url.to_string() }
    }
}

impl PageSource for WebDriverPage {
    /// Every call uses its own browser session, which is closed afterwards.
    async fn page_source(&self, url: &str) -> Result<String> {
        let mut capabilities = serde_json::Map::new();
        capabilities.insert("moz:firefoxOptions".to_string(), serde_json::json!({ "args": ["-headless"] }));

        let mut builder = ClientBuilder::native();
        builder.capabilities(capabilities);
        let client = builder.connect(&self.webdriver_url).await
            .map_err(|e| anyhow!("Error creating WebDriver session at {}: {}", self.webdriver_url, e))?;

        let source = match client.goto(url).await {
            Ok(()) => client.source().await
                .map_err(|e| anyhow!("Error reading page source of {}: {}", url, e)),
            Err(e) => Err(anyhow!("Error loading {}: {}", url, e)),
        };
        client.close().await
            .map_err(|e| anyhow!("Error closing WebDriver session: {}", e))?;
        source
    }
}

impl PageSource for HttpPage {
    async fn page_source(&self, url: &str) -> Result<String> {
        utility::http_get(url).await
    }
}

impl ProfilerUi {
    /// Start `go tool pprof` serving its web interface for the profile endpoint.
    /// `go tool` runs the pprof server as a child process, so everything is started in a process group of its own,
    /// which [ProfilerUi::stop] signals as a whole.
    pub fn spawn(
        config: &CollectorConfig,
    ) -> Result<Self>
    {
        let child = Command::new(&config.go_binary)
            .args(["tool", "pprof", "-no_browser"])
            .arg(format!("-http=:{}", config.ui_port))
            .arg(&config.profile_url)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .process_group(0)
            .spawn()
            .with_context(|| format!("Error spawning {} tool pprof", config.go_binary))?;
        let pid = child.id()
            .with_context(|| format!("{} tool pprof has no process id", config.go_binary))?;
        let group = Pid::from_raw(i32::try_from(pid)
            .with_context(|| format!("Invalid process id: {}", pid))?);
        debug!("pprof web interface started, process group {}", group);
        Ok(ProfilerUi { child, group, stopped: false })
    }
    /// Wait until the web interface answers at `url`.
    /// Fails as soon as the spawned process has exited: whatever answers then is not ours.
    pub async fn wait_ready(
        &mut self,
        url: &str,
        timeout: Duration,
    ) -> Result<()>
    {
        let child = &mut self.child;
        utility::wait_for_http(url, timeout, || match child.try_wait() {
            Ok(None) => Ok(()),
            Ok(Some(status)) => bail!("pprof web interface exited with {}", status),
            Err(e) => Err(e).with_context(|| "Error checking pprof web interface"),
        }).await
    }
    /// Send SIGTERM to the process group and wait for the spawned process to exit.
    /// When it is still there after STOP_TIMEOUT, the group gets SIGKILL.
    pub async fn stop(
        mut self,
    ) -> Result<()>
    {
        self.stopped = true;
        signal_group(self.group, Signal::SIGTERM)?;
        match tokio::time::timeout(STOP_TIMEOUT, self.child.wait()).await {
            Ok(status) => {
                let status = status.with_context(|| "Error waiting for pprof web interface")?;
                debug!("pprof web interface stopped: {}", status);
            },
            Err(_) => {
                warn!("pprof web interface still running {:?} after SIGTERM, sending SIGKILL", STOP_TIMEOUT);
                signal_group(self.group, Signal::SIGKILL)?;
                self.child.wait().await
                    .with_context(|| "Error waiting for pprof web interface")?;
            },
        }
        Ok(())
    }
}

impl Drop for ProfilerUi {
    fn drop(&mut self) {
        if !self.stopped {
            let _ = killpg(self.group, Signal::SIGTERM);
        }
    }
}

/// Signal every process in `group`. A group that is already gone is fine.
fn signal_group(
    group: Pid,
    signal: Signal,
) -> Result<()>
{
    match killpg(group, signal) {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(e) => Err(e).with_context(|| format!("Error sending {:?} to process group {}", signal, group)),
    }
}

/// The page error is the cause to report; a stop error next to it is only logged.
fn page_after_stop(
    page: Result<String>,
    stopped: Result<()>,
) -> Result<String>
{
    match (page, stopped) {
        (Ok(page), Ok(())) => Ok(page),
        (Ok(_), Err(stop_error)) => Err(stop_error),
        (Err(page_error), Ok(())) => Err(page_error),
        (Err(page_error), Err(stop_error)) => {
            warn!("Error stopping pprof web interface: {:#}", stop_error);
            Err(page_error)
        },
    }
}

impl<'a, P: PageSource> Collector<'a, P> {
    pub fn new(
        config: &'a CollectorConfig,
        page_source: P,
    ) -> Self
    {
        Collector {
            config,
            page_source,
            allprofilerrows: AllProfilerRows::new(),
            allprocessrows: AllProcessRows::new(),
        }
    }
    /// Take `iterations` samples, then write pprof.csv and top.csv.
    /// Zero or negative iterations take no samples, and write files with only the header.
    pub async fn run(
        mut self,
        iterations: i64,
    ) -> Result<()>
    {
        info!("begin collection of {} iterations", iterations);
        let timer = Instant::now();

        let iterations = u32::try_from(iterations.max(0))
            .with_context(|| format!("Too many iterations: {}", iterations))?;
        for iteration in 0..iterations {
            self.sample(iteration).await?;
            tokio::time::sleep(self.config.interval).await;
        }
        self.write()?;

        info!("end collection: {:?}", timer.elapsed());
        Ok(())
    }
    /// Take one sample of the top table and the process status.
    pub async fn sample(
        &mut self,
        iteration: u32,
    ) -> Result<()>
    {
        let page = self.read_top_page().await?;
        let profiler_rows = self.allprofilerrows.add_toptable(&page, &self.config.table_id, iteration)?;
        let process_rows = self.allprocessrows.read_processes(&self.config.process_name, &self.config.process_marker, iteration).await?;
        info!("iteration {}: {} top table rows, {} process rows", iteration, profiler_rows, process_rows);
        Ok(())
    }
    /// Run the pprof web interface for as long as it takes to read the top page.
    async fn read_top_page(
        &self,
    ) -> Result<String>
    {
        let ui_url = self.config.ui_url();
        if utility::http_answers(&ui_url).await {
            bail!("{} answers before pprof is started: port {} is in use", ui_url, self.config.ui_port);
        }
        let mut profiler_ui = ProfilerUi::spawn(self.config)?;
        let page = match profiler_ui.wait_ready(&ui_url, self.config.ready_timeout).await {
            Ok(()) => self.page_source.page_source(&ui_url).await,
            Err(e) => Err(e),
        };
        let stopped = profiler_ui.stop().await;
        page_after_stop(page, stopped)
    }
    /// Write the collected rows to pprof.csv and top.csv in the output directory.
    pub fn write(
        &self,
    ) -> Result<()>
    {
        let pprof_file = self.config.output_directory.join("pprof.csv");
        self.allprofilerrows.write_csv(&pprof_file)?;
        let top_file = self.config.output_directory.join("top.csv");
        self.allprocessrows.write_csv(&top_file)?;
        info!("written {} rows to {}, {} rows to {}", self.allprofilerrows.profilerrows.len(), pprof_file.display(), self.allprocessrows.processrows.len(), top_file.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use clap::Parser;
    use crate::processes::parse_ps_output;

    const TOPTABLE: &str = r#"<html><body><table class="toptable" id="toptable">
<thead><tr><th>Flat</th><th>Flat%</th><th>Sum%</th><th>Cum</th><th>Cum%</th><th>Name</th><th>Inlined?</th></tr></thead>
<tbody id="rows">
<tr><td>30.00MB</td><td>45.12%</td><td>45.12%</td><td>30.00MB</td><td>45.12%</td><td>golang.org/x/crypto/scrypt.Key</td><td></td></tr>
<tr><td>8.50MB</td><td>12.78%</td><td>57.90%</td><td>8.50MB</td><td>12.78%</td><td>bufio.NewReaderSize</td><td>(inline)</td></tr>
</tbody></table></body></html>"#;

    struct StaticPage(&'static str);

    impl PageSource for StaticPage {
        async fn page_source(&self, _url: &str) -> Result<String> {
            Ok(self.0.to_string())
        }
    }

    fn config_for(directory: &std::path::Path) -> CollectorConfig {
        let options = CollectorOpts::parse_from(["memstats_collect", "1", "--output-directory", directory.to_str().unwrap(), "--interval", "0", "--page-source", "http"]);
        CollectorConfig::from_opts(&options, &mut HashMap::new()).unwrap()
    }

    #[test]
    fn unit_page_source_kind() {
        assert_eq!("webdriver".parse::<PageSourceKind>().unwrap(), PageSourceKind::WebDriver);
        assert_eq!("HTTP".parse::<PageSourceKind>().unwrap(), PageSourceKind::Http);
        assert!("selenium".parse::<PageSourceKind>().is_err());
    }

    #[test]
    fn unit_config_from_opts() {
        let options = CollectorOpts::parse_from(["memstats_collect", "5", "--ui-port", "9090", "--interval", "0.5", "--process-name", "btcd"]);
        let mut changed_options = HashMap::new();
        let config = CollectorConfig::from_opts(&options, &mut changed_options).unwrap();
        assert_eq!(options.iterations, 5);
        assert_eq!(config.ui_port, 9090);
        assert_eq!(config.interval, Duration::from_millis(500));
        assert_eq!(config.process_name, "btcd");
        assert_eq!(config.ui_url(), "http://localhost:9090/ui/top");
        assert_eq!(changed_options["MEMSTATS_UI_PORT"], "9090");
    }

    #[test]
    fn unit_config_invalid_port() {
        let options = CollectorOpts::parse_from(["memstats_collect", "1", "--ui-port", "99999"]);
        assert!(CollectorConfig::from_opts(&options, &mut HashMap::new()).is_err());
    }

    #[test]
    fn unit_negative_iterations_parse() {
        let options = CollectorOpts::parse_from(["memstats_collect", "-3"]);
        assert_eq!(options.iterations, -3);
    }

    #[tokio::test]
    async fn unit_run_without_iterations_writes_headers() {
        let directory = tempfile::tempdir().unwrap();
        let config = config_for(directory.path());
        fs::write(directory.path().join("pprof.csv"), "stale\n").unwrap();

        Collector::new(&config, StaticPage(TOPTABLE)).run(-1).await.unwrap();

        assert_eq!(fs::read_to_string(directory.path().join("pprof.csv")).unwrap(), "Time,Flat,Flat%,Sum%,Cum,Cum%,Name,Inlined?\n");
        assert_eq!(fs::read_to_string(directory.path().join("top.csv")).unwrap(), "Time,USER,PID,%CPU,%MEM,VSZ,RSS,TTY,STAT,START,TIME\n");
    }

    #[test]
    fn unit_write_one_row_per_entry_per_iteration() {
        let directory = tempfile::tempdir().unwrap();
        let config = config_for(directory.path());
        let mut collector = Collector::new(&config, StaticPage(TOPTABLE));
        let ps_output = "lnd 184273 6.1 2.4 2812472 198532 pts/1 Sl+ 10:02 1:13 lnd --profile=6060\n";
        for iteration in 0..3 {
            collector.allprofilerrows.add_toptable(TOPTABLE, &config.table_id, iteration).unwrap();
            collector.allprocessrows.processrows.extend(parse_ps_output(ps_output, &config.process_marker, iteration));
        }
        collector.write().unwrap();

        let pprof = fs::read_to_string(directory.path().join("pprof.csv")).unwrap();
        let times: Vec<&str> = pprof.lines().skip(1).map(|line| line.split(',').next().unwrap()).collect();
        assert_eq!(times, vec!["0", "0", "1", "1", "2", "2"]);
        let top = fs::read_to_string(directory.path().join("top.csv")).unwrap();
        assert_eq!(top.lines().count(), 4);
    }

    #[tokio::test]
    async fn unit_static_page_source() {
        let page = StaticPage(TOPTABLE).page_source("http://localhost:8082/ui/top").await.unwrap();
        let rows = crate::pprof::parse_toptable(&page, "toptable", 0).unwrap();
        assert_eq!(rows.len(), 2);
    }

    /// Serves a top table with one row, named after the spawn, at the port in MEMSTATS_FAKE_PORT.
    /// Started by the fake go binary below; without the variable there is nothing to do.
    #[test]
    #[ignore]
    fn fake_pprof_server() {
        use std::io::{Read, Write};
        let Ok(port) = std::env::var("MEMSTATS_FAKE_PORT") else { return };
        let name = std::env::var("MEMSTATS_FAKE_NAME").unwrap();
        let body = format!(r#"<table id="toptable"><tbody><tr><td>1.00MB</td><td>5.00%</td><td>5.00%</td><td>1.00MB</td><td>5.00%</td><td>{}</td><td></td></tr></tbody></table>"#, name);
        let listener = std::net::TcpListener::bind(("127.0.0.1", port.parse::<u16>().unwrap())).unwrap();
        for stream in listener.incoming() {
            let mut stream = stream.unwrap();
            let mut request = [0u8; 4096];
            let _ = stream.read(&mut request);
            let _ = write!(stream, "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}", body.len(), body);
        }
    }

    /// A go binary whose `tool pprof -http=:port` runs the server above as a child process, like go does.
    fn fake_go(directory: &std::path::Path) -> String {
        let exe = std::env::current_exe().unwrap();
        let script = format!(r#"#!/bin/sh
for arg in "$@"; do
    case "$arg" in -http=:*) port="${{arg#-http=:}}" ;; esac
done
count=$(( $(cat "{dir}/spawns" 2>/dev/null || echo 0) + 1 ))
echo $count > "{dir}/spawns"
MEMSTATS_FAKE_PORT=$port MEMSTATS_FAKE_NAME=spawn$count "{exe}" --exact collector::functions::tests::fake_pprof_server --ignored --test-threads=1 &
wait
"#, dir = directory.display(), exe = exe.display());
        write_script(directory, "go", &script)
    }

    fn write_script(directory: &std::path::Path, name: &str, script: &str) -> String {
        use std::os::unix::fs::PermissionsExt;
        let path = directory.join(name);
        fs::write(&path, script).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path.to_str().unwrap().to_string()
    }

    fn free_port() -> u16 {
        std::net::TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port()
    }

    fn lifecycle_config(directory: &std::path::Path, go_binary: &str, port: u16, interval: &str) -> CollectorConfig {
        let options = CollectorOpts::parse_from([
            "memstats_collect", "1",
            "--output-directory", directory.to_str().unwrap(),
            "--go-binary", go_binary,
            "--ui-port", &port.to_string(),
            "--interval", interval,
            "--ready-timeout", "10",
            "--page-source", "http",
            "--process-name", "memstats-no-such-process",
        ]);
        CollectorConfig::from_opts(&options, &mut HashMap::new()).unwrap()
    }

    async fn stops_answering(url: &str) -> bool {
        for _ in 0..20 {
            if !utility::http_answers(url).await {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        false
    }

    #[tokio::test]
    async fn unit_read_top_page_fresh_per_spawn() {
        let directory = tempfile::tempdir().unwrap();
        let go_binary = fake_go(directory.path());
        let config = lifecycle_config(directory.path(), &go_binary, free_port(), "0");
        let collector = Collector::new(&config, HttpPage);

        for spawn in 1..=3 {
            let page = collector.read_top_page().await.unwrap();
            let rows = crate::pprof::parse_toptable(&page, "toptable", 0).unwrap();
            assert_eq!(rows[0].name, format!("spawn{}", spawn));
            assert!(stops_answering(&config.ui_url()).await, "pprof web interface of spawn {} still answers", spawn);
        }
    }

    #[tokio::test]
    async fn unit_run_samples_every_iteration() {
        if std::process::Command::new("ps").arg("aux").output().is_err() {
            eprintln!("ps not available, skipping");
            return;
        }
        let directory = tempfile::tempdir().unwrap();
        let go_binary = fake_go(directory.path());
        let config = lifecycle_config(directory.path(), &go_binary, free_port(), "0.2");

        Collector::new(&config, HttpPage).run(3).await.unwrap();

        let pprof = fs::read_to_string(directory.path().join("pprof.csv")).unwrap();
        let samples: Vec<(String, String)> = pprof.lines().skip(1)
            .map(|line| {
                let fields: Vec<&str> = line.split(',').collect();
                (fields[0].to_string(), fields[6].to_string())
            })
            .collect();
        assert_eq!(samples, vec![
            ("0".to_string(), "spawn1".to_string()),
            ("1".to_string(), "spawn2".to_string()),
            ("2".to_string(), "spawn3".to_string()),
        ]);
        assert!(stops_answering(&config.ui_url()).await);
    }

    #[tokio::test]
    async fn unit_read_top_page_port_in_use() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            loop {
                let (mut stream, _) = listener.accept().await.unwrap();
                let mut request = [0u8; 4096];
                let _ = stream.read(&mut request).await;
                let _ = stream.write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\nConnection: close\r\n\r\nok").await;
            }
        });
        let directory = tempfile::tempdir().unwrap();
        let config = lifecycle_config(directory.path(), "/nonexistent/go", port, "0");

        let error = Collector::new(&config, HttpPage).read_top_page().await.unwrap_err();
        assert!(format!("{:#}", error).contains("is in use"), "{:#}", error);
    }

    #[tokio::test]
    async fn unit_read_top_page_exited_child() {
        let directory = tempfile::tempdir().unwrap();
        let go_binary = write_script(directory.path(), "go", "#!/bin/sh\nexit 3\n");
        let config = lifecycle_config(directory.path(), &go_binary, free_port(), "0");

        let error = Collector::new(&config, HttpPage).read_top_page().await.unwrap_err();
        assert!(format!("{:#}", error).contains("pprof web interface exited"), "{:#}", error);
    }

    #[test]
    fn unit_page_after_stop() {
        assert_eq!(page_after_stop(Ok("page".to_string()), Ok(())).unwrap(), "page");
        let error = page_after_stop(Ok("page".to_string()), Err(anyhow!("stop failed"))).unwrap_err();
        assert_eq!(error.to_string(), "stop failed");
        let error = page_after_stop(Err(anyhow!("no top table")), Ok(())).unwrap_err();
        assert_eq!(error.to_string(), "no top table");
        let error = page_after_stop(Err(anyhow!("no top table")), Err(anyhow!("stop failed"))).unwrap_err();
        assert_eq!(error.to_string(), "no top table");
    }
}
