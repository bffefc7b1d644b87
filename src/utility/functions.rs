//! The functions
//!
use log::*;
use std::{collections::HashMap, env, fs, ops::RangeInclusive, path::Path, str::FromStr, time::{Duration, Instant}};
use anyhow::{bail, Context, Result};
use itertools::Itertools;
use serde::Serialize;

/// Resolve a setting.
/// The order of precedence is:
/// - the command line option.
/// - the environment variable `env_name` (`.env` is read into the environment via `dotenv().ok()`).
/// - the default.
///
/// A setting coming from the command line or the environment is added to `changed_options`,
/// so it can be written to `.env` later on.
pub fn set_option(
    option: &Option<String>,
    env_name: &'static str,
    default: &str,
    changed_options: &mut HashMap<&'static str, String>,
) -> String
{
    match option {
        Some(value) => {
            info!("{} argument set: using: {}", env_name, value);
            changed_options.insert(env_name, value.to_string());
            value.to_string()
        },
        None => {
            match env::var(env_name) {
                Ok(set_var) => {
                    info!("{} not set: set via .env: {}", env_name, set_var);
                    changed_options.insert(env_name, set_var.to_owned());
                    set_var
                },
                Err(_e) => {
                    info!("{} not set: and not set via .env: using default: {}", env_name, default);
                    default.to_string()
                },
            }
        },
    }
}

/// Resolve a setting with [set_option] and parse it into `T`.
pub fn set_parsed_option<T>(
    option: &Option<String>,
    env_name: &'static str,
    default: &str,
    changed_options: &mut HashMap<&'static str, String>,
) -> Result<T>
where
    T: FromStr,
    <T as FromStr>::Err: std::error::Error + Send + Sync + 'static,
{
    let value = set_option(option, env_name, default, changed_options);
    value.trim().parse::<T>()
        .with_context(|| format!("Invalid value for {}: {}", env_name, value))
}

/// Parse a range of test case numbers, written as `first-last` (both inclusive), or a single number.
pub fn parse_test_case_range(
    range: &str,
) -> Result<RangeInclusive<u32>>
{
    let (first, last) = match range.split_once('-') {
        Some((first, last)) => (first.trim(), last.trim()),
        None => (range.trim(), range.trim()),
    };
    let first: u32 = first.parse()
        .with_context(|| format!("Invalid test case range: {}", range))?;
    let last: u32 = last.parse()
        .with_context(|| format!("Invalid test case range: {}", range))?;
    if first > last {
        bail!("Invalid test case range: {}: first test case is higher than last", range);
    }
    Ok(first..=last)
}

/// Write the settings in `changed_options` to `dotenv_file` as `KEY=value` lines, ordered by key.
/// Nothing is written unless `write_dotenv` is set; an existing file is replaced.
pub fn dotenv_writer(
    write_dotenv: bool,
    changed_options: HashMap<&str, String>,
    dotenv_file: &Path,
) -> Result<()>
{
    if changed_options.is_empty() || !write_dotenv {
        return Ok(());
    }
    info!("Writing {}", dotenv_file.display());
    let lines: String = changed_options.iter()
        .sorted()
        .map(|(key, value)| format!("{}={}\n", key, value))
        .collect();
    fs::write(dotenv_file, lines)
        .with_context(|| format!("Error writing .env file: {}", dotenv_file.display()))?;
    Ok(())
}

/// Write `rows` to `path` as csv, preceded by `headers`.
/// An existing file is truncated. The header is written by hand, so a file without rows still has it.
pub fn write_csv<T: Serialize>(
    path: &Path,
    headers: &[&str],
    rows: &[T],
) -> Result<()>
{
    let file = fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)
        .with_context(|| format!("Cannot create file: {}", path.display()))?;
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(file);
    writer.write_record(headers)
        .with_context(|| format!("Error writing file: {}", path.display()))?;
    for row in rows {
        writer.serialize(row)
            .with_context(|| format!("Error writing file: {}", path.display()))?;
    }
    writer.flush()
        .with_context(|| format!("Error writing file: {}", path.display()))?;
    Ok(())
}

/// Perform an http GET and return the body.
/// A non-success status is an error: the body of an error page is of no use to the parsers.
pub async fn http_get(
    url: &str,
) -> Result<String>
{
    let response = reqwest::get(url).await
        .with_context(|| format!("Error performing http GET: {}", url))?;
    if ! response.status().is_success() {
        bail!("Non success response: {} = {}", url, response.status());
    }
    debug!("Success response: {} = {}", url, response.status());
    response.text().await
        .with_context(|| format!("Error reading http response body: {}", url))
}

/// Is anything answering http at `url`?
pub async fn http_answers(
    url: &str,
) -> bool
{
    reqwest::get(url).await.is_ok()
}

/// Poll `url` until it answers with a success status.
/// `still_running` is checked before every attempt: an error from it ends the wait at once,
/// so an answer from some other process on the same port is never taken for readiness.
/// Gives up with an error when `timeout` has passed.
pub async fn wait_for_http<F>(
    url: &str,
    timeout: Duration,
    mut still_running: F,
) -> Result<()>
where
    F: FnMut() -> Result<()>,
{
    let client = reqwest::Client::new();
    let timer = Instant::now();
    loop {
        still_running()?;
        match client.get(url).send().await {
            Ok(response) if response.status().is_success() => {
                debug!("{} ready after {:?}", url, timer.elapsed());
                return Ok(());
            },
            Ok(response) => debug!("Non success response: {} = {}", url, response.status()),
            Err(e) => debug!("Non-Ok response: {}: {}", url, e),
        }
        if timer.elapsed() >= timeout {
            bail!("{} did not become ready within {:?}", url, timeout);
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}
