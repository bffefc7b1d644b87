//! The impls and functions
//!
use std::{path::Path, process::Stdio};
use tokio::process::Command;
use log::*;
use anyhow::{bail, Context, Result};
use crate::processes::{AllProcessRows, ProcessRow, PROCESS_HEADERS};
use crate::utility;

impl AllProcessRows {
    pub fn new() -> Self { Default::default() }
    /// Run the ps/grep pipeline and add the rows for `iteration`.
    pub async fn read_processes(
        &mut self,
        process_name: &str,
        marker: &str,
        iteration: u32,
    ) -> Result<usize>
    {
        let output = ps_grep(process_name).await?;
        let rows = parse_ps_output(&output, marker, iteration);
        let number_of_rows = rows.len();
        self.processrows.extend(rows);
        Ok(number_of_rows)
    }
    pub fn write_csv(
        &self,
        path: &Path,
    ) -> Result<()>
    {
        utility::write_csv(path, &PROCESS_HEADERS, &self.processrows)
    }
}

/// Run `ps aux | grep <process_name>` and return the output.
/// grep exits with 1 when nothing matched, which is not an error: the output is empty then.
pub async fn ps_grep(
    process_name: &str,
) -> Result<String>
{
    let mut ps = Command::new("ps")
        .arg("aux")
        .stdout(Stdio::piped())
        .spawn()
        .with_context(|| "Error spawning ps")?;
    let ps_stdout: Stdio = ps.stdout.take()
        .with_context(|| "Error taking the stdout of ps")?
        .try_into()
        .with_context(|| "Error connecting ps to grep")?;

    let grep = Command::new("grep")
        .arg(process_name)
        .stdin(ps_stdout)
        .stdout(Stdio::piped())
        .output()
        .await
        .with_context(|| "Error running grep")?;

    let ps_status = ps.wait().await
        .with_context(|| "Error waiting for ps")?;
    if ! ps_status.success() {
        bail!("ps exited with {}", ps_status);
    }
    match grep.status.code() {
        Some(0) | Some(1) => {},
        _ => bail!("grep exited with {}", grep.status),
    }

    let output = String::from_utf8(grep.stdout)
        .with_context(|| "ps output is not valid utf-8")?;
    debug!("ps_grep {}: {} lines", process_name, output.lines().count());
    Ok(output)
}

/// Parse the lines of ps aux output.
/// Each line is cut off at `marker`, and the first ten whitespace separated fields are taken.
pub fn parse_ps_output(
    output: &str,
    marker: &str,
    iteration: u32,
) -> Vec<ProcessRow>
{
    let mut processrows: Vec<ProcessRow> = Vec::new();
    for line in output.lines().filter(|line| !line.trim().is_empty())
    {
        let line = match line.find(marker) {
            Some(position) if !marker.is_empty() => &line[..position],
            _ => line,
        };
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 10 {
            warn!("Dropping ps line with {} fields: {:?}", fields.len(), line);
            continue;
        }
        processrows.push( ProcessRow {
            time: iteration,
            user: fields[0].to_string(),
            pid: fields[1].to_string(),
            cpu_percent: fields[2].to_string(),
            mem_percent: fields[3].to_string(),
            vsz: fields[4].to_string(),
            rss: fields[5].to_string(),
            tty: fields[6].to_string(),
            stat: fields[7].to_string(),
            start: fields[8].to_string(),
            cpu_time: fields[9].to_string(),
        });
    }
    processrows
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const PS_OUTPUT: &str = "\
lnd       184273  6.1  2.4 2812472 198532 pts/1   Sl+  10:02   1:13 lnd --profile=6060 --bitcoin.active --bitcoin.regtest
lnd       184951  0.0  0.0   6476  2268 pts/2    S+   10:20   0:00 grep lnd
";

    #[test]
    fn unit_parse_ps_output() {
        let rows = parse_ps_output(PS_OUTPUT, "lnd --profile=", 2);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], ProcessRow {
            time: 2,
            user: "lnd".to_string(),
            pid: "184273".to_string(),
            cpu_percent: "6.1".to_string(),
            mem_percent: "2.4".to_string(),
            vsz: "2812472".to_string(),
            rss: "198532".to_string(),
            tty: "pts/1".to_string(),
            stat: "Sl+".to_string(),
            start: "10:02".to_string(),
            cpu_time: "1:13".to_string(),
        });
        assert_eq!(rows[1].pid, "184951");
    }

    #[test]
    fn unit_parse_ps_output_multi_word_command() {
        // a command line that does not contain the marker keeps its words after TIME; they are ignored.
        let output = "root 1 0.0 0.1 168000 11000 ? Ss Oct18 0:03 /usr/lib/systemd/systemd --switched-root --system --deserialize 31\n";
        let rows = parse_ps_output(output, "lnd --profile=", 0);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].cpu_time, "0:03");
        assert_eq!(rows[0].start, "Oct18");
    }

    #[test]
    fn unit_parse_ps_output_drops_short_lines() {
        let output = "lnd 184273 6.1 2.4 2812472\n\n   \n";
        assert!(parse_ps_output(output, "lnd --profile=", 0).is_empty());
    }

    #[test]
    fn unit_parse_ps_output_empty_marker() {
        let rows = parse_ps_output(PS_OUTPUT, "", 0);
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn unit_write_csv_header_and_rows() {
        let directory = tempfile::tempdir().unwrap();
        let path = directory.path().join("top.csv");
        let mut allprocessrows = AllProcessRows::new();
        allprocessrows.processrows.extend(parse_ps_output(PS_OUTPUT, "lnd --profile=", 0));
        allprocessrows.processrows.extend(parse_ps_output(PS_OUTPUT, "lnd --profile=", 1));
        allprocessrows.write_csv(&path).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 5);
        assert_eq!(lines[0], "Time,USER,PID,%CPU,%MEM,VSZ,RSS,TTY,STAT,START,TIME");
        assert_eq!(lines[1], "0,lnd,184273,6.1,2.4,2812472,198532,pts/1,Sl+,10:02,1:13");
        assert!(lines[3].starts_with("1,"));
    }
}
