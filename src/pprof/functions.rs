//! The impls and functions
//!
use std::{fs, io, path::Path};
use scraper::{Html, Selector};
use regex::Regex;
use log::*;
use anyhow::{anyhow, Context, Result};
use crate::pprof::{AllProfilerRows, ProfilerRow, PROFILER_HEADERS};
use crate::utility;

impl AllProfilerRows {
    pub fn new() -> Self { Default::default() }
    /// Parse the top table and add its rows to the rows already collected.
    pub fn add_toptable(
        &mut self,
        http_data: &str,
        table_id: &str,
        iteration: u32,
    ) -> Result<usize>
    {
        let rows = parse_toptable(http_data, table_id, iteration)?;
        let number_of_rows = rows.len();
        self.profilerrows.extend(rows);
        Ok(number_of_rows)
    }
    /// Write the rows to `path`, preceded by the header.
    /// An existing file is truncated.
    pub fn write_csv(
        &self,
        path: &Path,
    ) -> Result<()>
    {
        utility::write_csv(path, &PROFILER_HEADERS, &self.profilerrows)
    }
    pub fn read_csv(
        path: &Path,
    ) -> Result<AllProfilerRows>
    {
        let file = fs::File::open(path)
            .with_context(|| format!("Error opening file: {}", path.display()))?;
        let profilerrows = read_profiler_rows(file)
            .with_context(|| format!("Error reading file: {}", path.display()))?;
        Ok(AllProfilerRows { profilerrows })
    }
}

fn selector(
    selector: &str,
) -> Result<Selector>
{
    Selector::parse(selector)
        .map_err(|e| anyhow!("Invalid selector {}: {:?}", selector, e))
}

/// Parse the body rows of the table with id `table_id`.
///
/// This is how the top table looks like:
/// ---
/// <table class="toptable" id="toptable">
///   <thead><tr><th>Flat</th><th>Flat%</th><th>Sum%</th><th>Cum</th><th>Cum%</th><th>Name</th><th>Inlined?</th></tr></thead>
///   <tbody id="rows">
///     <tr><td>12.30MB</td><td>45.12%</td><td>45.12%</td><td>12.30MB</td><td>45.12%</td><td>golang.org/x/crypto/scrypt.Key</td><td></td></tr>
/// ---
/// Empty cells are dropped and the remaining cells are taken in order.
pub fn parse_toptable(
    http_data: &str,
    table_id: &str,
    iteration: u32,
) -> Result<Vec<ProfilerRow>>
{
    let table_selector = selector(&format!("table[id=\"{}\"]", table_id))?;
    let tbody_selector = selector("tbody")?;
    let tr_selector = selector("tr")?;
    let td_selector = selector("td")?;

    let html = Html::parse_document(http_data);

    let table = html.select(&table_selector).next()
        .with_context(|| format!("No table with id {} found", table_id))?;
    let tbody = table.select(&tbody_selector).next()
        .with_context(|| format!("Table {} has no body", table_id))?;

    let mut profilerrows: Vec<ProfilerRow> = Vec::new();
    for tr in tbody.select(&tr_selector)
    {
        let cells: Vec<String> = tr.select(&td_selector)
            .map(|td| td.text().collect::<String>().trim().to_string())
            .filter(|cell| !cell.is_empty())
            .collect();
        if cells.len() < 6 {
            warn!("Dropping top table row with {} non-empty cells: {:?}", cells.len(), cells);
            continue;
        }
        profilerrows.push( ProfilerRow {
            time: iteration,
            flat: cells[0].clone(),
            flat_percent: cells[1].clone(),
            sum_percent: cells[2].clone(),
            cum: cells[3].clone(),
            cum_percent: cells[4].clone(),
            name: cells[5].clone(),
            inlined: cells.get(6).cloned(),
        });
    }
    debug!("iteration {}: {} top table rows", iteration, profilerrows.len());
    Ok(profilerrows)
}

/// Read `pprof.csv` data.
/// Rows may lack the last column, which happens when the inlined cell was dropped as empty.
pub fn read_profiler_rows<R: io::Read>(
    reader: R,
) -> Result<Vec<ProfilerRow>>
{
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(reader);
    let mut profilerrows: Vec<ProfilerRow> = Vec::new();
    for row in reader.deserialize() {
        let data: ProfilerRow = row
            .with_context(|| "Error deserialize row")?;
        profilerrows.push(data);
    }
    Ok(profilerrows)
}

/// Convert a percentage such as `"45.12%"` into `45.12`.
pub fn parse_percentage(
    value: &str,
) -> Result<f64>
{
    let trimmed = value.trim();
    let number = trimmed.strip_suffix('%').unwrap_or(trimmed);
    number.trim().parse::<f64>()
        .with_context(|| format!("Invalid percentage: {:?}", value))
}

/// The pattern for a value with a two letter unit suffix, for [parse_flat_value].
pub fn unit_value_regex() -> Result<Regex>
{
    Ok(Regex::new(r"^\s*(-?[0-9]*\.?[0-9]+)[A-Za-z]{2}\s*$")?)
}

/// Convert a value with a two letter unit suffix such as `"12.34MB"` into `12.34`.
/// The unit is dropped, not converted. `unit_value` comes from [unit_value_regex].
pub fn parse_flat_value(
    value: &str,
    unit_value: &Regex,
) -> Result<f64>
{
    let captures = unit_value.captures(value)
        .with_context(|| format!("Invalid unit value: {:?}", value))?;
    captures[1].parse::<f64>()
        .with_context(|| format!("Invalid unit value: {:?}", value))
}
