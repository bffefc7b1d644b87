//! The impls and functions
//!
use std::{cmp::Ordering, collections::{BTreeMap, HashMap}, fs, io, path::{Path, PathBuf}, time::Instant};
use plotters::{coord::ranged1d::SegmentValue, element::Pie, prelude::*};
use itertools::Itertools;
use colored::Colorize;
use log::*;
use anyhow::{Context, Result};
use crate::pprof::{parse_flat_value, parse_percentage, read_profiler_rows, unit_value_regex, ProfilerRow};
use crate::visuals::{FunctionSeries, PieSlice, VisualsConfig, VisualsOpts, PALETTE};
use crate::utility;
use crate::{DEFAULT_BAR_ITERATION, DEFAULT_BASE_DIRECTORY, DEFAULT_LINE_CASES, DEFAULT_LINE_FUNCTION, DEFAULT_LINE_ITERATION, DEFAULT_PIE_CASES, DEFAULT_PIE_ITERATION, DEFAULT_THRESHOLD, DEFAULT_VISUALS_DIRECTORY};

impl VisualsConfig {
    /// Resolve every setting from the command line, the environment or the default.
    pub fn from_opts(
        options: &VisualsOpts,
        changed_options: &mut HashMap<&'static str, String>,
    ) -> Result<Self>
    {
        let pie_cases = utility::set_option(&options.pie_cases, "MEMSTATS_PIE_CASES", DEFAULT_PIE_CASES, changed_options);
        let line_cases = utility::set_option(&options.line_cases, "MEMSTATS_LINE_CASES", DEFAULT_LINE_CASES, changed_options);
        Ok(VisualsConfig {
            base_directory: PathBuf::from(utility::set_option(&options.base_directory, "MEMSTATS_BASE_DIRECTORY", DEFAULT_BASE_DIRECTORY, changed_options)),
            visuals_directory: PathBuf::from(utility::set_option(&options.visuals_directory, "MEMSTATS_VISUALS_DIRECTORY", DEFAULT_VISUALS_DIRECTORY, changed_options)),
            pie_cases: utility::parse_test_case_range(&pie_cases)?,
            line_cases: utility::parse_test_case_range(&line_cases)?,
            pie_iteration: utility::set_parsed_option(&options.pie_iteration, "MEMSTATS_PIE_ITERATION", DEFAULT_PIE_ITERATION, changed_options)?,
            threshold: utility::set_parsed_option(&options.threshold, "MEMSTATS_THRESHOLD", DEFAULT_THRESHOLD, changed_options)?,
            line_function: utility::set_option(&options.line_function, "MEMSTATS_LINE_FUNCTION", DEFAULT_LINE_FUNCTION, changed_options),
            line_iteration: utility::set_parsed_option(&options.line_iteration, "MEMSTATS_LINE_ITERATION", DEFAULT_LINE_ITERATION, changed_options)?,
            bar_chart: options.bar_chart,
            bar_iteration: utility::set_parsed_option(&options.bar_iteration, "MEMSTATS_BAR_ITERATION", DEFAULT_BAR_ITERATION, changed_options)?,
        })
    }
    pub fn test_case_path(
        &self,
        test_case: u32,
    ) -> PathBuf
    {
        self.base_directory.join(format!("test_case_{}", test_case)).join("pprof.csv")
    }
    pub fn pie_files(&self) -> Vec<PathBuf> {
        self.pie_cases.clone().map(|test_case| self.test_case_path(test_case)).collect()
    }
    pub fn line_files(&self) -> Vec<PathBuf> {
        self.line_cases.clone().map(|test_case| self.test_case_path(test_case)).collect()
    }
    /// The axis labels for the test cases of the line range.
    pub fn line_labels(&self) -> Vec<String> {
        self.line_cases.clone().map(|test_case| format!("Test Case {}", test_case)).collect()
    }
}

/// Read the rows of a test case.
/// Returns `None` when the file does not exist; every other problem is an error.
pub fn load_test_case(
    path: &Path,
) -> Result<Option<Vec<ProfilerRow>>>
{
    let file = match fs::File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e).with_context(|| format!("Error opening file: {}", path.display())),
    };
    let rows = read_profiler_rows(file)
        .with_context(|| format!("Error reading file: {}", path.display()))?;
    Ok(Some(rows))
}

/// Read the rows of a test case that must exist.
fn load_required_test_case(
    path: &Path,
) -> Result<Vec<ProfilerRow>>
{
    load_test_case(path)?
        .with_context(|| format!("File {} not found.", path.display()))
}

/// The test case number of a path such as `.../test_case_7/pprof.csv`:
/// the text after the last underscore, up to the next path separator.
pub fn test_case_number(
    path: &Path,
) -> String
{
    let path = path.to_string_lossy();
    let after_underscore = path.rsplit('_').next().unwrap_or_default();
    after_underscore
        .split(|c| c == '/' || c == std::path::MAIN_SEPARATOR)
        .next()
        .unwrap_or_default()
        .to_string()
}

/// The pie slices for one test case.
/// Every flat% is converted first, and a single invalid value is an error.
/// Then rows at `iteration` with a flat% above `threshold` are kept, and summed per function name.
/// The slices are ordered by name.
pub fn pie_slices(
    rows: &[ProfilerRow],
    iteration: u32,
    threshold: f64,
) -> Result<Vec<PieSlice>>
{
    let mut filtered: Vec<(&str, f64)> = Vec::new();
    for row in rows {
        let flat_percent = parse_percentage(&row.flat_percent)?;
        if row.time == iteration && flat_percent > threshold {
            filtered.push((row.name.as_str(), flat_percent));
        }
    }
    let slices = filtered
        .into_iter()
        .sorted_by(|a, b| a.0.cmp(b.0))
        .group_by(|(name, _)| *name)
        .into_iter()
        .map(|(name, group)| PieSlice {
            name: name.to_string(),
            percentage: group.map(|(_, flat_percent)| flat_percent).sum(),
        })
        .collect();
    Ok(slices)
}

/// The slice labels: the function name with the share of the pie, with one decimal.
pub fn pie_labels(
    slices: &[PieSlice],
) -> Vec<String>
{
    let total: f64 = slices.iter().map(|slice| slice.percentage).sum();
    slices.iter()
        .map(|slice| {
            let share = if total > 0.0 { slice.percentage / total * 100.0 } else { 0.0 };
            format!("{} ({:.1}%)", slice.name, share)
        })
        .collect()
}

/// Per function, the flat% at `iteration` in each test case.
/// A function absent from a test case gets 0 there; multiple rows of a function in one test case are summed.
pub fn function_series(
    test_cases: &[Vec<ProfilerRow>],
    iteration: u32,
) -> Result<Vec<FunctionSeries>>
{
    let mut series: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    for (index, rows) in test_cases.iter().enumerate() {
        for row in rows.iter().filter(|row| row.time == iteration) {
            let flat_percent = parse_percentage(&row.flat_percent)?;
            let values = series.entry(row.name.clone()).or_insert_with(|| vec![0.0; test_cases.len()]);
            values[index] += flat_percent;
        }
    }
    Ok(series.into_iter().map(|(name, values)| FunctionSeries { name, values }).collect())
}

/// Keep the functions that exceed `threshold` in at least one test case.
pub fn filter_function_series(
    series: Vec<FunctionSeries>,
    threshold: f64,
) -> Vec<FunctionSeries>
{
    series.into_iter()
        .filter(|function| function.values.iter().any(|value| *value > threshold))
        .collect()
}

/// The flat value of `function_name` at `iteration`, per test case.
/// The first matching row is used; a test case without a matching row gives `None`.
pub fn line_values(
    test_cases: &[Vec<ProfilerRow>],
    function_name: &str,
    iteration: u32,
) -> Result<Vec<Option<f64>>>
{
    let unit_value = unit_value_regex()?;
    test_cases.iter()
        .map(|rows| {
            rows.iter()
                .find(|row| row.name == function_name && row.time == iteration)
                .map(|row| parse_flat_value(&row.flat, &unit_value))
                .transpose()
        })
        .collect()
}

/// Sort descending; missing values go last.
pub fn sort_descending(
    values: &mut [Option<f64>],
)
{
    values.sort_by(|a, b| match (a, b) {
        (Some(a), Some(b)) => b.total_cmp(a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });
}

pub fn draw_pie_chart(
    slices: &[PieSlice],
    title: &str,
    output: &Path,
) -> Result<()>
{
    let root = BitMapBackend::new(output, (2000, 800)).into_drawing_area();
    root.fill(&WHITE)?;
    let root = root.titled(title, ("sans-serif", 32).into_font())?;

    let (width, height) = root.dim_in_pixel();
    let center = (width as i32 / 2, height as i32 / 2);
    let radius = f64::from(width.min(height)) * 0.4;
    let sizes: Vec<f64> = slices.iter().map(|slice| slice.percentage).collect();
    let colors: Vec<RGBColor> = (0..slices.len()).map(|index| PALETTE[index % PALETTE.len()]).collect();
    let labels = pie_labels(slices);

    let mut pie = Pie::new(&center, &radius, &sizes, &colors, &labels);
    pie.start_angle(140.0);
    pie.label_style(("sans-serif", 18).into_font().color(&BLACK));
    root.draw(&pie)?;

    root.present()?;
    Ok(())
}

/// Label a segment of the test case axis.
fn segment_label(
    value: &SegmentValue<i32>,
    labels: &[String],
) -> String
{
    match value {
        SegmentValue::CenterOf(index) | SegmentValue::Exact(index) => {
            usize::try_from(*index).ok().and_then(|index| labels.get(index)).cloned().unwrap_or_default()
        },
        SegmentValue::Last => String::new(),
    }
}

/// Draw the values against the test case labels; missing values are not drawn.
pub fn draw_line_chart(
    function_name: &str,
    labels: &[String],
    values: &[Option<f64>],
    output: &Path,
) -> Result<()>
{
    let max_value = values.iter().flatten().copied().fold(0.0, f64::max);
    let max_value = if max_value > 0.0 { max_value * 1.15 } else { 1.0 };

    let root = BitMapBackend::new(output, (1000, 600)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(format!("Flat Value for {}", function_name), ("sans-serif", 20).into_font())
        .margin(15)
        .x_label_area_size(40)
        .y_label_area_size(75)
        .build_cartesian_2d((0..labels.len() as i32).into_segmented(), 0.0..max_value)?;

    chart.configure_mesh()
        .x_labels(labels.len())
        .x_label_formatter(&|x| segment_label(x, labels))
        .y_desc("Flat Value (MB)")
        .draw()?;

    let points: Vec<(SegmentValue<i32>, f64)> = values.iter()
        .enumerate()
        .filter_map(|(index, value)| value.map(|value| (SegmentValue::CenterOf(index as i32), value)))
        .collect();

    chart.draw_series(LineSeries::new(points.iter().cloned(), &PALETTE[0]))?;
    chart.draw_series(points.iter().map(|(x, y)| {
        EmptyElement::at((x.clone(), *y))
            + Circle::new((0, 0), 5, PALETTE[0].filled())
            + Text::new(format!("{:.2}", y), (-15, -22), ("sans-serif", 14).into_font())
    }))?;

    root.present()?;
    Ok(())
}

/// Draw one group of bars per function, one bar per test case, with the value above each bar.
pub fn draw_bar_chart(
    series: &[FunctionSeries],
    labels: &[String],
    output: &Path,
) -> Result<()>
{
    // every function gets a slot per test case, plus an empty slot to separate the groups.
    let slots_per_function = labels.len() as i32 + 1;
    let total_slots = series.len() as i32 * slots_per_function;
    let function_names: Vec<String> = series.iter().map(|function| function.name.clone()).collect();

    let root = BitMapBackend::new(output, (1600, 800)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption("Memory by function", ("sans-serif", 20).into_font())
        .margin(15)
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d((0..total_slots).into_segmented(), 0.0..110.0)?;

    // the function name goes under the middle bar of its group.
    let middle_slot = (slots_per_function - 1) / 2;
    chart.configure_mesh()
        .disable_x_mesh()
        .x_labels(total_slots.max(1) as usize)
        .x_label_formatter(&|x| match x {
            SegmentValue::CenterOf(slot) | SegmentValue::Exact(slot) if slot % slots_per_function == middle_slot => {
                function_names.get((slot / slots_per_function) as usize).cloned().unwrap_or_default()
            },
            _ => String::new(),
        })
        .draw()?;

    for (test_index, label) in labels.iter().enumerate() {
        let color = PALETTE[(test_index * 3) % PALETTE.len()];
        let bars: Vec<(i32, f64)> = series.iter()
            .enumerate()
            .map(|(function_index, function)| (function_index as i32 * slots_per_function + test_index as i32, function.values[test_index]))
            .collect();
        chart.draw_series(bars.iter().map(|(slot, value)| {
            Rectangle::new([(SegmentValue::Exact(*slot), 0.0), (SegmentValue::Exact(slot + 1), *value)], color.filled())
        }))?
            .label(label)
            .legend(move |(x, y)| Rectangle::new([(x, y - 5), (x + 10, y + 5)], color.filled()));
        chart.draw_series(bars.iter().map(|(slot, value)| {
            EmptyElement::at((SegmentValue::CenterOf(*slot), *value))
                + Text::new(format!("{}", value), (-10, -15), ("sans-serif", 12).into_font())
        }))?;
    }

    chart.configure_series_labels()
        .position(SeriesLabelPosition::UpperRight)
        .border_style(&BLACK.mix(0.8))
        .background_style(&WHITE.mix(0.5))
        .draw()?;

    root.present()?;
    Ok(())
}

/// Create the pie chart for one test case.
/// Returns the chart file, or `None` when no function passes the filter.
pub fn create_pie_chart(
    config: &VisualsConfig,
    rows: &[ProfilerRow],
    path: &Path,
) -> Result<Option<PathBuf>>
{
    let slices = pie_slices(rows, config.pie_iteration, config.threshold)
        .with_context(|| format!("Error converting Flat% in {}", path.display()))?;
    if slices.is_empty() {
        println!("{}", format!("No data found for time {} with flat percentage > {}% in {}", config.pie_iteration, config.threshold, path.display()).yellow());
        return Ok(None);
    }

    let test_case = test_case_number(path);
    let chart_file = config.visuals_directory.join(format!("test_case_{}_pie_chart.png", test_case));
    draw_pie_chart(&slices, &format!("Function Memory Usage: Test Case {}", test_case), &chart_file)?;
    println!("Saved pie chart as {}", chart_file.display());
    Ok(Some(chart_file))
}

/// Create the line chart for the test cases of the line range.
/// Every test case file must exist.
pub fn create_line_chart(
    config: &VisualsConfig,
) -> Result<PathBuf>
{
    let test_cases = config.line_files().iter()
        .map(|path| load_required_test_case(path))
        .collect::<Result<Vec<_>>>()?;
    let mut values = line_values(&test_cases, &config.line_function, config.line_iteration)?;
    for (path, value) in config.line_files().iter().zip(&values) {
        if value.is_none() {
            warn!("No row for {} at time {} in {}", config.line_function, config.line_iteration, path.display());
        }
    }
    sort_descending(&mut values);

    let chart_file = config.visuals_directory.join("Line_Graph.png");
    draw_line_chart(&config.line_function, &config.line_labels(), &values, &chart_file)?;
    println!("Saved Line Graph as {}", chart_file.display());
    Ok(chart_file)
}

/// Create the bar chart for the test cases of the line range.
/// Every test case file must exist. Returns `None` when no function passes the threshold.
pub fn create_bar_chart(
    config: &VisualsConfig,
) -> Result<Option<PathBuf>>
{
    let test_cases = config.line_files().iter()
        .map(|path| load_required_test_case(path))
        .collect::<Result<Vec<_>>>()?;
    let series = filter_function_series(function_series(&test_cases, config.bar_iteration)?, config.threshold);
    if series.is_empty() {
        println!("{}", format!("No data found for time {} with flat percentage > {}% for the bar chart", config.bar_iteration, config.threshold).yellow());
        return Ok(None);
    }

    let chart_file = config.visuals_directory.join("Bar_Chart.png");
    draw_bar_chart(&series, &config.line_labels(), &chart_file)?;
    println!("Saved bar chart as {}", chart_file.display());
    Ok(Some(chart_file))
}

/// Create all charts: a pie chart per test case of the pie range (missing files are skipped),
/// the bar chart when asked for, and the line chart.
pub fn generate_visuals(
    config: &VisualsConfig,
) -> Result<()>
{
    info!("begin generate visuals");
    let timer = Instant::now();

    fs::create_dir_all(&config.visuals_directory)
        .with_context(|| format!("Cannot create directory: {}", config.visuals_directory.display()))?;

    for path in config.pie_files() {
        match load_test_case(&path)? {
            Some(rows) => { create_pie_chart(config, &rows, &path)?; },
            None => println!("{}", format!("File {} not found.", path.display()).yellow()),
        }
    }

    if config.bar_chart {
        create_bar_chart(config)?;
    }

    create_line_chart(config)?;

    info!("end generate visuals: {:?}", timer.elapsed());
    Ok(())
}
