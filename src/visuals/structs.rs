use std::{ops::RangeInclusive, path::PathBuf};
use clap::Parser;
use plotters::style::RGBColor;

/// The colors of the pie slices, used in order and repeated when there are more slices.
pub const PALETTE: [RGBColor; 8] = [
    RGBColor(0x00, 0x4c, 0x6d),
    RGBColor(0x13, 0x63, 0x83),
    RGBColor(0x26, 0x7c, 0x9a),
    RGBColor(0x38, 0x95, 0xaf),
    RGBColor(0x4c, 0xaf, 0xc4),
    RGBColor(0x62, 0xc9, 0xd9),
    RGBColor(0x79, 0xe4, 0xec),
    RGBColor(0x93, 0xff, 0xff),
];

#[derive(Debug, Parser)]
#[command(author, version, about = "Create pie, line and bar charts from the pprof.csv files of test cases", long_about = None)]
pub struct VisualsOpts {
    /// Directory holding the test_case_<N> directories
    #[arg(short, long, value_name = "directory")]
    pub base_directory: Option<String>,
    /// Directory to write the charts to
    #[arg(short, long, value_name = "directory")]
    pub visuals_directory: Option<String>,
    /// Test cases to create pie charts for, as first-last
    #[arg(long, value_name = "range")]
    pub pie_cases: Option<String>,
    /// Test cases for the line and bar chart, as first-last
    #[arg(long, value_name = "range")]
    pub line_cases: Option<String>,
    /// Iteration (Time) shown in the pie charts
    #[arg(long, value_name = "iteration")]
    pub pie_iteration: Option<String>,
    /// Flat% a function must exceed to be shown
    #[arg(long, value_name = "percentage")]
    pub threshold: Option<String>,
    /// Function shown in the line chart
    #[arg(long, value_name = "name")]
    pub line_function: Option<String>,
    /// Iteration (Time) shown in the line chart
    #[arg(long, value_name = "iteration")]
    pub line_iteration: Option<String>,
    /// Create the bar chart too
    #[arg(long)]
    pub bar_chart: bool,
    /// Iteration (Time) shown in the bar chart
    #[arg(long, value_name = "iteration")]
    pub bar_iteration: Option<String>,
    /// Write the options that are set to .env
    #[arg(long)]
    pub write_dotenv: bool,
}

#[derive(Debug, Clone)]
pub struct VisualsConfig {
    pub base_directory: PathBuf,
    pub visuals_directory: PathBuf,
    pub pie_cases: RangeInclusive<u32>,
    pub line_cases: RangeInclusive<u32>,
    pub pie_iteration: u32,
    pub threshold: f64,
    pub line_function: String,
    pub line_iteration: u32,
    pub bar_chart: bool,
    pub bar_iteration: u32,
}

/// The summed flat% of one function.
#[derive(Debug, Clone, PartialEq)]
pub struct PieSlice {
    pub name: String,
    pub percentage: f64,
}

/// The flat% of one function, one value per test case.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionSeries {
    pub name: String,
    pub values: Vec<f64>,
}
