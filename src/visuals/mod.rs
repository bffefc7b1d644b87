//! Module for turning the `pprof.csv` files of several test cases into charts.
//!
//! The test cases are expected at `<base directory>/test_case_<N>/pprof.csv`.
//! The charts are written as png files to the visuals directory:
//! - `test_case_<N>_pie_chart.png`: for every test case of the pie range, the functions with a flat% above
//!   the threshold at the pie iteration. Rows are filtered first and then summed per function name,
//!   so inlined entries of one function end up in one slice. A missing file is reported and skipped.
//! - `Line_Graph.png`: the flat value of one function at one iteration for the test cases of the line range.
//!   The values are sorted descending, independent of the test case they came from.
//! - `Bar_Chart.png` (only with `--bar-chart`): the flat% per function per test case of the line range.
//!
mod structs;
mod functions;

pub use structs::*;
pub use functions::*;
