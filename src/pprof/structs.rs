/// The header of `pprof.csv`.
pub const PROFILER_HEADERS: [&str; 8] = ["Time", "Flat", "Flat%", "Sum%", "Cum", "Cum%", "Name", "Inlined?"];

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfilerRow {
    #[serde(rename = "Time")]
    pub time: u32,
    #[serde(rename = "Flat")]
    pub flat: String,
    #[serde(rename = "Flat%")]
    pub flat_percent: String,
    #[serde(rename = "Sum%")]
    pub sum_percent: String,
    #[serde(rename = "Cum")]
    pub cum: String,
    #[serde(rename = "Cum%")]
    pub cum_percent: String,
    #[serde(rename = "Name")]
    pub name: String,
    // empty for most functions, and absent in rows that were written without the empty cell.
    #[serde(rename = "Inlined?")]
    pub inlined: Option<String>,
}

#[derive(Debug, Default)]
pub struct AllProfilerRows {
    pub profilerrows: Vec<ProfilerRow>,
}
