/// The header of `top.csv`.
pub const PROCESS_HEADERS: [&str; 11] = ["Time", "USER", "PID", "%CPU", "%MEM", "VSZ", "RSS", "TTY", "STAT", "START", "TIME"];

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessRow {
    #[serde(rename = "Time")]
    pub time: u32,
    #[serde(rename = "USER")]
    pub user: String,
    #[serde(rename = "PID")]
    pub pid: String,
    #[serde(rename = "%CPU")]
    pub cpu_percent: String,
    #[serde(rename = "%MEM")]
    pub mem_percent: String,
    #[serde(rename = "VSZ")]
    pub vsz: String,
    #[serde(rename = "RSS")]
    pub rss: String,
    #[serde(rename = "TTY")]
    pub tty: String,
    #[serde(rename = "STAT")]
    pub stat: String,
    #[serde(rename = "START")]
    pub start: String,
    /// cumulative cpu time
    #[serde(rename = "TIME")]
    pub cpu_time: String,
}

#[derive(Debug, Default)]
pub struct AllProcessRows {
    pub processrows: Vec<ProcessRow>,
}
