//! Sample the pprof top table and the process status of a daemon.
//!
//! Usage: `memstats_collect <iterations>`; writes `pprof.csv` and `top.csv` after the last iteration.
//! The top page is read with a headless firefox via WebDriver by default, so geckodriver must be running.
//!
use std::{collections::HashMap, path::Path};
use clap::Parser;
use dotenv::dotenv;
use log::*;
use anyhow::Result;
use lnd_memstats::collector::{Collector, CollectorConfig, CollectorOpts, HttpPage, PageSourceKind, WebDriverPage};
use lnd_memstats::utility;

#[tokio::main]
async fn main() -> Result<()>
{
    env_logger::init();
    dotenv().ok();
    let options = CollectorOpts::parse();

    let mut changed_options = HashMap::new();
    let config = CollectorConfig::from_opts(&options, &mut changed_options)?;
    info!("{:?}", config);

    match config.page_source {
        PageSourceKind::WebDriver => Collector::new(&config, WebDriverPage::new(&config.webdriver_url)).run(options.iterations).await?,
        PageSourceKind::Http => Collector::new(&config, HttpPage).run(options.iterations).await?,
    }

    utility::dotenv_writer(options.write_dotenv, changed_options, Path::new(".env"))?;
    Ok(())
}
