//! Create charts from the `pprof.csv` files of test cases.
//!
use std::{collections::HashMap, path::Path};
use clap::Parser;
use dotenv::dotenv;
use log::*;
use anyhow::Result;
use lnd_memstats::visuals::{generate_visuals, VisualsConfig, VisualsOpts};
use lnd_memstats::utility;

fn main() -> Result<()>
{
    env_logger::init();
    dotenv().ok();
    let options = VisualsOpts::parse();

    let mut changed_options = HashMap::new();
    let config = VisualsConfig::from_opts(&options, &mut changed_options)?;
    info!("{:?}", config);

    generate_visuals(&config)?;

    utility::dotenv_writer(options.write_dotenv, changed_options, Path::new(".env"))?;
    Ok(())
}
