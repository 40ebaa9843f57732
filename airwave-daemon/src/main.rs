//! airwave: multi-channel live audio broadcast origin.

use std::path::PathBuf;

use anyhow::Result;
use tracing::info;

use airwave_daemon::{init_logging, run, Config};

fn main() -> Result<()> {
    init_logging();
    info!("airwave starting");

    let config = Config::from_env(std::env::args_os().nth(1).map(PathBuf::from))?;
    run(config)
}
