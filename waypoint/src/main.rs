//! The Waypoint server binary.

use std::path::Path;

use anyhow::Context;
use waypoint::{WaypointServer, logger};
use waypoint_core::TravelConfig;

const CONFIG_PATH: &str = "config/waypoint_config.json5";

fn main() -> anyhow::Result<()> {
    logger::init_logging()?;

    let config = TravelConfig::load_or_create(Path::new(CONFIG_PATH))
        .with_context(|| format!("failed to load {CONFIG_PATH}"))?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build the tokio runtime")?;

    runtime.block_on(async {
        let server = WaypointServer::new(config);
        server.start();

        tokio::signal::ctrl_c()
            .await
            .context("failed to listen for ctrl-c")?;

        server.stop();
        anyhow::Ok(())
    })
}
