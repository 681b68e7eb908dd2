#![deny(clippy::pedantic, clippy::all, clippy::nursery)]
#![allow(clippy::must_use_candidate)]

use smsrelay::{app::App, config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = config::find_config_file()?;
    let config = config::load_config(&config_path)?;

    // The environment, when set, still wins over the config file.
    match std::env::var("LOG_LEVEL") {
        Ok(level) => smsrelay_common::logging::init_with_level(Some(&level)),
        Err(_) => smsrelay_common::logging::init_with_level(Some(&config.log_level)),
    }

    let app = App::build(config);
    app.run().await
}
