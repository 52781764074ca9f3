//! `taskboard serve` and `taskboard init`.

use std::path::Path;

use anyhow::Result;
use taskboard::config::TaskboardToml;
use taskboard::store::{self, ServerConfig};

pub async fn cmd_serve(config: ServerConfig) -> Result<()> {
    store::start_server(config).await
}

pub fn cmd_init(config: &TaskboardToml, config_path: &Path) -> Result<()> {
    store::open_state(&config.server)?;
    println!(
        "Task database initialized at {}",
        config.server.db_path.display()
    );

    if !config_path.exists() {
        config.save(config_path)?;
        println!("Wrote default configuration to {}", config_path.display());
    }
    Ok(())
}
