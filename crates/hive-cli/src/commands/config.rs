use std::path::PathBuf;

use miette::{IntoDiagnostic, Result};

use hive_core::config::HiveConfig;

use crate::output;

pub async fn show(path: Option<PathBuf>) -> Result<()> {
    let config = match path {
        Some(p) => HiveConfig::load_from(&p).await?,
        None => HiveConfig::load().await?,
    };
    let toml = toml::to_string_pretty(&config).into_diagnostic()?;
    output::section("effective configuration");
    println!("{toml}");
    Ok(())
}

pub async fn init(path: PathBuf) -> Result<()> {
    let config = HiveConfig::default();
    config.save_to(&path).await?;
    output::success(&format!("wrote default configuration to {}", path.display()));
    Ok(())
}
