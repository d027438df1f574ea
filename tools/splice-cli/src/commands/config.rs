//! Show or persist the effective configuration.

use splice_common::config::AppConfig;

pub fn run(config: &AppConfig, save: bool) -> anyhow::Result<()> {
    println!("Config file: {}", AppConfig::path().display());
    println!("{}", serde_json::to_string_pretty(config)?);
    if save {
        config.save()?;
        println!("Saved.");
    }
    Ok(())
}
