//! Resume an interrupted export.

use std::path::PathBuf;

use splice_common::config::AppConfig;
use splice_composition::Composition;
use splice_export_engine::{ffmpeg, ExportOptions, Exporter};

pub async fn run(
    config: &AppConfig,
    composition_path: PathBuf,
    output: PathBuf,
    previous: PathBuf,
) -> anyhow::Result<()> {
    ffmpeg::check_tools(config)?;
    if !previous.exists() {
        anyhow::bail!("Previous output not found: {}", previous.display());
    }
    let composition = Composition::load(&composition_path)
        .map_err(|e| anyhow::anyhow!("Failed to load composition: {e}"))?;

    println!("Resuming export: {}", composition_path.display());
    println!("  Previous output: {}", previous.display());
    println!("  Output: {}", output.display());

    let exporter = Exporter::new(ffmpeg::collaborators(config), ExportOptions::from(config));
    let handle = exporter.resume(composition, &output, &previous)?;
    let result = super::drive(handle).await?;
    super::report(&result)
}
