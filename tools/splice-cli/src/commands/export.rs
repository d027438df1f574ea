//! Export a composition.

use std::path::PathBuf;

use splice_common::config::AppConfig;
use splice_composition::Composition;
use splice_export_engine::{ffmpeg, ExportOptions, Exporter, TransformationRequest};

pub async fn run(
    config: &AppConfig,
    composition_path: PathBuf,
    output: PathBuf,
    trim_optimization: bool,
    video_mime: Option<String>,
    audio_mime: Option<String>,
) -> anyhow::Result<()> {
    ffmpeg::check_tools(config)?;
    let composition = Composition::load(&composition_path)
        .map_err(|e| anyhow::anyhow!("Failed to load composition: {e}"))?;

    let mut options = ExportOptions::from(config);
    options.trim_optimization |= trim_optimization;
    options.transformation = TransformationRequest {
        video_mime,
        audio_mime,
        hdr_mode: None,
    };

    println!("Exporting composition: {}", composition_path.display());
    println!("  Sources: {}", composition.uris().join(", "));
    println!("  Output: {}", output.display());
    println!("  Trim optimization: {}", options.trim_optimization);

    let exporter = Exporter::new(ffmpeg::collaborators(config), options);
    let handle = exporter.start(composition, &output)?;
    let result = super::drive(handle).await?;
    super::report(&result)
}
