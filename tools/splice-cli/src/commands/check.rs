//! Check for the external tools exports rely on.

use splice_common::config::AppConfig;
use splice_export_engine::ffmpeg;

pub fn run(config: &AppConfig) -> anyhow::Result<()> {
    println!("Splice System Check");
    println!("{}", "=".repeat(50));

    let mut all_ok = true;
    for (label, binary) in [
        ("ffmpeg", &config.ffmpeg.ffmpeg_bin),
        ("ffprobe", &config.ffmpeg.ffprobe_bin),
    ] {
        if ffmpeg::command_exists(binary) {
            println!("[OK] {label}: {binary}");
        } else {
            println!("[MISSING] {label}: {binary}");
            all_ok = false;
        }
    }
    println!(
        "[OK] Encoders: video={} audio={}",
        config.ffmpeg.video_codec, config.ffmpeg.audio_codec
    );

    println!();
    if all_ok {
        println!("All required tools are available. Splice is ready.");
        Ok(())
    } else {
        anyhow::bail!(
            "Some required tools are missing. Install ffmpeg or adjust {}",
            AppConfig::path().display()
        )
    }
}
