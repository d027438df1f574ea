pub mod check;
pub mod config;
pub mod export;
pub mod probe;
pub mod resume;

use std::io::Write;
use std::time::Duration;

use splice_export_engine::{ExportHandle, ExportResult};

/// Print progress until the job ends, cancelling it on Ctrl-C.
pub async fn drive(handle: ExportHandle) -> anyhow::Result<ExportResult> {
    let control = handle.control();
    let mut completion = Box::pin(handle.wait());
    let mut ticker = tokio::time::interval(Duration::from_millis(500));

    loop {
        tokio::select! {
            outcome = &mut completion => {
                println!();
                return match outcome {
                    Ok(result) => Ok(result),
                    Err(failure) => {
                        if !failure.error.is_cancelled() {
                            eprintln!("{}", serde_json::to_string_pretty(&failure.result)?);
                        }
                        Err(failure.into())
                    }
                };
            }
            _ = ticker.tick() => {
                print!("\r  Progress: {:<12}", control.progress().await.to_string());
                std::io::stdout().flush().ok();
            }
            _ = tokio::signal::ctrl_c() => {
                eprintln!("\nCancelling export...");
                control.cancel().await;
            }
        }
    }
}

/// Print a finished job's summary and full result.
pub fn report(result: &ExportResult) -> anyhow::Result<()> {
    println!("Export complete");
    println!("  Strategy: {:?}", result.strategy);
    println!("  Optimization: {}", result.optimization);
    if let Some(error) = &result.optimization_error {
        println!("  Optimization error: {error}");
    }
    if let (Some(duration_ms), Some(size)) = (result.duration_ms, result.file_size_bytes) {
        println!(
            "  Output: {:.2}s, {:.1} MiB",
            duration_ms as f64 / 1000.0,
            size as f64 / (1024.0 * 1024.0)
        );
    }
    println!();
    println!("{}", serde_json::to_string_pretty(result)?);
    Ok(())
}
