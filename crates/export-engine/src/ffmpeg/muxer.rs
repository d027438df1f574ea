//! Chunk-staging muxer.
//!
//! Each phase writes its media into a chunk file under a staging directory.
//! Committing in `Default` or `Append` mode joins every staged chunk into the
//! output with ffmpeg's concat demuxer, without re-encoding.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use splice_common::error::{SpliceError, SpliceResult};
use splice_common::time::us_to_ms;
use splice_composition::{Format, TrackType};
use tokio::process::Command;

use crate::events::EventSink;
use crate::muxer::{ChunkInfo, FileEnded, MuxerFactory, MuxerMode, MuxerSession, TrackLedger};

static NEXT_SESSION: AtomicU64 = AtomicU64::new(0);

/// Opens [`ChunkMuxer`] sessions.
#[derive(Debug, Clone)]
pub struct ChunkMuxerFactory {
    ffmpeg_bin: String,
    staging_dir: Option<PathBuf>,
}

impl ChunkMuxerFactory {
    pub fn new(ffmpeg_bin: impl Into<String>, staging_dir: Option<PathBuf>) -> Self {
        Self {
            ffmpeg_bin: ffmpeg_bin.into(),
            staging_dir,
        }
    }

    fn staging_for(&self, output: &Path) -> PathBuf {
        let name = output
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "output".to_string());
        let session = NEXT_SESSION.fetch_add(1, Ordering::Relaxed);
        let dir_name = format!(".{name}.splice-{}-{session}", std::process::id());
        match &self.staging_dir {
            Some(dir) => dir.join(dir_name),
            None => output
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or(Path::new("."))
                .join(dir_name),
        }
    }
}

impl MuxerFactory for ChunkMuxerFactory {
    fn create(
        &self,
        output: &Path,
        mode: MuxerMode,
        expected_video: Option<Format>,
        sink: EventSink,
    ) -> SpliceResult<Box<dyn MuxerSession>> {
        let staging = self.staging_for(output);
        std::fs::create_dir_all(&staging).map_err(|e| {
            SpliceError::muxer(format!(
                "Failed to create staging directory {}: {e}",
                staging.display()
            ))
        })?;
        tracing::debug!(output = %output.display(), ?mode, staging = %staging.display(), "Opened muxer");
        Ok(Box::new(ChunkMuxer {
            output: output.to_path_buf(),
            mode,
            staging,
            ffmpeg_bin: self.ffmpeg_bin.clone(),
            ledger: TrackLedger::new(expected_video),
            chunks: Vec::new(),
            next_chunk: 0,
            finalized: false,
            sink,
        }))
    }
}

/// A muxer session writing through staged chunk files.
#[derive(Debug)]
pub struct ChunkMuxer {
    output: PathBuf,
    mode: MuxerMode,
    staging: PathBuf,
    ffmpeg_bin: String,
    ledger: TrackLedger,
    chunks: Vec<PathBuf>,
    next_chunk: usize,
    finalized: bool,
    sink: EventSink,
}

impl ChunkMuxer {
    async fn finalize(&mut self) -> SpliceResult<()> {
        match self.chunks.as_slice() {
            [] => return Err(SpliceError::muxer("nothing to finalize")),
            [single] => move_file(single, &self.output).await?,
            _ => self.concat().await?,
        }

        let size = tokio::fs::metadata(&self.output)
            .await
            .map(|m| m.len())
            .map_err(|e| SpliceError::muxer(format!("Output missing after finalize: {e}")))?;
        for track in self.ledger.track_ended() {
            self.sink.track_ended(track);
        }
        self.sink.file_ended(FileEnded {
            duration_ms: us_to_ms(self.ledger.duration_us()),
            file_size_bytes: size,
        });
        self.finalized = true;

        if let Err(e) = tokio::fs::remove_dir_all(&self.staging).await {
            tracing::warn!(staging = %self.staging.display(), "Failed to remove staging directory: {e}");
        }
        tracing::info!(
            output = %self.output.display(),
            chunks = self.chunks.len(),
            size_bytes = size,
            "Output finalized"
        );
        Ok(())
    }

    async fn concat(&self) -> SpliceResult<()> {
        let list_path = self.staging.join("concat.txt");
        tokio::fs::write(&list_path, concat_list(&self.chunks)).await?;

        let output = Command::new(&self.ffmpeg_bin)
            .args(["-hide_banner", "-loglevel", "error", "-y"])
            .args(["-f", "concat", "-safe", "0", "-i"])
            .arg(&list_path)
            .args(["-map", "0", "-c", "copy"])
            .arg(&self.output)
            .output()
            .await
            .map_err(|e| SpliceError::muxer(format!("Failed to start ffmpeg concat: {e}")))?;
        if !output.status.success() {
            return Err(SpliceError::muxer(format!(
                "ffmpeg concat failed ({}): {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl MuxerSession for ChunkMuxer {
    fn output_path(&self) -> &Path {
        &self.output
    }

    fn mode(&self) -> MuxerMode {
        self.mode
    }

    fn switch_to_append(&mut self) -> SpliceResult<()> {
        if self.mode != MuxerMode::Partial {
            return Err(SpliceError::muxer(format!(
                "cannot switch a {:?} muxer to append mode",
                self.mode
            )));
        }
        self.mode = MuxerMode::Append;
        Ok(())
    }

    fn track_format(&self, track_type: TrackType) -> Option<Format> {
        self.ledger.format(track_type).cloned()
    }

    fn next_chunk_path(&mut self) -> SpliceResult<PathBuf> {
        if self.finalized {
            return Err(SpliceError::muxer("output already finalized"));
        }
        let path = self.staging.join(format!("chunk-{:03}.mp4", self.next_chunk));
        self.next_chunk += 1;
        Ok(path)
    }

    async fn commit_chunk(&mut self, chunk: ChunkInfo) -> SpliceResult<()> {
        if self.finalized {
            return Err(SpliceError::muxer("output already finalized"));
        }
        self.ledger.record(&chunk, self.mode)?;
        tracing::debug!(
            chunk = %chunk.path.display(),
            start_offset_us = chunk.start_offset_us,
            duration_us = chunk.duration_us,
            mode = ?self.mode,
            "Committed chunk"
        );
        self.chunks.push(chunk.path);
        match self.mode {
            MuxerMode::Partial => Ok(()),
            MuxerMode::Default | MuxerMode::Append => self.finalize().await,
        }
    }

    async fn abandon(self: Box<Self>) {
        if self.finalized {
            return;
        }
        if let Err(e) = tokio::fs::remove_dir_all(&self.staging).await {
            tracing::warn!(staging = %self.staging.display(), "Failed to discard staged output: {e}");
        }
    }
}

impl Drop for ChunkMuxer {
    fn drop(&mut self) {
        if self.finalized || !self.staging.exists() {
            return;
        }
        match std::fs::remove_dir_all(&self.staging) {
            Ok(()) => tracing::debug!(staging = %self.staging.display(), "Removed unfinished staging"),
            Err(e) => tracing::warn!(staging = %self.staging.display(), "Failed to remove unfinished staging: {e}"),
        }
    }
}

async fn move_file(from: &Path, to: &Path) -> SpliceResult<()> {
    if tokio::fs::rename(from, to).await.is_ok() {
        return Ok(());
    }
    // Rename fails across filesystems.
    tokio::fs::copy(from, to).await.map_err(|e| {
        SpliceError::muxer(format!(
            "Failed to move {} to {}: {e}",
            from.display(),
            to.display()
        ))
    })?;
    tokio::fs::remove_file(from).await.ok();
    Ok(())
}

/// Concat demuxer script listing `chunks` in order.
fn concat_list(chunks: &[PathBuf]) -> String {
    chunks
        .iter()
        .map(|c| format!("file '{}'\n", c.to_string_lossy().replace('\'', r"'\''")))
        .collect()
}
