//! Transcoding raw media into an audio-only file by shelling out to ffmpeg.

use std::ffi::OsString;
use std::path::Path;
use std::process::ExitStatus;

use tracing::info;

#[derive(Debug, thiserror::Error)]
pub enum TranscodeError {
    #[error("could not run ffmpeg: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("ffmpeg exited with {status}: {stderr}")]
    Failed { status: ExitStatus, stderr: String },
}

#[async_trait::async_trait]
pub trait Transcoder: Send + Sync {
    /// Produce an audio-only file at `dest` from the media at `source`.
    async fn convert(&self, source: &Path, dest: &Path) -> Result<(), TranscodeError>;
}

/// Transcoder backed by an ffmpeg subprocess.
pub struct FfmpegTranscoder {
    program: String,
}

impl FfmpegTranscoder {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for FfmpegTranscoder {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

fn ffmpeg_args(source: &Path, dest: &Path) -> Vec<OsString> {
    // -vn strips the video stream; the container of `dest` picks the codec.
    vec![
        OsString::from("-y"),
        OsString::from("-i"),
        source.as_os_str().to_os_string(),
        OsString::from("-vn"),
        dest.as_os_str().to_os_string(),
    ]
}

#[async_trait::async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn convert(&self, source: &Path, dest: &Path) -> Result<(), TranscodeError> {
        let output = tokio::process::Command::new(&self.program)
            .args(ffmpeg_args(source, dest))
            .output()
            .await?;
        if !output.status.success() {
            return Err(TranscodeError::Failed {
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            });
        }
        info!("converted {} to {}", source.display(), dest.display());
        Ok(())
    }
}
