//! Track source: resolving an opaque identifier into track metadata and
//! fetching the raw media for it.
//!
//! The trait keeps the jukebox core independent of any particular backend;
//! the shipped implementation uses the rusty_ytdl crate and streams the
//! best audio-bearing format straight to the cache file.

use std::path::{Path, PathBuf};

use rusty_ytdl::{Video, VideoOptions, VideoQuality, VideoSearchOptions};
use tokio::io::AsyncWriteExt;
use tracing::info;

/// Metadata for a resolved track identifier.
pub struct TrackMeta {
    pub title: String,
}

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("could not resolve track info for {id}: {reason}")]
    Resolve { id: String, reason: String },
    #[error("could not stream media for {id}: {reason}")]
    Stream { id: String, reason: String },
    #[error("could not write media file {}: {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Where track media comes from. Abstraction allows swapping rusty_ytdl
/// for yt-dlp or other backends, and lets tests fake the network.
#[async_trait::async_trait]
pub trait TrackSource: Send + Sync {
    /// Resolve an identifier into track metadata.
    async fn resolve(&self, id: &str) -> Result<TrackMeta, SourceError>;

    /// Stream the best audio-bearing format for `id` to `dest`.
    async fn fetch(&self, id: &str, dest: &Path) -> Result<(), SourceError>;
}

/// YouTube track source using the rusty_ytdl crate.
pub struct RustyYtdlSource;

impl RustyYtdlSource {
    fn video(&self, id: &str) -> Result<Video, SourceError> {
        let options = VideoOptions {
            quality: VideoQuality::HighestAudio,
            filter: VideoSearchOptions::Audio,
            ..Default::default()
        };
        Video::new_with_options(id, options).map_err(|e| SourceError::Resolve {
            id: id.to_string(),
            reason: e.to_string(),
        })
    }
}

#[async_trait::async_trait]
impl TrackSource for RustyYtdlSource {
    async fn resolve(&self, id: &str) -> Result<TrackMeta, SourceError> {
        let video = self.video(id)?;
        let info = video
            .get_basic_info()
            .await
            .map_err(|e| SourceError::Resolve {
                id: id.to_string(),
                reason: e.to_string(),
            })?;
        Ok(TrackMeta {
            title: info.video_details.title,
        })
    }

    async fn fetch(&self, id: &str, dest: &Path) -> Result<(), SourceError> {
        let video = self.video(id)?;
        let stream = video.stream().await.map_err(|e| SourceError::Stream {
            id: id.to_string(),
            reason: e.to_string(),
        })?;

        let mut file = tokio::fs::File::create(dest)
            .await
            .map_err(|e| SourceError::Write {
                path: dest.to_path_buf(),
                source: e,
            })?;

        let mut written = 0usize;
        while let Some(chunk) = stream.chunk().await.map_err(|e| SourceError::Stream {
            id: id.to_string(),
            reason: e.to_string(),
        })? {
            written += chunk.len();
            file.write_all(&chunk)
                .await
                .map_err(|e| SourceError::Write {
                    path: dest.to_path_buf(),
                    source: e,
                })?;
        }
        file.flush().await.map_err(|e| SourceError::Write {
            path: dest.to_path_buf(),
            source: e,
        })?;

        info!("downloaded {written} bytes of media for {id}");
        Ok(())
    }
}
