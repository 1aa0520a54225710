//! The track entity: identity, cache paths, and the fetch-then-transcode
//! preparation lifecycle.
//!
//! Preparation is idempotent against the on-disk cache: a file that already
//! exists is taken at face value, there is no checksum or freshness check.
//! The cache key is the track title, so upstream must reject duplicate
//! titles before they reach the queue.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::{error, info};

use crate::source::{SourceError, TrackSource};
use crate::transcode::Transcoder;

/// Where a track is in its preparation pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrepState {
    NotStarted,
    Fetching,
    Transcoding,
    Ready,
    Failed,
}

/// One queued or playing unit of audio.
///
/// Clones share the preparation state, so the detached preparation task
/// and the queue observe the same lifecycle.
#[derive(Debug, Clone)]
pub struct Track {
    pub id: String,
    pub title: String,
    /// Raw media as fetched from the source.
    pub media_path: PathBuf,
    /// Audio-only file produced by the transcoder; what playback opens.
    pub audio_path: PathBuf,
    prep: Arc<Mutex<PrepState>>,
}

/// Turn a track title into a usable cache file stem. Titles are arbitrary
/// text and must not be able to escape the cache directory.
pub fn cache_file_stem(title: &str) -> String {
    title
        .chars()
        .map(|c| match c {
            '/' | '\\' | '\0' => '_',
            c => c,
        })
        .collect()
}

impl Track {
    pub fn new(id: impl Into<String>, title: impl Into<String>, cache_dir: &Path) -> Self {
        let id = id.into();
        let title = title.into();
        let stem = cache_file_stem(&title);
        Self {
            media_path: cache_dir.join(format!("{stem}.mp4")),
            audio_path: cache_dir.join(format!("{stem}.mp3")),
            id,
            title,
            prep: Arc::new(Mutex::new(PrepState::NotStarted)),
        }
    }

    /// Resolve an identifier into a track rooted in `cache_dir`.
    pub async fn resolve(
        source: &dyn TrackSource,
        id: &str,
        cache_dir: &Path,
    ) -> Result<Track, SourceError> {
        let meta = source.resolve(id).await?;
        info!("resolved {id} as {}", meta.title);
        Ok(Track::new(id, meta.title, cache_dir))
    }

    pub fn prep_state(&self) -> PrepState {
        *self.prep.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_prep_state(&self, state: PrepState) {
        *self.prep.lock().unwrap_or_else(|e| e.into_inner()) = state;
    }

    fn media_cached(&self) -> bool {
        self.media_path.exists()
    }

    fn audio_cached(&self) -> bool {
        self.audio_path.exists()
    }

    /// Run the preparation pipeline: fetch, then transcode, each skipped
    /// when its output is already cached. Failure is terminal for this
    /// track and is only reported through the log and the prep state.
    pub async fn prepare(&self, source: &dyn TrackSource, transcoder: &dyn Transcoder) {
        if let Err(err) = self.try_prepare(source, transcoder).await {
            self.set_prep_state(PrepState::Failed);
            error!("preparation of {} failed: {err}", self.title);
        }
    }

    async fn try_prepare(
        &self,
        source: &dyn TrackSource,
        transcoder: &dyn Transcoder,
    ) -> anyhow::Result<()> {
        self.download(source).await?;
        self.convert(transcoder).await?;
        self.set_prep_state(PrepState::Ready);
        Ok(())
    }

    async fn download(&self, source: &dyn TrackSource) -> Result<(), SourceError> {
        if self.audio_cached() || self.media_cached() {
            info!("found {} in cache, skipping download", self.title);
            return Ok(());
        }
        self.set_prep_state(PrepState::Fetching);
        info!(
            "downloading {} to {}",
            self.title,
            self.media_path.display()
        );
        source.fetch(&self.id, &self.media_path).await
    }

    async fn convert(
        &self,
        transcoder: &dyn Transcoder,
    ) -> Result<(), crate::transcode::TranscodeError> {
        if self.audio_cached() {
            info!("found {} in cache, skipping convert", self.title);
            return Ok(());
        }
        self.set_prep_state(PrepState::Transcoding);
        transcoder.convert(&self.media_path, &self.audio_path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcode::TranscodeError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeSource {
        fetches: AtomicUsize,
        fail: bool,
    }

    impl FakeSource {
        fn new() -> Self {
            Self {
                fetches: AtomicUsize::new(0),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                fetches: AtomicUsize::new(0),
                fail: true,
            }
        }
    }

    #[async_trait::async_trait]
    impl TrackSource for FakeSource {
        async fn resolve(&self, id: &str) -> Result<crate::source::TrackMeta, SourceError> {
            Ok(crate::source::TrackMeta {
                title: id.to_string(),
            })
        }

        async fn fetch(&self, id: &str, dest: &Path) -> Result<(), SourceError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(SourceError::Stream {
                    id: id.to_string(),
                    reason: "boom".to_string(),
                });
            }
            std::fs::write(dest, b"media").map_err(|e| SourceError::Write {
                path: dest.to_path_buf(),
                source: e,
            })
        }
    }

    struct FakeTranscoder {
        converts: AtomicUsize,
    }

    impl FakeTranscoder {
        fn new() -> Self {
            Self {
                converts: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait::async_trait]
    impl Transcoder for FakeTranscoder {
        async fn convert(&self, _source: &Path, dest: &Path) -> Result<(), TranscodeError> {
            self.converts.fetch_add(1, Ordering::SeqCst);
            std::fs::write(dest, b"audio").map_err(TranscodeError::Spawn)
        }
    }

    #[test]
    fn cache_paths_derive_from_title() {
        let track = Track::new("abc123", "Test Song", Path::new("cache"));
        assert_eq!(track.media_path, Path::new("cache/Test Song.mp4"));
        assert_eq!(track.audio_path, Path::new("cache/Test Song.mp3"));
        assert_eq!(track.prep_state(), PrepState::NotStarted);
    }

    #[test]
    fn cache_file_stem_replaces_path_separators() {
        assert_eq!(cache_file_stem("AC/DC - Back\\In Black"), "AC_DC - Back_In Black");
        assert_eq!(cache_file_stem("plain title"), "plain title");
    }

    #[tokio::test]
    async fn prepare_fetches_then_transcodes() {
        let dir = tempfile::tempdir().unwrap();
        let track = Track::new("abc", "song", dir.path());
        let source = FakeSource::new();
        let transcoder = FakeTranscoder::new();

        track.prepare(&source, &transcoder).await;

        assert_eq!(source.fetches.load(Ordering::SeqCst), 1);
        assert_eq!(transcoder.converts.load(Ordering::SeqCst), 1);
        assert_eq!(track.prep_state(), PrepState::Ready);
    }

    #[tokio::test]
    async fn prepare_skips_everything_when_audio_cached() {
        let dir = tempfile::tempdir().unwrap();
        let track = Track::new("abc", "song", dir.path());
        std::fs::write(&track.audio_path, b"audio").unwrap();
        let source = FakeSource::new();
        let transcoder = FakeTranscoder::new();

        track.prepare(&source, &transcoder).await;

        assert_eq!(source.fetches.load(Ordering::SeqCst), 0);
        assert_eq!(transcoder.converts.load(Ordering::SeqCst), 0);
        assert_eq!(track.prep_state(), PrepState::Ready);
    }

    #[tokio::test]
    async fn prepare_skips_fetch_when_media_cached() {
        let dir = tempfile::tempdir().unwrap();
        let track = Track::new("abc", "song", dir.path());
        std::fs::write(&track.media_path, b"media").unwrap();
        let source = FakeSource::new();
        let transcoder = FakeTranscoder::new();

        track.prepare(&source, &transcoder).await;

        assert_eq!(source.fetches.load(Ordering::SeqCst), 0);
        assert_eq!(transcoder.converts.load(Ordering::SeqCst), 1);
        assert_eq!(track.prep_state(), PrepState::Ready);
    }

    #[tokio::test]
    async fn failed_fetch_marks_track_failed_and_skips_transcode() {
        let dir = tempfile::tempdir().unwrap();
        let track = Track::new("abc", "song", dir.path());
        let source = FakeSource::failing();
        let transcoder = FakeTranscoder::new();

        track.prepare(&source, &transcoder).await;

        assert_eq!(source.fetches.load(Ordering::SeqCst), 1);
        assert_eq!(transcoder.converts.load(Ordering::SeqCst), 0);
        assert_eq!(track.prep_state(), PrepState::Failed);
    }

    #[tokio::test]
    async fn clones_share_preparation_state() {
        let dir = tempfile::tempdir().unwrap();
        let track = Track::new("abc", "song", dir.path());
        let clone = track.clone();
        let source = FakeSource::new();
        let transcoder = FakeTranscoder::new();

        track.prepare(&source, &transcoder).await;

        assert_eq!(clone.prep_state(), PrepState::Ready);
    }
}
