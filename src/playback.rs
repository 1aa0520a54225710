//! Playback engine: opens a prepared track's cached audio file, decodes
//! and streams it to the output device, and signals completion exactly
//! once when the stream runs dry.
//!
//! The rodio `OutputStream` is not `Send`, so a dedicated thread owns it
//! and serves sink-creation requests over a channel. Pause state lives in
//! the sink's own controls, entirely disjoint from the playlist's queue
//! lock. Playback is never cancelled: a superseded sink keeps playing
//! until its source is exhausted, as it did in the original jukebox.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rodio::{Decoder, OutputStream, OutputStreamBuilder, Sink};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

#[derive(Debug, thiserror::Error)]
pub enum PlaybackError {
    #[error("could not open audio output device: {0}")]
    Device(String),
    #[error("could not open {}: {source}", path.display())]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("could not decode {}: {reason}", path.display())]
    Decode { path: PathBuf, reason: String },
    #[error("audio output thread is gone")]
    OutputGone,
}

/// Pause/resume capability for one in-flight playback.
pub trait PlaybackControl: Send + Sync {
    fn set_paused(&self, paused: bool);
    fn is_paused(&self) -> bool;
}

/// A started playback: its pause control, shared with whoever needs to
/// flip it, and a receiver that resolves exactly once at natural end of
/// stream. If playback never started, no signal ever arrives.
pub struct ActivePlayback {
    pub control: Arc<dyn PlaybackControl>,
    pub finished: oneshot::Receiver<()>,
}

#[async_trait::async_trait]
pub trait AudioOutput: Send + Sync {
    /// Open and decode `path` and start playing it on the output device.
    async fn play(&self, path: &Path) -> Result<ActivePlayback, PlaybackError>;
}

impl PlaybackControl for Sink {
    fn set_paused(&self, paused: bool) {
        if paused {
            self.pause();
        } else {
            self.play();
        }
    }

    fn is_paused(&self) -> bool {
        Sink::is_paused(self)
    }
}

struct PlayRequest {
    path: PathBuf,
    reply: oneshot::Sender<Result<ActivePlayback, PlaybackError>>,
}

/// Audio output backed by rodio's default device.
pub struct RodioOutput {
    tx: mpsc::UnboundedSender<PlayRequest>,
}

impl RodioOutput {
    /// Open the default output device on a dedicated audio thread.
    pub fn spawn() -> Result<Self, PlaybackError> {
        let (tx, mut rx) = mpsc::unbounded_channel::<PlayRequest>();
        let (ready_tx, ready_rx) = std::sync::mpsc::channel();

        std::thread::Builder::new()
            .name("audio-output".to_string())
            .spawn(move || {
                let mut stream = match OutputStreamBuilder::open_default_stream() {
                    Ok(stream) => stream,
                    Err(err) => {
                        let _ = ready_tx.send(Err(PlaybackError::Device(err.to_string())));
                        return;
                    }
                };
                stream.log_on_drop(false);
                let _ = ready_tx.send(Ok(()));

                while let Some(request) = rx.blocking_recv() {
                    let result = start_sink(&stream, &request.path);
                    if request.reply.send(result).is_err() {
                        warn!("playback requester went away before the sink was ready");
                    }
                }
                debug!("audio output thread exiting");
            })
            .map_err(|e| PlaybackError::Device(e.to_string()))?;

        ready_rx
            .recv()
            .map_err(|_| PlaybackError::OutputGone)??;
        Ok(Self { tx })
    }
}

fn start_sink(stream: &OutputStream, path: &Path) -> Result<ActivePlayback, PlaybackError> {
    let file = File::open(path).map_err(|e| PlaybackError::Open {
        path: path.to_path_buf(),
        source: e,
    })?;
    let source = Decoder::new(BufReader::new(file)).map_err(|e| PlaybackError::Decode {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    let sink = Arc::new(Sink::connect_new(stream.mixer()));
    sink.append(source);

    let (done_tx, done_rx) = oneshot::channel();
    let waiter = sink.clone();
    std::thread::spawn(move || {
        waiter.sleep_until_end();
        let _ = done_tx.send(());
    });

    Ok(ActivePlayback {
        control: sink,
        finished: done_rx,
    })
}

#[async_trait::async_trait]
impl AudioOutput for RodioOutput {
    async fn play(&self, path: &Path) -> Result<ActivePlayback, PlaybackError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(PlayRequest {
                path: path.to_path_buf(),
                reply: reply_tx,
            })
            .map_err(|_| PlaybackError::OutputGone)?;
        reply_rx.await.map_err(|_| PlaybackError::OutputGone)?
    }
}
