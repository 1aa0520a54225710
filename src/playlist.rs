//! The playlist sequencer: a single task owning the queue and the
//! current-track slot, processing one command at a time from a bounded
//! channel.
//!
//! Everything else talks to it through [`Command`] values: the HTTP
//! surface sends transport commands, the playback waiter task feeds
//! `TrackFinished` back into the same channel. Preparation and playback
//! run detached and never mutate sequencer state directly. Queue length
//! and membership are readable concurrently through a read/write lock
//! whose critical sections never hold across an await and never nest
//! with the playback engine's own pause state.

use std::sync::{Arc, RwLock};

use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::playback::{ActivePlayback, AudioOutput, PlaybackControl};
use crate::source::TrackSource;
use crate::track::Track;
use crate::transcode::Transcoder;

/// Everything the sequencer delegates to.
#[derive(Clone)]
pub struct Services {
    pub source: Arc<dyn TrackSource>,
    pub transcoder: Arc<dyn Transcoder>,
    pub output: Arc<dyn AudioOutput>,
}

/// One atomic message to the sequencer. A closed set: the compiler
/// guarantees every command is handled.
#[derive(Debug)]
pub enum Command {
    /// Append a resolved track to the queue tail and kick off its
    /// preparation. Duplicate suppression happens before this is sent.
    Enqueue(Track),
    Pause,
    UnPause,
    TogglePause,
    /// Advance to the next track (or start the head when idle).
    Next,
    /// Internal: delivered by the playback waiter when a track's stream
    /// is exhausted. Handled identically to `Next`.
    TrackFinished,
}

struct CurrentTrack {
    track: Track,
    /// Present only while a playback actually started; `None` means the
    /// audio file could not be opened and this track will never finish
    /// on its own.
    control: Option<Arc<dyn PlaybackControl>>,
}

/// Handle to a running sequencer. Cloneable; commands from all clones are
/// totally ordered through the one channel.
#[derive(Clone)]
pub struct Playlist {
    tx: mpsc::Sender<Command>,
    queue: Arc<RwLock<Vec<Track>>>,
}

impl Playlist {
    /// Start a sequencer task and return a handle to it.
    pub fn spawn(services: Services) -> Playlist {
        // Capacity 1: a sender blocks until the sequencer drains the
        // previous command, keeping at most one command in flight per
        // caller, like the original's unbuffered rendezvous.
        let (tx, rx) = mpsc::channel(1);
        let queue = Arc::new(RwLock::new(Vec::new()));
        let sequencer = Sequencer {
            queue: queue.clone(),
            current: None,
            tx: tx.downgrade(),
            services,
        };
        tokio::spawn(sequencer.run(rx));
        Playlist { tx, queue }
    }

    pub async fn enqueue(&self, track: Track) {
        self.send(Command::Enqueue(track)).await;
    }

    pub async fn pause(&self) {
        self.send(Command::Pause).await;
    }

    pub async fn unpause(&self) {
        self.send(Command::UnPause).await;
    }

    pub async fn toggle_pause(&self) {
        self.send(Command::TogglePause).await;
    }

    pub async fn next(&self) {
        self.send(Command::Next).await;
    }

    async fn send(&self, command: Command) {
        if self.tx.send(command).await.is_err() {
            error!("sequencer is gone; dropping command");
        }
    }

    pub fn len(&self) -> usize {
        self.queue.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether a track with exactly this title is queued.
    pub fn contains(&self, title: &str) -> bool {
        self.queue
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .any(|t| t.title == title)
    }

    pub fn titles(&self) -> Vec<String> {
        self.queue
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|t| t.title.clone())
            .collect()
    }
}

struct Sequencer {
    queue: Arc<RwLock<Vec<Track>>>,
    current: Option<CurrentTrack>,
    /// Weak so the channel closes once every external handle is dropped.
    tx: mpsc::WeakSender<Command>,
    services: Services,
}

impl Sequencer {
    async fn run(mut self, mut rx: mpsc::Receiver<Command>) {
        while let Some(command) = rx.recv().await {
            debug!("received command {command:?}");
            self.handle(command).await;
        }
        // No sender is left, so no command can ever be processed again.
        error!("playlist command channel closed; sequencer exiting");
    }

    async fn handle(&mut self, command: Command) {
        match command {
            Command::Enqueue(track) => self.add_track(track),
            Command::Pause => self.set_paused(true),
            Command::UnPause => self.set_paused(false),
            Command::TogglePause => self.toggle_pause(),
            Command::Next | Command::TrackFinished => self.advance().await,
        }
    }

    fn add_track(&self, track: Track) {
        {
            let mut queue = self.queue.write().unwrap_or_else(|e| e.into_inner());
            queue.push(track.clone());
        }
        let source = self.services.source.clone();
        let transcoder = self.services.transcoder.clone();
        let prep = track.clone();
        tokio::spawn(async move {
            prep.prepare(source.as_ref(), transcoder.as_ref()).await;
        });
        info!("added {} to the playlist", track.title);
    }

    fn set_paused(&self, paused: bool) {
        if let Some(current) = &self.current {
            if let Some(control) = &current.control {
                control.set_paused(paused);
            }
        }
    }

    fn toggle_pause(&self) {
        if let Some(current) = &self.current {
            if let Some(control) = &current.control {
                control.set_paused(!control.is_paused());
            }
        }
    }

    /// `Next` and `TrackFinished` both land here. With no current track
    /// the queue head starts playing and stays in the queue; with one,
    /// the head is popped and the new head starts. When the queue is
    /// down to its last entry it is cleared and the current track slot
    /// is deliberately left as-is, matching the original jukebox.
    async fn advance(&mut self) {
        if self.current.is_none() {
            let head = self
                .queue
                .read()
                .unwrap_or_else(|e| e.into_inner())
                .first()
                .cloned();
            if let Some(track) = head {
                self.start_playback(track).await;
            }
        } else {
            let next = {
                let mut queue = self.queue.write().unwrap_or_else(|e| e.into_inner());
                if queue.len() > 1 {
                    queue.remove(0);
                    Some(queue[0].clone())
                } else {
                    queue.clear();
                    None
                }
            };
            match next {
                Some(track) => self.start_playback(track).await,
                None => {
                    if let Some(current) = &self.current {
                        debug!("queue exhausted after {}", current.track.title);
                    }
                }
            }
        }
    }

    async fn start_playback(&mut self, track: Track) {
        info!("playing {}", track.title);
        match self.services.output.play(&track.audio_path).await {
            Ok(ActivePlayback { control, finished }) => {
                let tx = self.tx.clone();
                let title = track.title.clone();
                tokio::spawn(async move {
                    if finished.await.is_ok() {
                        info!("finished playing {title}");
                        if let Some(tx) = tx.upgrade() {
                            let _ = tx.send(Command::TrackFinished).await;
                        }
                    }
                });
                self.current = Some(CurrentTrack {
                    track,
                    control: Some(control),
                });
            }
            Err(err) => {
                // No completion will ever arrive for this track; the
                // playlist stays on it until an explicit next command.
                error!("cannot play {}: {err}", track.title);
                self.current = Some(CurrentTrack {
                    track,
                    control: None,
                });
            }
        }
    }
}
