//! A network-controlled audio jukebox.
//!
//! Clients submit track identifiers and transport commands over HTTP;
//! the playlist sequencer fetches, caches, transcodes, and plays tracks
//! in queue order. See [`playlist::Playlist`] for the core.

pub mod config;
pub mod http;
pub mod playback;
pub mod playlist;
pub mod source;
pub mod track;
pub mod transcode;

pub use playlist::{Command, Playlist, Services};
pub use track::{PrepState, Track};
