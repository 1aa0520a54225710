use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use juke::config::Settings;
use juke::http::{self, AppContext};
use juke::playback::RodioOutput;
use juke::playlist::{Playlist, Services};
use juke::source::RustyYtdlSource;
use juke::transcode::FfmpegTranscoder;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "juke=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config_path = std::env::var("JUKE_CONFIG").unwrap_or_else(|_| "juke.json".to_string());
    let settings = match Settings::load(Path::new(&config_path)) {
        Ok(settings) => settings,
        Err(err) => {
            info!("no settings loaded from {config_path} ({err:#}); using defaults");
            Settings::default()
        }
    };

    std::fs::create_dir_all(&settings.cache_dir).with_context(|| {
        format!("failed to create cache dir {}", settings.cache_dir.display())
    })?;

    let output = RodioOutput::spawn().context("failed to open audio output")?;
    let source = Arc::new(RustyYtdlSource);
    let playlist = Playlist::spawn(Services {
        source: source.clone(),
        transcoder: Arc::new(FfmpegTranscoder::new(settings.ffmpeg.clone())),
        output: Arc::new(output),
    });

    let ctx = AppContext {
        playlist,
        source,
        cache_dir: settings.cache_dir.clone(),
    };
    http::serve(ctx, &settings.bind_addr).await
}
