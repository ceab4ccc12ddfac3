//! Music playback tools
//!
//! The DJ agent can resume and pause playback. Both tools report a plain
//! boolean; failures are logged and reported as `false`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tower::BoxError;
use tracing::{debug, error, warn};

use crate::core::{tool_typed, ToolDef};
use crate::tools::microwave::NoArgs;

#[derive(Debug, Error)]
pub enum MusicError {
    #[error("no access token configured for the music player")]
    MissingToken,

    #[error("music player unavailable")]
    Unavailable,

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

#[async_trait]
pub trait MusicPlayer: Send + Sync + 'static {
    /// `Ok(false)` when the player refused the request.
    async fn resume(&self) -> Result<bool, MusicError>;

    async fn pause(&self) -> Result<bool, MusicError>;
}

/// Player behind a Spotify-style Web API (`PUT me/player/play|pause`).
#[derive(Debug, Clone)]
pub struct HttpMusicPlayer {
    client: reqwest::Client,
    base_url: String,
    access_token: Option<String>,
}

impl HttpMusicPlayer {
    pub fn new(client: reqwest::Client, base_url: &str, access_token: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            access_token,
        }
    }

    async fn put(&self, action: &str) -> Result<bool, MusicError> {
        let token = self.access_token.as_deref().ok_or(MusicError::MissingToken)?;
        let response = self
            .client
            .put(format!("{}/me/player/{}", self.base_url, action))
            .bearer_auth(token)
            .header(reqwest::header::CONTENT_LENGTH, 0)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            debug!(%status, action, "music player refused request");
        }
        Ok(status.is_success())
    }
}

#[async_trait]
impl MusicPlayer for HttpMusicPlayer {
    async fn resume(&self) -> Result<bool, MusicError> {
        self.put("play").await
    }

    async fn pause(&self) -> Result<bool, MusicError> {
        self.put("pause").await
    }
}

/// Player kept in memory, for tests and offline demos.
#[derive(Debug)]
pub struct InMemoryMusicPlayer {
    playing: AtomicBool,
    available: AtomicBool,
}

impl Default for InMemoryMusicPlayer {
    fn default() -> Self {
        Self {
            playing: AtomicBool::new(false),
            available: AtomicBool::new(true),
        }
    }
}

impl InMemoryMusicPlayer {
    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }

    /// Make every later call fail as if the player were offline.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn set_playing(&self, playing: bool) -> Result<bool, MusicError> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(MusicError::Unavailable);
        }
        self.playing.store(playing, Ordering::SeqCst);
        Ok(true)
    }
}

#[async_trait]
impl MusicPlayer for InMemoryMusicPlayer {
    async fn resume(&self) -> Result<bool, MusicError> {
        self.set_playing(true)
    }

    async fn pause(&self) -> Result<bool, MusicError> {
        self.set_playing(false)
    }
}

#[derive(Clone)]
pub struct MusicTools {
    player: Arc<dyn MusicPlayer>,
}

impl MusicTools {
    pub fn new(player: Arc<dyn MusicPlayer>) -> Self {
        Self { player }
    }

    pub async fn resume(&self) -> bool {
        match self.player.resume().await {
            Ok(true) => {
                debug!("Resumed music");
                true
            }
            Ok(false) => {
                warn!("Failed to resume the music");
                false
            }
            Err(e) => {
                error!(error = %e, "Failed to resume the music");
                false
            }
        }
    }

    pub async fn pause(&self) -> bool {
        match self.player.pause().await {
            Ok(true) => {
                debug!("Paused music");
                true
            }
            Ok(false) => {
                warn!("Failed to pause the music");
                false
            }
            Err(e) => {
                error!(error = %e, "Failed to pause the music");
                false
            }
        }
    }

    pub fn tool_defs(&self) -> Vec<ToolDef> {
        let resume = self.clone();
        let pause = self.clone();
        vec![
            tool_typed(
                "resume_music",
                "Resumes the music. Returns the success status of resuming.",
                move |_: NoArgs| {
                    let tools = resume.clone();
                    async move { Ok::<_, BoxError>(tools.resume().await) }
                },
            ),
            tool_typed(
                "pause_music",
                "Pause the music. Returns the success status of pausing.",
                move |_: NoArgs| {
                    let tools = pause.clone();
                    async move { Ok::<_, BoxError>(tools.pause().await) }
                },
            ),
        ]
    }
}
