//! The browser-automation resource owned by one cycle.
//!
//! A `Session` launches its browser lazily on first `acquire`, hands out at
//! most one `SessionHandle` at a time and is released unconditionally by the
//! orchestrator when the cycle ends. The temporary profile directory is
//! removed on release, and again on drop if release never ran.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tempfile::TempDir;
use thiserror::Error;
use tokio::sync::{MappedMutexGuard, Mutex, MutexGuard};
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum BrowserError {
    /// Page load or network failure. Worth one retry.
    #[error("navigation failed: {0}")]
    Navigation(String),

    /// The page no longer matches the form script. Never retried.
    #[error("element not found: {selector}")]
    ElementNotFound { selector: String },

    #[error("browser session already in use")]
    SessionBusy,

    #[error("failed to launch browser: {0}")]
    Launch(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl BrowserError {
    pub fn is_transient(&self) -> bool {
        matches!(self, BrowserError::Navigation(_))
    }
}

/// Page-level primitives a form script needs.
#[async_trait]
pub trait BrowserContext: Send + Sync {
    async fn goto(&mut self, url: &str) -> Result<(), BrowserError>;
    async fn click(&mut self, selector: &str) -> Result<(), BrowserError>;
    async fn fill(&mut self, selector: &str, value: &str) -> Result<(), BrowserError>;
    async fn upload(&mut self, selector: &str, file: &Path) -> Result<(), BrowserError>;
    async fn wait_for(&mut self, selector: &str) -> Result<(), BrowserError>;
    async fn screenshot(&mut self) -> Result<Vec<u8>, BrowserError>;
    async fn close(self: Box<Self>) -> Result<(), BrowserError>;
}

#[async_trait]
pub trait BrowserDriver: Send + Sync {
    async fn launch(&self, profile_dir: &Path) -> Result<Box<dyn BrowserContext>, BrowserError>;
}

struct LiveBrowser {
    context: Box<dyn BrowserContext>,
    profile: TempDir,
}

pub struct Session {
    driver: Arc<dyn BrowserDriver>,
    slot: Mutex<Option<LiveBrowser>>,
}

/// Exclusive access to the cycle's browser for one attempt.
pub struct SessionHandle<'a> {
    live: MappedMutexGuard<'a, LiveBrowser>,
}

impl SessionHandle<'_> {
    pub fn browser(&mut self) -> &mut dyn BrowserContext {
        self.live.context.as_mut()
    }

    /// Per-session scratch space, e.g. for resume files to upload.
    pub fn scratch_dir(&self) -> PathBuf {
        self.live.profile.path().join("scratch")
    }
}

impl Session {
    pub fn new(driver: Arc<dyn BrowserDriver>) -> Self {
        Self {
            driver,
            slot: Mutex::new(None),
        }
    }

    pub async fn acquire(&self) -> Result<SessionHandle<'_>, BrowserError> {
        let mut slot = self.slot.try_lock().map_err(|_| BrowserError::SessionBusy)?;

        if slot.is_none() {
            let profile = tempfile::Builder::new()
                .prefix("autoapply-profile-")
                .tempdir()?;
            std::fs::create_dir_all(profile.path().join("scratch"))?;
            debug!("Launching browser with profile {}", profile.path().display());
            let context = self.driver.launch(profile.path()).await?;
            *slot = Some(LiveBrowser { context, profile });
        }

        let live = MutexGuard::try_map(slot, |s| s.as_mut())
            .map_err(|_| BrowserError::Launch("browser context missing".to_string()))?;
        Ok(SessionHandle { live })
    }

    #[cfg(test)]
    pub async fn is_live(&self) -> bool {
        self.slot.lock().await.is_some()
    }

    /// Closes the browser and deletes its profile. Safe to call repeatedly.
    pub async fn release(&self) {
        let live = self.slot.lock().await.take();
        let Some(LiveBrowser { context, profile }) = live else {
            return;
        };
        if let Err(e) = context.close().await {
            warn!("Browser did not close cleanly: {e}");
        }
        let path = profile.path().to_path_buf();
        if let Err(e) = profile.close() {
            warn!("Failed to remove browser profile {}: {e}", path.display());
        } else {
            debug!("Released browser session, removed {}", path.display());
        }
    }
}
