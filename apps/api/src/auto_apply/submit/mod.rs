//! Submission strategies and the retry/timeout policy around them.
//!
//! Dispatch is a pure lookup from platform id to [`PlatformHandler`]. Every
//! attempt runs under the platform's timeout; transient failures get exactly
//! one retry after a backoff, structural failures none.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

use crate::auto_apply::platforms::{HandlerKind, PlatformRegistry, PlatformSpec};
use crate::auto_apply::session::Session;
use crate::models::application::Resume;
use crate::models::candidate::JobCandidate;

pub mod browser;
pub mod direct;
pub mod email;

pub use browser::BrowserSubmit;
pub use direct::DirectSubmit;
pub use email::EmailSubmit;

const MAX_ATTEMPTS: u32 = 2;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum AttemptError {
    #[error("no automated submission for platform '{0}'")]
    Unsupported(String),

    /// The target rejected the application or its page no longer matches.
    #[error("automation failed: {0}")]
    Structural(String),

    #[error("transient failure: {0}")]
    Transient(String),
}

impl AttemptError {
    pub fn is_transient(&self) -> bool {
        matches!(self, AttemptError::Transient(_))
    }
}

/// A failed try, with a screenshot when one could be captured.
#[derive(Debug)]
pub struct Failure {
    pub error: AttemptError,
    pub artifact: Option<Vec<u8>>,
}

impl Failure {
    pub fn structural(message: impl Into<String>) -> Self {
        Self {
            error: AttemptError::Structural(message.into()),
            artifact: None,
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            error: AttemptError::Transient(message.into()),
            artifact: None,
        }
    }
}

#[derive(Debug)]
pub struct AttemptResult {
    pub success: bool,
    pub error: Option<AttemptError>,
    pub artifact: Option<Vec<u8>>,
    pub attempts: u32,
}

/// Everything a strategy needs to apply for one candidate.
pub struct AttemptRequest<'a> {
    pub candidate: &'a JobCandidate,
    pub resume: &'a Resume,
    pub cover_letter: Option<&'a str>,
}

pub enum PlatformHandler<'a> {
    DirectSubmit(&'a DirectSubmit),
    BrowserAutomationSubmit(&'a BrowserSubmit),
    EmailSubmit(&'a EmailSubmit),
    Unsupported,
}

impl PlatformHandler<'_> {
    pub fn kind(&self) -> HandlerKind {
        match self {
            PlatformHandler::DirectSubmit(_) => HandlerKind::DirectSubmit,
            PlatformHandler::BrowserAutomationSubmit(_) => HandlerKind::BrowserAutomationSubmit,
            PlatformHandler::EmailSubmit(_) => HandlerKind::EmailSubmit,
            PlatformHandler::Unsupported => HandlerKind::Unsupported,
        }
    }
}

pub struct Handlers {
    registry: Arc<PlatformRegistry>,
    direct: DirectSubmit,
    browser: BrowserSubmit,
    email: EmailSubmit,
    retry_backoff: Duration,
}

impl Handlers {
    pub fn new(
        registry: Arc<PlatformRegistry>,
        direct: DirectSubmit,
        browser: BrowserSubmit,
        email: EmailSubmit,
        retry_backoff: Duration,
    ) -> Self {
        Self {
            registry,
            direct,
            browser,
            email,
            retry_backoff,
        }
    }

    pub fn dispatch(&self, platform: &str) -> PlatformHandler<'_> {
        match self.registry.resolve(platform) {
            HandlerKind::DirectSubmit => PlatformHandler::DirectSubmit(&self.direct),
            HandlerKind::BrowserAutomationSubmit => {
                PlatformHandler::BrowserAutomationSubmit(&self.browser)
            }
            HandlerKind::EmailSubmit => PlatformHandler::EmailSubmit(&self.email),
            HandlerKind::Unsupported => PlatformHandler::Unsupported,
        }
    }

    /// Runs one application through its platform's strategy, retrying a
    /// transient failure once.
    pub async fn attempt(&self, request: &AttemptRequest<'_>, session: &Session) -> AttemptResult {
        let platform = request.candidate.platform.as_str();
        let handler = self.dispatch(platform);
        let spec = match (&handler, self.registry.get(platform)) {
            (PlatformHandler::Unsupported, _) | (_, None) => {
                return AttemptResult {
                    success: false,
                    error: Some(AttemptError::Unsupported(platform.to_string())),
                    artifact: None,
                    attempts: 0,
                }
            }
            (_, Some(spec)) => spec,
        };

        let mut attempts = 0;
        loop {
            attempts += 1;
            let outcome = self.try_once(&handler, spec, request, session).await;
            match outcome {
                Ok(()) => {
                    debug!(
                        "Submitted '{}' at {} via {:?}",
                        request.candidate.title,
                        request.candidate.company,
                        handler.kind()
                    );
                    return AttemptResult {
                        success: true,
                        error: None,
                        artifact: None,
                        attempts,
                    };
                }
                Err(failure) if failure.error.is_transient() && attempts < MAX_ATTEMPTS => {
                    warn!(
                        "Attempt {attempts} for '{}' on {platform} failed ({}), retrying in {:?}",
                        request.candidate.title, failure.error, self.retry_backoff
                    );
                    tokio::time::sleep(self.retry_backoff).await;
                }
                Err(failure) => {
                    return AttemptResult {
                        success: false,
                        error: Some(failure.error),
                        artifact: failure.artifact,
                        attempts,
                    }
                }
            }
        }
    }

    async fn try_once(
        &self,
        handler: &PlatformHandler<'_>,
        spec: &PlatformSpec,
        request: &AttemptRequest<'_>,
        session: &Session,
    ) -> Result<(), Failure> {
        let run = async {
            match handler {
                PlatformHandler::DirectSubmit(h) => h.submit(spec, request).await,
                PlatformHandler::BrowserAutomationSubmit(h) => {
                    h.submit(spec, request, session).await
                }
                PlatformHandler::EmailSubmit(h) => h.submit(request).await,
                PlatformHandler::Unsupported => Err(Failure {
                    error: AttemptError::Unsupported(spec.id.clone()),
                    artifact: None,
                }),
            }
        };

        match tokio::time::timeout(spec.timeout(), run).await {
            Ok(result) => result,
            Err(_) => Err(Failure::transient(format!(
                "timed out after {}s",
                spec.timeout_secs
            ))),
        }
    }
}
