use std::path::Path;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::auto_apply::platforms::{FormScript, PlatformSpec};
use crate::auto_apply::session::{BrowserContext, BrowserError, Session};
use crate::auto_apply::submit::{AttemptError, AttemptRequest, Failure};

/// Drives the cycle's browser through a platform's form script.
#[derive(Debug, Default)]
pub struct BrowserSubmit;

impl BrowserSubmit {
    pub async fn submit(
        &self,
        spec: &PlatformSpec,
        request: &AttemptRequest<'_>,
        session: &Session,
    ) -> Result<(), Failure> {
        let form = spec
            .form
            .as_ref()
            .ok_or_else(|| Failure::structural(format!("{} has no form script", spec.id)))?;

        let mut handle = session.acquire().await.map_err(|e| match e {
            BrowserError::SessionBusy => Failure::transient(e.to_string()),
            other => Failure::transient(format!("browser unavailable: {other}")),
        })?;

        let resume_path = handle
            .scratch_dir()
            .join(format!("resume-{}.txt", Uuid::new_v4()));
        tokio::fs::write(&resume_path, &request.resume.content)
            .await
            .map_err(|e| Failure::transient(format!("failed to stage resume: {e}")))?;

        let browser = handle.browser();
        let result = run_script(browser, form, request, &resume_path).await;
        if let Err(e) = tokio::fs::remove_file(&resume_path).await {
            debug!("Could not remove staged resume {}: {e}", resume_path.display());
        }

        match result {
            Ok(()) => Ok(()),
            Err(e) if e.is_transient() => Err(Failure::transient(e.to_string())),
            Err(e) => {
                let artifact = match browser.screenshot().await {
                    Ok(png) => Some(png),
                    Err(shot) => {
                        warn!("Failed to capture screenshot after '{e}': {shot}");
                        None
                    }
                };
                Err(Failure {
                    error: AttemptError::Structural(e.to_string()),
                    artifact,
                })
            }
        }
    }
}

async fn run_script(
    browser: &mut dyn BrowserContext,
    form: &FormScript,
    request: &AttemptRequest<'_>,
    resume_path: &Path,
) -> Result<(), BrowserError> {
    let resume = request.resume;

    browser.goto(&request.candidate.url).await?;
    if let Some(apply) = &form.apply_button {
        browser.click(apply).await?;
    }

    let fields = [
        (&form.name_field, Some(resume.full_name.as_str())),
        (&form.email_field, Some(resume.email.as_str())),
        (&form.phone_field, resume.phone.as_deref()),
        (&form.cover_letter_field, request.cover_letter),
    ];
    for (selector, value) in fields {
        if let (Some(selector), Some(value)) = (selector, value) {
            browser.fill(selector, value).await?;
        }
    }

    browser.upload(&form.resume_upload, resume_path).await?;
    browser.click(&form.submit_button).await?;
    browser.wait_for(&form.confirmation).await
}
