use reqwest::{Client, StatusCode};
use serde::Serialize;

use crate::auto_apply::platforms::PlatformSpec;
use crate::auto_apply::submit::{AttemptError, AttemptRequest, Failure};

#[derive(Debug, Serialize)]
struct Applicant<'a> {
    name: &'a str,
    email: &'a str,
    phone: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct DirectApplication<'a> {
    job_id: Option<&'a str>,
    job_url: &'a str,
    title: &'a str,
    company: &'a str,
    applicant: Applicant<'a>,
    resume_text: &'a str,
    cover_letter: Option<&'a str>,
}

/// Posts the application as JSON to the platform's apply API.
pub struct DirectSubmit {
    client: Client,
}

impl DirectSubmit {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub async fn submit(
        &self,
        spec: &PlatformSpec,
        request: &AttemptRequest<'_>,
    ) -> Result<(), Failure> {
        let endpoint = spec
            .apply_endpoint
            .as_deref()
            .ok_or_else(|| Failure::structural(format!("{} has no apply endpoint", spec.id)))?;

        let job = request.candidate;
        let body = DirectApplication {
            job_id: job.external_id.as_deref(),
            job_url: &job.url,
            title: &job.title,
            company: &job.company,
            applicant: Applicant {
                name: &request.resume.full_name,
                email: &request.resume.email,
                phone: request.resume.phone.as_deref(),
            },
            resume_text: &request.resume.content,
            cover_letter: request.cover_letter,
        };

        let response = self
            .client
            .post(endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| Failure::transient(format!("request to {endpoint} failed: {e}")))?;

        let status = response.status();
        match classify_status(status) {
            None => Ok(()),
            Some(error) => {
                let detail = response.text().await.unwrap_or_default();
                let error = match error {
                    AttemptError::Structural(m) => AttemptError::Structural(with_detail(m, &detail)),
                    AttemptError::Transient(m) => AttemptError::Transient(with_detail(m, &detail)),
                    other => other,
                };
                Err(Failure {
                    error,
                    artifact: None,
                })
            }
        }
    }
}

/// 2xx is success; 408, 429 and 5xx are worth a retry; any other status
/// means the platform rejected the application.
pub fn classify_status(status: StatusCode) -> Option<AttemptError> {
    if status.is_success() {
        None
    } else if status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
    {
        Some(AttemptError::Transient(format!("apply API returned {status}")))
    } else {
        Some(AttemptError::Structural(format!("apply API returned {status}")))
    }
}

fn with_detail(message: String, detail: &str) -> String {
    let detail = detail.trim();
    if detail.is_empty() {
        message
    } else {
        format!("{message}: {}", detail.chars().take(200).collect::<String>())
    }
}
