//! External collaborators consumed by the engine, plus their production
//! adapters. The engine only ever sees the traits.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::auto_apply::prompts::{build_cover_letter_prompt, COVER_LETTER_SYSTEM};
use crate::llm_client::{LlmClient, LlmError};
use crate::models::application::{ApplicationRecord, ApplicationStatus, Resume};
use crate::models::candidate::JobCandidate;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("upstream returned status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("every search source failed: {0}")]
    AllSourcesFailed(String),

    #[error("not configured: {0}")]
    NotConfigured(String),
}

#[async_trait]
pub trait JobSearchProvider: Send + Sync {
    /// Aggregates every configured board. Partial failures are tolerated;
    /// an error means nothing could be searched.
    async fn search(
        &self,
        keywords: &[String],
        locations: &[String],
        min_salary: Option<i64>,
    ) -> Result<Vec<JobCandidate>, ProviderError>;
}

#[async_trait]
pub trait ResumeProvider: Send + Sync {
    async fn get_default_resume(&self, user_id: Uuid) -> Result<Option<Resume>, ProviderError>;
}

#[async_trait]
pub trait CoverLetterProvider: Send + Sync {
    async fn generate_cover_letter(
        &self,
        job: &JobCandidate,
        resume: &Resume,
    ) -> Result<String, ProviderError>;
}

/// Outcome handed to the application history.
#[derive(Debug, Clone)]
pub struct ApplicationOutcome {
    pub user_id: Uuid,
    pub cycle_id: Option<Uuid>,
    pub status: ApplicationStatus,
    pub error: Option<String>,
}

#[async_trait]
pub trait ApplicationStore: Send + Sync {
    async fn create_application(
        &self,
        candidate: &JobCandidate,
        outcome: &ApplicationOutcome,
    ) -> Result<ApplicationRecord, ProviderError>;
}

#[derive(Debug, Clone, Serialize)]
pub struct EmailAttachment {
    pub filename: String,
    pub content_type: String,
    pub content: String,
}

#[async_trait]
pub trait EmailSender: Send + Sync {
    /// `Ok(false)` means the provider refused the message.
    async fn send(
        &self,
        to: &str,
        subject: &str,
        body: &str,
        attachments: &[EmailAttachment],
    ) -> Result<bool, ProviderError>;
}

// ────────────────────────────────────────────────────────────────────────────
// Job search over HTTP
// ────────────────────────────────────────────────────────────────────────────

/// One board endpoint of the search aggregator.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchSource {
    pub platform: String,
    pub url: String,
}

/// Parses `platform=url` pairs separated by commas.
pub fn parse_search_sources(raw: &str) -> Result<Vec<SearchSource>, String> {
    raw.split(',')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((platform, url)) if !platform.trim().is_empty() && url.trim().starts_with("http") => {
                Ok(SearchSource {
                    platform: platform.trim().to_lowercase(),
                    url: url.trim().to_string(),
                })
            }
            _ => Err(format!("invalid search source '{pair}', expected platform=url")),
        })
        .collect()
}

/// Queries every source with `GET {url}?keywords=..&locations=..&min_salary=..`
/// and expects a JSON array of postings.
pub struct HttpJobSearchProvider {
    client: Client,
    sources: Vec<SearchSource>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    title: String,
    company: String,
    url: String,
    #[serde(default)]
    platform: Option<String>,
    #[serde(default)]
    posted_date: Option<chrono::NaiveDate>,
    #[serde(default)]
    location: Option<String>,
    #[serde(default)]
    salary_min: Option<i64>,
    #[serde(default)]
    salary_max: Option<i64>,
    #[serde(default)]
    contact_email: Option<String>,
    #[serde(default)]
    external_id: Option<String>,
}

impl HttpJobSearchProvider {
    pub fn new(client: Client, sources: Vec<SearchSource>) -> Self {
        Self { client, sources }
    }

    async fn search_source(
        &self,
        source: &SearchSource,
        keywords: &[String],
        locations: &[String],
        min_salary: Option<i64>,
    ) -> Result<Vec<JobCandidate>, ProviderError> {
        let mut query = vec![
            ("keywords", keywords.join(",")),
            ("locations", locations.join(",")),
        ];
        if let Some(min) = min_salary {
            query.push(("min_salary", min.to_string()));
        }

        let response = self.client.get(&source.url).query(&query).send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let hits: Vec<SearchHit> = response.json().await?;
        Ok(hits
            .into_iter()
            .map(|hit| JobCandidate {
                platform: hit.platform.unwrap_or_else(|| source.platform.clone()),
                title: hit.title,
                company: hit.company,
                url: hit.url,
                posted_date: hit.posted_date,
                location: hit.location,
                salary_min: hit.salary_min,
                salary_max: hit.salary_max,
                contact_email: hit.contact_email,
                external_id: hit.external_id,
            })
            .collect())
    }
}

#[async_trait]
impl JobSearchProvider for HttpJobSearchProvider {
    async fn search(
        &self,
        keywords: &[String],
        locations: &[String],
        min_salary: Option<i64>,
    ) -> Result<Vec<JobCandidate>, ProviderError> {
        if self.sources.is_empty() {
            return Err(ProviderError::NotConfigured("no search sources".to_string()));
        }

        let mut results = Vec::new();
        let mut failures = Vec::new();
        for source in &self.sources {
            match self.search_source(source, keywords, locations, min_salary).await {
                Ok(found) => {
                    debug!("{} returned {} postings", source.platform, found.len());
                    results.extend(found);
                }
                Err(e) => {
                    warn!("Search source {} failed: {e}", source.platform);
                    failures.push(format!("{}: {e}", source.platform));
                }
            }
        }

        if failures.len() == self.sources.len() {
            return Err(ProviderError::AllSourcesFailed(failures.join("; ")));
        }
        Ok(results)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Cover letters via the shared LLM client
// ────────────────────────────────────────────────────────────────────────────

pub struct LlmCoverLetterProvider {
    llm: LlmClient,
}

impl LlmCoverLetterProvider {
    pub fn new(llm: LlmClient) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl CoverLetterProvider for LlmCoverLetterProvider {
    async fn generate_cover_letter(
        &self,
        job: &JobCandidate,
        resume: &Resume,
    ) -> Result<String, ProviderError> {
        let prompt = build_cover_letter_prompt(job, resume);
        Ok(self.llm.call_text(&prompt, COVER_LETTER_SYSTEM).await?)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Resumes and application history in PostgreSQL
// ────────────────────────────────────────────────────────────────────────────

/// Reads the CRUD side's `resumes` table and appends to its `applications` table.
pub struct PgApplicationRepository {
    pool: PgPool,
}

impl PgApplicationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ResumeProvider for PgApplicationRepository {
    async fn get_default_resume(&self, user_id: Uuid) -> Result<Option<Resume>, ProviderError> {
        Ok(sqlx::query_as::<_, Resume>(
            r#"
            SELECT id, user_id, title, content, full_name, email, phone
            FROM resumes
            WHERE user_id = $1 AND is_default
            ORDER BY updated_at DESC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?)
    }
}

#[async_trait]
impl ApplicationStore for PgApplicationRepository {
    async fn create_application(
        &self,
        candidate: &JobCandidate,
        outcome: &ApplicationOutcome,
    ) -> Result<ApplicationRecord, ProviderError> {
        let record = ApplicationRecord {
            id: Uuid::new_v4(),
            user_id: outcome.user_id,
            cycle_id: outcome.cycle_id,
            job_title: candidate.title.clone(),
            company: candidate.company.clone(),
            job_url: candidate.url.clone(),
            platform: candidate.platform.clone(),
            status: outcome.status,
            error: outcome.error.clone(),
            applied_at: Utc::now(),
        };

        sqlx::query(
            r#"
            INSERT INTO applications
                (id, user_id, cycle_id, job_title, company, job_url, platform, status, error, applied_at, source)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, 'auto_apply')
            "#,
        )
        .bind(record.id)
        .bind(record.user_id)
        .bind(record.cycle_id)
        .bind(&record.job_title)
        .bind(&record.company)
        .bind(&record.job_url)
        .bind(&record.platform)
        .bind(record.status.as_str())
        .bind(&record.error)
        .bind(record.applied_at)
        .execute(&self.pool)
        .await?;

        Ok(record)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Email over a transactional-mail HTTP API
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct EmailRequest<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    text: &'a str,
    attachments: &'a [EmailAttachment],
}

pub struct HttpEmailSender {
    client: Client,
    endpoint: String,
    api_key: String,
    from: String,
}

impl HttpEmailSender {
    pub fn new(client: Client, endpoint: String, api_key: String, from: String) -> Self {
        Self {
            client,
            endpoint,
            api_key,
            from,
        }
    }
}

#[async_trait]
impl EmailSender for HttpEmailSender {
    async fn send(
        &self,
        to: &str,
        subject: &str,
        body: &str,
        attachments: &[EmailAttachment],
    ) -> Result<bool, ProviderError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&EmailRequest {
                from: &self.from,
                to,
                subject,
                text: body,
                attachments,
            })
            .send()
            .await?;

        let status = response.status();
        if status.is_server_error() || status.as_u16() == 429 {
            let message = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                status: status.as_u16(),
                message,
            });
        }
        if !status.is_success() {
            warn!("Email API rejected message to {to}: {status}");
            return Ok(false);
        }
        Ok(true)
    }
}

/// Stand-in used when no email API is configured: every send is refused.
pub struct DisabledEmailSender;

#[async_trait]
impl EmailSender for DisabledEmailSender {
    async fn send(
        &self,
        to: &str,
        _subject: &str,
        _body: &str,
        _attachments: &[EmailAttachment],
    ) -> Result<bool, ProviderError> {
        Err(ProviderError::NotConfigured(format!(
            "EMAIL_API_URL is not set; cannot email {to}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode as AxumStatus, routing::get, Json, Router};
    use serde_json::json;

    #[test]
    fn test_parse_search_sources() {
        let sources = parse_search_sources(
            "Greenhouse=https://search.example.com/gh, lever=http://localhost:9000/lever,",
        )
        .unwrap();
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0].platform, "greenhouse");
        assert_eq!(sources[1].url, "http://localhost:9000/lever");

        assert!(parse_search_sources("greenhouse").is_err());
        assert!(parse_search_sources("=https://x.example.com").is_err());
    }

    /// Serves `GET /search` with a fixed status and JSON body.
    async fn search_server(status: u16, body: serde_json::Value) -> String {
        let app = Router::new().route(
            "/search",
            get(move || {
                let body = body.clone();
                async move {
                    (
                        AxumStatus::from_u16(status).unwrap_or(AxumStatus::OK),
                        Json(body),
                    )
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/search")
    }

    fn source(platform: &str, url: String) -> SearchSource {
        SearchSource {
            platform: platform.to_string(),
            url,
        }
    }

    #[tokio::test]
    async fn test_search_keeps_results_when_one_source_fails() {
        let broken = search_server(500, json!({ "error": "index rebuilding" })).await;
        let working = search_server(
            200,
            json!([
                {
                    "title": "Backend Engineer",
                    "company": "Hooli",
                    "url": "https://jobs.lever.co/hooli/1",
                    "salary_max": 150000
                },
                {
                    "title": "Platform Engineer",
                    "company": "Initech",
                    "url": "https://initech.example.com/jobs/7",
                    "platform": "email",
                    "contact_email": "jobs@initech.example.com"
                }
            ]),
        )
        .await;
        let provider = HttpJobSearchProvider::new(
            Client::new(),
            vec![source("greenhouse", broken), source("lever", working)],
        );

        let found = provider
            .search(&["rust".to_string()], &["Remote".to_string()], Some(100_000))
            .await
            .unwrap();

        assert_eq!(found.len(), 2);
        assert_eq!(found[0].platform, "lever");
        assert_eq!(found[0].salary_max, Some(150_000));
        assert_eq!(found[1].platform, "email");
        assert_eq!(found[1].contact_email.as_deref(), Some("jobs@initech.example.com"));
    }

    #[tokio::test]
    async fn test_search_fails_when_every_source_fails() {
        let first = search_server(500, json!({ "error": "down" })).await;
        let second = search_server(503, json!({ "error": "maintenance" })).await;
        let provider = HttpJobSearchProvider::new(
            Client::new(),
            vec![source("greenhouse", first), source("lever", second)],
        );

        match provider.search(&["rust".to_string()], &[], None).await {
            Err(ProviderError::AllSourcesFailed(message)) => {
                assert!(message.contains("greenhouse"));
                assert!(message.contains("lever"));
            }
            other => panic!("expected every source to fail, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_search_without_sources_is_not_configured() {
        let provider = HttpJobSearchProvider::new(Client::new(), vec![]);
        let result = provider.search(&["rust".to_string()], &[], None).await;
        assert!(matches!(result, Err(ProviderError::NotConfigured(_))));
    }

    #[tokio::test]
    async fn test_disabled_email_sender_refuses() {
        let result = DisabledEmailSender.send("a@b.c", "s", "b", &[]).await;
        assert!(matches!(result, Err(ProviderError::NotConfigured(_))));
    }
}
