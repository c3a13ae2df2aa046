//! Fakes for every collaborator trait, shared by the engine's unit tests.

use std::collections::{HashSet, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use crate::auto_apply::activity::ActivityLog;
use crate::auto_apply::duplicate::DuplicateDetector;
use crate::auto_apply::engine::AutoApplyEngine;
use crate::auto_apply::orchestrator::{Collaborators, CycleOrchestrator};
use crate::auto_apply::platforms::{
    default_registry, FormScript, HandlerKind, PlatformRegistry, PlatformSpec,
};
use crate::auto_apply::providers::{
    ApplicationOutcome, ApplicationStore, CoverLetterProvider, EmailAttachment, EmailSender,
    JobSearchProvider, ProviderError, ResumeProvider,
};
use crate::auto_apply::queue::ReviewQueue;
use crate::auto_apply::rate_limiter::RateLimiter;
use crate::auto_apply::session::{BrowserContext, BrowserDriver, BrowserError};
use crate::auto_apply::submit::{BrowserSubmit, DirectSubmit, EmailSubmit, Handlers};
use crate::models::application::{ApplicationRecord, ApplicationStatus, Resume};
use crate::models::candidate::JobCandidate;
use crate::models::config::AutoApplyConfig;
use crate::store::memory::{
    MemoryArtifactStore, MemoryConfigStore, MemoryCounterStore, MemoryCycleStore,
    MemoryDuplicateIndex, MemoryQueueStore,
};
use crate::store::{CounterKey, CounterStore, StoreError};

pub fn candidate(platform: &str, title: &str, company: &str) -> JobCandidate {
    JobCandidate {
        platform: platform.to_string(),
        title: title.to_string(),
        company: company.to_string(),
        url: format!(
            "https://{platform}.example.com/jobs/{}",
            title.to_lowercase().replace(' ', "-")
        ),
        posted_date: None,
        location: Some("Remote".to_string()),
        salary_min: None,
        salary_max: None,
        contact_email: Some(format!("jobs@{}.example.com", company.to_lowercase())),
        external_id: Some(Uuid::new_v4().to_string()),
    }
}

pub fn resume(user_id: Uuid) -> Resume {
    Resume {
        id: Uuid::new_v4(),
        user_id,
        title: "Default".to_string(),
        content: "Sam Doe\nStaff engineer. Rust, Postgres, Kubernetes.".to_string(),
        full_name: "Sam Doe".to_string(),
        email: "sam@example.com".to_string(),
        phone: Some("+1 555 0100".to_string()),
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Browser
// ────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct BrowserState {
    launches: usize,
    closes: usize,
    missing: HashSet<String>,
    navigation_failures: u32,
    hanging: bool,
    visited: Vec<String>,
    filled: Vec<(String, String)>,
}

/// Scriptable browser. Selectors in `missing` fail as structural errors and
/// the first `navigation_failures` page loads fail as transient ones.
#[derive(Clone, Default)]
pub struct FakeBrowser {
    state: Arc<Mutex<BrowserState>>,
    in_use: Arc<AtomicUsize>,
    max_in_use: Arc<AtomicUsize>,
}

impl FakeBrowser {
    pub fn with_missing(selector: &str) -> Self {
        let browser = Self::default();
        browser.state.lock().unwrap().missing.insert(selector.to_string());
        browser
    }

    pub fn failing_navigations(self, n: u32) -> Self {
        self.state.lock().unwrap().navigation_failures = n;
        self
    }

    /// Page loads never complete.
    pub fn hanging(self) -> Self {
        self.state.lock().unwrap().hanging = true;
        self
    }

    pub fn launches(&self) -> usize {
        self.state.lock().unwrap().launches
    }

    pub fn closes(&self) -> usize {
        self.state.lock().unwrap().closes
    }

    pub fn visited(&self) -> Vec<String> {
        self.state.lock().unwrap().visited.clone()
    }

    pub fn filled(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().filled.clone()
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_in_use.load(Ordering::SeqCst)
    }
}

struct FakePage {
    browser: FakeBrowser,
}

impl FakePage {
    fn check(&self, selector: &str) -> Result<(), BrowserError> {
        if self.browser.state.lock().unwrap().missing.contains(selector) {
            return Err(BrowserError::ElementNotFound {
                selector: selector.to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl BrowserContext for FakePage {
    async fn goto(&mut self, url: &str) -> Result<(), BrowserError> {
        let hanging = self.browser.state.lock().unwrap().hanging;
        if hanging {
            std::future::pending::<()>().await;
        }
        let now = self.browser.in_use.fetch_add(1, Ordering::SeqCst) + 1;
        self.browser.max_in_use.fetch_max(now, Ordering::SeqCst);
        tokio::task::yield_now().await;
        self.browser.in_use.fetch_sub(1, Ordering::SeqCst);

        let mut state = self.browser.state.lock().unwrap();
        if state.navigation_failures > 0 {
            state.navigation_failures -= 1;
            return Err(BrowserError::Navigation(format!("timeout loading {url}")));
        }
        state.visited.push(url.to_string());
        Ok(())
    }

    async fn click(&mut self, selector: &str) -> Result<(), BrowserError> {
        self.check(selector)
    }

    async fn fill(&mut self, selector: &str, value: &str) -> Result<(), BrowserError> {
        self.check(selector)?;
        self.browser
            .state
            .lock()
            .unwrap()
            .filled
            .push((selector.to_string(), value.to_string()));
        Ok(())
    }

    async fn upload(&mut self, selector: &str, file: &Path) -> Result<(), BrowserError> {
        self.check(selector)?;
        if !file.exists() {
            return Err(BrowserError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                file.display().to_string(),
            )));
        }
        Ok(())
    }

    async fn wait_for(&mut self, selector: &str) -> Result<(), BrowserError> {
        self.check(selector)
    }

    async fn screenshot(&mut self) -> Result<Vec<u8>, BrowserError> {
        Ok(b"\x89PNG fake".to_vec())
    }

    async fn close(self: Box<Self>) -> Result<(), BrowserError> {
        self.browser.state.lock().unwrap().closes += 1;
        Ok(())
    }
}

#[async_trait]
impl BrowserDriver for FakeBrowser {
    async fn launch(&self, _profile_dir: &Path) -> Result<Box<dyn BrowserContext>, BrowserError> {
        self.state.lock().unwrap().launches += 1;
        Ok(Box::new(FakePage {
            browser: self.clone(),
        }))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Providers
// ────────────────────────────────────────────────────────────────────────────

/// Returns queued batches in order; once drained, returns empty results.
#[derive(Default)]
pub struct FakeSearch {
    batches: Mutex<VecDeque<Result<Vec<JobCandidate>, String>>>,
    calls: AtomicUsize,
}

impl FakeSearch {
    pub fn returning(candidates: Vec<JobCandidate>) -> Self {
        let search = Self::default();
        search.push(Ok(candidates));
        search
    }

    pub fn failing(message: &str) -> Self {
        let search = Self::default();
        search.push(Err(message.to_string()));
        search
    }

    pub fn push(&self, batch: Result<Vec<JobCandidate>, String>) {
        self.batches.lock().unwrap().push_back(batch);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl JobSearchProvider for FakeSearch {
    async fn search(
        &self,
        _keywords: &[String],
        _locations: &[String],
        _min_salary: Option<i64>,
    ) -> Result<Vec<JobCandidate>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.batches.lock().unwrap().pop_front() {
            Some(Ok(batch)) => Ok(batch),
            Some(Err(message)) => Err(ProviderError::AllSourcesFailed(message)),
            None => Ok(vec![]),
        }
    }
}

pub struct FakeResumes {
    pub present: bool,
}

#[async_trait]
impl ResumeProvider for FakeResumes {
    async fn get_default_resume(&self, user_id: Uuid) -> Result<Option<Resume>, ProviderError> {
        Ok(self.present.then(|| resume(user_id)))
    }
}

pub struct FakeCoverLetters {
    pub fail: bool,
}

#[async_trait]
impl CoverLetterProvider for FakeCoverLetters {
    async fn generate_cover_letter(
        &self,
        job: &JobCandidate,
        resume: &Resume,
    ) -> Result<String, ProviderError> {
        if self.fail {
            return Err(ProviderError::NotConfigured("llm offline".to_string()));
        }
        Ok(format!(
            "Dear {} team, I would like to join as {}. {}",
            job.company, job.title, resume.full_name
        ))
    }
}

#[derive(Default)]
pub struct FakeApplications {
    records: Mutex<Vec<(JobCandidate, ApplicationStatus)>>,
}

impl FakeApplications {
    pub fn records(&self) -> Vec<(JobCandidate, ApplicationStatus)> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl ApplicationStore for FakeApplications {
    async fn create_application(
        &self,
        candidate: &JobCandidate,
        outcome: &ApplicationOutcome,
    ) -> Result<ApplicationRecord, ProviderError> {
        self.records
            .lock()
            .unwrap()
            .push((candidate.clone(), outcome.status));
        Ok(ApplicationRecord {
            id: Uuid::new_v4(),
            user_id: outcome.user_id,
            cycle_id: outcome.cycle_id,
            job_title: candidate.title.clone(),
            company: candidate.company.clone(),
            job_url: candidate.url.clone(),
            platform: candidate.platform.clone(),
            status: outcome.status,
            error: outcome.error.clone(),
            applied_at: chrono::Utc::now(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct SentEmail {
    pub to: String,
    pub subject: String,
    pub body: String,
    pub attachments: usize,
}

type SendHook = Box<dyn Fn(usize) + Send + Sync>;

/// Records every message. `fail_first` sends error out as transport
/// failures before sends start succeeding; `on_send` sees the 1-based count
/// of successful sends.
#[derive(Default)]
pub struct FakeEmail {
    sent: Mutex<Vec<SentEmail>>,
    fail_first: AtomicUsize,
    refuse: bool,
    on_send: Option<SendHook>,
}

impl FakeEmail {
    pub fn failing_first(n: usize) -> Self {
        let email = Self::default();
        email.fail_first.store(n, Ordering::SeqCst);
        email
    }

    pub fn refusing() -> Self {
        Self {
            refuse: true,
            ..Self::default()
        }
    }

    pub fn with_hook(hook: impl Fn(usize) + Send + Sync + 'static) -> Self {
        Self {
            on_send: Some(Box::new(hook)),
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<SentEmail> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl EmailSender for FakeEmail {
    async fn send(
        &self,
        to: &str,
        subject: &str,
        body: &str,
        attachments: &[EmailAttachment],
    ) -> Result<bool, ProviderError> {
        if self
            .fail_first
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(ProviderError::Status {
                status: 503,
                message: "mail relay unavailable".to_string(),
            });
        }
        if self.refuse {
            return Ok(false);
        }
        let count = {
            let mut sent = self.sent.lock().unwrap();
            sent.push(SentEmail {
                to: to.to_string(),
                subject: subject.to_string(),
                body: body.to_string(),
                attachments: attachments.len(),
            });
            sent.len()
        };
        if let Some(hook) = &self.on_send {
            hook(count);
        }
        Ok(true)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Wiring
// ────────────────────────────────────────────────────────────────────────────

pub fn active_config(daily_limit: u32) -> AutoApplyConfig {
    let mut config = AutoApplyConfig::new(Uuid::new_v4());
    config.keywords = vec!["rust".to_string()];
    config.locations = vec!["Remote".to_string()];
    config.daily_limit = daily_limit;
    config.is_active = true;
    config
}

pub fn email_platform(id: &str, hourly_limit: u32, daily_limit: u32) -> PlatformSpec {
    PlatformSpec {
        id: id.to_string(),
        handler: HandlerKind::EmailSubmit,
        hourly_limit,
        daily_limit,
        timeout_secs: 5,
        apply_endpoint: None,
        form: None,
    }
}

pub fn browser_platform(id: &str, timeout_secs: u64) -> PlatformSpec {
    PlatformSpec {
        id: id.to_string(),
        handler: HandlerKind::BrowserAutomationSubmit,
        hourly_limit: 10,
        daily_limit: 50,
        timeout_secs,
        apply_endpoint: None,
        form: Some(FormScript {
            apply_button: None,
            name_field: Some("#name".to_string()),
            email_field: Some("#email".to_string()),
            phone_field: None,
            resume_upload: "#resume".to_string(),
            cover_letter_field: None,
            submit_button: "#submit".to_string(),
            confirmation: "#done".to_string(),
        }),
    }
}

struct DownCounters;

#[async_trait]
impl CounterStore for DownCounters {
    async fn try_increment(&self, _keys: &[CounterKey]) -> Result<Option<usize>, StoreError> {
        Err(StoreError::Unavailable("redis: connection refused".to_string()))
    }
}

/// In-memory stores and fakes for a whole engine.
pub struct Harness {
    pub search: Arc<FakeSearch>,
    pub email: Arc<FakeEmail>,
    pub browser: FakeBrowser,
    pub applications: Arc<FakeApplications>,
    pub artifacts: Arc<MemoryArtifactStore>,
    pub activity: Arc<ActivityLog>,
    configs: Arc<MemoryConfigStore>,
    queue_store: Arc<MemoryQueueStore>,
    counters: Arc<dyn CounterStore>,
    duplicates: Arc<MemoryDuplicateIndex>,
    registry: Arc<PlatformRegistry>,
    resume_present: bool,
    cover_letters_fail: bool,
}

impl Harness {
    pub fn new(search: FakeSearch) -> Self {
        let artifacts = Arc::new(MemoryArtifactStore::default());
        Self {
            search: Arc::new(search),
            email: Arc::new(FakeEmail::default()),
            browser: FakeBrowser::default(),
            applications: Arc::new(FakeApplications::default()),
            activity: Arc::new(ActivityLog::new(
                Arc::new(MemoryCycleStore::default()),
                artifacts.clone(),
            )),
            artifacts,
            configs: Arc::new(MemoryConfigStore::default()),
            queue_store: Arc::new(MemoryQueueStore::default()),
            counters: Arc::new(MemoryCounterStore::default()),
            duplicates: Arc::new(MemoryDuplicateIndex::default()),
            registry: Arc::new(default_registry()),
            resume_present: true,
            cover_letters_fail: false,
        }
    }

    pub fn with_registry(mut self, registry: PlatformRegistry) -> Self {
        self.registry = Arc::new(registry);
        self
    }

    pub fn with_email(mut self, email: FakeEmail) -> Self {
        self.email = Arc::new(email);
        self
    }

    pub fn with_browser(mut self, browser: FakeBrowser) -> Self {
        self.browser = browser;
        self
    }

    pub fn with_counters_down(mut self) -> Self {
        self.counters = Arc::new(DownCounters);
        self
    }

    pub fn without_resume(mut self) -> Self {
        self.resume_present = false;
        self
    }

    pub fn without_cover_letters(mut self) -> Self {
        self.cover_letters_fail = true;
        self
    }

    pub fn queue(&self) -> ReviewQueue {
        ReviewQueue::new(self.queue_store.clone())
    }

    pub fn orchestrator(&self) -> CycleOrchestrator {
        let handlers = Handlers::new(
            self.registry.clone(),
            DirectSubmit::new(reqwest::Client::new()),
            BrowserSubmit,
            EmailSubmit::new(self.email.clone()),
            Duration::ZERO,
        );
        CycleOrchestrator::new(
            Collaborators {
                search: self.search.clone(),
                resumes: Arc::new(FakeResumes {
                    present: self.resume_present,
                }),
                cover_letters: Arc::new(FakeCoverLetters {
                    fail: self.cover_letters_fail,
                }),
                applications: self.applications.clone(),
                browser: Arc::new(self.browser.clone()),
            },
            Arc::new(handlers),
            RateLimiter::new(self.registry.clone(), self.counters.clone()),
            DuplicateDetector::new(self.duplicates.clone()),
            self.queue(),
            self.activity.clone(),
        )
    }

    pub fn engine(&self) -> AutoApplyEngine {
        AutoApplyEngine::new(
            self.configs.clone(),
            self.orchestrator(),
            self.activity.clone(),
            self.queue(),
        )
    }
}
