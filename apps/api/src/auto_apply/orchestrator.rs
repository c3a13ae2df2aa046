//! One cycle, start to finish.

use std::sync::Arc;

use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::auto_apply::activity::{ActivityLog, CandidateOutcome};
use crate::auto_apply::duplicate::DuplicateDetector;
use crate::auto_apply::platforms::HandlerKind;
use crate::auto_apply::providers::{
    ApplicationOutcome, ApplicationStore, CoverLetterProvider, JobSearchProvider, ResumeProvider,
};
use crate::auto_apply::queue::ReviewQueue;
use crate::auto_apply::rate_limiter::{Admission, DenyReason, RateLimiter};
use crate::auto_apply::session::{BrowserDriver, Session};
use crate::auto_apply::submit::{AttemptError, AttemptRequest, Handlers};
use crate::auto_apply::{EngineError, StopSignal};
use crate::models::application::{ApplicationStatus, Resume};
use crate::models::candidate::JobCandidate;
use crate::models::config::AutoApplyConfig;
use crate::models::cycle::{CycleRecord, CycleStatus, FailureKind};
use crate::models::queue::QueueReason;
use crate::store::DuplicateOutcome;

/// External collaborators a cycle talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub search: Arc<dyn JobSearchProvider>,
    pub resumes: Arc<dyn ResumeProvider>,
    pub cover_letters: Arc<dyn CoverLetterProvider>,
    pub applications: Arc<dyn ApplicationStore>,
    pub browser: Arc<dyn BrowserDriver>,
}

pub struct CycleOrchestrator {
    collaborators: Collaborators,
    handlers: Arc<Handlers>,
    limiter: RateLimiter,
    duplicates: DuplicateDetector,
    queue: ReviewQueue,
    activity: Arc<ActivityLog>,
}

/// What the loop does after a candidate.
enum Step {
    Next,
    /// Counts against the cycle's `daily_limit`.
    Applied,
    /// The user's global daily cap is spent.
    CapReached,
}

impl CycleOrchestrator {
    pub fn new(
        collaborators: Collaborators,
        handlers: Arc<Handlers>,
        limiter: RateLimiter,
        duplicates: DuplicateDetector,
        queue: ReviewQueue,
        activity: Arc<ActivityLog>,
    ) -> Self {
        Self {
            collaborators,
            handlers,
            limiter,
            duplicates,
            queue,
            activity,
        }
    }

    /// Drives an already started cycle to a terminal state. The browser
    /// session is released and the record finalized whatever happens.
    pub async fn run(
        &self,
        config: &AutoApplyConfig,
        cycle_id: Uuid,
        stop: &StopSignal,
    ) -> Result<CycleRecord, EngineError> {
        let session = Session::new(self.collaborators.browser.clone());

        let status = match self.process(config, cycle_id, stop, &session).await {
            Ok(status) => status,
            Err(e) => {
                error!("Cycle {cycle_id} failed: {e}");
                if let Err(log_err) = self
                    .activity
                    .record_error(cycle_id, FailureKind::Infrastructure, e.to_string())
                    .await
                {
                    warn!("Could not record failure of cycle {cycle_id}: {log_err}");
                }
                CycleStatus::Failed
            }
        };

        session.release().await;
        let record = self.activity.finish_cycle(cycle_id, status).await?;
        info!(
            "Cycle {cycle_id} {}: searched={} matched={} applied={} ok={} failed={}",
            record.cycle_status.as_str(),
            record.jobs_searched,
            record.jobs_matched,
            record.jobs_applied,
            record.applications_successful,
            record.applications_failed
        );
        Ok(record)
    }

    async fn process(
        &self,
        config: &AutoApplyConfig,
        cycle_id: Uuid,
        stop: &StopSignal,
        session: &Session,
    ) -> Result<CycleStatus, EngineError> {
        let resume = self
            .collaborators
            .resumes
            .get_default_resume(config.user_id)
            .await
            .map_err(|e| EngineError::Infrastructure(format!("resume lookup failed: {e}")))?
            .ok_or_else(|| EngineError::Validation("user has no default resume".to_string()))?;

        let mut applied = 0u32;
        // one search per keyword; overlapping results are caught by the duplicate index
        for keyword in &config.keywords {
            if stop.is_stopped() {
                info!("Stop requested, ending cycle {cycle_id}");
                return Ok(CycleStatus::Stopped);
            }

            let candidates = self
                .collaborators
                .search
                .search(std::slice::from_ref(keyword), &config.locations, config.min_salary)
                .await
                .map_err(|e| EngineError::Infrastructure(format!("job search failed: {e}")))?;
            debug!("Search for '{keyword}' returned {} candidates", candidates.len());
            self.activity
                .record_search(cycle_id, candidates.len() as u32)
                .await?;

            for candidate in candidates {
                if stop.is_stopped() {
                    info!("Stop requested, ending cycle {cycle_id}");
                    return Ok(CycleStatus::Stopped);
                }

                match self.process_candidate(config, cycle_id, &resume, candidate, session).await? {
                    Step::Next => {}
                    Step::Applied => {
                        applied += 1;
                        if applied >= config.daily_limit {
                            info!("Daily limit of {} reached", config.daily_limit);
                            return Ok(CycleStatus::Completed);
                        }
                    }
                    Step::CapReached => {
                        info!("Global daily cap reached for user {}", config.user_id);
                        return Ok(CycleStatus::Completed);
                    }
                }
            }
        }

        Ok(CycleStatus::Completed)
    }

    async fn process_candidate(
        &self,
        config: &AutoApplyConfig,
        cycle_id: Uuid,
        resume: &Resume,
        candidate: JobCandidate,
        session: &Session,
    ) -> Result<Step, EngineError> {
        let user_id = config.user_id;

        if !candidate.meets_salary(config.min_salary) {
            debug!("Filtered '{}' at {}: below salary floor", candidate.title, candidate.company);
            return Ok(Step::Next);
        }

        let key = candidate.identity_key();
        if self.duplicates.is_duplicate(user_id, &key).await? {
            debug!("Skipping duplicate {key}");
            return Ok(Step::Next);
        }

        if self.handlers.dispatch(&candidate.platform).kind() == HandlerKind::Unsupported {
            if !self.duplicates.claim(user_id, &key).await? {
                return Ok(Step::Next);
            }
            self.queue
                .enqueue(
                    user_id,
                    Some(cycle_id),
                    candidate.clone(),
                    QueueReason::UnsupportedPlatform,
                    None,
                )
                .await?;
            self.duplicates
                .record(user_id, &key, DuplicateOutcome::Queued)
                .await?;
            self.activity
                .record_outcome(cycle_id, &candidate, CandidateOutcome::Queued)
                .await?;
            return Ok(Step::Next);
        }

        match self
            .limiter
            .admit(user_id, &candidate.platform, config.daily_limit)
            .await?
        {
            Admission::Admitted => {}
            Admission::Denied(reason) => {
                debug!("Rate limited {key}: {reason:?}");
                self.activity
                    .record_outcome(cycle_id, &candidate, CandidateOutcome::RateLimited(reason))
                    .await?;
                return Ok(if reason == DenyReason::GlobalDaily {
                    Step::CapReached
                } else {
                    Step::Next
                });
            }
        }

        if !self.duplicates.claim(user_id, &key).await? {
            debug!("{key} was claimed concurrently");
            return Ok(Step::Next);
        }

        let cover_letter = match self
            .collaborators
            .cover_letters
            .generate_cover_letter(&candidate, resume)
            .await
        {
            Ok(letter) => Some(letter),
            Err(e) => {
                warn!("Cover letter unavailable for {key}, applying resume-only: {e}");
                None
            }
        };

        let result = self
            .handlers
            .attempt(
                &AttemptRequest {
                    candidate: &candidate,
                    resume,
                    cover_letter: cover_letter.as_deref(),
                },
                session,
            )
            .await;

        if result.success {
            info!("Applied to '{}' at {} on {}", candidate.title, candidate.company, candidate.platform);
            self.activity
                .record_outcome(cycle_id, &candidate, CandidateOutcome::Submitted)
                .await?;
            self.duplicates
                .record(user_id, &key, DuplicateOutcome::Applied)
                .await?;
            self.save_application(user_id, cycle_id, &candidate, ApplicationStatus::Submitted, None)
                .await;
            return Ok(Step::Applied);
        }

        let error = result
            .error
            .unwrap_or_else(|| AttemptError::Transient("attempt failed without detail".to_string()));
        let (kind, needs_review) = match &error {
            AttemptError::Transient(_) => (FailureKind::Transient, false),
            AttemptError::Structural(_) | AttemptError::Unsupported(_) => {
                (FailureKind::Automation, true)
            }
        };
        let message = error.to_string();
        warn!("Application to {key} failed after {} attempt(s): {message}", result.attempts);

        self.activity
            .record_outcome(
                cycle_id,
                &candidate,
                CandidateOutcome::Failed {
                    kind,
                    message: message.clone(),
                    screenshot: result.artifact,
                },
            )
            .await?;
        self.duplicates
            .record(user_id, &key, DuplicateOutcome::Failed)
            .await?;
        self.save_application(
            user_id,
            cycle_id,
            &candidate,
            ApplicationStatus::Failed,
            Some(message.clone()),
        )
        .await;

        if needs_review {
            self.queue
                .enqueue(
                    user_id,
                    Some(cycle_id),
                    candidate,
                    QueueReason::AutomationFailed,
                    Some(message),
                )
                .await?;
        }
        Ok(Step::Applied)
    }

    /// Application history is best effort; a failed write never fails the cycle.
    async fn save_application(
        &self,
        user_id: Uuid,
        cycle_id: Uuid,
        candidate: &JobCandidate,
        status: ApplicationStatus,
        error: Option<String>,
    ) {
        let outcome = ApplicationOutcome {
            user_id,
            cycle_id: Some(cycle_id),
            status,
            error,
        };
        if let Err(e) = self
            .collaborators
            .applications
            .create_application(candidate, &outcome)
            .await
        {
            warn!("Failed to save application history for '{}': {e}", candidate.title);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auto_apply::platforms::PlatformRegistry;
    use crate::auto_apply::testing::{
        active_config, browser_platform, candidate, email_platform, FakeBrowser, FakeEmail,
        FakeSearch, Harness,
    };

    fn unique(platform: &str, n: usize) -> Vec<JobCandidate> {
        (0..n)
            .map(|i| candidate(platform, &format!("Engineer {i}"), &format!("Company{i}")))
            .collect()
    }

    async fn run(harness: &Harness, config: &AutoApplyConfig) -> CycleRecord {
        let cycle = harness.activity.start_cycle(config.user_id).await.unwrap();
        harness
            .orchestrator()
            .run(config, cycle.cycle_id, &StopSignal::new())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_daily_limit_caps_attempts() {
        let harness = Harness::new(FakeSearch::returning(unique("email", 10)));
        let config = active_config(5);

        let record = run(&harness, &config).await;

        assert_eq!(record.cycle_status, CycleStatus::Completed);
        assert_eq!(record.jobs_applied, 5);
        assert_eq!(record.applications_successful, 5);
        assert_eq!(harness.email.sent().len(), 5);
        assert_eq!(harness.applications.records().len(), 5);
        assert!(record.counters_consistent());
    }

    #[tokio::test]
    async fn test_duplicate_across_searches_attempted_once() {
        let search = FakeSearch::default();
        search.push(Ok(vec![candidate("email", "Rust Engineer", "Acme")]));
        search.push(Ok(vec![candidate("email", "  rust   engineer ", "ACME")]));
        let harness = Harness::new(search);
        let mut config = active_config(10);
        config.keywords = vec!["rust".to_string(), "backend".to_string()];

        let record = run(&harness, &config).await;

        assert_eq!(harness.search.calls(), 2);
        assert_eq!(record.jobs_searched, 2);
        assert_eq!(record.jobs_applied, 1);
        assert_eq!(harness.email.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_hourly_ceiling_skips_without_queueing() {
        let harness = Harness::new(FakeSearch::returning(unique("mailer", 5)))
            .with_registry(PlatformRegistry::new(vec![email_platform("mailer", 2, 50)]));
        let config = active_config(10);

        let record = run(&harness, &config).await;

        assert_eq!(record.cycle_status, CycleStatus::Completed);
        assert_eq!(harness.email.sent().len(), 2);
        assert_eq!(record.jobs_applied, 2);
        assert_eq!(record.jobs_matched, 5);
        assert_eq!(record.applications_failed, 0);
        assert!(record.errors.is_empty());
        assert!(harness.queue().list(config.user_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unsupported_platform_goes_to_queue() {
        let harness = Harness::new(FakeSearch::returning(vec![candidate(
            "monster",
            "Data Engineer",
            "Umbrella",
        )]));
        let config = active_config(10);

        let record = run(&harness, &config).await;

        assert_eq!(record.jobs_applied, 0);
        assert_eq!(record.jobs_matched, 1);
        assert!(harness.email.sent().is_empty());
        assert!(harness.applications.records().is_empty());
        let queued = harness.queue().list(config.user_id).await.unwrap();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].reason, QueueReason::UnsupportedPlatform);
        assert_eq!(queued[0].cycle_id, Some(record.cycle_id));
    }

    #[tokio::test]
    async fn test_stop_between_candidates() {
        let stop = StopSignal::new();
        let signal = stop.clone();
        let harness = Harness::new(FakeSearch::returning(unique("email", 8))).with_email(
            FakeEmail::with_hook(move |sent| {
                if sent == 2 {
                    signal.stop();
                }
            }),
        );
        let config = active_config(10);
        let cycle = harness.activity.start_cycle(config.user_id).await.unwrap();

        let record = harness
            .orchestrator()
            .run(&config, cycle.cycle_id, &stop)
            .await
            .unwrap();

        assert_eq!(record.cycle_status, CycleStatus::Stopped);
        assert!(record.jobs_applied <= 3);
        assert_eq!(harness.email.sent().len(), 2);
        assert!(record.cycle_end.is_some());
    }

    #[tokio::test]
    async fn test_structural_failure_queued_with_screenshot() {
        let browser = FakeBrowser::with_missing("button[type='submit']");
        let harness = Harness::new(FakeSearch::returning(vec![candidate("indeed", "SRE", "Hooli")]))
            .with_browser(browser.clone());
        let config = active_config(10);

        let record = run(&harness, &config).await;

        assert_eq!(record.cycle_status, CycleStatus::Completed);
        assert_eq!(record.applications_failed, 1);
        assert_eq!(record.errors.len(), 1);
        assert_eq!(record.errors[0].kind, FailureKind::Automation);
        assert_eq!(record.screenshots.len(), 1);
        assert_eq!(harness.artifacts.len(), 1);

        let queued = harness.queue().list(config.user_id).await.unwrap();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].reason, QueueReason::AutomationFailed);

        assert_eq!(
            harness.applications.records()[0].1,
            ApplicationStatus::Failed
        );
        // released at cycle end
        assert_eq!(browser.launches(), 1);
        assert_eq!(browser.closes(), 1);
    }

    #[tokio::test]
    async fn test_transient_browser_failure_retried_once() {
        let browser = FakeBrowser::default().failing_navigations(1);
        let harness = Harness::new(FakeSearch::returning(vec![candidate("linkedin", "SRE", "Hooli")]))
            .with_browser(browser.clone());
        let config = active_config(10);

        let record = run(&harness, &config).await;

        assert_eq!(record.applications_successful, 1);
        assert!(record.errors.is_empty());
        assert_eq!(browser.visited().len(), 1);
        assert_eq!(browser.closes(), 1);
    }

    #[tokio::test]
    async fn test_browser_candidates_share_one_session() {
        let browser = FakeBrowser::default();
        let harness = Harness::new(FakeSearch::returning(unique("linkedin", 3)))
            .with_browser(browser.clone());
        let config = active_config(10);

        let record = run(&harness, &config).await;

        assert_eq!(record.applications_successful, 3);
        assert_eq!(browser.launches(), 1);
        assert_eq!(browser.closes(), 1);
        assert_eq!(browser.max_concurrent(), 1);
    }

    #[tokio::test]
    async fn test_timeout_fails_only_that_candidate() {
        let harness = Harness::new(FakeSearch::returning(vec![
            candidate("slowboard", "SRE", "Hooli"),
            candidate("email", "SRE", "Globex"),
        ]))
        .with_registry(PlatformRegistry::new(vec![
            browser_platform("slowboard", 0),
            email_platform("email", 10, 40),
        ]))
        .with_browser(FakeBrowser::default().hanging());
        let config = active_config(10);

        let record = run(&harness, &config).await;

        assert_eq!(record.cycle_status, CycleStatus::Completed);
        assert_eq!(record.applications_failed, 1);
        assert_eq!(record.applications_successful, 1);
        assert_eq!(record.errors[0].kind, FailureKind::Transient);
        assert!(harness.queue().list(config.user_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_search_failure_fails_cycle() {
        let harness = Harness::new(FakeSearch::failing("all boards down"));
        let config = active_config(10);

        let record = run(&harness, &config).await;

        assert_eq!(record.cycle_status, CycleStatus::Failed);
        assert_eq!(record.errors.len(), 1);
        assert_eq!(record.errors[0].kind, FailureKind::Infrastructure);
        assert!(record.cycle_end.is_some());
    }

    #[tokio::test]
    async fn test_missing_resume_fails_cycle() {
        let harness = Harness::new(FakeSearch::returning(unique("email", 2))).without_resume();
        let config = active_config(10);

        let record = run(&harness, &config).await;

        assert_eq!(record.cycle_status, CycleStatus::Failed);
        assert_eq!(harness.search.calls(), 0);
    }

    #[tokio::test]
    async fn test_salary_floor_and_cover_letter_fallback() {
        let mut cheap = candidate("email", "Junior Dev", "Acme");
        cheap.salary_max = Some(40_000);
        let harness = Harness::new(FakeSearch::returning(vec![
            cheap,
            candidate("email", "Senior Dev", "Acme"),
        ]))
        .without_cover_letters();
        let mut config = active_config(10);
        config.min_salary = Some(100_000);

        let record = run(&harness, &config).await;

        assert_eq!(record.jobs_searched, 2);
        assert_eq!(record.jobs_matched, 1);
        let sent = harness.email.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].body.contains("Senior Dev position at Acme"));
    }

    #[tokio::test]
    async fn test_counter_store_outage_fails_closed() {
        let harness = Harness::new(FakeSearch::returning(unique("email", 3))).with_counters_down();
        let config = active_config(10);

        let record = run(&harness, &config).await;

        assert_eq!(record.cycle_status, CycleStatus::Failed);
        assert!(harness.email.sent().is_empty());
    }
}
