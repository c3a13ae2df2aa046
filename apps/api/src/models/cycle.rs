use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CycleStatus {
    Running,
    Completed,
    Failed,
    Stopped,
}

impl CycleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CycleStatus::Running => "running",
            CycleStatus::Completed => "completed",
            CycleStatus::Failed => "failed",
            CycleStatus::Stopped => "stopped",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, CycleStatus::Running)
    }
}

impl FromStr for CycleStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(CycleStatus::Running),
            "completed" => Ok(CycleStatus::Completed),
            "failed" => Ok(CycleStatus::Failed),
            "stopped" => Ok(CycleStatus::Stopped),
            other => Err(format!("unknown cycle status '{other}'")),
        }
    }
}

/// Classification of a failure recorded against a cycle.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Page layout changed or form fields missing. Never retried.
    Automation,
    /// Network or timeout failure that survived its single retry.
    Transient,
    /// Search provider or counter store unreachable; aborts the cycle.
    Infrastructure,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CycleError {
    pub platform: Option<String>,
    pub identity_key: Option<String>,
    pub kind: FailureKind,
    pub message: String,
    pub at: DateTime<Utc>,
}

impl fmt::Display for CycleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {:?}", self.at.to_rfc3339(), self.kind)?;
        if let Some(platform) = &self.platform {
            write!(f, " {platform}")?;
        }
        if let Some(key) = &self.identity_key {
            write!(f, " ({key})")?;
        }
        write!(f, ": {}", self.message)
    }
}

/// One record per orchestrator run.
///
/// Counters obey
/// `applications_successful + applications_failed <= jobs_applied <= jobs_matched <= jobs_searched`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CycleRecord {
    pub cycle_id: Uuid,
    pub user_id: Uuid,
    pub cycle_start: DateTime<Utc>,
    pub cycle_end: Option<DateTime<Utc>>,
    pub cycle_status: CycleStatus,
    pub jobs_searched: u32,
    pub jobs_matched: u32,
    pub jobs_applied: u32,
    pub applications_successful: u32,
    pub applications_failed: u32,
    pub errors: Vec<CycleError>,
    pub screenshots: Vec<String>,
}

impl CycleRecord {
    pub fn start(user_id: Uuid) -> Self {
        Self {
            cycle_id: Uuid::new_v4(),
            user_id,
            cycle_start: Utc::now(),
            cycle_end: None,
            cycle_status: CycleStatus::Running,
            jobs_searched: 0,
            jobs_matched: 0,
            jobs_applied: 0,
            applications_successful: 0,
            applications_failed: 0,
            errors: vec![],
            screenshots: vec![],
        }
    }

    pub fn counters_consistent(&self) -> bool {
        self.applications_successful + self.applications_failed <= self.jobs_applied
            && self.jobs_applied <= self.jobs_matched
            && self.jobs_matched <= self.jobs_searched
    }
}
