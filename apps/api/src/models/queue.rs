use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::candidate::JobCandidate;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum QueueReason {
    UnsupportedPlatform,
    AutomationFailed,
    ManualReviewRequested,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum QueueResolution {
    AppliedManually,
    Discarded,
}

macro_rules! text_enum {
    ($ty:ty { $($variant:path => $text:literal),+ $(,)? }) => {
        impl $ty {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($variant => $text),+
                }
            }
        }

        impl FromStr for $ty {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($variant),)+
                    other => Err(format!("unknown {} '{}'", stringify!($ty), other)),
                }
            }
        }
    };
}

text_enum!(QueueReason {
    QueueReason::UnsupportedPlatform => "unsupported_platform",
    QueueReason::AutomationFailed => "automation_failed",
    QueueReason::ManualReviewRequested => "manual_review_requested",
});

text_enum!(QueueResolution {
    QueueResolution::AppliedManually => "applied_manually",
    QueueResolution::Discarded => "discarded",
});

/// A candidate the engine could not resolve on its own, waiting for a human.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueueItem {
    pub id: Uuid,
    pub user_id: Uuid,
    pub cycle_id: Option<Uuid>,
    pub candidate: JobCandidate,
    pub reason: QueueReason,
    pub queued_at: DateTime<Utc>,
    pub resolution: Option<QueueResolution>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub note: Option<String>,
}

impl QueueItem {
    pub fn new(
        user_id: Uuid,
        cycle_id: Option<Uuid>,
        candidate: JobCandidate,
        reason: QueueReason,
        note: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            cycle_id,
            candidate,
            reason,
            queued_at: Utc::now(),
            resolution: None,
            resolved_at: None,
            note,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.resolution.is_none()
    }
}
