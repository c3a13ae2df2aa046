use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A single search result considered for application within a cycle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobCandidate {
    pub platform: String,
    pub title: String,
    pub company: String,
    pub url: String,
    #[serde(default)]
    pub posted_date: Option<NaiveDate>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub salary_min: Option<i64>,
    #[serde(default)]
    pub salary_max: Option<i64>,
    /// Address for email applications, when the posting lists one.
    #[serde(default)]
    pub contact_email: Option<String>,
    /// The platform's own posting id, used by API submissions.
    #[serde(default)]
    pub external_id: Option<String>,
}

impl JobCandidate {
    pub fn identity_key(&self) -> String {
        identity_key(&self.title, &self.company, &self.platform)
    }

    /// False when the posting advertises a ceiling below the user's floor.
    /// Postings without a known `salary_max` always pass.
    pub fn meets_salary(&self, min_salary: Option<i64>) -> bool {
        match (min_salary, self.salary_max) {
            (Some(floor), Some(top)) => top >= floor,
            _ => true,
        }
    }
}

/// Stable identity of a posting: normalized title, company and platform.
///
/// The URL is deliberately left out: boards vary query parameters for the
/// same posting.
pub fn identity_key(title: &str, company: &str, platform: &str) -> String {
    [title, company, platform]
        .iter()
        .map(|part| normalize(part))
        .collect::<Vec<_>>()
        .join("|")
}

fn normalize(value: &str) -> String {
    value
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}
