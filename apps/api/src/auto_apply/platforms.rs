//! Platform registry: which submission strategy each job board gets, and the
//! admission ceilings and timeouts that apply to it.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

/// The fixed set of submission strategies.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HandlerKind {
    DirectSubmit,
    BrowserAutomationSubmit,
    EmailSubmit,
    Unsupported,
}

/// CSS selectors a browser submission walks through, in order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FormScript {
    /// Clicked after the posting loads to open the application form.
    pub apply_button: Option<String>,
    pub name_field: Option<String>,
    pub email_field: Option<String>,
    pub phone_field: Option<String>,
    pub resume_upload: String,
    /// Filled only when a cover letter was generated.
    pub cover_letter_field: Option<String>,
    pub submit_button: String,
    /// Must appear after submit for the attempt to count as a success.
    pub confirmation: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlatformSpec {
    pub id: String,
    pub handler: HandlerKind,
    pub hourly_limit: u32,
    pub daily_limit: u32,
    pub timeout_secs: u64,
    /// Apply API for `direct_submit` platforms.
    #[serde(default)]
    pub apply_endpoint: Option<String>,
    /// Form script for `browser_automation_submit` platforms.
    #[serde(default)]
    pub form: Option<FormScript>,
}

impl PlatformSpec {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            bail!("platform id must not be empty");
        }
        if self.timeout_secs == 0 {
            bail!("platform '{}': timeout_secs must be greater than zero", self.id);
        }
        match self.handler {
            HandlerKind::DirectSubmit if self.apply_endpoint.is_none() => {
                bail!("platform '{}': direct_submit needs an apply_endpoint", self.id)
            }
            HandlerKind::BrowserAutomationSubmit if self.form.is_none() => {
                bail!("platform '{}': browser_automation_submit needs a form", self.id)
            }
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PlatformRegistry {
    platforms: HashMap<String, PlatformSpec>,
}

impl PlatformRegistry {
    pub fn new(specs: Vec<PlatformSpec>) -> Self {
        Self {
            platforms: specs
                .into_iter()
                .map(|s| (s.id.trim().to_lowercase(), s))
                .collect(),
        }
    }

    /// Loads a JSON array of platform specs.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read platform registry {}", path.display()))?;
        Self::from_json(&raw)
            .with_context(|| format!("Invalid platform registry {}", path.display()))
    }

    /// Parses and validates a JSON array of platform specs. Ids are
    /// case-insensitive and must be unique.
    pub fn from_json(raw: &str) -> Result<Self> {
        let specs: Vec<PlatformSpec> = serde_json::from_str(raw)?;
        let mut seen = HashSet::new();
        for spec in &specs {
            spec.validate()?;
            if !seen.insert(spec.id.trim().to_lowercase()) {
                bail!("platform '{}' is defined more than once", spec.id);
            }
        }
        Ok(Self::new(specs))
    }

    pub fn get(&self, platform: &str) -> Option<&PlatformSpec> {
        self.platforms.get(&platform.trim().to_lowercase())
    }

    /// Pure lookup; unknown platforms resolve to `Unsupported`.
    pub fn resolve(&self, platform: &str) -> HandlerKind {
        self.get(platform)
            .map(|s| s.handler)
            .unwrap_or(HandlerKind::Unsupported)
    }

    pub fn len(&self) -> usize {
        self.platforms.len()
    }
}

/// Boards supported out of the box.
pub fn default_registry() -> PlatformRegistry {
    PlatformRegistry::new(vec![
        PlatformSpec {
            id: "greenhouse".to_string(),
            handler: HandlerKind::DirectSubmit,
            hourly_limit: 10,
            daily_limit: 50,
            timeout_secs: 30,
            apply_endpoint: Some("https://boards-api.greenhouse.io/v1/applications".to_string()),
            form: None,
        },
        PlatformSpec {
            id: "lever".to_string(),
            handler: HandlerKind::DirectSubmit,
            hourly_limit: 10,
            daily_limit: 50,
            timeout_secs: 30,
            apply_endpoint: Some("https://api.lever.co/v0/applications".to_string()),
            form: None,
        },
        PlatformSpec {
            id: "linkedin".to_string(),
            handler: HandlerKind::BrowserAutomationSubmit,
            hourly_limit: 5,
            daily_limit: 25,
            timeout_secs: 120,
            apply_endpoint: None,
            form: Some(FormScript {
                apply_button: Some("button.jobs-apply-button".to_string()),
                name_field: None,
                email_field: Some("input[id*='email']".to_string()),
                phone_field: Some("input[id*='phoneNumber']".to_string()),
                resume_upload: "input[type='file']".to_string(),
                cover_letter_field: Some("textarea[id*='cover']".to_string()),
                submit_button: "button[aria-label='Submit application']".to_string(),
                confirmation: "div.artdeco-inline-feedback--success".to_string(),
            }),
        },
        PlatformSpec {
            id: "indeed".to_string(),
            handler: HandlerKind::BrowserAutomationSubmit,
            hourly_limit: 5,
            daily_limit: 25,
            timeout_secs: 120,
            apply_endpoint: None,
            form: Some(FormScript {
                apply_button: Some("#indeedApplyButton".to_string()),
                name_field: Some("input[name='applicant.name']".to_string()),
                email_field: Some("input[name='applicant.emailAddress']".to_string()),
                phone_field: Some("input[name='applicant.phoneNumber']".to_string()),
                resume_upload: "input[type='file']".to_string(),
                cover_letter_field: Some("textarea[name='coverletter']".to_string()),
                submit_button: "button[type='submit']".to_string(),
                confirmation: "[data-testid='application-submitted']".to_string(),
            }),
        },
        PlatformSpec {
            id: "email".to_string(),
            handler: HandlerKind::EmailSubmit,
            hourly_limit: 10,
            daily_limit: 40,
            timeout_secs: 30,
            apply_endpoint: None,
            form: None,
        },
    ])
}
