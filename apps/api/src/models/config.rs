use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Largest accepted `daily_limit`.
pub const MAX_DAILY_LIMIT: u32 = 1_000;

/// Per-user automation settings.
///
/// Never deleted; a user switches automation off with `is_active = false`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AutoApplyConfig {
    pub user_id: Uuid,
    pub keywords: Vec<String>,
    pub locations: Vec<String>,
    pub min_salary: Option<i64>,
    /// Upper bound on applications submitted per day across every platform.
    pub daily_limit: u32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Body of `create_or_update_config`. Fields left out keep their stored value.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigUpdate {
    pub user_id: Uuid,
    pub keywords: Option<Vec<String>>,
    pub locations: Option<Vec<String>>,
    /// `Some(None)` clears the floor; absent keeps it.
    #[serde(default, with = "double_option")]
    pub min_salary: Option<Option<i64>>,
    pub daily_limit: Option<u32>,
    pub is_active: Option<bool>,
}

impl AutoApplyConfig {
    pub fn new(user_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            keywords: vec![],
            locations: vec![],
            min_salary: None,
            daily_limit: 10,
            is_active: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Applies an update on top of the stored config and validates the result.
    pub fn apply(mut self, update: ConfigUpdate) -> Result<Self, String> {
        if let Some(keywords) = update.keywords {
            self.keywords = normalize_set(keywords);
        }
        if let Some(locations) = update.locations {
            self.locations = normalize_set(locations);
        }
        if let Some(min_salary) = update.min_salary {
            self.min_salary = min_salary;
        }
        if let Some(limit) = update.daily_limit {
            self.daily_limit = limit;
        }
        if let Some(active) = update.is_active {
            self.is_active = active;
        }
        self.updated_at = Utc::now();
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.daily_limit == 0 {
            return Err("daily_limit must be greater than zero".to_string());
        }
        if self.daily_limit > MAX_DAILY_LIMIT {
            return Err(format!("daily_limit cannot exceed {MAX_DAILY_LIMIT}"));
        }
        if matches!(self.min_salary, Some(s) if s < 0) {
            return Err("min_salary cannot be negative".to_string());
        }
        if self.is_active && self.keywords.is_empty() {
            return Err("at least one keyword is required to activate auto-apply".to_string());
        }
        Ok(())
    }
}

/// Trims entries, drops empties and removes case-insensitive duplicates,
/// keeping first-seen order.
pub fn normalize_set(values: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    values
        .into_iter()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .filter(|v| seen.insert(v.to_lowercase()))
        .collect()
}

mod double_option {
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D, T>(de: D) -> Result<Option<Option<T>>, D::Error>
    where
        D: Deserializer<'de>,
        T: Deserialize<'de>,
    {
        Option::<T>::deserialize(de).map(Some)
    }
}
