use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Priority bucket a company belongs to. Declaration order is the sort rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Tier1,
    Tier2,
    Tier3,
    Unknown,
}

impl Tier {
    /// Tiers that can be looked up in a targets config.
    pub const NAMED: [Tier; 3] = [Tier::Tier1, Tier::Tier2, Tier::Tier3];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Tier1 => "tier1",
            Tier::Tier2 => "tier2",
            Tier::Tier3 => "tier3",
            Tier::Unknown => "unknown",
        }
    }

    pub fn auto_apply_eligible(&self) -> bool {
        matches!(self, Tier::Tier1 | Tier::Tier2)
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleMatch {
    Primary,
    Secondary,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExperienceMatch {
    InRange,
    UnderQualified,
    OverQualified,
    Unknown,
}

/// A scraped job posting.
///
/// Only the fields the pipeline reads are named; everything else a scraper
/// produced is carried through untouched in `extra`. The enrichment fields
/// stay `None` until the targets filter or tracker lookup fills them in.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobPosting {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_tier: Option<Tier>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_priority: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_apply_eligible: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role_match: Option<RoleMatch>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bad_word_penalty: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bad_words_matched: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_experience_years: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub experience_match: Option<ExperienceMatch>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub already_applied: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub existing_application_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub existing_status: Option<ApplicationStatus>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl JobPosting {
    pub fn new(company: &str, title: &str) -> Self {
        Self {
            company: Some(company.to_string()),
            title: Some(title.to_string()),
            ..Default::default()
        }
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    pub fn with_location(mut self, location: &str) -> Self {
        self.location = Some(location.to_string());
        self
    }

    pub fn with_url(mut self, url: &str) -> Self {
        self.job_url = Some(url.to_string());
        self
    }

    pub fn company(&self) -> &str {
        self.company.as_deref().unwrap_or("")
    }

    pub fn title(&self) -> &str {
        self.title.as_deref().unwrap_or("")
    }

    pub fn description(&self) -> &str {
        self.description.as_deref().unwrap_or("")
    }

    pub fn location(&self) -> &str {
        self.location.as_deref().unwrap_or("")
    }

    /// Title, falling back to `role` for records that come from the tracker side.
    pub fn role_or_title(&self) -> &str {
        non_empty(self.title.as_deref())
            .or_else(|| non_empty(self.role.as_deref()))
            .unwrap_or("")
    }

    /// `job_url`, falling back to `url`.
    pub fn link(&self) -> Option<&str> {
        non_empty(self.job_url.as_deref()).or_else(|| non_empty(self.url.as_deref()))
    }
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.filter(|s| !s.is_empty())
}

/// Application pipeline status, in flow order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    Discovered,
    Analyzing,
    Ready,
    Applied,
    Responded,
    Interviewing,
    Offer,
    Rejected,
    Withdrawn,
}

impl ApplicationStatus {
    pub const FLOW: [ApplicationStatus; 9] = [
        ApplicationStatus::Discovered,
        ApplicationStatus::Analyzing,
        ApplicationStatus::Ready,
        ApplicationStatus::Applied,
        ApplicationStatus::Responded,
        ApplicationStatus::Interviewing,
        ApplicationStatus::Offer,
        ApplicationStatus::Rejected,
        ApplicationStatus::Withdrawn,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ApplicationStatus::Discovered => "discovered",
            ApplicationStatus::Analyzing => "analyzing",
            ApplicationStatus::Ready => "ready",
            ApplicationStatus::Applied => "applied",
            ApplicationStatus::Responded => "responded",
            ApplicationStatus::Interviewing => "interviewing",
            ApplicationStatus::Offer => "offer",
            ApplicationStatus::Rejected => "rejected",
            ApplicationStatus::Withdrawn => "withdrawn",
        }
    }

    /// Statuses that mean the employer answered; entering one stamps `response_at`.
    pub fn is_response(&self) -> bool {
        matches!(
            self,
            ApplicationStatus::Responded
                | ApplicationStatus::Interviewing
                | ApplicationStatus::Offer
                | ApplicationStatus::Rejected
        )
    }
}

impl fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid status: '{value}'. Valid statuses: {}", valid_statuses())]
pub struct InvalidStatus {
    pub value: String,
}

fn valid_statuses() -> String {
    ApplicationStatus::FLOW
        .iter()
        .map(|s| s.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

impl FromStr for ApplicationStatus {
    type Err = InvalidStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ApplicationStatus::FLOW
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| InvalidStatus {
                value: s.to_string(),
            })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Application {
    pub id: String,
    pub company: String,
    pub role: String,
    pub job_url: Option<String>,
    pub platform: Option<String>, // "linkedin", "greenhouse", "lever", "direct"
    pub status: ApplicationStatus,
    pub match_score: Option<f64>,
    pub resume_variant: Option<String>,
    pub cover_letter: Option<String>,
    pub salary_range: Option<String>,
    pub location: Option<String>,
    pub remote_policy: Option<String>,
    pub applied_at: Option<String>,
    pub response_at: Option<String>,
    pub keywords_matched: Vec<String>,
    pub notes: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Application {
    /// A fresh record with timestamps set to now and everything optional left empty.
    pub fn new(id: &str, company: &str, role: &str, status: ApplicationStatus) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            id: id.to_string(),
            company: company.to_string(),
            role: role.to_string(),
            job_url: None,
            platform: None,
            status,
            match_score: None,
            resume_variant: None,
            cover_letter: None,
            salary_range: None,
            location: None,
            remote_policy: None,
            applied_at: None,
            response_at: None,
            keywords_matched: Vec::new(),
            notes: None,
            created_at: now.clone(),
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interaction {
    pub id: i64,
    pub application_id: String,
    pub kind: String, // "application", "email", "phone", "interview", "offer", "rejection", "status_change"
    pub details: Option<String>,
    pub occurred_at: Option<String>,
    pub created_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parse_roundtrips_every_flow_value() {
        for status in ApplicationStatus::FLOW {
            assert_eq!(status.as_str().parse::<ApplicationStatus>(), Ok(status));
        }
    }

    #[test]
    fn test_invalid_status_names_offending_value() {
        let err = "ghosted".parse::<ApplicationStatus>().unwrap_err();
        assert_eq!(err.value, "ghosted");
        let msg = err.to_string();
        assert!(msg.contains("'ghosted'"));
        assert!(msg.contains("discovered"));
        assert!(msg.contains("withdrawn"));
    }

    #[test]
    fn test_tier_rank_puts_unknown_last() {
        let mut tiers = vec![Tier::Unknown, Tier::Tier3, Tier::Tier1, Tier::Tier2];
        tiers.sort();
        assert_eq!(tiers, vec![Tier::Tier1, Tier::Tier2, Tier::Tier3, Tier::Unknown]);
    }

    #[test]
    fn test_job_posting_keeps_unknown_fields() {
        let raw = r#"{"company":"Anthropic","title":"AI Engineer","site":"linkedin","min_amount":150000}"#;
        let job: JobPosting = serde_json::from_str(raw).unwrap();
        assert_eq!(job.company(), "Anthropic");
        assert_eq!(job.extra.get("site"), Some(&Value::from("linkedin")));

        let out = serde_json::to_value(&job).unwrap();
        assert_eq!(out["min_amount"], 150000);
        assert!(out.get("target_tier").is_none());
    }

    #[test]
    fn test_job_posting_fallbacks() {
        let job = JobPosting {
            role: Some("ML Engineer".into()),
            url: Some("https://example.com/1".into()),
            job_url: Some(String::new()),
            ..Default::default()
        };
        assert_eq!(job.role_or_title(), "ML Engineer");
        assert_eq!(job.link(), Some("https://example.com/1"));
        assert_eq!(job.description(), "");
    }

    #[test]
    fn test_enrichment_serializes_snake_case() {
        let mut job = JobPosting::new("Co", "Engineer");
        job.target_tier = Some(Tier::Tier1);
        job.experience_match = Some(ExperienceMatch::UnderQualified);
        job.existing_status = Some(ApplicationStatus::Interviewing);
        let out = serde_json::to_value(&job).unwrap();
        assert_eq!(out["target_tier"], "tier1");
        assert_eq!(out["experience_match"], "under_qualified");
        assert_eq!(out["existing_status"], "interviewing");
    }
}
