//! Targets configuration: which companies to chase, what to skip, and how to
//! rank what is left. Loaded from YAML, optionally merged with a locale.
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, warn};

use crate::models::Tier;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Unknown locale '{requested}'. Available locales: {}{}", list_or_none(.available), suggestion(.requested, .available))]
    UnknownLocale {
        requested: String,
        available: Vec<String>,
    },
}

fn list_or_none(names: &[String]) -> String {
    if names.is_empty() {
        "(none)".to_string()
    } else {
        names.join(", ")
    }
}

fn suggestion(requested: &str, available: &[String]) -> String {
    available
        .iter()
        .map(|name| (name, strsim::jaro_winkler(&requested.to_lowercase(), &name.to_lowercase())))
        .filter(|(_, score)| *score >= 0.8)
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(name, _)| format!(" (did you mean '{}'?)", name))
        .unwrap_or_default()
}

/// Base targets config. Every field has exactly one declared default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetsConfig {
    pub version: String,
    pub last_updated: Option<String>,
    pub tiers: BTreeMap<String, TierConfig>,
    pub exclusions: ExclusionsConfig,
    pub target_roles: TargetRoles,
    pub search_params: SearchParams,
    pub bad_words: BadWordsConfig,
    pub experience_range: ExperienceRange,
    /// Set when the source document declared at least one top-level key.
    #[serde(skip)]
    pub(crate) declared: bool,
}

impl Default for TargetsConfig {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            last_updated: None,
            tiers: BTreeMap::new(),
            exclusions: ExclusionsConfig::default(),
            target_roles: TargetRoles::default(),
            search_params: SearchParams::default(),
            bad_words: BadWordsConfig::default(),
            experience_range: ExperienceRange::default(),
            declared: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TierConfig {
    pub companies: Vec<CompanyEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyEntry {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub careers_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub greenhouse_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lever_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ashby_id: Option<String>,
    #[serde(default = "default_company_priority")]
    pub priority: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

fn default_company_priority() -> u32 {
    3
}

impl CompanyEntry {
    pub fn new(name: &str, priority: u32) -> Self {
        Self {
            name: name.to_string(),
            careers_url: None,
            greenhouse_id: None,
            lever_id: None,
            ashby_id: None,
            priority,
            notes: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExclusionsConfig {
    pub companies: Vec<String>,
    pub keywords: Vec<String>,
    pub reasons: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetRoles {
    pub primary: Vec<String>,
    pub secondary: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchParams {
    pub locations: Locations,
    pub experience_levels: Vec<String>,
    pub job_types: Vec<String>,
    pub posted_within: String,
    pub salary: Salary,
    pub country: String,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            locations: Locations::default(),
            experience_levels: Vec::new(),
            job_types: Vec::new(),
            posted_within: "7d".to_string(),
            salary: Salary::default(),
            country: "USA".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Locations {
    pub preferred: Vec<String>,
    pub acceptable: Vec<String>,
}

/// Salary floor. Everything besides `currency` is locale-specific
/// (`minimum_usd`, `minimum_ils`, `period`, ...) and kept as raw YAML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Salary {
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(flatten)]
    pub amounts: BTreeMap<String, serde_yaml::Value>,
}

fn default_currency() -> String {
    "USD".to_string()
}

impl Default for Salary {
    fn default() -> Self {
        Self {
            currency: default_currency(),
            amounts: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BadWordsConfig {
    pub title_words: Vec<String>,
    pub description_words: Vec<String>,
    pub penalty_per_match: f64,
}

impl Default for BadWordsConfig {
    fn default() -> Self {
        Self {
            title_words: Vec::new(),
            description_words: Vec::new(),
            penalty_per_match: 5.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperienceRange {
    pub min_years: u32,
    pub max_years: u32,
}

impl Default for ExperienceRange {
    fn default() -> Self {
        Self {
            min_years: 0,
            max_years: 50,
        }
    }
}

/// Region-specific partial config. Only the fields present are merged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocaleOverrides {
    pub search_params: Option<LocaleSearchParams>,
    pub tiers: BTreeMap<String, TierConfig>,
    pub bad_words: Option<LocaleBadWords>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocaleSearchParams {
    pub locations: Option<Locations>,
    pub country: Option<String>,
    pub salary: Option<Salary>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocaleBadWords {
    pub title_words: Option<Vec<String>>,
    pub description_words: Option<Vec<String>>,
}

/// On-disk layout: the base config plus the `locales` section, which is split
/// off on load and never handed to callers.
#[derive(Debug, Default, Deserialize)]
struct TargetsFile {
    #[serde(flatten)]
    base: TargetsConfig,
    #[serde(default)]
    locales: BTreeMap<String, LocaleOverrides>,
}

impl TargetsConfig {
    /// True when nothing was configured, in which case filtering is a no-op.
    pub fn is_empty(&self) -> bool {
        !self.declared && *self == TargetsConfig::default()
    }

    pub fn tier(&self, tier: Tier) -> Option<&TierConfig> {
        self.tiers.get(tier.as_str())
    }

    pub fn all_companies(&self) -> impl Iterator<Item = &CompanyEntry> {
        self.tiers.values().flat_map(|t| t.companies.iter())
    }

    /// Tier name a company belongs to, matched case-insensitively.
    pub fn company_tier(&self, company: &str) -> Option<&str> {
        let needle = company.to_lowercase();
        self.tiers
            .iter()
            .find(|(_, tier)| tier.companies.iter().any(|c| c.name.to_lowercase() == needle))
            .map(|(name, _)| name.as_str())
    }
}

/// Merge `overrides` into a copy of `base`.
///
/// Tier company lists are extended, bad words are extended and deduplicated
/// case-insensitively (first spelling wins), and locations, salary and country
/// are replaced wholesale. Target roles and experience range always come from
/// the base.
pub fn merge_locale(base: &TargetsConfig, overrides: &LocaleOverrides) -> TargetsConfig {
    let mut merged = base.clone();
    merged.declared = base.declared || *overrides != LocaleOverrides::default();

    for (tier_name, tier) in &overrides.tiers {
        merged
            .tiers
            .entry(tier_name.clone())
            .or_default()
            .companies
            .extend(tier.companies.iter().cloned());
    }

    if let Some(bad_words) = &overrides.bad_words {
        if let Some(words) = &bad_words.title_words {
            merged.bad_words.title_words = extend_dedup(&merged.bad_words.title_words, words);
        }
        if let Some(words) = &bad_words.description_words {
            merged.bad_words.description_words =
                extend_dedup(&merged.bad_words.description_words, words);
        }
    }

    if let Some(params) = &overrides.search_params {
        if let Some(locations) = &params.locations {
            merged.search_params.locations = locations.clone();
        }
        if let Some(salary) = &params.salary {
            merged.search_params.salary = salary.clone();
        }
        if let Some(country) = &params.country {
            merged.search_params.country = country.clone();
        }
    }

    merged
}

fn extend_dedup(existing: &[String], extra: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    existing
        .iter()
        .chain(extra)
        .filter(|w| seen.insert(w.to_lowercase()))
        .cloned()
        .collect()
}

fn parse_targets_file(content: &str) -> Result<TargetsFile, ConfigError> {
    if content.trim().is_empty() {
        return Ok(TargetsFile::default());
    }
    let raw: serde_yaml::Value = serde_yaml::from_str(content)?;
    if raw.is_null() {
        return Ok(TargetsFile::default());
    }
    let declared = raw
        .as_mapping()
        .is_some_and(|keys| keys.keys().any(|k| k.as_str() != Some("locales")));

    let mut file: TargetsFile = serde_yaml::from_value(raw)?;
    file.base.declared = declared;
    Ok(file)
}

/// Parse a targets document and resolve `locale` against its `locales` section.
pub fn parse_targets(content: &str, locale: Option<&str>) -> Result<TargetsConfig, ConfigError> {
    let TargetsFile { base, locales } = parse_targets_file(content)?;

    let Some(locale) = locale else {
        return Ok(base);
    };

    match locales.get(locale) {
        Some(overrides) => {
            debug!(locale, "merging locale overrides");
            Ok(merge_locale(&base, overrides))
        }
        None => Err(ConfigError::UnknownLocale {
            requested: locale.to_string(),
            available: locales.keys().cloned().collect(),
        }),
    }
}

/// Load targets from `path`. A missing file yields the empty config.
pub fn load_targets(path: &Path, locale: Option<&str>) -> Result<TargetsConfig, ConfigError> {
    if !path.exists() {
        warn!(path = %path.display(), "targets config not found, filtering disabled");
        return Ok(TargetsConfig::default());
    }
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_targets(&content, locale)
}

/// Names of the locales a targets file defines.
pub fn available_locales(path: &Path) -> Result<Vec<String>, ConfigError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    Ok(parse_targets_file(&content)?.locales.into_keys().collect())
}

#[derive(Debug, Default, Serialize)]
pub struct ValidationReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Check a targets file for hard errors (unreadable, malformed) and for
/// settings that silently disable part of the filter.
pub fn validate_targets(path: &Path) -> ValidationReport {
    let mut report = ValidationReport::default();
    let label = path.display();

    if !path.exists() {
        report.warnings.push(format!("targets config not found at {}", label));
        return report;
    }

    let parsed = fs::read_to_string(path)
        .map_err(|source| ConfigError::Io {
            path: label.to_string(),
            source,
        })
        .and_then(|content| parse_targets_file(&content));

    let file = match parsed {
        Ok(file) => file,
        Err(e) => {
            report.errors.push(format!("{}: {}", label, e));
            return report;
        }
    };

    let targets = &file.base;
    if targets.all_companies().next().is_none() {
        report.warnings.push(format!("{}: No companies configured in any tier", label));
    }
    if targets.target_roles.primary.is_empty() {
        report.warnings.push(format!("{}: No primary target roles defined", label));
    }
    if targets.bad_words.title_words.is_empty() && targets.bad_words.description_words.is_empty() {
        report
            .warnings
            .push(format!("{}: No bad_words configured (filtering disabled)", label));
    }
    if targets.bad_words.penalty_per_match < 0.0 {
        report.warnings.push(format!(
            "{}: bad_words.penalty_per_match is negative ({})",
            label, targets.bad_words.penalty_per_match
        ));
    }
    let range = &targets.experience_range;
    if range.min_years > range.max_years {
        report.warnings.push(format!(
            "{}: experience_range.min_years ({}) exceeds max_years ({}), every posting with a stated requirement will be penalized",
            label, range.min_years, range.max_years
        ));
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const TARGETS_YAML: &str = r#"
version: "1.0"
tiers:
  tier1:
    companies:
      - name: Anthropic
        careers_url: https://anthropic.com/careers
        priority: 1
  tier2:
    companies:
      - name: Databricks
        priority: 2
  tier3:
    companies:
      - name: Snyk
exclusions:
  companies: [BadCorp]
  keywords: [unpaid]
target_roles:
  primary: [AI Engineer]
  secondary: [Platform Engineer]
search_params:
  locations:
    preferred: [Remote]
    acceptable: ["San Francisco, CA"]
  salary:
    minimum_usd: 150000
    currency: USD
bad_words:
  title_words: [junior, intern]
  description_words: [security clearance required]
  penalty_per_match: 5.0
experience_range:
  min_years: 3
  max_years: 15
locales:
  israel:
    search_params:
      locations:
        preferred: ["Tel Aviv, Israel", "Herzliya, Israel"]
        acceptable: ["Haifa, Israel", Remote]
      country: Israel
      salary:
        minimum_ils: 45000
        currency: ILS
    tiers:
      tier1:
        companies:
          - name: monday.com
            priority: 1
      tier2:
        companies:
          - name: Tabnine
            priority: 2
    bad_words:
      description_words: [dod clearance, must be eligible for us security clearance]
"#;

    fn base_config() -> TargetsConfig {
        parse_targets(TARGETS_YAML, None).unwrap()
    }

    fn israel_overrides() -> LocaleOverrides {
        parse_targets_file(TARGETS_YAML)
            .unwrap()
            .locales
            .remove("israel")
            .unwrap()
    }

    fn tier_names(config: &TargetsConfig, tier: &str) -> Vec<String> {
        config.tiers[tier].companies.iter().map(|c| c.name.clone()).collect()
    }

    #[test]
    fn test_defaults_applied_to_sparse_document() {
        let config = parse_targets("bad_words:\n  title_words: [junior]\n", None).unwrap();
        assert_eq!(config.bad_words.penalty_per_match, 5.0);
        assert_eq!(config.experience_range.min_years, 0);
        assert_eq!(config.experience_range.max_years, 50);
        assert_eq!(config.search_params.country, "USA");
        assert!(!config.is_empty());
    }

    #[test]
    fn test_company_priority_defaults_to_three() {
        let config = base_config();
        assert_eq!(config.tiers["tier3"].companies[0].priority, 3);
    }

    #[test]
    fn test_empty_document_is_empty_config() {
        assert!(parse_targets("", None).unwrap().is_empty());
        assert!(parse_targets("   \n", None).unwrap().is_empty());
    }

    #[test]
    fn test_merge_tiers_extended() {
        let merged = merge_locale(&base_config(), &israel_overrides());
        assert_eq!(tier_names(&merged, "tier1"), vec!["Anthropic", "monday.com"]);
        assert_eq!(tier_names(&merged, "tier2"), vec!["Databricks", "Tabnine"]);
    }

    #[test]
    fn test_merge_locations_replaced() {
        let merged = merge_locale(&base_config(), &israel_overrides());
        let locs = &merged.search_params.locations;
        assert!(locs.preferred.contains(&"Tel Aviv, Israel".to_string()));
        assert!(!locs.preferred.contains(&"Remote".to_string()));
        assert!(!locs.acceptable.contains(&"San Francisco, CA".to_string()));
    }

    #[test]
    fn test_merge_country_and_salary_replaced() {
        let merged = merge_locale(&base_config(), &israel_overrides());
        assert_eq!(merged.search_params.country, "Israel");
        let salary = &merged.search_params.salary;
        assert_eq!(salary.currency, "ILS");
        assert_eq!(salary.amounts["minimum_ils"].as_i64(), Some(45000));
        assert!(!salary.amounts.contains_key("minimum_usd"));
    }

    #[test]
    fn test_locale_salary_with_different_shape() {
        let yaml = r#"
search_params:
  salary:
    minimum_usd: 150000.0
locales:
  eu:
    search_params:
      salary:
        currency: EUR
        minimum: 90000
        period: yearly
"#;
        let base = parse_targets(yaml, None).unwrap();
        assert_eq!(base.search_params.salary.amounts["minimum_usd"].as_f64(), Some(150000.0));

        let salary = parse_targets(yaml, Some("eu")).unwrap().search_params.salary;
        assert_eq!(salary.currency, "EUR");
        assert_eq!(salary.amounts["minimum"].as_i64(), Some(90000));
        assert_eq!(salary.amounts["period"].as_str(), Some("yearly"));
        assert!(!salary.amounts.contains_key("minimum_usd"));
    }

    #[test]
    fn test_document_with_default_values_is_not_empty() {
        let yaml = "version: '1.0'\nexperience_range:\n  min_years: 0\n  max_years: 50\n";
        let config = parse_targets(yaml, None).unwrap();
        assert!(!config.is_empty());
    }

    #[test]
    fn test_locales_only_document_is_empty_without_locale() {
        let yaml = "locales:\n  eu:\n    search_params:\n      country: Germany\n";
        assert!(parse_targets(yaml, None).unwrap().is_empty());
        assert!(!parse_targets(yaml, Some("eu")).unwrap().is_empty());
    }

    #[test]
    fn test_merge_bad_words_extended_and_deduped() {
        let merged = merge_locale(&base_config(), &israel_overrides());
        let desc = &merged.bad_words.description_words;
        assert_eq!(
            desc,
            &vec![
                "security clearance required".to_string(),
                "dod clearance".to_string(),
                "must be eligible for us security clearance".to_string(),
            ]
        );
        assert_eq!(merged.bad_words.title_words, vec!["junior", "intern"]);
    }

    #[test]
    fn test_merge_bad_words_dedup_case_insensitive() {
        let overrides = LocaleOverrides {
            bad_words: Some(LocaleBadWords {
                title_words: None,
                description_words: Some(vec!["Security Clearance Required".into()]),
            }),
            ..Default::default()
        };
        let merged = merge_locale(&base_config(), &overrides);
        let count = merged
            .bad_words
            .description_words
            .iter()
            .filter(|w| w.to_lowercase() == "security clearance required")
            .count();
        assert_eq!(count, 1);
        // first spelling wins
        assert_eq!(merged.bad_words.description_words[0], "security clearance required");
    }

    #[test]
    fn test_merge_does_not_mutate_base() {
        let base = base_config();
        let before = base.clone();
        let _ = merge_locale(&base, &israel_overrides());
        assert_eq!(base, before);
    }

    #[test]
    fn test_merge_empty_override_is_identity() {
        let base = base_config();
        assert_eq!(merge_locale(&base, &LocaleOverrides::default()), base);
    }

    #[test]
    fn test_merge_inherits_roles_and_experience_range() {
        let base = base_config();
        let merged = merge_locale(&base, &israel_overrides());
        assert_eq!(merged.target_roles, base.target_roles);
        assert_eq!(merged.experience_range, base.experience_range);
    }

    #[test]
    fn test_merge_creates_new_tier() {
        let mut overrides = LocaleOverrides::default();
        overrides.tiers.insert(
            "tier4".into(),
            TierConfig {
                companies: vec![CompanyEntry::new("NewCo", 4)],
            },
        );
        let merged = merge_locale(&base_config(), &overrides);
        assert_eq!(merged.tiers["tier4"].companies[0].name, "NewCo");
        assert_eq!(merged.tiers["tier1"].companies.len(), 1);
    }

    #[test]
    fn test_load_with_locale_merges_and_strips_locales() {
        let targets = parse_targets(TARGETS_YAML, Some("israel")).unwrap();
        assert_eq!(tier_names(&targets, "tier1"), vec!["Anthropic", "monday.com"]);
        assert_eq!(targets.company_tier("TABNINE"), Some("tier2"));
    }

    #[test]
    fn test_unknown_locale_lists_available() {
        let err = parse_targets(TARGETS_YAML, Some("narnia")).unwrap_err();
        match &err {
            ConfigError::UnknownLocale { requested, available } => {
                assert_eq!(requested, "narnia");
                assert_eq!(available, &vec!["israel".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
        let msg = err.to_string();
        assert!(msg.contains("Unknown locale 'narnia'"));
        assert!(msg.contains("israel"));
        assert!(!msg.contains("did you mean"));
    }

    #[test]
    fn test_unknown_locale_suggests_close_name() {
        let err = parse_targets(TARGETS_YAML, Some("isreal")).unwrap_err();
        assert!(err.to_string().contains("did you mean 'israel'?"));
    }

    #[test]
    fn test_unknown_locale_without_locales_section() {
        let err = parse_targets("version: '1.0'\n", Some("israel")).unwrap_err();
        assert!(err.to_string().contains("(none)"));
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let targets = load_targets(&dir.path().join("targets.yaml"), Some("israel")).unwrap();
        assert!(targets.is_empty());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(TARGETS_YAML.as_bytes()).unwrap();
        let targets = load_targets(file.path(), None).unwrap();
        assert_eq!(targets.company_tier("anthropic"), Some("tier1"));
        assert_eq!(available_locales(file.path()).unwrap(), vec!["israel"]);
    }

    #[test]
    fn test_validate_clean_config_has_no_findings() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(TARGETS_YAML.as_bytes()).unwrap();
        let report = validate_targets(file.path());
        assert!(report.is_valid());
        assert!(report.warnings.is_empty(), "{:?}", report.warnings);
    }

    #[test]
    fn test_validate_warns_on_sparse_config() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"experience_range:\n  min_years: 10\n  max_years: 5\n").unwrap();
        let report = validate_targets(file.path());
        assert!(report.is_valid());
        let joined = report.warnings.join("\n");
        assert!(joined.contains("No companies configured"));
        assert!(joined.contains("No primary target roles"));
        assert!(joined.contains("No bad_words configured"));
        assert!(joined.contains("exceeds max_years"));
    }

    #[test]
    fn test_validate_reports_parse_error() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"tiers:\n  tier1:\n    companies:\n      - priority: 1\n").unwrap();
        let report = validate_targets(file.path());
        assert!(!report.is_valid());
        assert!(report.errors[0].contains("name"));
    }
}
