use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use tracing::debug;

use crate::experience::extract_experience_years;
use crate::models::{ExperienceMatch, JobPosting, RoleMatch, Tier};
use crate::targets::{ExperienceRange, TargetsConfig};

const UNKNOWN_TIER_PRIORITY: u32 = 4;

/// Drop repeated postings, keeping the first occurrence.
///
/// A posting repeats if its URL or its `company|title|location` key was
/// already seen. Both keys of every kept posting are recorded.
pub fn deduplicate(jobs: Vec<JobPosting>) -> Vec<JobPosting> {
    let mut seen_urls: HashSet<String> = HashSet::new();
    let mut seen_keys: HashSet<String> = HashSet::new();
    let mut unique = Vec::with_capacity(jobs.len());

    for job in jobs {
        let url = job.link().map(str::to_string);
        let key = format!("{}|{}|{}", job.company(), job.title(), job.location());

        if url.as_ref().is_some_and(|u| seen_urls.contains(u)) || seen_keys.contains(&key) {
            debug!(company = job.company(), title = job.title(), "dropping duplicate posting");
            continue;
        }

        if let Some(url) = url {
            seen_urls.insert(url);
        }
        seen_keys.insert(key);
        unique.push(job);
    }

    unique
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct TierInfo {
    tier: Tier,
    priority: u32,
}

/// Targets config pre-lowercased for matching against many postings.
#[derive(Debug, Clone)]
pub struct TargetMatcher {
    company_tiers: HashMap<String, TierInfo>,
    excluded_companies: HashSet<String>,
    excluded_keywords: Vec<String>,
    primary_roles: Vec<String>,
    secondary_roles: Vec<String>,
    bad_title_words: Vec<String>,
    bad_description_words: Vec<String>,
    penalty_per_match: f64,
    experience: ExperienceRange,
}

fn lowered(items: &[String]) -> Vec<String> {
    items.iter().map(|s| s.to_lowercase()).collect()
}

impl TargetMatcher {
    pub fn new(targets: &TargetsConfig) -> Self {
        let mut company_tiers = HashMap::new();
        for tier in Tier::NAMED {
            let Some(tier_config) = targets.tier(tier) else { continue };
            for company in &tier_config.companies {
                // Tiers are walked tier1..tier3; a later listing overrides.
                company_tiers.insert(
                    company.name.to_lowercase(),
                    TierInfo {
                        tier,
                        priority: company.priority,
                    },
                );
            }
        }

        Self {
            company_tiers,
            excluded_companies: lowered(&targets.exclusions.companies).into_iter().collect(),
            excluded_keywords: lowered(&targets.exclusions.keywords),
            primary_roles: lowered(&targets.target_roles.primary),
            secondary_roles: lowered(&targets.target_roles.secondary),
            bad_title_words: lowered(&targets.bad_words.title_words),
            bad_description_words: lowered(&targets.bad_words.description_words),
            penalty_per_match: targets.bad_words.penalty_per_match,
            experience: targets.experience_range.clone(),
        }
    }

    /// Hard filter: excluded company, or an excluded keyword in title or description.
    pub fn is_hard_excluded(&self, job: &JobPosting) -> bool {
        let company = job.company().to_lowercase();
        if self.excluded_companies.contains(&company) {
            return true;
        }
        let title = job.title().to_lowercase();
        let description = job.description().to_lowercase();
        self.excluded_keywords
            .iter()
            .any(|kw| title.contains(kw.as_str()) || description.contains(kw.as_str()))
    }

    fn tier_for(&self, company: &str) -> TierInfo {
        self.company_tiers
            .get(&company.to_lowercase())
            .copied()
            .unwrap_or(TierInfo {
                tier: Tier::Unknown,
                priority: UNKNOWN_TIER_PRIORITY,
            })
    }

    /// Classify a title against the target roles, returning the priority cap it earns.
    pub fn role_match(&self, title: &str) -> (RoleMatch, Option<u32>) {
        let title = title.to_lowercase();
        if self.primary_roles.iter().any(|r| title.contains(r.as_str())) {
            (RoleMatch::Primary, Some(1))
        } else if self.secondary_roles.iter().any(|r| title.contains(r.as_str())) {
            (RoleMatch::Secondary, Some(2))
        } else {
            (RoleMatch::Other, None)
        }
    }

    /// Soft filter: one penalty per bad word found, tagged `title:` or `desc:`.
    pub fn score_bad_words(&self, title: &str, description: &str) -> (f64, Vec<String>) {
        let title = title.to_lowercase();
        let description = description.to_lowercase();
        let mut penalty = 0.0;
        let mut matched = Vec::new();

        for word in &self.bad_title_words {
            if title.contains(word.as_str()) {
                penalty += self.penalty_per_match;
                matched.push(format!("title:{}", word));
            }
        }
        for word in &self.bad_description_words {
            if description.contains(word.as_str()) {
                penalty += self.penalty_per_match;
                matched.push(format!("desc:{}", word));
            }
        }

        (penalty, matched)
    }

    /// Place stated years against the configured range; mismatches cost one penalty.
    pub fn classify_experience(&self, years: Option<u32>) -> (ExperienceMatch, f64) {
        let Some(years) = years else {
            return (ExperienceMatch::Unknown, 0.0);
        };
        if years < self.experience.min_years {
            (ExperienceMatch::UnderQualified, self.penalty_per_match)
        } else if years > self.experience.max_years {
            (ExperienceMatch::OverQualified, self.penalty_per_match)
        } else {
            (ExperienceMatch::InRange, 0.0)
        }
    }

    /// Fill in tier, priority, role, penalty and experience fields.
    pub fn enrich(&self, job: &mut JobPosting) {
        let info = self.tier_for(job.company());
        let (role_match, priority_cap) = self.role_match(job.title());
        let priority = priority_cap.map_or(info.priority, |cap| info.priority.min(cap));

        let (mut penalty, matched) = self.score_bad_words(job.title(), job.description());

        let years = extract_experience_years(job.description())
            .or_else(|| extract_experience_years(job.title()));
        let (experience_match, experience_penalty) = self.classify_experience(years);
        penalty += experience_penalty;

        job.target_tier = Some(info.tier);
        job.target_priority = Some(priority);
        job.auto_apply_eligible = Some(info.tier.auto_apply_eligible());
        job.role_match = Some(role_match);
        job.bad_word_penalty = Some(penalty);
        job.bad_words_matched = Some(matched);
        job.required_experience_years = years;
        job.experience_match = Some(experience_match);
    }
}

/// Ranking order: priority, then penalty, then tier rank. Lower sorts first.
pub fn rank_order(a: &JobPosting, b: &JobPosting) -> Ordering {
    let priority = |j: &JobPosting| j.target_priority.unwrap_or(UNKNOWN_TIER_PRIORITY);
    let penalty = |j: &JobPosting| j.bad_word_penalty.unwrap_or(0.0);
    let tier = |j: &JobPosting| j.target_tier.unwrap_or(Tier::Unknown);

    priority(a)
        .cmp(&priority(b))
        .then_with(|| penalty(a).total_cmp(&penalty(b)))
        .then_with(|| tier(a).cmp(&tier(b)))
}

/// Drop hard-excluded postings, enrich the rest, and rank them.
///
/// Returns `jobs` untouched when `targets` is empty.
pub fn apply_targets_filter(jobs: Vec<JobPosting>, targets: &TargetsConfig) -> Vec<JobPosting> {
    if targets.is_empty() {
        return jobs;
    }

    let matcher = TargetMatcher::new(targets);
    let mut enriched: Vec<JobPosting> = jobs
        .into_iter()
        .filter(|job| {
            let excluded = matcher.is_hard_excluded(job);
            if excluded {
                debug!(company = job.company(), title = job.title(), "excluded by targets");
            }
            !excluded
        })
        .map(|mut job| {
            matcher.enrich(&mut job);
            job
        })
        .collect();

    enriched.sort_by(rank_order);
    enriched
}
