use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{info, warn};

use crate::db::ApplicationTracker;
use crate::filter::{apply_targets_filter, deduplicate};
use crate::models::{JobPosting, Tier};
use crate::targets::TargetsConfig;

#[derive(Debug, Default, Serialize)]
pub struct DiscoveryOutcome {
    pub jobs: Vec<JobPosting>,
    pub duplicates_removed: usize,
    pub excluded: usize,
    pub already_applied: Vec<JobPosting>,
    pub tier_counts: BTreeMap<Tier, usize>,
    /// False when the tracker was unavailable and DB dedup was skipped.
    pub tracker_checked: bool,
}

/// Post-process freshly scraped postings: dedup, targets filter, then drop
/// anything already applied to.
///
/// A failing tracker is logged and skipped; the targets-filtered list is kept.
pub fn process(
    jobs: Vec<JobPosting>,
    targets: &TargetsConfig,
    tracker: Option<&ApplicationTracker>,
) -> DiscoveryOutcome {
    let scraped = jobs.len();
    let jobs = deduplicate(jobs);
    let duplicates_removed = scraped - jobs.len();

    let before_filter = jobs.len();
    let jobs = apply_targets_filter(jobs, targets);
    let excluded = before_filter - jobs.len();
    if excluded > 0 {
        info!(excluded, "filtered jobs based on exclusions");
    }

    let mut tier_counts = BTreeMap::new();
    for job in &jobs {
        *tier_counts.entry(job.target_tier.unwrap_or(Tier::Unknown)).or_insert(0) += 1;
    }

    let (jobs, already_applied, tracker_checked) = match tracker {
        None => (jobs, Vec::new(), false),
        Some(tracker) => {
            // Keep a copy so a mid-way failure can fall back to the full list.
            match tracker.filter_already_applied(jobs.clone()) {
                Ok((fresh, applied)) => {
                    if !applied.is_empty() {
                        info!(count = applied.len(), "filtered already-applied jobs");
                    }
                    (fresh, applied, true)
                }
                Err(err) => {
                    warn!(error = %err, "tracker dedup skipped");
                    (jobs, Vec::new(), false)
                }
            }
        }
    };

    info!(
        scraped,
        duplicates_removed,
        kept = jobs.len(),
        "discovery post-processing done"
    );

    DiscoveryOutcome {
        jobs,
        duplicates_removed,
        excluded,
        already_applied,
        tier_counts,
        tracker_checked,
    }
}
