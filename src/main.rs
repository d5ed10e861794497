mod db;
mod experience;
mod filter;
mod models;
mod pipeline;
mod targets;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use db::ApplicationTracker;
use models::{Application, ApplicationStatus, JobPosting, RoleMatch, Tier};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Parser)]
#[command(name = "jobsift")]
#[command(about = "Filter, rank and track job postings against your targets")]
struct Cli {
    /// Application tracker database
    #[arg(long, global = true, env = "JOBSIFT_DB", default_value = db::DEFAULT_DB_PATH)]
    db: PathBuf,

    /// Targets config (YAML)
    #[arg(long, global = true, env = "JOBSIFT_TARGETS")]
    targets: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the tracker database
    Init,

    /// Dedup, filter and rank scraped postings
    Filter {
        /// JSON file with an array of postings (or an object with a `jobs` array)
        input: PathBuf,

        /// Locale overrides to merge into the targets config
        #[arg(short, long)]
        locale: Option<String>,

        /// Write the enriched postings to this JSON file
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Skip the already-applied lookup
        #[arg(long)]
        no_db: bool,

        /// Number of postings to show in the summary
        #[arg(long, default_value = "15")]
        limit: usize,
    },

    /// Record an application
    Add {
        /// Application ID
        id: String,

        #[arg(short, long)]
        company: String,

        #[arg(short, long)]
        role: String,

        #[arg(short, long)]
        url: Option<String>,

        /// linkedin, greenhouse, lever, direct
        #[arg(short, long)]
        platform: Option<String>,

        #[arg(short, long, default_value = "discovered")]
        status: String,

        #[arg(long)]
        score: Option<f64>,

        /// Matched keyword (repeatable)
        #[arg(short, long = "keyword")]
        keywords: Vec<String>,

        #[arg(long)]
        location: Option<String>,

        #[arg(short, long)]
        notes: Option<String>,
    },

    /// Update application status (applied, response, interview, offer, rejected, withdrawn)
    Track {
        /// Application ID
        id: String,

        action: String,

        note: Option<String>,
    },

    /// Log an interaction (email, phone, interview, ...)
    Note {
        /// Application ID
        id: String,

        kind: String,

        details: String,

        /// When it happened (defaults to now)
        #[arg(long)]
        at: Option<String>,
    },

    /// List applications
    List {
        /// Filter by status
        #[arg(short, long)]
        status: Option<String>,
    },

    /// Show application details and interactions
    Show {
        /// Application ID
        id: String,
    },

    /// Search applications
    Search {
        #[arg(short, long)]
        company: Option<String>,

        #[arg(short, long)]
        role: Option<String>,

        #[arg(long)]
        min_score: Option<f64>,
    },

    /// Show pipeline summary
    Status,

    /// Validate the targets config
    Validate,

    /// List locales defined in the targets config
    Locales,

    /// Export all applications as JSON
    Export {
        output: PathBuf,
    },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum JobsInput {
    List(Vec<JobPosting>),
    Wrapped { jobs: Vec<JobPosting> },
}

fn resolve_targets_path(explicit: Option<PathBuf>) -> PathBuf {
    if let Some(path) = explicit {
        return path;
    }
    let local = PathBuf::from("config/targets.yaml");
    if local.exists() {
        return local;
    }
    directories::ProjectDirs::from("", "", "jobsift")
        .map(|dirs| dirs.config_dir().join("targets.yaml"))
        .unwrap_or(local)
}

fn read_jobs(path: &Path) -> Result<Vec<JobPosting>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read jobs file: {}", path.display()))?;
    let input: JobsInput = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse jobs file: {}", path.display()))?;
    Ok(match input {
        JobsInput::List(jobs) | JobsInput::Wrapped { jobs } => jobs,
    })
}

/// Map a user-facing action word onto a status.
fn action_to_status(action: &str) -> Option<ApplicationStatus> {
    match action.to_lowercase().as_str() {
        "applied" => Some(ApplicationStatus::Applied),
        "response" | "responded" => Some(ApplicationStatus::Responded),
        "interview" | "interviewing" => Some(ApplicationStatus::Interviewing),
        "offer" => Some(ApplicationStatus::Offer),
        "rejected" => Some(ApplicationStatus::Rejected),
        "withdrawn" => Some(ApplicationStatus::Withdrawn),
        _ => None,
    }
}

fn print_job_summary(jobs: &[JobPosting], limit: usize) {
    println!("{}", "=".repeat(70));
    println!("{} jobs after filtering", jobs.len());
    println!("{}\n", "=".repeat(70));

    for (i, job) in jobs.iter().take(limit).enumerate() {
        let tier_badge = match job.target_tier {
            Some(tier) if tier != Tier::Unknown => format!(" [{}]", tier.as_str().to_uppercase()),
            _ => String::new(),
        };
        let role_badge = match job.role_match {
            Some(RoleMatch::Primary) => " (primary)",
            Some(RoleMatch::Secondary) => " (secondary)",
            _ => "",
        };

        println!("{:2}. {}{}", i + 1, job.title(), role_badge);
        println!("    Company:  {}{}", job.company(), tier_badge);
        println!("    Location: {}", job.location());
        if let Some(penalty) = job.bad_word_penalty.filter(|p| *p > 0.0) {
            let matched = job.bad_words_matched.as_deref().unwrap_or_default().join(", ");
            println!("    Penalty:  {:.1} ({})", penalty, matched);
        }
        if let Some(url) = job.link() {
            println!("    URL:      {}", truncate(url, 80));
        }
        println!();
    }

    if jobs.len() > limit {
        println!("... and {} more jobs", jobs.len() - limit);
    }
}

fn print_applications(apps: &[Application]) {
    if apps.is_empty() {
        println!("No applications found.");
        return;
    }
    println!(
        "{:<16} {:<13} {:<22} {:<26} {:>6}",
        "ID", "STATUS", "COMPANY", "ROLE", "SCORE"
    );
    println!("{}", "-".repeat(87));
    for app in apps {
        let score = app
            .match_score
            .map(|s| format!("{:.1}", s))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<16} {:<13} {:<22} {:<26} {:>6}",
            truncate(&app.id, 14),
            app.status,
            truncate(&app.company, 20),
            truncate(&app.role, 24),
            score
        );
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();
    let targets_path = resolve_targets_path(cli.targets);

    match cli.command {
        Commands::Init => {
            let tracker = ApplicationTracker::open(&cli.db)?;
            println!("Database initialized at {}", tracker.path().display());
        }

        Commands::Filter {
            input,
            locale,
            output,
            no_db,
            limit,
        } => {
            let jobs = read_jobs(&input)?;
            let targets = targets::load_targets(&targets_path, locale.as_deref())?;
            info!(count = jobs.len(), targets = %targets_path.display(), "filtering postings");

            let tracker = if no_db {
                None
            } else {
                match ApplicationTracker::open(&cli.db) {
                    Ok(tracker) => Some(tracker),
                    Err(err) => {
                        tracing::warn!(error = %err, "tracker unavailable, DB dedup skipped");
                        None
                    }
                }
            };

            let outcome = pipeline::process(jobs, &targets, tracker.as_ref());

            if outcome.duplicates_removed > 0 {
                println!("Removed {} duplicate postings", outcome.duplicates_removed);
            }
            if outcome.excluded > 0 {
                println!("Filtered {} jobs based on exclusions", outcome.excluded);
            }
            if !outcome.tier_counts.is_empty() && !targets.is_empty() {
                let counts: Vec<String> = outcome
                    .tier_counts
                    .iter()
                    .map(|(tier, n)| format!("{}: {}", tier, n))
                    .collect();
                println!("Jobs by tier: {}", counts.join(", "));
            }
            if !outcome.already_applied.is_empty() {
                println!(
                    "Filtered {} already-applied jobs (DB dedup)",
                    outcome.already_applied.len()
                );
            }
            println!();
            print_job_summary(&outcome.jobs, limit);

            if let Some(out_path) = output {
                let result = serde_json::json!({
                    "source": input.display().to_string(),
                    "locale": locale,
                    "timestamp": chrono::Local::now().to_rfc3339(),
                    "count": outcome.jobs.len(),
                    "jobs": outcome.jobs,
                    "already_applied": outcome.already_applied,
                });
                std::fs::write(&out_path, serde_json::to_string_pretty(&result)?)
                    .with_context(|| format!("Failed to write to {}", out_path.display()))?;
                println!("Saved JSON: {}", out_path.display());
            }
        }

        Commands::Add {
            id,
            company,
            role,
            url,
            platform,
            status,
            score,
            keywords,
            location,
            notes,
        } => {
            let tracker = ApplicationTracker::open(&cli.db)?;
            let status: ApplicationStatus = status.parse()?;
            let mut app = Application::new(&id, &company, &role, status);
            app.job_url = url;
            app.platform = platform;
            app.match_score = score;
            app.keywords_matched = keywords;
            app.location = location;
            app.notes = notes;
            if status == ApplicationStatus::Applied {
                app.applied_at = Some(app.created_at.clone());
            } else if status.is_response() {
                app.response_at = Some(app.created_at.clone());
            }

            if tracker.add_application(&app)? {
                println!("Added application '{}' ({} at {}, {})", id, role, company, status);
            } else {
                println!("Application '{}' already exists.", id);
            }
        }

        Commands::Track { id, action, note } => {
            let tracker = ApplicationTracker::open(&cli.db)?;
            let status = action_to_status(&action).ok_or_else(|| {
                anyhow!(
                    "Unknown action '{}'. Valid actions: applied, response, interview, offer, rejected, withdrawn",
                    action
                )
            })?;

            if tracker.update_status(&id, status.as_str(), note.as_deref().unwrap_or(""))? {
                println!("Updated {} to {}", id, status);
                if let Some(note) = note {
                    println!("Note: {}", note);
                }
            } else {
                println!("Application '{}' not found.", id);
            }
        }

        Commands::Note {
            id,
            kind,
            details,
            at,
        } => {
            let tracker = ApplicationTracker::open(&cli.db)?;
            if tracker.get_application(&id)?.is_none() {
                return Err(anyhow!("Application '{}' not found", id));
            }
            let interaction_id = tracker.add_interaction(&id, &kind, &details, at.as_deref())?;
            println!("Logged {} for {} (#{})", kind, id, interaction_id);
        }

        Commands::List { status } => {
            let tracker = ApplicationTracker::open(&cli.db)?;
            let apps = match status {
                Some(s) => tracker.get_applications_by_status(s.parse()?)?,
                None => tracker.get_all_applications()?,
            };
            print_applications(&apps);
        }

        Commands::Show { id } => {
            let tracker = ApplicationTracker::open(&cli.db)?;
            match tracker.get_application(&id)? {
                Some(app) => {
                    println!("Application {}", app.id);
                    println!("Company: {}", app.company);
                    println!("Role: {}", app.role);
                    println!("Status: {}", app.status);
                    if let Some(url) = &app.job_url {
                        println!("URL: {}", url);
                    }
                    if let Some(platform) = &app.platform {
                        println!("Platform: {}", platform);
                    }
                    if let Some(score) = app.match_score {
                        println!("Match score: {:.1}", score);
                    }
                    if !app.keywords_matched.is_empty() {
                        println!("Keywords: {}", app.keywords_matched.join(", "));
                    }
                    if let Some(applied) = &app.applied_at {
                        println!("Applied: {}", applied);
                    }
                    if let Some(response) = &app.response_at {
                        println!("Response: {}", response);
                    }
                    println!("Created: {}", app.created_at);
                    println!("Updated: {}", app.updated_at);
                    if let Some(notes) = app.notes.as_deref().filter(|n| !n.is_empty()) {
                        println!("\n--- Notes ---");
                        for line in notes.lines() {
                            println!("{}", textwrap::fill(line, 70));
                        }
                    }

                    let interactions = tracker.get_interactions(&app.id)?;
                    if !interactions.is_empty() {
                        println!("\nInteractions ({}):", interactions.len());
                        for i in interactions {
                            let when = i.occurred_at.as_deref().unwrap_or(&i.created_at);
                            let details = i.details.unwrap_or_default();
                            let prefix = format!("  {} [{}] ", truncate(when, 19), i.kind);
                            let indent = " ".repeat(prefix.chars().count());
                            let options = textwrap::Options::new(90)
                                .initial_indent(&prefix)
                                .subsequent_indent(&indent);
                            println!("{}", textwrap::fill(&details, options));
                        }
                    }
                }
                None => {
                    println!("Application '{}' not found.", id);
                }
            }
        }

        Commands::Search {
            company,
            role,
            min_score,
        } => {
            let tracker = ApplicationTracker::open(&cli.db)?;
            let apps =
                tracker.search_applications(company.as_deref(), role.as_deref(), min_score)?;
            print_applications(&apps);
        }

        Commands::Status => {
            let tracker = ApplicationTracker::open(&cli.db)?;
            print!("{}", tracker.generate_status_report()?);
        }

        Commands::Validate => {
            println!("Validating {}...\n", targets_path.display());
            let report = targets::validate_targets(&targets_path);
            if !report.errors.is_empty() {
                println!("Errors:");
                for error in &report.errors {
                    println!("  ✗ {}", error);
                }
                println!();
            }
            if !report.warnings.is_empty() {
                println!("Warnings:");
                for warning in &report.warnings {
                    println!("  ⚠ {}", warning);
                }
                println!();
            }
            if report.is_valid() {
                println!("Config valid.");
            } else {
                return Err(anyhow!("Config validation failed"));
            }
        }

        Commands::Locales => {
            let locales = targets::available_locales(&targets_path)?;
            if locales.is_empty() {
                println!("No locales defined in {}.", targets_path.display());
            } else {
                for name in locales {
                    println!("{}", name);
                }
            }
        }

        Commands::Export { output } => {
            let tracker = ApplicationTracker::open(&cli.db)?;
            let apps = tracker.get_all_applications()?;
            std::fs::write(&output, serde_json::to_string_pretty(&apps)?)
                .with_context(|| format!("Failed to write to {}", output.display()))?;
            println!("Exported {} applications to {}", apps.len(), output.display());
        }
    }

    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_action_aliases() {
        assert_eq!(action_to_status("Interview"), Some(ApplicationStatus::Interviewing));
        assert_eq!(action_to_status("response"), Some(ApplicationStatus::Responded));
        assert_eq!(action_to_status("withdrawn"), Some(ApplicationStatus::Withdrawn));
        assert_eq!(action_to_status("discovered"), None);
    }

    #[test]
    fn test_read_jobs_accepts_array_and_wrapped() {
        let mut list = tempfile::NamedTempFile::new().unwrap();
        list.write_all(br#"[{"company":"A","title":"Engineer","site":"indeed"}]"#).unwrap();
        let jobs = read_jobs(list.path()).unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].company(), "A");

        let mut wrapped = tempfile::NamedTempFile::new().unwrap();
        wrapped
            .write_all(br#"{"search_term":"AI Engineer","jobs":[{"company":"B"},{"company":"C"}]}"#)
            .unwrap();
        assert_eq!(read_jobs(wrapped.path()).unwrap().len(), 2);
    }

    #[test]
    fn test_explicit_targets_path_wins() {
        let path = resolve_targets_path(Some(PathBuf::from("/tmp/custom.yaml")));
        assert_eq!(path, PathBuf::from("/tmp/custom.yaml"));
    }

    #[test]
    fn test_truncate_is_char_safe() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("Zürich Engineering Team", 10), "Zürich ...");
    }

    #[test]
    fn test_cli_parses_filter() {
        let cli = Cli::try_parse_from([
            "jobsift", "--db", "x.db", "filter", "jobs.json", "--locale", "israel", "--no-db",
        ])
        .unwrap();
        assert_eq!(cli.db, PathBuf::from("x.db"));
        match cli.command {
            Commands::Filter { locale, no_db, limit, .. } => {
                assert_eq!(locale.as_deref(), Some("israel"));
                assert!(no_db);
                assert_eq!(limit, 15);
            }
            _ => panic!("expected filter"),
        }
    }
}
