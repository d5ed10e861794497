use anyhow::{Context, Result};
use rusqlite::types::Type;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::models::{Application, ApplicationStatus, Interaction, JobPosting};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS applications (
    id TEXT PRIMARY KEY,
    company TEXT NOT NULL,
    role TEXT NOT NULL,
    job_url TEXT,
    platform TEXT,
    status TEXT NOT NULL DEFAULT 'discovered' CHECK (status IN (
        'discovered', 'analyzing', 'ready', 'applied', 'responded',
        'interviewing', 'offer', 'rejected', 'withdrawn'
    )),
    match_score REAL,
    resume_variant TEXT,
    cover_letter TEXT,
    salary_range TEXT,
    location TEXT,
    remote_policy TEXT,
    applied_at TEXT,
    response_at TEXT,
    keywords_matched TEXT,
    notes TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS interactions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    application_id TEXT NOT NULL REFERENCES applications(id),
    type TEXT NOT NULL,
    details TEXT,
    occurred_at TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS job_cache (
    job_id TEXT PRIMARY KEY,
    company TEXT,
    role TEXT,
    job_url TEXT,
    platform TEXT,
    raw_data TEXT,
    fetched_at TEXT,
    expires_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_applications_status ON applications(status);
CREATE INDEX IF NOT EXISTS idx_applications_company ON applications(company);
CREATE INDEX IF NOT EXISTS idx_applications_job_url ON applications(job_url);
CREATE INDEX IF NOT EXISTS idx_interactions_app_id ON interactions(application_id);
"#;

const APPLICATION_COLUMNS: &str = "id, company, role, job_url, platform, status, match_score,
    resume_variant, cover_letter, salary_range, location, remote_policy,
    applied_at, response_at, keywords_matched, notes, created_at, updated_at";

pub const DEFAULT_DB_PATH: &str = "data/applications.db";

/// Persistent record of applications. Every call opens its own connection,
/// runs, commits and closes.
pub struct ApplicationTracker {
    path: PathBuf,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompanyCount {
    pub company: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Analytics {
    pub pipeline_stats: BTreeMap<ApplicationStatus, i64>,
    pub response_rate: f64,
    pub total_applications: i64,
    pub top_companies: Vec<CompanyCount>,
    pub avg_score_by_status: BTreeMap<ApplicationStatus, f64>,
}

impl ApplicationTracker {
    /// Open (creating parent directories and schema if needed) the tracker at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }
        let tracker = Self { path };
        tracker.init()?;
        Ok(tracker)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn connect(&self) -> Result<Connection> {
        Connection::open(&self.path)
            .with_context(|| format!("Failed to open database at {}", self.path.display()))
    }

    fn init(&self) -> Result<()> {
        self.connect()?
            .execute_batch(SCHEMA)
            .context("Failed to create tracker schema")
    }

    // --- Dedup lookups ---

    /// The stored application matching this job, ignoring `discovered` rows.
    ///
    /// An exact `job_url` match is tried first, then a case-insensitive
    /// company + role match.
    pub fn is_already_applied(
        &self,
        company: &str,
        role: &str,
        job_url: Option<&str>,
    ) -> Result<Option<Application>> {
        let conn = self.connect()?;

        if let Some(url) = job_url.filter(|u| !u.is_empty()) {
            let sql = format!(
                "SELECT {APPLICATION_COLUMNS} FROM applications
                 WHERE job_url = ?1 AND status != 'discovered' LIMIT 1"
            );
            let found = conn
                .query_row(&sql, [url], Self::row_to_application)
                .optional()?;
            if found.is_some() {
                return Ok(found);
            }
        }

        if company.is_empty() || role.is_empty() {
            return Ok(None);
        }

        let sql = format!(
            "SELECT {APPLICATION_COLUMNS} FROM applications
             WHERE LOWER(company) = LOWER(?1) AND LOWER(role) = LOWER(?2)
             AND status != 'discovered' LIMIT 1"
        );
        conn.query_row(&sql, params![company, role], Self::row_to_application)
            .optional()
            .context("Failed to look up application")
    }

    /// Split `jobs` into `(new, already_applied)`, preserving order in both.
    /// Already-applied jobs are tagged with the matching application's id and status.
    pub fn filter_already_applied(
        &self,
        jobs: Vec<JobPosting>,
    ) -> Result<(Vec<JobPosting>, Vec<JobPosting>)> {
        let mut new_jobs = Vec::new();
        let mut already_applied = Vec::new();

        for mut job in jobs {
            let existing = self.is_already_applied(job.company(), job.role_or_title(), job.link())?;
            match existing {
                Some(app) => {
                    debug!(company = job.company(), application = %app.id, "already applied");
                    job.already_applied = Some(true);
                    job.existing_application_id = Some(app.id);
                    job.existing_status = Some(app.status);
                    already_applied.push(job);
                }
                None => new_jobs.push(job),
            }
        }

        Ok((new_jobs, already_applied))
    }

    // --- Write side ---

    /// Insert a new application. Returns `false` if the id already exists.
    pub fn add_application(&self, app: &Application) -> Result<bool> {
        let keywords = serde_json::to_string(&app.keywords_matched)?;
        let conn = self.connect()?;
        let result = conn.execute(
            "INSERT INTO applications (
                id, company, role, job_url, platform, status, match_score,
                resume_variant, cover_letter, salary_range, location, remote_policy,
                applied_at, response_at, keywords_matched, notes, created_at, updated_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)",
            params![
                app.id,
                app.company,
                app.role,
                app.job_url,
                app.platform,
                app.status.as_str(),
                app.match_score,
                app.resume_variant,
                app.cover_letter,
                app.salary_range,
                app.location,
                app.remote_policy,
                app.applied_at,
                app.response_at,
                keywords,
                app.notes,
                app.created_at,
                app.updated_at,
            ],
        );

        match result {
            Ok(_) => Ok(true),
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                debug!(id = %app.id, "application already exists");
                Ok(false)
            }
            Err(e) => Err(e).context("Failed to insert application"),
        }
    }

    /// Move an application to `new_status`, appending `notes` and logging a
    /// `status_change` interaction. Returns `false` if no application has `app_id`.
    ///
    /// `applied_at` is stamped on entering `applied`; `response_at` on entering
    /// any response status.
    pub fn update_status(&self, app_id: &str, new_status: &str, notes: &str) -> Result<bool> {
        let status: ApplicationStatus = new_status.parse()?;
        let now = chrono::Utc::now().to_rfc3339();

        let mut conn = self.connect()?;
        let tx = conn.transaction()?;

        let updated = tx.execute(
            "UPDATE applications
             SET status = ?1, updated_at = ?2,
                 notes = CASE
                     WHEN ?3 = '' THEN notes
                     WHEN notes IS NULL OR notes = '' THEN ?3
                     ELSE notes || char(10) || ?3
                 END
             WHERE id = ?4",
            params![status.as_str(), now, notes, app_id],
        )?;

        if updated == 0 {
            return Ok(false);
        }

        if status == ApplicationStatus::Applied {
            tx.execute(
                "UPDATE applications SET applied_at = ?1 WHERE id = ?2",
                params![now, app_id],
            )?;
        } else if status.is_response() {
            tx.execute(
                "UPDATE applications SET response_at = ?1 WHERE id = ?2",
                params![now, app_id],
            )?;
        }

        tx.execute(
            "INSERT INTO interactions (application_id, type, details, occurred_at)
             VALUES (?1, 'status_change', ?2, ?3)",
            params![app_id, status.as_str(), now],
        )?;

        tx.commit()?;
        Ok(true)
    }

    /// Append an interaction record and return its id.
    pub fn add_interaction(
        &self,
        app_id: &str,
        kind: &str,
        details: &str,
        occurred_at: Option<&str>,
    ) -> Result<i64> {
        let occurred_at = occurred_at
            .map(str::to_string)
            .unwrap_or_else(|| chrono::Utc::now().to_rfc3339());
        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO interactions (application_id, type, details, occurred_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![app_id, kind, details, occurred_at],
        )?;
        Ok(conn.last_insert_rowid())
    }

    // --- Read side ---

    pub fn get_application(&self, app_id: &str) -> Result<Option<Application>> {
        let sql = format!("SELECT {APPLICATION_COLUMNS} FROM applications WHERE id = ?1");
        self.connect()?
            .query_row(&sql, [app_id], Self::row_to_application)
            .optional()
            .context("Failed to get application")
    }

    pub fn get_applications_by_status(&self, status: ApplicationStatus) -> Result<Vec<Application>> {
        let sql = format!(
            "SELECT {APPLICATION_COLUMNS} FROM applications WHERE status = ?1 ORDER BY updated_at DESC"
        );
        let conn = self.connect()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([status.as_str()], Self::row_to_application)?;
        rows.collect::<Result<Vec<_>, _>>()
            .context("Failed to list applications")
    }

    pub fn get_all_applications(&self) -> Result<Vec<Application>> {
        let sql = format!("SELECT {APPLICATION_COLUMNS} FROM applications ORDER BY updated_at DESC");
        let conn = self.connect()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], Self::row_to_application)?;
        rows.collect::<Result<Vec<_>, _>>()
            .context("Failed to list applications")
    }

    /// Substring search on company and role, optionally with a score floor.
    pub fn search_applications(
        &self,
        company: Option<&str>,
        role: Option<&str>,
        min_score: Option<f64>,
    ) -> Result<Vec<Application>> {
        let mut sql = format!("SELECT {APPLICATION_COLUMNS} FROM applications WHERE 1=1");
        let mut values: Vec<rusqlite::types::Value> = vec![];

        if let Some(c) = company {
            values.push(format!("%{}%", c).into());
            sql.push_str(&format!(" AND company LIKE ?{}", values.len()));
        }
        if let Some(r) = role {
            values.push(format!("%{}%", r).into());
            sql.push_str(&format!(" AND role LIKE ?{}", values.len()));
        }
        if let Some(score) = min_score {
            values.push(score.into());
            sql.push_str(&format!(" AND match_score >= ?{}", values.len()));
        }
        sql.push_str(" ORDER BY match_score DESC, updated_at DESC");

        let conn = self.connect()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(values), Self::row_to_application)?;
        rows.collect::<Result<Vec<_>, _>>()
            .context("Failed to search applications")
    }

    /// Interactions for an application, most recent first.
    pub fn get_interactions(&self, app_id: &str) -> Result<Vec<Interaction>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT id, application_id, type, details, occurred_at, created_at
             FROM interactions WHERE application_id = ?1
             ORDER BY occurred_at DESC, id DESC",
        )?;
        let rows = stmt.query_map([app_id], |row| {
            Ok(Interaction {
                id: row.get(0)?,
                application_id: row.get(1)?,
                kind: row.get(2)?,
                details: row.get(3)?,
                occurred_at: row.get(4)?,
                created_at: row.get(5)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>()
            .context("Failed to list interactions")
    }

    /// Application count per status.
    pub fn get_pipeline_stats(&self) -> Result<BTreeMap<ApplicationStatus, i64>> {
        let conn = self.connect()?;
        let mut stmt =
            conn.prepare("SELECT status, COUNT(*) FROM applications GROUP BY status")?;
        let rows = stmt.query_map([], |row| Ok((parse_status_column(row, 0)?, row.get(1)?)))?;
        rows.collect::<Result<BTreeMap<_, _>, _>>()
            .context("Failed to compute pipeline stats")
    }

    pub fn get_analytics(&self) -> Result<Analytics> {
        let stats = self.get_pipeline_stats()?;
        let count = |s: ApplicationStatus| stats.get(&s).copied().unwrap_or(0);

        let responded: i64 = ApplicationStatus::FLOW
            .iter()
            .filter(|s| s.is_response())
            .map(|s| count(*s))
            .sum();
        let applied = count(ApplicationStatus::Applied) + responded;
        let response_rate = if applied > 0 {
            round1(responded as f64 / applied as f64 * 100.0)
        } else {
            0.0
        };

        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT company, COUNT(*) AS count FROM applications
             GROUP BY company ORDER BY count DESC, company LIMIT 10",
        )?;
        let top_companies = stmt
            .query_map([], |row| {
                Ok(CompanyCount {
                    company: row.get(0)?,
                    count: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut stmt = conn.prepare(
            "SELECT status, AVG(match_score) FROM applications GROUP BY status",
        )?;
        let avg_score_by_status = stmt
            .query_map([], |row| {
                Ok((parse_status_column(row, 0)?, row.get::<_, Option<f64>>(1)?))
            })?
            .filter_map(|r| match r {
                Ok((status, Some(avg))) => Some(Ok((status, round1(avg)))),
                Ok((_, None)) => None,
                Err(e) => Some(Err(e)),
            })
            .collect::<Result<BTreeMap<_, _>, _>>()?;

        Ok(Analytics {
            total_applications: stats.values().sum(),
            pipeline_stats: stats,
            response_rate,
            top_companies,
            avg_score_by_status,
        })
    }

    /// Boxed plain-text pipeline summary.
    pub fn generate_status_report(&self) -> Result<String> {
        let analytics = self.get_analytics()?;
        let stats = &analytics.pipeline_stats;
        let count = |s: ApplicationStatus| stats.get(&s).copied().unwrap_or(0);
        let rule = "═".repeat(64);
        let line = |text: String| format!("║ {:<62} ║\n", text);

        let mut report = format!("╔{}╗\n", rule);
        report.push_str(&line(format!("{:^62}", "APPLICATION PIPELINE STATUS")));
        report.push_str(&format!("╠{}╣\n", rule));
        report.push_str(&line(format!("Total Applications: {}", analytics.total_applications)));
        report.push_str(&line(format!("Response Rate: {}%", analytics.response_rate)));
        report.push_str(&format!("╠{}╣\n", rule));
        report.push_str(&line("Pipeline Breakdown:".to_string()));

        let rows = ApplicationStatus::FLOW;
        for (i, status) in rows.iter().enumerate() {
            let branch = if i + 1 == rows.len() { "└──" } else { "├──" };
            report.push_str(&line(format!(
                "{} {:<14} {}",
                branch,
                format!("{}:", status.as_str()),
                count(*status)
            )));
        }

        if !analytics.top_companies.is_empty() {
            report.push_str(&format!("╠{}╣\n", rule));
            report.push_str(&line("Top Companies:".to_string()));
            for company in analytics.top_companies.iter().take(5) {
                let name: String = company.company.chars().take(40).collect();
                report.push_str(&line(format!("• {:<40} ({})", name, company.count)));
            }
        }

        report.push_str(&format!("╚{}╝\n", rule));
        Ok(report)
    }

    fn row_to_application(row: &rusqlite::Row) -> rusqlite::Result<Application> {
        let keywords: Option<String> = row.get(14)?;
        let keywords_matched = match keywords.as_deref() {
            None | Some("") => Vec::new(),
            Some(raw) => serde_json::from_str(raw)
                .map_err(|e| rusqlite::Error::FromSqlConversionFailure(14, Type::Text, Box::new(e)))?,
        };

        Ok(Application {
            id: row.get(0)?,
            company: row.get(1)?,
            role: row.get(2)?,
            job_url: row.get(3)?,
            platform: row.get(4)?,
            status: parse_status_column(row, 5)?,
            match_score: row.get(6)?,
            resume_variant: row.get(7)?,
            cover_letter: row.get(8)?,
            salary_range: row.get(9)?,
            location: row.get(10)?,
            remote_policy: row.get(11)?,
            applied_at: row.get(12)?,
            response_at: row.get(13)?,
            keywords_matched,
            notes: row.get(15)?,
            created_at: row.get(16)?,
            updated_at: row.get(17)?,
        })
    }
}

fn parse_status_column(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<ApplicationStatus> {
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
