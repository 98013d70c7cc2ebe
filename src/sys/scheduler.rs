// src/sys/scheduler.rs

use chrono::{DateTime, Utc};
use indexmap::IndexSet;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use crate::error::{RecipeError, Result};
use crate::sys::detect::ComposerManifest;
use crate::sys::safety::escape_remote_path;

const BLITZ_PACKAGE: &str = "putyourlightson/craft-blitz";
const FORMIE_PACKAGE: &str = "verbb/formie";

const BLOCK_BEGIN: &str = "# >>> deploy-recipe:";
const BLOCK_END: &str = "# <<< deploy-recipe:";

/// Five whitespace-separated fields followed by a non-empty command.
static FREE_TEXT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\S+\s+\S+\s+\S+\s+\S+\s+\S+)\s+(\S.*)$").expect("static regex")
});

/// A `cd` command word: at the start, after whitespace or after `;`, `&` or `|`.
static CD_TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|[\s;&|])cd\s").expect("static regex"));

static CRON_FIELD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9A-Za-z*/,-]+$").expect("static regex"));

/// One job as written in the inventory: `["*/5 * * * *", "php bin/console x"]`,
/// `{"schedule": ..., "command": ...}` or a single free-text line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CronJob {
    Pair(String, String),
    Entry { schedule: String, command: String },
    Line(String),
}

/// 🛡️ A validated five-field schedule paired with its command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleEntry {
    schedule: String,
    command: String,
}

impl ScheduleEntry {
    pub fn new(schedule: &str, command: &str) -> Result<Self> {
        let fields: Vec<&str> = schedule.split_whitespace().collect();
        if fields.len() != 5 || !fields.iter().all(|f| CRON_FIELD_RE.is_match(f)) {
            return Err(RecipeError::invalid("cron schedule", schedule));
        }
        let command = command.trim();
        if command.is_empty() || command.contains('\n') {
            return Err(RecipeError::invalid("cron command", command));
        }
        Ok(Self {
            schedule: fields.join(" "),
            command: command.to_string(),
        })
    }

    /// `<schedule> cd <path> && <command>`
    pub fn render(&self, deploy_path: &str) -> String {
        format!(
            "{} cd {} && {}",
            self.schedule,
            escape_remote_path(deploy_path),
            self.command
        )
    }
}

/// Inputs of one crontab build, resolved from config and the project.
pub struct CronRequest<'a> {
    pub jobs: &'a [CronJob],
    pub autodetect: bool,
    pub deploy_path: &'a str,
    pub minute: u8,
    pub php_bin: &'a str,
}

/// Builds the crontab lines: user jobs when any are configured, otherwise
/// package-triggered defaults. Duplicates are dropped, first one wins.
pub fn build(request: &CronRequest<'_>, manifest: &ComposerManifest) -> Result<Vec<String>> {
    let mut lines: IndexSet<String> = IndexSet::new();

    if !request.jobs.is_empty() {
        for job in request.jobs {
            lines.insert(render_job(job, request.deploy_path)?);
        }
    } else if request.autodetect {
        for entry in autodetected_entries(request, manifest)? {
            lines.insert(entry.render(request.deploy_path));
        }
    }

    Ok(lines.into_iter().collect())
}

fn render_job(job: &CronJob, deploy_path: &str) -> Result<String> {
    match job {
        CronJob::Pair(schedule, command) | CronJob::Entry { schedule, command } => {
            Ok(ScheduleEntry::new(schedule, command)?.render(deploy_path))
        }
        CronJob::Line(line) => Ok(split_free_text(line, deploy_path)),
    }
}

/// Free text that already changes directory, or has fewer than five fields
/// plus a command, is passed through untouched. The result is not validated.
fn split_free_text(line: &str, deploy_path: &str) -> String {
    let line = line.trim();
    if CD_TOKEN_RE.is_match(line) {
        return line.to_string();
    }
    match FREE_TEXT_RE.captures(line) {
        Some(caps) => format!(
            "{} cd {} && {}",
            &caps[1],
            escape_remote_path(deploy_path),
            &caps[2]
        ),
        None => line.to_string(),
    }
}

fn autodetected_entries(
    request: &CronRequest<'_>,
    manifest: &ComposerManifest,
) -> Result<Vec<ScheduleEntry>> {
    let schedule = format!("{} * * * *", request.minute);
    let mut entries = Vec::new();

    if manifest.has_package(BLITZ_PACKAGE) {
        entries.push(ScheduleEntry::new(
            &schedule,
            &format!("{} craft blitz/cache/refresh-expired", request.php_bin),
        )?);
    }
    if manifest.has_package(FORMIE_PACKAGE) {
        entries.push(ScheduleEntry::new(
            &schedule,
            &format!(
                "{} craft formie/gc/prune-data-retention-submissions",
                request.php_bin
            ),
        )?);
    }

    Ok(entries)
}

/// Replaces (or appends) this deployment's managed block in an existing crontab.
pub fn merge_into_crontab(
    existing: &str,
    deploy_path: &str,
    lines: &[String],
    now: DateTime<Utc>,
) -> String {
    let begin = format!("{} {}", BLOCK_BEGIN, deploy_path);
    let end = format!("{} {}", BLOCK_END, deploy_path);

    let mut out: Vec<String> = Vec::new();
    let mut inside = false;
    for line in existing.lines() {
        if line == begin {
            inside = true;
            continue;
        }
        if inside {
            if line == end {
                inside = false;
            }
            continue;
        }
        out.push(line.to_string());
    }

    while out.last().is_some_and(|l| l.trim().is_empty()) {
        out.pop();
    }

    if !lines.is_empty() {
        if !out.is_empty() {
            out.push(String::new());
        }
        out.push(begin);
        out.push(format!("# updated {}", now.format("%Y-%m-%d %H:%M:%S UTC")));
        out.extend(lines.iter().cloned());
        out.push(end);
    }

    let mut rendered = out.join("\n");
    if !rendered.is_empty() {
        rendered.push('\n');
    }
    rendered
}
