//! Run statistics: counters updated by every importer and a plain-text
//! report renderer printed at the end of a run.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for a single entity kind (created, skipped as already present,
/// failed outright).
#[derive(Debug, Default)]
pub struct EntityCounters {
    pub created: AtomicU64,
    pub skipped: AtomicU64,
    pub failed: AtomicU64,
}

impl EntityCounters {
    pub fn created(&self) -> u64 {
        self.created.load(Ordering::Relaxed)
    }
    pub fn skipped(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn record_created(&self) {
        self.created.fetch_add(1, Ordering::Relaxed);
    }
    pub fn record_skipped(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }
    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }
}

/// Global, run-wide statistics: one [`EntityCounters`] per entity kind, plus
/// per-project breakdowns for the entities that are scoped to a project.
#[derive(Debug, Default)]
pub struct Stats {
    pub users: EntityCounters,
    pub projects: EntityCounters,
    pub attachments: EntityCounters,
    pub custom_fields: EntityCounters,
    pub per_project: std::sync::Mutex<BTreeMap<String, ProjectStats>>,
}

#[derive(Debug, Default)]
pub struct ProjectStats {
    pub configurations: EntityCounters,
    pub shared_steps: EntityCounters,
    pub milestones: EntityCounters,
    pub suites: EntityCounters,
    pub cases: EntityCounters,
    pub runs: EntityCounters,
    pub results: EntityCounters,
}

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn project_entry(&self, project_code: &str) -> std::sync::MutexGuard<'_, BTreeMap<String, ProjectStats>> {
        let mut guard = self.per_project.lock().expect("per_project stats poisoned");
        guard.entry(project_code.to_string()).or_default();
        guard
    }

    pub fn with_project<R>(&self, project_code: &str, f: impl FnOnce(&ProjectStats) -> R) -> R {
        let guard = self.project_entry(project_code);
        f(guard.get(project_code).expect("entry inserted above"))
    }

    /// Render a plain-text summary of the whole run. Intentionally not a
    /// spreadsheet: a run's audience is a terminal or a log file, not a
    /// downstream reporting tool.
    pub fn render_report(&self) -> String {
        let mut out = String::new();
        writeln!(out, "Migration summary").unwrap();
        writeln!(out, "==================").unwrap();
        write_entity_line(&mut out, "Users", &self.users);
        write_entity_line(&mut out, "Projects", &self.projects);
        write_entity_line(&mut out, "Attachments", &self.attachments);
        write_entity_line(&mut out, "Custom fields", &self.custom_fields);

        let per_project = self.per_project.lock().expect("per_project stats poisoned");
        for (project_code, stats) in per_project.iter() {
            writeln!(out).unwrap();
            writeln!(out, "Project {project_code}").unwrap();
            writeln!(out, "-----------------").unwrap();
            write_entity_line(&mut out, "  Configurations", &stats.configurations);
            write_entity_line(&mut out, "  Shared steps", &stats.shared_steps);
            write_entity_line(&mut out, "  Milestones", &stats.milestones);
            write_entity_line(&mut out, "  Suites", &stats.suites);
            write_entity_line(&mut out, "  Cases", &stats.cases);
            write_entity_line(&mut out, "  Runs", &stats.runs);
            write_entity_line(&mut out, "  Results", &stats.results);
        }
        out
    }
}

fn write_entity_line(out: &mut String, label: &str, counters: &EntityCounters) {
    writeln!(
        out,
        "{label}: {} created, {} skipped, {} failed",
        counters.created(),
        counters.skipped(),
        counters.failed()
    )
    .unwrap();
}
