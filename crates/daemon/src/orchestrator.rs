//! The migration orchestrator: walks the dependency-ordered phase sequence
//! (users -> projects -> attachments/fields -> per-project work) and fans
//! the per-project phase out across up to
//! [`MAX_PARALLEL_PROJECTS`] projects at once.

use std::sync::Arc;

use railmigrate_core::config::Config;
use railmigrate_core::mapping::MappingStore;
use railmigrate_core::stats::Stats;
use railmigrate_core::types::default_status_map;
use railmigrate_integrations::error::IntegrationError;
use railmigrate_integrations::importers::cases::{import_case, CaseImportContext};
use railmigrate_integrations::importers::runs::{create_run, post_result};
use railmigrate_integrations::importers::{
    attachments, configurations, fields, milestones, projects, shared_steps, suites, users,
};
use railmigrate_integrations::qase::QaseClient;
use railmigrate_integrations::testrail::{entities, TestrailClient};
use thiserror::Error;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tracing::{info, warn};

/// How many TestRail projects are migrated concurrently. TestRail and Qase
/// are both rate-limited independently of this (see
/// `railmigrate_harness::pool`), so this cap exists mainly to bound memory
/// and log noise, not API load.
const MAX_PARALLEL_PROJECTS: usize = 8;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("integration error: {0}")]
    Integration(#[from] IntegrationError),
    #[error("config error: {0}")]
    Config(#[from] railmigrate_core::config::ConfigError),
    #[error("no projects matched the requested filter")]
    NoMatchingProjects,
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;

/// Options controlling one migration run.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Restrict the run to these Qase project codes (matched after project
    /// creation/reuse). `None` migrates every TestRail project.
    pub project_codes: Option<Vec<String>>,
    /// Fetch and reconcile everything, logging what would be created,
    /// without issuing any Qase write calls.
    pub dry_run: bool,
}

/// Ties together the TestRail and Qase clients, the mapping store, and run
/// statistics to drive one end-to-end migration.
pub struct MigrationOrchestrator {
    testrail: TestrailClient,
    qase: QaseClient,
    config: Config,
}

impl MigrationOrchestrator {
    pub fn new(config: Config) -> Result<Self> {
        Ok(Self {
            testrail: TestrailClient::new(&config.testrail)?,
            qase: QaseClient::new(&config.qase)?,
            config,
        })
    }

    /// Run the full migration and return the final statistics. The global
    /// phases (users, projects, fields) run sequentially since each writes
    /// a dictionary the next phase reads; `PerProjectWork` then fans out.
    pub async fn run(&self, options: &RunOptions) -> Result<Stats> {
        let stats = Arc::new(Stats::new());
        let mut mapping = MappingStore::new();

        info!("phase: users");
        let source_users = entities::get_users(&self.testrail).await?;
        users::import_users(&self.qase, &source_users, &self.config.users, &mut mapping, &stats)
            .await?;

        info!("phase: projects");
        let source_projects = entities::get_projects(&self.testrail).await?;
        projects::import_projects(&self.qase, &source_projects, &mut mapping, &stats).await?;

        let selected: Vec<(u64, String)> = mapping
            .project_map
            .iter()
            .filter(|(_, code)| {
                options
                    .project_codes
                    .as_ref()
                    .map_or(true, |allowed| allowed.iter().any(|c| c == *code))
            })
            .map(|(id, code)| (*id, code.clone()))
            .collect();

        if selected.is_empty() {
            return Err(OrchestratorError::NoMatchingProjects);
        }

        info!("phase: fields");
        let case_fields = entities::get_case_fields(&self.testrail).await?;
        let result_fields = entities::get_result_fields(&self.testrail).await?;
        let project_codes: Vec<String> = selected.iter().map(|(_, c)| c.clone()).collect();
        fields::reconcile_fields(&self.qase, &case_fields, &project_codes, &mut mapping).await?;
        fields::reconcile_fields(&self.qase, &result_fields, &project_codes, &mut mapping).await?;
        resolve_system_field_ids(&case_fields, &self.config, &mut mapping);
        populate_status_maps(&mut mapping);

        if options.dry_run {
            info!(
                projects = selected.len(),
                "dry run: fetched and reconciled everything, skipping per-project writes"
            );
            return Ok(Arc::try_unwrap(stats).unwrap_or_else(|_| unreachable!()));
        }

        info!(projects = selected.len(), "phase: per-project work");
        self.run_per_project_phase(&selected, Arc::new(Mutex::new(mapping)), Arc::clone(&stats))
            .await?;

        Ok(Arc::try_unwrap(stats).unwrap_or_else(|_| unreachable!()))
    }

    async fn run_per_project_phase(
        &self,
        selected: &[(u64, String)],
        mapping: Arc<Mutex<MappingStore>>,
        stats: Arc<Stats>,
    ) -> Result<()> {
        let semaphore = Arc::new(Semaphore::new(MAX_PARALLEL_PROJECTS));
        let mut tasks: JoinSet<Result<()>> = JoinSet::new();

        for (project_id, project_code) in selected.iter().cloned() {
            let semaphore = Arc::clone(&semaphore);
            let mapping = Arc::clone(&mapping);
            let stats = Arc::clone(&stats);
            let testrail = self.testrail.clone();
            let qase = self.qase.clone();
            let preserve_ids = self.config.tests.preserve_ids;
            let refs_base_url = self
                .config
                .tests
                .refs
                .enable
                .then(|| self.config.tests.refs.url.clone())
                .flatten();

            tasks.spawn(async move {
                let _permit = semaphore
                    .acquire()
                    .await
                    .expect("semaphore is never closed");
                migrate_one_project(
                    &testrail,
                    &qase,
                    project_id,
                    &project_code,
                    preserve_ids,
                    refs_base_url.as_deref(),
                    &mapping,
                    &stats,
                )
                .await
            });
        }

        let mut first_error = None;
        while let Some(outcome) = tasks.join_next().await {
            match outcome.expect("project task panicked") {
                Ok(()) => {}
                Err(e) => {
                    warn!(error = %e, "a project's migration failed");
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// One project's sub-phase walk: configurations -> shared steps ->
/// milestones -> suites -> cases -> runs/results. TestRail fetches for
/// independent projects overlap freely; mapping-store writes (each POST
/// plus its resulting id insert) are serialized behind `mapping`'s mutex,
/// since every project writes into the same dictionaries.
async fn migrate_one_project(
    testrail: &TestrailClient,
    qase: &QaseClient,
    project_id: u64,
    project_code: &str,
    preserve_ids: bool,
    refs_base_url: Option<&str>,
    mapping: &Arc<Mutex<MappingStore>>,
    stats: &Stats,
) -> Result<()> {
    info!(project_code, "configurations");
    let groups = entities::get_configs(testrail, project_id).await?;
    {
        let mut guard = mapping.lock().await;
        configurations::import_configurations(qase, project_code, &groups, &mut guard, stats)
            .await?;
    }

    info!(project_code, "shared steps");
    let shared = entities::get_shared_steps(testrail, project_id).await?;
    {
        let mut guard = mapping.lock().await;
        shared_steps::import_shared_steps(qase, project_code, &shared, &mut guard, stats).await?;
    }

    info!(project_code, "milestones");
    let source_milestones = entities::get_milestones(testrail, project_id).await?;
    {
        let mut guard = mapping.lock().await;
        milestones::import_milestones(qase, project_code, &source_milestones, &mut guard, stats)
            .await?;
    }

    info!(project_code, "suites");
    let source_suites = entities::get_suites(testrail, project_id).await?;
    {
        let mut guard = mapping.lock().await;
        suites::import_suites(qase, project_code, &source_suites, &mut guard, stats).await?;
    }

    for suite in &source_suites {
        info!(project_code, suite = suite.name, "cases");
        let cases = entities::get_cases(testrail, project_id, suite.id).await?;
        let ctx = CaseImportContext {
            project_code,
            suite_name: &suite.name,
            preserve_ids,
            refs_base_url,
        };
        for case in &cases {
            let attachment_ids = entities::get_attachments_for_case(testrail, case.id).await?;
            for attachment in &attachment_ids {
                let Some(id) = attachment.get("id").and_then(|v| v.as_u64()) else {
                    continue;
                };
                let file_name = attachment
                    .get("filename")
                    .and_then(|v| v.as_str())
                    .unwrap_or("attachment");
                let guard = mapping.lock().await;
                if let Err(e) =
                    attachments::ensure_attachment(testrail, qase, project_code, id, file_name, &guard, stats)
                        .await
                {
                    warn!(project_code, attachment_id = id, error = %e, "attachment carry-over failed");
                }
            }

            let mut guard = mapping.lock().await;
            if let Err(e) = import_case(qase, case, &ctx, &mut guard, stats).await {
                warn!(project_code, case_id = case.id, error = %e, "case import failed");
            }
        }
    }

    info!(project_code, "runs and results");
    let source_runs = entities::get_runs(testrail, project_id).await?;
    for run in &source_runs {
        let qase_case_ids: Vec<i64> = {
            let guard = mapping.lock().await;
            run.case_ids
                .iter()
                .filter_map(|id| guard.case_id_mapping.get(id).map(|entry| entry.qase_id))
                .collect()
        };

        let run_id = {
            let mut guard = mapping.lock().await;
            create_run(
                qase,
                project_code,
                &run.name,
                &qase_case_ids,
                &run.config_ids,
                &mut guard,
                stats,
            )
            .await?
        };

        let results = entities::get_results_for_run(testrail, run.id).await?;
        for raw in &results {
            let Ok(result) = serde_json::from_value::<railmigrate_core::types::SourceResult>(raw.clone())
            else {
                continue;
            };
            let Some(qase_case_id) = ({
                let guard = mapping.lock().await;
                guard.case_id_mapping.get(&result.case_id).map(|e| e.qase_id)
            }) else {
                continue;
            };

            let guard = mapping.lock().await;
            if let Err(e) =
                post_result(qase, project_code, run_id, qase_case_id, &result, &guard, stats).await
            {
                warn!(project_code, run_id, result_id = result.id, error = %e, "posting result failed");
            }
        }
    }

    Ok(())
}

/// Resolve the Qase custom-field ids that carry TestRail system values with
/// no direct Qase system-field equivalent: the original case id (always,
/// for traceability), the estimate, and (if configured) `refs`.
fn resolve_system_field_ids(
    case_fields: &[railmigrate_core::types::SourceFieldDescriptor],
    config: &Config,
    mapping: &mut MappingStore,
) {
    if config.tests.refs.enable {
        if let Some(title) = &config.tests.refs.field_title {
            if let Some(field) = case_fields.iter().find(|f| &f.label == title) {
                mapping.refs_field_id = mapping.custom_field_for_project(field.tr_id, "");
            }
        }
    }
    if let Some(field) = case_fields.iter().find(|f| f.system_name == "custom_testrail_id") {
        mapping.testrail_original_id_field_id = mapping.custom_field_for_project(field.tr_id, "");
    }
    if let Some(field) = case_fields.iter().find(|f| f.system_name == "custom_preconds_estimate") {
        mapping.estimate_field_id = mapping.custom_field_for_project(field.tr_id, "");
    }
}

/// TestRail's priority, case-type, and result-status ids are small, fixed
/// vocabularies (1..=5 for result statuses on every instance); rather than
/// reconciling them against Qase's equivalents field-by-field, this run
/// maps them 1:1 by ordinal, which matches a freshly provisioned Qase
/// project's default system values.
fn populate_status_maps(mapping: &mut MappingStore) {
    let statuses = default_status_map();
    for tr_status_id in statuses.keys() {
        mapping.result_statuses.insert(*tr_status_id, *tr_status_id as u64);
        mapping.case_statuses.insert(*tr_status_id, *tr_status_id as u64);
    }
    for priority_id in 1..=4u32 {
        mapping.priorities.insert(priority_id, priority_id as u64);
    }
    for type_id in 1..=12u32 {
        mapping.case_types.insert(type_id, type_id as u64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn populate_status_maps_covers_the_five_testrail_statuses() {
        let mut mapping = MappingStore::new();
        populate_status_maps(&mut mapping);
        assert_eq!(mapping.result_statuses.len(), 5);
        assert_eq!(mapping.result_statuses.get(&1), Some(&1));
    }

    #[test]
    fn resolve_system_field_ids_finds_estimate_field() {
        use railmigrate_core::mapping::CustomFieldMapping;
        use railmigrate_core::types::{FieldScope, SourceFieldDescriptor};

        let mut mapping = MappingStore::new();
        mapping
            .custom_fields
            .insert(7, CustomFieldMapping::Global(42));
        let fields = vec![SourceFieldDescriptor {
            tr_id: 7,
            system_name: "custom_preconds_estimate".into(),
            label: "Estimate".into(),
            tr_type: 1,
            scope: FieldScope::Global,
            options: vec![],
            is_case_field: true,
        }];
        let config = Config::default();
        resolve_system_field_ids(&fields, &config, &mut mapping);
        assert_eq!(mapping.estimate_field_id, Some(42));
    }
}
