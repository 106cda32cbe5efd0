//! Pipeline runtime: input → clean → filter → label → rate → rank → plan → output.
//!
//! A [`Runtime`] owns a validated [`PipelineConfig`] and an immutable
//! [`PluginRegistry`]. Every enabled stage is timed and recorded in
//! [`Diagnostics`]. With `fail_fast` the first stage error aborts the run;
//! otherwise the error is recorded as non-fatal and the stage's input flows on.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use honestroles_plugins::{PluginCatalog, PluginRegistry, RuntimeExecutionContext};
use honestroles_shared::{
    HonestRolesError, InputFormat, JobDataset, PipelineConfig, PluginKind, Result,
    load_pipeline_config,
};
use tracing::{Span, debug, error, info, instrument, warn};

use crate::diagnostics::{Diagnostics, Stage};
use crate::llm::{LanguageModel, OllamaClient};
use crate::plan::{ApplicationPlanEntry, PlanThresholds, build_application_plan};
use crate::rank::{RankOptions, Ranking, rank_jobs};
use crate::stages::{
    RuntimeContext, clean_stage, filter_stage, in_stage, label_stage, rate_stage,
};

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when a stage begins.
    fn stage_started(&self, stage: Stage);
    /// Called when a stage ends, successfully or not, with the rows it passed on.
    fn stage_finished(&self, stage: Stage, rows: usize);
    /// Called once the run completes.
    fn done(&self, diagnostics: &Diagnostics);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn stage_started(&self, _stage: Stage) {}
    fn stage_finished(&self, _stage: Stage, _rows: usize) {}
    fn done(&self, _diagnostics: &Diagnostics) {}
}

// ---------------------------------------------------------------------------
// Runtime
// ---------------------------------------------------------------------------

/// Result of one pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineRun {
    /// Final table: the ranked rows when ranking ran, else the rated rows.
    pub dataset: JobDataset,
    pub ranking: Option<Ranking>,
    pub plan: Vec<ApplicationPlanEntry>,
    pub diagnostics: Diagnostics,
}

/// Configured pipeline, ready to run any number of times.
pub struct Runtime {
    config: PipelineConfig,
    registry: PluginRegistry,
    context: Arc<RuntimeExecutionContext>,
    model: Option<Box<dyn LanguageModel>>,
    rank_options: RankOptions,
    plan_thresholds: PlanThresholds,
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("config", &self.config)
            .field("plugins", &self.registry.len())
            .field("llm", &self.model.is_some())
            .finish_non_exhaustive()
    }
}

/// Keep configuration errors as-is; anything else is an initialization failure.
fn init_error(path: &Path, error: HonestRolesError) -> HonestRolesError {
    if error.is_configuration() {
        error
    } else {
        HonestRolesError::runtime_init(path, error.to_string())
    }
}

impl Runtime {
    /// Build a runtime from an in-memory config and registry.
    pub fn new(config: PipelineConfig, registry: PluginRegistry) -> Result<Self> {
        config.validate()?;
        let rank_options = RankOptions::from_config(&config.stages.rank)?;
        let plan_thresholds = PlanThresholds::from_config(&config.stages.plan)?;

        let label_llm = config.stages.label.enabled && config.stages.label.use_llm;
        let rate_llm = config.stages.rate.enabled && config.stages.rate.use_llm;
        let model: Option<Box<dyn LanguageModel>> = if label_llm || rate_llm {
            Some(Box::new(OllamaClient::new(&config.llm)?))
        } else {
            None
        };

        let stage_options = serde_json::to_value(&config.stages)
            .map_err(|e| HonestRolesError::config(format!("stage options: {e}")))?;
        let context = Arc::new(RuntimeExecutionContext {
            pipeline_config_path: None,
            plugin_manifest_path: None,
            stage_options,
        });

        Ok(Self {
            config,
            registry,
            context,
            model,
            rank_options,
            plan_thresholds,
        })
    }

    /// Load a pipeline config and an optional plugin manifest from disk.
    ///
    /// Config, plugin-load, and plugin-validation errors surface unchanged;
    /// other failures become `RuntimeInitialization` naming the offending path.
    pub fn from_configs(
        pipeline_config: &Path,
        plugin_manifest: Option<&Path>,
        catalog: &PluginCatalog,
    ) -> Result<Self> {
        let config =
            load_pipeline_config(pipeline_config).map_err(|e| init_error(pipeline_config, e))?;
        let registry = match plugin_manifest {
            Some(path) => {
                PluginRegistry::from_manifest(path, catalog).map_err(|e| init_error(path, e))?
            }
            None => PluginRegistry::empty(),
        };

        let mut runtime =
            Self::new(config, registry).map_err(|e| init_error(pipeline_config, e))?;
        runtime.context = Arc::new(RuntimeExecutionContext {
            pipeline_config_path: Some(pipeline_config.to_path_buf()),
            plugin_manifest_path: plugin_manifest.map(Path::to_path_buf),
            stage_options: runtime.context.stage_options.clone(),
        });
        info!(
            config = %pipeline_config.display(),
            plugins = runtime.registry.len(),
            "runtime initialized"
        );
        Ok(runtime)
    }

    /// Replace the language model used by LLM-assisted labeling and rating.
    pub fn with_model(mut self, model: Box<dyn LanguageModel>) -> Self {
        self.model = Some(model);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    /// Read the configured input, run every stage, and write configured outputs.
    #[instrument(skip_all, fields(run_id = tracing::field::Empty))]
    pub fn run(&self, progress: &dyn ProgressReporter) -> Result<PipelineRun> {
        let mut diagnostics =
            Diagnostics::new(self.config.runtime.fail_fast, self.registry.counts());
        Span::current().record("run_id", tracing::field::display(&diagnostics.run_id));

        progress.stage_started(Stage::Input);
        let start = Instant::now();
        let input = &self.config.input;
        let read = match input.format {
            InputFormat::Jsonl => JobDataset::read_jsonl(&input.path),
            InputFormat::Json => JobDataset::read_json(&input.path),
        };
        let dataset = match read.and_then(|ds| ds.validate().map(|()| ds)) {
            Ok(ds) => ds,
            Err(e) => {
                diagnostics.record_error(Stage::Input, &e, start.elapsed());
                error!(path = %input.path.display(), error = %e, "failed to read input");
                return Err(e);
            }
        };
        diagnostics.record_ok(Stage::Input, dataset.row_count(), start.elapsed());
        progress.stage_finished(Stage::Input, dataset.row_count());
        info!(path = %input.path.display(), rows = dataset.row_count(), "input loaded");

        let mut run = self.execute(dataset, diagnostics, progress)?;

        if let Some(output) = &self.config.output {
            progress.stage_started(Stage::Output);
            let start = Instant::now();
            let written = run
                .dataset
                .write_jsonl(&output.path)
                .and_then(|()| match &output.plan_path {
                    Some(plan_path) => write_plan(plan_path, &run.plan),
                    None => Ok(()),
                });
            if let Err(e) = written {
                run.diagnostics.record_error(Stage::Output, &e, start.elapsed());
                error!(path = %output.path.display(), error = %e, "failed to write output");
                return Err(e);
            }
            run.diagnostics.record_ok(Stage::Output, run.dataset.row_count(), start.elapsed());
            run.diagnostics.output_path = Some(output.path.clone());
            run.diagnostics.plan_path = output.plan_path.clone();
            progress.stage_finished(Stage::Output, run.dataset.row_count());
            info!(path = %output.path.display(), rows = run.dataset.row_count(), "output written");
        }

        progress.done(&run.diagnostics);
        Ok(run)
    }

    /// Run every stage over an in-memory dataset. Nothing is read or written.
    #[instrument(skip_all, fields(rows = dataset.row_count(), run_id = tracing::field::Empty))]
    pub fn run_dataset(
        &self,
        dataset: JobDataset,
        progress: &dyn ProgressReporter,
    ) -> Result<PipelineRun> {
        dataset.validate()?;
        let mut diagnostics =
            Diagnostics::new(self.config.runtime.fail_fast, self.registry.counts());
        Span::current().record("run_id", tracing::field::display(&diagnostics.run_id));
        diagnostics.record_ok(Stage::Input, dataset.row_count(), Duration::ZERO);

        let run = self.execute(dataset, diagnostics, progress)?;
        progress.done(&run.diagnostics);
        Ok(run)
    }

    fn execute(
        &self,
        dataset: JobDataset,
        mut diagnostics: Diagnostics,
        progress: &dyn ProgressReporter,
    ) -> Result<PipelineRun> {
        let stages = &self.config.stages;
        let runtime: RuntimeContext = Some(Arc::clone(&self.context));
        let model = self.model.as_deref();
        let mut ds = dataset;

        if stages.clean.enabled {
            let input = ds.clone();
            if let Some(out) = self.step(
                Stage::Clean,
                &mut diagnostics,
                progress,
                &ds,
                JobDataset::row_count,
                || clean_stage(input, &stages.clean),
            )? {
                ds = out;
            }
        }

        if stages.filter.enabled {
            let input = ds.clone();
            let plugins = self.registry.plugins_for_kind(PluginKind::Filter);
            if let Some(out) = self.step(
                Stage::Filter,
                &mut diagnostics,
                progress,
                &ds,
                JobDataset::row_count,
                || filter_stage(input, &stages.filter, plugins, &runtime),
            )? {
                ds = out;
            }
        }

        if stages.label.enabled {
            let input = ds.clone();
            let plugins = self.registry.plugins_for_kind(PluginKind::Label);
            if let Some(out) = self.step(
                Stage::Label,
                &mut diagnostics,
                progress,
                &ds,
                JobDataset::row_count,
                || label_stage(input, &stages.label, plugins, &runtime, model),
            )? {
                ds = out;
            }
        }

        if stages.rate.enabled {
            let input = ds.clone();
            let plugins = self.registry.plugins_for_kind(PluginKind::Rate);
            if let Some(out) = self.step(
                Stage::Rate,
                &mut diagnostics,
                progress,
                &ds,
                JobDataset::row_count,
                || rate_stage(input, &stages.rate, plugins, &runtime, model),
            )? {
                ds = out;
            }
        }

        let mut ranking = None;
        if stages.rank.enabled {
            let input = ds.clone();
            ranking = self.step(
                Stage::Rank,
                &mut diagnostics,
                progress,
                &ds,
                |r: &Ranking| r.records.len(),
                || rank_jobs(input, &self.rank_options).map_err(|e| in_stage("rank", e)),
            )?;
            if let Some(r) = &ranking {
                ds = r.dataset.clone();
            }
        }

        let mut plan = Vec::new();
        if stages.plan.enabled {
            match &ranking {
                Some(r) => {
                    progress.stage_started(Stage::Plan);
                    let start = Instant::now();
                    plan = build_application_plan(
                        &r.records,
                        &self.rank_options.profile,
                        &self.plan_thresholds,
                    );
                    diagnostics.record_ok(Stage::Plan, plan.len(), start.elapsed());
                    progress.stage_finished(Stage::Plan, plan.len());
                }
                None => {
                    warn!("plan stage skipped: no ranking available");
                    diagnostics.record_warn(
                        Stage::Plan,
                        "skipped: no ranking available",
                        Duration::ZERO,
                    );
                }
            }
        }

        diagnostics.final_rows = ds.row_count();
        info!(
            rows = diagnostics.final_rows,
            non_fatal_errors = diagnostics.non_fatal_errors.len(),
            "pipeline finished"
        );
        Ok(PipelineRun {
            dataset: ds,
            ranking,
            plan,
            diagnostics,
        })
    }

    /// Time one stage. `Ok(None)` means the stage failed and the run continues.
    fn step<T>(
        &self,
        stage: Stage,
        diagnostics: &mut Diagnostics,
        progress: &dyn ProgressReporter,
        input: &JobDataset,
        rows: impl Fn(&T) -> usize,
        run: impl FnOnce() -> Result<T>,
    ) -> Result<Option<T>> {
        progress.stage_started(stage);
        let start = Instant::now();
        match run() {
            Ok(out) => {
                let n = rows(&out);
                diagnostics.record_ok(stage, n, start.elapsed());
                progress.stage_finished(stage, n);
                debug!(stage = %stage, rows_in = input.row_count(), rows_out = n, "stage finished");
                Ok(Some(out))
            }
            Err(e) if self.config.runtime.fail_fast => {
                diagnostics.record_error(stage, &e, start.elapsed());
                progress.stage_finished(stage, input.row_count());
                error!(stage = %stage, error = %e, "stage failed, aborting run");
                Err(e)
            }
            Err(e) => {
                diagnostics.record_non_fatal(stage, &e, start.elapsed());
                progress.stage_finished(stage, input.row_count());
                warn!(stage = %stage, error = %e, "stage failed, continuing with its input");
                Ok(None)
            }
        }
    }
}

fn write_plan(path: &Path, plan: &[ApplicationPlanEntry]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| HonestRolesError::io(parent, e))?;
    }
    let json = serde_json::to_string_pretty(plan)
        .map_err(|e| HonestRolesError::stage("output", e.to_string()))?;
    std::fs::write(path, json).map_err(|e| HonestRolesError::io(path, e))
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use honestroles_shared::schema::{LABEL_ROLE_CATEGORY, LABEL_SENIORITY, LABEL_TECH_STACK};
    use honestroles_shared::{Record, parse_pipeline_config};
    use serde_json::json;

    use super::*;
    use crate::diagnostics::StageStatus;

    fn config(extra: &str) -> PipelineConfig {
        let toml = format!(
            "[input]\npath = \"jobs.jsonl\"\n\n[stages.rank]\nas_of = \"2025-01-15\"\n{extra}"
        );
        parse_pipeline_config(&toml, Path::new("/tmp")).expect("config")
    }

    fn jobs() -> JobDataset {
        let records: Vec<Record> = vec![
            json!({"id": "1", "title": "  Junior Data Scientist ", "company": "Acme",
                   "description_text": "Python and SQL. Entry level role, no experience required.",
                   "skills": ["python", "sql"], "remote": true, "posted_at": "2025-01-10"}),
            json!({"id": "2", "title": "Staff Backend Engineer", "company": "Globex",
                   "description_text": "Go, Kubernetes. 10+ years of experience.",
                   "remote": false, "posted_at": "2024-06-01"}),
            json!({"id": "3", "title": null, "company": "Initech"}),
        ]
        .into_iter()
        .map(|v| v.as_object().expect("object").clone())
        .collect();
        JobDataset::from_records(&records).expect("dataset")
    }

    #[derive(Default)]
    struct Recorder(Mutex<Vec<String>>);

    impl ProgressReporter for Recorder {
        fn stage_started(&self, stage: Stage) {
            self.0.lock().expect("lock").push(format!("start:{stage}"));
        }
        fn stage_finished(&self, stage: Stage, rows: usize) {
            self.0.lock().expect("lock").push(format!("end:{stage}:{rows}"));
        }
        fn done(&self, _diagnostics: &Diagnostics) {
            self.0.lock().expect("lock").push("done".into());
        }
    }

    #[test]
    fn runs_all_stages_in_order() {
        let runtime = Runtime::new(config(""), PluginRegistry::empty()).expect("runtime");
        let progress = Recorder::default();
        let run = runtime.run_dataset(jobs(), &progress).expect("run");

        let stages: Vec<Stage> = run.diagnostics.entries.iter().map(|e| e.stage).collect();
        assert_eq!(
            stages,
            vec![
                Stage::Input,
                Stage::Clean,
                Stage::Filter,
                Stage::Label,
                Stage::Rate,
                Stage::Rank,
                Stage::Plan,
            ]
        );
        assert_eq!(run.diagnostics.stage_rows.input, Some(3));
        assert_eq!(run.diagnostics.stage_rows.clean, Some(2));
        assert_eq!(run.dataset.row_count(), 2);
        assert_eq!(run.diagnostics.final_rows, 2);
        assert_eq!(run.plan.len(), 2);

        let ranking = run.ranking.expect("ranking");
        assert_eq!(ranking.records[0].id.as_deref(), Some("1"));
        assert_eq!(ranking.records[0].title.as_deref(), Some("Junior Data Scientist"));

        let events = progress.0.into_inner().expect("lock");
        assert_eq!(events.first().map(String::as_str), Some("start:clean"));
        assert_eq!(events.last().map(String::as_str), Some("done"));
    }

    #[test]
    fn disabled_stages_are_not_recorded() {
        let cfg = config("\n[stages.label]\nenabled = false\n\n[stages.plan]\nenabled = false\n");
        let runtime = Runtime::new(cfg, PluginRegistry::empty()).expect("runtime");
        let run = runtime.run_dataset(jobs(), &SilentProgress).expect("run");
        assert!(run.diagnostics.entries.iter().all(|e| e.stage != Stage::Label));
        assert!(run.plan.is_empty());
        for column in [LABEL_SENIORITY, LABEL_ROLE_CATEGORY, LABEL_TECH_STACK] {
            assert!(!run.dataset.has_column(column), "{column} written by a disabled stage");
        }

        let enabled = Runtime::new(config(""), PluginRegistry::empty()).expect("runtime");
        let run = enabled.run_dataset(jobs(), &SilentProgress).expect("run");
        for column in [LABEL_SENIORITY, LABEL_ROLE_CATEGORY, LABEL_TECH_STACK] {
            assert!(run.dataset.has_column(column), "{column} missing");
        }
    }

    #[test]
    fn stage_options_reach_the_plugin_context() {
        let runtime = Runtime::new(config(""), PluginRegistry::empty()).expect("runtime");
        let options = &runtime.context.stage_options;
        assert!(options.is_object());
        assert_eq!(options["rank"]["as_of"], json!("2025-01-15"));
    }

    #[test]
    fn plan_without_ranking_is_a_warning() {
        let cfg = config("enabled = false\n");
        let runtime = Runtime::new(cfg, PluginRegistry::empty()).expect("runtime");
        let run = runtime.run_dataset(jobs(), &SilentProgress).expect("run");
        let last = run.diagnostics.entries.last().expect("entry");
        assert_eq!(last.stage, Stage::Plan);
        assert_eq!(last.status, StageStatus::Warn);
        assert!(run.ranking.is_none());
    }

    #[test]
    fn invalid_rank_config_is_rejected_up_front() {
        let cfg = config("profile = \"astronaut\"\n");
        let err = Runtime::new(cfg, PluginRegistry::empty()).expect_err("unknown profile");
        assert!(err.is_configuration());
    }

    #[test]
    fn input_without_ids_fails() {
        let runtime = Runtime::new(config(""), PluginRegistry::empty()).expect("runtime");
        let ds = jobs().without_column("id");
        assert!(runtime.run_dataset(ds, &SilentProgress).is_err());
    }

    #[test]
    fn run_reads_input_and_writes_outputs() {
        let dir = std::env::temp_dir().join(format!("honestroles-runtime-{}", std::process::id()));
        std::fs::create_dir_all(&dir).expect("mkdir");
        let input = dir.join("jobs.jsonl");
        jobs().write_jsonl(&input).expect("write input");

        let toml = r#"
[input]
path = "jobs.jsonl"

[output]
path = "out/ranked.jsonl"
plan_path = "out/plan.json"

[stages.rank]
as_of = "2025-01-15"
"#;
        let config_path = dir.join("pipeline.toml");
        std::fs::write(&config_path, toml).expect("write config");

        let runtime =
            Runtime::from_configs(&config_path, None, &PluginCatalog::new()).expect("runtime");
        let run = runtime.run(&SilentProgress).expect("run");

        let written = JobDataset::read_jsonl(&dir.join("out/ranked.jsonl")).expect("read output");
        assert_eq!(written.row_count(), run.dataset.row_count());
        assert!(written.has_column("fit_score"));

        let plan: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(dir.join("out/plan.json")).expect("read plan"),
        )
        .expect("plan json");
        assert_eq!(plan.as_array().map(Vec::len), Some(run.plan.len()));
        assert_eq!(run.diagnostics.entries.last().map(|e| e.stage), Some(Stage::Output));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn missing_config_file_is_initialization_error() {
        let missing = Path::new("/nonexistent/pipeline.toml");
        let err = Runtime::from_configs(missing, None, &PluginCatalog::new())
            .expect_err("missing file");
        assert!(matches!(err, HonestRolesError::RuntimeInitialization { .. }));
    }
}
