//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use honestroles_core::{
    Diagnostics, GateRules, GateStatus, PipelineRun, ProgressReporter, Runtime, Stage,
    build_findings, evaluate_gate, profile_dataset,
};
use honestroles_plugins::inspect_manifest;
use honestroles_shared::{JobDataset, PluginKind, load_pipeline_config, load_plugin_manifest};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use crate::builtin;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// HonestRoles: rank job listings against a candidate profile.
#[derive(Parser)]
#[command(
    name = "honestroles",
    version,
    about = "Clean, filter, label, rate, and rank job listings, then plan applications.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log level filter (error, warn, info, debug, trace). RUST_LOG overrides it.
    #[arg(long, default_value = "info", global = true)]
    pub log_level: String,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Run the pipeline described by a config file.
    Run {
        /// Pipeline config (TOML).
        #[arg(long)]
        config: PathBuf,

        /// Plugin manifest (TOML).
        #[arg(long)]
        plugins: Option<PathBuf>,

        /// Print diagnostics as JSON instead of a summary.
        #[arg(long)]
        json: bool,
    },

    /// Inspect plugin manifests.
    Plugins {
        #[command(subcommand)]
        action: PluginsAction,
    },

    /// Exploratory data checks.
    Eda {
        #[command(subcommand)]
        action: EdaAction,
    },

    /// Configuration management.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
pub(crate) enum PluginsAction {
    /// List every manifest entry and whether it loads.
    List {
        #[arg(long)]
        manifest: PathBuf,

        /// Only show one kind: filter, label, or rate.
        #[arg(long)]
        kind: Option<PluginKind>,
    },
    /// Validate every manifest entry against its contract.
    Validate {
        #[arg(long)]
        manifest: PathBuf,
    },
}

#[derive(Subcommand)]
pub(crate) enum EdaAction {
    /// Profile a job file and fail on findings above the configured thresholds.
    Gate {
        /// Job file (.jsonl, or .json array).
        #[arg(long)]
        input: PathBuf,

        /// Gate rules (TOML with a [gate] table).
        #[arg(long)]
        rules: Option<PathBuf>,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Show the resolved pipeline configuration.
    Show {
        #[arg(long)]
        config: PathBuf,
    },
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags. Logs go to stderr so stdout stays parseable.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("honestroles={}", cli.log_level)));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Run {
            config,
            plugins,
            json,
        } => cmd_run(&config, plugins.as_deref(), json),
        Command::Plugins { action } => match action {
            PluginsAction::List { manifest, kind } => cmd_plugins_list(&manifest, kind),
            PluginsAction::Validate { manifest } => cmd_plugins_validate(&manifest),
        },
        Command::Eda { action } => match action {
            EdaAction::Gate { input, rules } => cmd_eda_gate(&input, rules.as_deref()),
        },
        Command::Config { action } => match action {
            ConfigAction::Show { config } => cmd_config_show(&config),
        },
    }
}

// ---------------------------------------------------------------------------
// run
// ---------------------------------------------------------------------------

fn cmd_run(config: &Path, plugins: Option<&Path>, json: bool) -> Result<()> {
    let catalog = builtin::catalog();
    let runtime = Runtime::from_configs(config, plugins, &catalog)?;
    info!(
        config = %config.display(),
        plugins = runtime.registry().len(),
        fail_fast = runtime.config().runtime.fail_fast,
        "starting pipeline"
    );

    let reporter = CliProgress::new();
    let result = runtime.run(&reporter);
    reporter.finish();
    let run = result?;

    if json {
        println!("{}", serde_json::to_string_pretty(&run.diagnostics)?);
    } else {
        print_summary(&run);
    }
    Ok(())
}

fn print_summary(run: &PipelineRun) {
    let d = &run.diagnostics;
    println!();
    println!("  Run:    {}", d.run_id);
    println!(
        "  Rows:   {} in, {} out",
        d.stage_rows.input.unwrap_or_default(),
        d.final_rows
    );
    let elapsed: u64 = d.entries.iter().map(|e| e.elapsed_ms).sum();
    println!("  Time:   {:.1}s", Duration::from_millis(elapsed).as_secs_f64());
    if !d.non_fatal_errors.is_empty() {
        println!("  Errors: {} (continued)", d.non_fatal_errors.len());
        for err in &d.non_fatal_errors {
            println!("          {}: {}", err.stage, err.detail);
        }
    }
    if let Some(path) = &d.output_path {
        println!("  Output: {}", path.display());
    }
    if let Some(path) = &d.plan_path {
        println!("  Plan:   {}", path.display());
    }

    if !run.plan.is_empty() {
        println!();
        for entry in &run.plan {
            println!(
                "  {:>3}. {:<24} {:.2}  {} @ {}  (~{} min)",
                entry.rank,
                entry.action.as_str(),
                entry.fit_score,
                entry.title.as_deref().unwrap_or("(untitled)"),
                entry.company.as_deref().unwrap_or("(unknown)"),
                entry.estimated_effort_minutes,
            );
        }
    }
    println!();
}

// ---------------------------------------------------------------------------
// plugins
// ---------------------------------------------------------------------------

fn cmd_plugins_list(manifest_path: &Path, kind: Option<PluginKind>) -> Result<()> {
    let manifest = load_plugin_manifest(manifest_path)?;
    let catalog = builtin::catalog();
    let entries = inspect_manifest(&manifest, &catalog);

    for entry in entries.iter().filter(|e| kind.is_none_or(|k| e.kind == k)) {
        let status = match (&entry.result, entry.enabled) {
            (Ok(_), true) => "ok".to_string(),
            (Ok(_), false) => "disabled".to_string(),
            (Err(e), _) => format!("error: {e}"),
        };
        println!(
            "{:>5}  {:<6}  {:<24}  {:<36}  {status}",
            entry.order,
            entry.kind.as_str(),
            entry.name,
            entry.reference
        );
    }
    Ok(())
}

fn cmd_plugins_validate(manifest_path: &Path) -> Result<()> {
    let manifest = load_plugin_manifest(manifest_path)?;
    let catalog = builtin::catalog();
    let entries = inspect_manifest(&manifest, &catalog);

    let mut failed = 0usize;
    for entry in &entries {
        match (&entry.result, entry.enabled) {
            (Ok(_), _) => println!("ok    {} ({})", entry.name, entry.kind),
            (Err(e), false) => println!("warn  {} ({}, disabled): {e}", entry.name, entry.kind),
            (Err(e), true) => {
                failed += 1;
                println!("FAIL  {} ({}): {e}", entry.name, entry.kind);
            }
        }
    }

    if failed > 0 {
        return Err(eyre!(
            "{failed} of {} plugin(s) failed validation",
            entries.len()
        ));
    }
    println!("{} plugin(s) valid", entries.len());
    Ok(())
}

// ---------------------------------------------------------------------------
// eda
// ---------------------------------------------------------------------------

fn cmd_eda_gate(input: &Path, rules: Option<&Path>) -> Result<()> {
    let dataset = match input.extension().and_then(|e| e.to_str()) {
        Some("json") => JobDataset::read_json(input)?,
        _ => JobDataset::read_jsonl(input)?,
    };
    let rules = match rules {
        Some(path) => GateRules::load(path)?,
        None => GateRules::default(),
    };

    let profile = profile_dataset(&dataset);
    let findings = build_findings(&profile);
    let report = evaluate_gate(&findings, &rules);
    info!(
        rows = profile.rows,
        findings = findings.len(),
        status = ?report.status,
        "data-quality gate evaluated"
    );

    let payload = serde_json::json!({ "profile": profile, "gate": report });
    println!("{}", serde_json::to_string_pretty(&payload)?);

    if report.status == GateStatus::Fail {
        return Err(eyre!(
            "data-quality gate failed with {} failure(s)",
            report.failures.len()
        ));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

fn cmd_config_show(path: &Path) -> Result<()> {
    let config = load_pipeline_config(path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(Duration::from_millis(80));
        Self { spinner }
    }

    fn finish(&self) {
        if !self.spinner.is_finished() {
            self.spinner.finish_and_clear();
        }
    }
}

impl ProgressReporter for CliProgress {
    fn stage_started(&self, stage: Stage) {
        self.spinner.set_message(format!("{stage}..."));
    }

    fn stage_finished(&self, stage: Stage, rows: usize) {
        self.spinner.println(format!("  {stage:<7} {rows} rows"));
    }

    fn done(&self, _diagnostics: &Diagnostics) {
        self.spinner.finish_and_clear();
    }
}
