//! Built-in stage functions and plugin threading.
//!
//! Each stage applies its own deterministic logic first, then runs the
//! enabled plugins of its kind in registry order. The first plugin failure
//! stops the stage; whether the run continues is the runtime's decision.

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use honestroles_clean::{
    dedup, html_to_text, normalize_employment_types, normalize_locations, normalize_salaries,
};
use honestroles_plugins::{PluginDefinition, RuntimeExecutionContext, StageContext};
use honestroles_shared::schema::{COMPANY, DESCRIPTION_HTML, DESCRIPTION_TEXT, TITLE};
use honestroles_shared::{
    CleanConfig, Column, FilterConfig, HonestRolesError, JobDataset, LabelConfig, PluginKind,
    RateConfig, Result,
};
use tracing::{debug, info_span, instrument, warn};

use crate::filter::FilterChain;
use crate::label::{apply_llm_labels, label_jobs};
use crate::llm::LanguageModel;
use crate::rate::{clamp_rate_columns, rate_jobs};

/// Shared runtime context handed to plugins, if any.
pub type RuntimeContext = Option<Arc<RuntimeExecutionContext>>;

// ---------------------------------------------------------------------------
// Plugin threading
// ---------------------------------------------------------------------------

fn panic_detail(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_string()
    }
}

/// Thread `dataset` through `plugins` in order.
///
/// Each call gets a fresh [`StageContext`]. A returned error, a panic, or an
/// invalid returned dataset becomes `PluginExecution` and stops the sequence.
/// Once ids are unique, a plugin may not repeat them.
pub fn run_plugins(
    dataset: JobDataset,
    kind: PluginKind,
    plugins: &[PluginDefinition],
    runtime: &RuntimeContext,
) -> Result<JobDataset> {
    let mut current = dataset;
    for plugin in plugins.iter().filter(|p| p.enabled && p.kind == kind) {
        let _span = info_span!("plugin", name = %plugin.name, kind = %kind).entered();
        let ctx = StageContext::for_plugin(plugin, runtime.clone());

        let outcome = catch_unwind(AssertUnwindSafe(|| plugin.invoke(&current, &ctx)));
        let next = match outcome {
            Ok(Ok(next)) => next,
            Ok(Err(e)) => {
                return Err(HonestRolesError::plugin_execution(
                    &plugin.name,
                    kind.as_str(),
                    e.to_string(),
                ));
            }
            Err(payload) => {
                return Err(HonestRolesError::plugin_execution(
                    &plugin.name,
                    kind.as_str(),
                    panic_detail(payload.as_ref()),
                ));
            }
        };
        let checked = if current.has_unique_ids() {
            next.validate_deduplicated()
        } else {
            next.validate()
        };
        checked.map_err(|e| {
            HonestRolesError::plugin_execution(
                &plugin.name,
                kind.as_str(),
                format!("returned invalid JobDataset: {e}"),
            )
        })?;

        debug!(rows_in = current.row_count(), rows_out = next.row_count(), "plugin applied");
        current = next;
    }
    Ok(current)
}

/// Attribute a built-in failure to `stage`. Plugin failures keep their own context.
pub(crate) fn in_stage(stage: &str, error: HonestRolesError) -> HonestRolesError {
    match error {
        e @ (HonestRolesError::PluginExecution { .. }
        | HonestRolesError::StageExecution { .. }) => e,
        other => HonestRolesError::stage(stage, other.to_string()),
    }
}

// ---------------------------------------------------------------------------
// Clean
// ---------------------------------------------------------------------------

fn trim_text(dataset: JobDataset, column: &str) -> Result<JobDataset> {
    let Some(values) = dataset.text(column) else {
        return Ok(dataset);
    };
    let trimmed: Vec<Option<String>> = values
        .iter()
        .map(|v| v.as_deref().map(str::trim).filter(|s| !s.is_empty()).map(String::from))
        .collect();
    dataset.with_column(column, Column::Text(trimmed))
}

fn strip_html(dataset: JobDataset) -> Result<JobDataset> {
    let Some(html) = dataset.text(DESCRIPTION_HTML) else {
        if !dataset.has_column(DESCRIPTION_TEXT) {
            warn!(column = DESCRIPTION_HTML, "column missing, skipping HTML stripping");
        }
        return trim_text(dataset, DESCRIPTION_TEXT);
    };

    let text: Vec<Option<String>> = html
        .iter()
        .enumerate()
        .map(|(row, html)| {
            html.as_deref().and_then(html_to_text).or_else(|| {
                dataset
                    .text_at(DESCRIPTION_TEXT, row)
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
            })
        })
        .collect();
    dataset.with_column(DESCRIPTION_TEXT, Column::Text(text))
}

fn drop_null_titles(dataset: JobDataset) -> Result<JobDataset> {
    let Some(titles) = dataset.text(TITLE) else {
        warn!(column = TITLE, "column missing, keeping all rows");
        return Ok(dataset);
    };
    let keep: Vec<bool> = titles
        .iter()
        .map(|t| t.as_deref().is_some_and(|s| !s.trim().is_empty()))
        .collect();
    dataset.filter_rows(&keep)
}

/// Trim, strip HTML, normalize, drop untitled rows, and dedup.
#[instrument(skip_all, fields(rows = dataset.row_count()))]
pub fn clean_stage(dataset: JobDataset, config: &CleanConfig) -> Result<JobDataset> {
    let run = || -> Result<JobDataset> {
        let mut ds = trim_text(dataset, TITLE)?;
        ds = trim_text(ds, COMPANY)?;
        ds = if config.strip_html {
            strip_html(ds)?
        } else {
            trim_text(ds, DESCRIPTION_TEXT)?
        };
        if config.normalize {
            ds = normalize_employment_types(normalize_salaries(normalize_locations(ds)?)?)?;
        }
        if config.drop_null_titles {
            ds = drop_null_titles(ds)?;
        }
        if config.dedup {
            ds = dedup(ds)?;
        }
        Ok(ds)
    };
    run().map_err(|e| in_stage("clean", e))
}

// ---------------------------------------------------------------------------
// Filter, label, rate
// ---------------------------------------------------------------------------

/// Apply the configured filter chain, then filter plugins.
#[instrument(skip_all, fields(rows = dataset.row_count()))]
pub fn filter_stage(
    dataset: JobDataset,
    config: &FilterConfig,
    plugins: &[PluginDefinition],
    runtime: &RuntimeContext,
) -> Result<JobDataset> {
    let chain = FilterChain::from_config(config);
    debug!(predicates = chain.len(), mode = ?chain.mode(), "filter chain built");
    let filtered = chain.apply(&dataset).map_err(|e| in_stage("filter", e))?;
    run_plugins(filtered, PluginKind::Filter, plugins, runtime).map_err(|e| in_stage("filter", e))
}

/// Heuristic labels, optional model override, then label plugins.
#[instrument(skip_all, fields(rows = dataset.row_count()))]
pub fn label_stage(
    dataset: JobDataset,
    config: &LabelConfig,
    plugins: &[PluginDefinition],
    runtime: &RuntimeContext,
    model: Option<&dyn LanguageModel>,
) -> Result<JobDataset> {
    let mut ds = label_jobs(dataset).map_err(|e| in_stage("label", e))?;
    if config.use_llm {
        match model {
            Some(model) => ds = apply_llm_labels(ds, model).map_err(|e| in_stage("label", e))?,
            None => warn!("use_llm is set but no language model is configured"),
        }
    }
    run_plugins(ds, PluginKind::Label, plugins, runtime).map_err(|e| in_stage("label", e))
}

/// Ratings, then rate plugins, then re-bounding of the rate columns.
#[instrument(skip_all, fields(rows = dataset.row_count()))]
pub fn rate_stage(
    dataset: JobDataset,
    config: &RateConfig,
    plugins: &[PluginDefinition],
    runtime: &RuntimeContext,
    model: Option<&dyn LanguageModel>,
) -> Result<JobDataset> {
    if config.use_llm && model.is_none() {
        warn!("use_llm is set but no language model is configured");
    }
    let rated = rate_jobs(dataset, config, model).map_err(|e| in_stage("rate", e))?;
    let rated = run_plugins(rated, PluginKind::Rate, plugins, runtime)
        .map_err(|e| in_stage("rate", e))?;
    clamp_rate_columns(rated).map_err(|e| in_stage("rate", e))
}
