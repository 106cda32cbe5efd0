//! Example plugins shipped with the CLI under the `examples` module.
//!
//! Reference them from a manifest as `examples:only_remote`,
//! `examples:add_source_group`, and `examples:add_priority_rating`.

use honestroles_plugins::{PluginCatalog, PluginFailure, StageContext};
use honestroles_shared::schema::{APPLY_URL, RATE_COMPOSITE, REMOTE};
use honestroles_shared::{Column, JobDataset, PluginKind};
use url::Url;

const MODULE: &str = "examples";

/// Default `rate_composite` cut-off for `priority_role`.
const DEFAULT_PRIORITY_THRESHOLD: f64 = 0.8;

/// Catalog holding every built-in example plugin.
pub(crate) fn catalog() -> PluginCatalog {
    let mut catalog = PluginCatalog::new();
    catalog
        .export_typed(MODULE, "only_remote", PluginKind::Filter, only_remote)
        .export_typed(MODULE, "add_source_group", PluginKind::Label, add_source_group)
        .export_typed(MODULE, "add_priority_rating", PluginKind::Rate, add_priority_rating);
    catalog
}

/// Keep rows explicitly flagged remote.
fn only_remote(dataset: &JobDataset, _ctx: &StageContext) -> Result<JobDataset, PluginFailure> {
    let keep: Vec<bool> = (0..dataset.row_count())
        .map(|row| dataset.bool_at(REMOTE, row) == Some(true))
        .collect();
    Ok(dataset.clone().filter_rows(&keep)?)
}

fn source_group(apply_url: &str) -> String {
    let host = Url::parse(apply_url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_lowercase));
    let Some(host) = host else {
        return "unknown".to_string();
    };
    for (needle, group) in [
        ("greenhouse.io", "greenhouse"),
        ("lever.co", "lever"),
        ("myworkdayjobs.com", "workday"),
        ("ashbyhq.com", "ashby"),
        ("smartrecruiters.com", "smartrecruiters"),
        ("linkedin.com", "linkedin"),
    ] {
        if host == needle || host.ends_with(&format!(".{needle}")) {
            return group.to_string();
        }
    }
    host.strip_prefix("www.").unwrap_or(&host).to_string()
}

/// Label each row with the job board behind its `apply_url`.
fn add_source_group(
    dataset: &JobDataset,
    _ctx: &StageContext,
) -> Result<JobDataset, PluginFailure> {
    let groups: Vec<Option<String>> = (0..dataset.row_count())
        .map(|row| {
            Some(
                dataset
                    .text_at(APPLY_URL, row)
                    .map_or_else(|| "unknown".to_string(), source_group),
            )
        })
        .collect();
    Ok(dataset.clone().with_column("source_group", Column::Text(groups))?)
}

/// Flag rows whose composite rating reaches `settings.threshold`.
fn add_priority_rating(
    dataset: &JobDataset,
    ctx: &StageContext,
) -> Result<JobDataset, PluginFailure> {
    let threshold = ctx
        .settings
        .get_f64("threshold")
        .unwrap_or(DEFAULT_PRIORITY_THRESHOLD);
    let priority: Vec<Option<bool>> = (0..dataset.row_count())
        .map(|row| Some(dataset.float_at(RATE_COMPOSITE, row).unwrap_or(0.0) >= threshold))
        .collect();
    Ok(dataset.clone().with_column("priority_role", Column::Bool(priority))?)
}
