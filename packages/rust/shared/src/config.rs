//! Pipeline configuration and plugin manifests.
//!
//! Both files are TOML. Every key except `input.path` has a default, and
//! relative paths in the pipeline config resolve against the config file's
//! directory. Validation runs at load time so bad configuration fails before
//! any row is processed.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{HonestRolesError, Result};
use crate::types::{PluginKind, PluginSpec};

// ---------------------------------------------------------------------------
// Pipeline config
// ---------------------------------------------------------------------------

/// Top-level pipeline config, deserialized from TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    pub input: InputConfig,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<OutputConfig>,

    #[serde(default)]
    pub stages: StagesConfig,

    #[serde(default)]
    pub runtime: RuntimeConfig,

    #[serde(default)]
    pub llm: LlmConfig,
}

/// `[input]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InputConfig {
    pub path: PathBuf,
    #[serde(default)]
    pub format: InputFormat,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputFormat {
    /// One JSON object per line.
    #[default]
    Jsonl,
    /// A single JSON array of objects.
    Json,
}

/// `[output]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputConfig {
    /// Ranked dataset, written as JSONL.
    pub path: PathBuf,
    /// Application plan, written as pretty JSON.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan_path: Option<PathBuf>,
}

/// `[stages]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StagesConfig {
    #[serde(default)]
    pub clean: CleanConfig,
    #[serde(default)]
    pub filter: FilterConfig,
    #[serde(default)]
    pub label: LabelConfig,
    #[serde(default)]
    pub rate: RateConfig,
    #[serde(default)]
    pub rank: RankConfig,
    #[serde(default)]
    pub plan: PlanConfig,
}

/// `[stages.clean]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CleanConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_true")]
    pub drop_null_titles: bool,
    #[serde(default = "default_true")]
    pub strip_html: bool,
    /// Location, salary text, and employment type normalization.
    #[serde(default = "default_true")]
    pub normalize: bool,
    #[serde(default = "default_true")]
    pub dedup: bool,
}

impl Default for CleanConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            drop_null_titles: true,
            strip_html: true,
            normalize: true,
            dedup: true,
        }
    }
}

/// How the filter chain combines predicate masks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainMode {
    #[default]
    And,
    Or,
}

/// `[stages.filter]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FilterConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub mode: ChainMode,
    #[serde(default)]
    pub remote_only: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_salary: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_salary: Option<f64>,
    #[serde(default)]
    pub required_keywords: Vec<String>,
    #[serde(default)]
    pub excluded_keywords: Vec<String>,
    #[serde(default)]
    pub required_fields: Vec<String>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            mode: ChainMode::And,
            remote_only: false,
            min_salary: None,
            max_salary: None,
            required_keywords: Vec::new(),
            excluded_keywords: Vec::new(),
            required_fields: Vec::new(),
        }
    }
}

/// `[stages.label]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LabelConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub use_llm: bool,
}

impl Default for LabelConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            use_llm: false,
        }
    }
}

/// `[stages.rate]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RateConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_half")]
    pub completeness_weight: f64,
    #[serde(default = "default_half")]
    pub quality_weight: f64,
    #[serde(default)]
    pub use_llm: bool,
}

impl Default for RateConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            completeness_weight: default_half(),
            quality_weight: default_half(),
            use_llm: false,
        }
    }
}

/// How a ranking component with no value for a row is weighted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingPolicy {
    /// Drop the component from both numerator and denominator.
    #[default]
    Exclude,
    /// Count the component as a score of 0 at full weight.
    Zero,
    /// Count the component as the given score at full weight.
    Penalty(f64),
}

/// `[stages.rank.missing]` section: a default policy plus per-component overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MissingConfig {
    #[serde(default)]
    pub default: MissingPolicy,
    #[serde(flatten)]
    pub overrides: BTreeMap<String, MissingPolicy>,
}

/// `[stages.rank.candidate]`: field-level overrides applied on top of the preset profile.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CandidateOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_roles: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_skills: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_skills: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_seniority: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_cities: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_regions: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_countries: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_ok: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_salary: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub salary_currency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_years_experience: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub needs_visa_sponsorship: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graduation_year: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub friction_tolerance: Option<f64>,
}

/// `[stages.rank]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RankConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Built-in candidate preset name.
    #[serde(default = "default_profile")]
    pub profile: String,
    #[serde(default)]
    pub candidate: CandidateOverrides,
    /// Per-component weight overrides keyed by component name.
    #[serde(default)]
    pub weights: BTreeMap<String, f64>,
    #[serde(default)]
    pub missing: MissingConfig,
    /// Fixed reference date for recency scoring; defaults to today.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub as_of: Option<NaiveDate>,
}

impl Default for RankConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            top_k: default_top_k(),
            profile: default_profile(),
            candidate: CandidateOverrides::default(),
            weights: BTreeMap::new(),
            missing: MissingConfig::default(),
            as_of: None,
        }
    }
}

/// `[stages.plan]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlanConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_apply_threshold")]
    pub apply_threshold: f64,
    #[serde(default = "default_research_threshold")]
    pub research_threshold: f64,
    #[serde(default = "default_max_friction")]
    pub max_friction: f64,
}

impl Default for PlanConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            apply_threshold: default_apply_threshold(),
            research_threshold: default_research_threshold(),
            max_friction: default_max_friction(),
        }
    }
}

/// `[runtime]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuntimeConfig {
    /// Abort on the first stage error instead of recording it and continuing.
    #[serde(default = "default_true")]
    pub fail_fast: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self { fail_fast: true }
    }
}

/// `[llm]` section (local Ollama-compatible endpoint).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LlmConfig {
    #[serde(default = "default_llm_url")]
    pub base_url: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_llm_url(),
            model: default_llm_model(),
            timeout_secs: default_llm_timeout(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_half() -> f64 {
    0.5
}
fn default_top_k() -> usize {
    100
}
fn default_profile() -> String {
    "new_grad".into()
}
fn default_apply_threshold() -> f64 {
    0.7
}
fn default_research_threshold() -> f64 {
    0.45
}
fn default_max_friction() -> f64 {
    0.5
}
fn default_llm_url() -> String {
    "http://localhost:11434".into()
}
fn default_llm_model() -> String {
    "llama3".into()
}
fn default_llm_timeout() -> u64 {
    30
}

impl PipelineConfig {
    /// Check value ranges that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        let rate = &self.stages.rate;
        for (name, weight) in [
            ("completeness_weight", rate.completeness_weight),
            ("quality_weight", rate.quality_weight),
        ] {
            if !weight.is_finite() || weight < 0.0 {
                return Err(HonestRolesError::config(format!(
                    "stages.rate.{name} must be a finite number >= 0, got {weight}"
                )));
            }
        }

        let filter = &self.stages.filter;
        if let Some(min) = filter.min_salary {
            if !min.is_finite() || min < 0.0 {
                return Err(HonestRolesError::config("stages.filter.min_salary must be >= 0"));
            }
        }
        if let Some(max) = filter.max_salary {
            if !max.is_finite() || max < 0.0 {
                return Err(HonestRolesError::config("stages.filter.max_salary must be >= 0"));
            }
        }
        if let (Some(min), Some(max)) = (filter.min_salary, filter.max_salary) {
            if max < min {
                return Err(HonestRolesError::config(
                    "stages.filter.max_salary must be >= min_salary",
                ));
            }
        }

        let rank = &self.stages.rank;
        if rank.top_k < 1 {
            return Err(HonestRolesError::config("stages.rank.top_k must be >= 1"));
        }
        for (name, weight) in &rank.weights {
            if !weight.is_finite() || *weight < 0.0 {
                return Err(HonestRolesError::config(format!(
                    "stages.rank.weights.{name} must be a finite number >= 0, got {weight}"
                )));
            }
        }
        let policies =
            std::iter::once(&rank.missing.default).chain(rank.missing.overrides.values());
        for policy in policies {
            if let MissingPolicy::Penalty(value) = policy {
                if !(0.0..=1.0).contains(value) {
                    return Err(HonestRolesError::config(format!(
                        "missing-component penalty must be within [0, 1], got {value}"
                    )));
                }
            }
        }
        if let Some(tolerance) = rank.candidate.friction_tolerance {
            if !(0.0..1.0).contains(&tolerance) {
                return Err(HonestRolesError::config(
                    "stages.rank.candidate.friction_tolerance must be within [0, 1)",
                ));
            }
        }
        if let Some(floor) = rank.candidate.min_salary {
            if !floor.is_finite() || floor < 0.0 {
                return Err(HonestRolesError::config(
                    "stages.rank.candidate.min_salary must be a finite number >= 0",
                ));
            }
        }

        let plan = &self.stages.plan;
        for (name, value) in [
            ("apply_threshold", plan.apply_threshold),
            ("research_threshold", plan.research_threshold),
            ("max_friction", plan.max_friction),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(HonestRolesError::config(format!(
                    "stages.plan.{name} must be within [0, 1], got {value}"
                )));
            }
        }
        if plan.research_threshold > plan.apply_threshold {
            return Err(HonestRolesError::config(
                "stages.plan.research_threshold must not exceed apply_threshold",
            ));
        }

        if self.llm.timeout_secs == 0 {
            return Err(HonestRolesError::config("llm.timeout_secs must be > 0"));
        }
        Ok(())
    }

    /// Resolve relative input/output paths against `base_dir`.
    fn resolve_paths(&mut self, base_dir: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base_dir.join(&*p);
            }
        };
        resolve(&mut self.input.path);
        if let Some(output) = self.output.as_mut() {
            resolve(&mut output.path);
            if let Some(plan_path) = output.plan_path.as_mut() {
                resolve(plan_path);
            }
        }
    }
}

/// Parse and validate a pipeline config from TOML text.
pub fn parse_pipeline_config(content: &str, base_dir: &Path) -> Result<PipelineConfig> {
    let mut config: PipelineConfig = toml::from_str(content)
        .map_err(|e| HonestRolesError::config(format!("invalid pipeline config: {e}")))?;
    config.validate()?;
    config.resolve_paths(base_dir);
    Ok(config)
}

/// Load a pipeline config from a file path.
pub fn load_pipeline_config(path: &Path) -> Result<PipelineConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| HonestRolesError::io(path, e))?;
    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
    parse_pipeline_config(&content, base_dir).map_err(|e| match e {
        HonestRolesError::ConfigValidation { message } => {
            HonestRolesError::config(format!("{}: {message}", path.display()))
        }
        other => other,
    })
}

// ---------------------------------------------------------------------------
// Plugin manifest
// ---------------------------------------------------------------------------

/// A plugin manifest: an ordered list of `[[plugins]]` entries.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PluginManifest {
    #[serde(default)]
    pub plugins: Vec<PluginManifestItem>,
}

/// `[[plugins]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PluginManifestItem {
    pub name: String,
    pub kind: PluginKind,
    /// `module:function` reference resolved through a plugin catalog.
    #[serde(alias = "callable")]
    pub reference: String,
    #[serde(default)]
    pub order: i64,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub settings: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub spec: PluginSpec,
}

impl PluginManifest {
    /// Trim names and reject empty fields or duplicate `(kind, name)` pairs.
    pub fn validate(&mut self) -> Result<()> {
        let mut seen = HashSet::new();
        for (index, item) in self.plugins.iter_mut().enumerate() {
            item.name = item.name.trim().to_string();
            item.reference = item.reference.trim().to_string();
            if item.name.is_empty() {
                return Err(HonestRolesError::config(format!(
                    "plugins[{index}].name must not be empty"
                )));
            }
            if item.reference.is_empty() {
                return Err(HonestRolesError::config(format!(
                    "plugins[{index}] ('{}') has an empty reference",
                    item.name
                )));
            }
            if !seen.insert((item.kind, item.name.clone())) {
                return Err(HonestRolesError::config(format!(
                    "duplicate plugin name '{}' for kind '{}'",
                    item.name, item.kind
                )));
            }
        }
        Ok(())
    }
}

/// Parse and validate a plugin manifest from TOML text.
pub fn parse_plugin_manifest(content: &str) -> Result<PluginManifest> {
    let mut manifest: PluginManifest = toml::from_str(content)
        .map_err(|e| HonestRolesError::config(format!("invalid plugin manifest: {e}")))?;
    manifest.validate()?;
    Ok(manifest)
}

/// Load a plugin manifest from a file path.
pub fn load_plugin_manifest(path: &Path) -> Result<PluginManifest> {
    let content = std::fs::read_to_string(path).map_err(|e| HonestRolesError::io(path, e))?;
    parse_plugin_manifest(&content).map_err(|e| match e {
        HonestRolesError::ConfigValidation { message } => {
            HonestRolesError::config(format!("{}: {message}", path.display()))
        }
        other => other,
    })
}
