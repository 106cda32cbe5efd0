//! Shared types, error model, configuration, and the job table for HonestRoles.
//!
//! This crate is the foundation depended on by all other HonestRoles crates.
//! It provides:
//! - [`HonestRolesError`], the unified error type
//! - [`JobDataset`], the named-column table every stage transforms
//! - Configuration ([`PipelineConfig`], [`PluginManifest`], config loading)
//! - Domain types ([`PluginKind`], [`PluginSpec`], [`RunId`])

pub mod config;
pub mod dataset;
pub mod error;
pub mod schema;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    CandidateOverrides, ChainMode, CleanConfig, FilterConfig, InputConfig, InputFormat,
    LabelConfig, LlmConfig, MissingConfig, MissingPolicy, OutputConfig, PipelineConfig,
    PlanConfig, PluginManifest, PluginManifestItem, RankConfig, RateConfig, RuntimeConfig,
    StagesConfig, load_pipeline_config, load_plugin_manifest, parse_pipeline_config,
    parse_plugin_manifest,
};
pub use dataset::{Column, JobDataset, Record};
pub use error::{HonestRolesError, Result};
pub use schema::LogicalType;
pub use types::{PluginKind, PluginSpec, RunId};
