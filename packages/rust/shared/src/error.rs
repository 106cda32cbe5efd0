//! Error types for HonestRoles.
//!
//! Library crates use [`HonestRolesError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all HonestRoles operations.
#[derive(Debug, thiserror::Error)]
pub enum HonestRolesError {
    /// Malformed pipeline config or plugin manifest. Always raised before execution.
    #[error("config validation error: {message}")]
    ConfigValidation { message: String },

    /// A plugin reference could not be resolved to a callable.
    #[error("failed to load plugin reference '{reference}': {detail}")]
    PluginLoad { reference: String, detail: String },

    /// A resolved plugin does not satisfy the contract for its kind.
    #[error(
        "plugin '{plugin_name}' ({kind}) violates the plugin contract: {}",
        violations.join("; ")
    )]
    PluginValidation {
        plugin_name: String,
        kind: String,
        /// Rendered contract the host expects, e.g. `(dataset: JobDataset, ...) -> JobDataset`.
        expected: String,
        /// Rendered signature the plugin declared.
        found: String,
        violations: Vec<String>,
    },

    /// A plugin failed while running inside a stage.
    #[error("plugin '{plugin_name}' ({stage_kind}) execution failed: {detail}")]
    PluginExecution {
        plugin_name: String,
        stage_kind: String,
        detail: String,
    },

    /// A built-in stage failed.
    #[error("stage '{stage}' failed: {detail}")]
    StageExecution { stage: String, detail: String },

    /// The runtime could not be constructed from its configs.
    #[error("runtime initialization failed for '{}': {detail}", path.display())]
    RuntimeInitialization { path: PathBuf, detail: String },

    /// Dataset shape or schema violation.
    #[error("dataset error: {message}")]
    Dataset { message: String },

    /// LLM transport or response error.
    #[error("llm error: {0}")]
    Llm(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, HonestRolesError>;

impl HonestRolesError {
    /// Create a config validation error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::ConfigValidation {
            message: msg.into(),
        }
    }

    /// Create a dataset error from any displayable message.
    pub fn dataset(msg: impl Into<String>) -> Self {
        Self::Dataset {
            message: msg.into(),
        }
    }

    pub fn plugin_load(reference: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::PluginLoad {
            reference: reference.into(),
            detail: detail.into(),
        }
    }

    pub fn plugin_execution(
        plugin_name: impl Into<String>,
        stage_kind: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self::PluginExecution {
            plugin_name: plugin_name.into(),
            stage_kind: stage_kind.into(),
            detail: detail.into(),
        }
    }

    /// Create a stage execution error for the named stage.
    pub fn stage(stage: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::StageExecution {
            stage: stage.into(),
            detail: detail.into(),
        }
    }

    pub fn runtime_init(path: impl Into<PathBuf>, detail: impl Into<String>) -> Self {
        Self::RuntimeInitialization {
            path: path.into(),
            detail: detail.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Stable type name recorded in diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::ConfigValidation { .. } => "ConfigValidationError",
            Self::PluginLoad { .. } => "PluginLoadError",
            Self::PluginValidation { .. } => "PluginValidationError",
            Self::PluginExecution { .. } => "PluginExecutionError",
            Self::StageExecution { .. } => "StageExecutionError",
            Self::RuntimeInitialization { .. } => "RuntimeInitializationError",
            Self::Dataset { .. } => "DatasetError",
            Self::Llm(_) => "LlmError",
            Self::Io { .. } => "IoError",
        }
    }

    /// Errors that describe bad configuration rather than a failure while building.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::ConfigValidation { .. } | Self::PluginLoad { .. } | Self::PluginValidation { .. }
        )
    }
}
