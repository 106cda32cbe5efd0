//! Structured, append-only record of a pipeline run.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use honestroles_plugins::PluginCounts;
use honestroles_shared::{HonestRolesError, RunId};
use serde::Serialize;

/// Pipeline stages in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Input,
    Clean,
    Filter,
    Label,
    Rate,
    Rank,
    Plan,
    Output,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::Clean => "clean",
            Self::Filter => "filter",
            Self::Label => "label",
            Self::Rate => "rate",
            Self::Rank => "rank",
            Self::Plan => "plan",
            Self::Output => "output",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    Ok,
    Warn,
    Error,
}

/// One diagnostics log line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageEntry {
    pub stage: Stage,
    pub status: StageStatus,
    pub message: String,
    pub elapsed_ms: u64,
}

/// Rows remaining after each stage that ran.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StageRowCounts {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clean: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rank: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<usize>,
}

impl StageRowCounts {
    fn set(&mut self, stage: Stage, rows: usize) {
        let slot = match stage {
            Stage::Input => &mut self.input,
            Stage::Clean => &mut self.clean,
            Stage::Filter => &mut self.filter,
            Stage::Label => &mut self.label,
            Stage::Rate => &mut self.rate,
            Stage::Rank => &mut self.rank,
            Stage::Plan => &mut self.plan,
            Stage::Output => return,
        };
        *slot = Some(rows);
    }
}

/// An error recorded while the run continued (`fail_fast = false`).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NonFatalError {
    pub stage: Stage,
    pub error_type: String,
    pub detail: String,
}

/// Diagnostics returned by every pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostics {
    pub run_id: RunId,
    pub fail_fast: bool,
    pub plugins: PluginCounts,
    pub stage_rows: StageRowCounts,
    pub entries: Vec<StageEntry>,
    pub non_fatal_errors: Vec<NonFatalError>,
    pub final_rows: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan_path: Option<PathBuf>,
}

impl Diagnostics {
    pub fn new(fail_fast: bool, plugins: PluginCounts) -> Self {
        Self {
            run_id: RunId::new(),
            fail_fast,
            plugins,
            stage_rows: StageRowCounts::default(),
            entries: Vec::new(),
            non_fatal_errors: Vec::new(),
            final_rows: 0,
            output_path: None,
            plan_path: None,
        }
    }

    pub fn record_ok(&mut self, stage: Stage, rows: usize, elapsed: Duration) {
        self.stage_rows.set(stage, rows);
        self.push(stage, StageStatus::Ok, format!("{rows} rows"), elapsed);
    }

    pub fn record_warn(&mut self, stage: Stage, message: impl Into<String>, elapsed: Duration) {
        self.push(stage, StageStatus::Warn, message.into(), elapsed);
    }

    pub fn record_error(&mut self, stage: Stage, error: &HonestRolesError, elapsed: Duration) {
        self.push(stage, StageStatus::Error, error.to_string(), elapsed);
    }

    /// Record an error the run recovered from.
    pub fn record_non_fatal(&mut self, stage: Stage, error: &HonestRolesError, elapsed: Duration) {
        self.record_error(stage, error, elapsed);
        self.non_fatal_errors.push(NonFatalError {
            stage,
            error_type: error.kind_name().to_string(),
            detail: error.to_string(),
        });
    }

    fn push(&mut self, stage: Stage, status: StageStatus, message: String, elapsed: Duration) {
        self.entries.push(StageEntry {
            stage,
            status,
            message,
            elapsed_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
        });
    }

    pub fn has_errors(&self) -> bool {
        self.entries.iter().any(|e| e.status == StageStatus::Error)
    }
}
