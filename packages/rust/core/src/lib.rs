//! Core pipeline and domain logic for HonestRoles.
//!
//! This crate turns a raw [`JobDataset`](honestroles_shared::JobDataset) into
//! a ranked shortlist and an application plan:
//! clean → filter → label → rate → rank → plan. The [`Runtime`] sequences the
//! stages, threads registered plugins through filter/label/rate, and records
//! everything in [`Diagnostics`]. [`quality`] profiles a dataset and gates it
//! on findings severity.

pub mod diagnostics;
pub mod filter;
pub mod label;
pub mod llm;
pub mod plan;
pub mod quality;
pub mod rank;
pub mod rate;
pub mod runtime;
pub mod signals;
pub mod stages;
pub mod vocab;

pub use diagnostics::{Diagnostics, NonFatalError, Stage, StageEntry, StageStatus};
pub use filter::{FilterChain, Predicate};
pub use llm::{LanguageModel, OllamaClient};
pub use plan::{ApplicationPlanEntry, PlanAction, PlanThresholds, build_application_plan};
pub use quality::{
    DatasetProfile, Finding, GateReport, GateRules, GateStatus, Severity, build_findings,
    evaluate_gate, profile_dataset,
};
pub use rank::{
    CandidateProfile, Component, MatchWeights, MissingPolicies, RankOptions, RankedJob, Ranking,
    rank_jobs,
};
pub use runtime::{PipelineRun, ProgressReporter, Runtime, SilentProgress};
pub use signals::extract_job_signals;
