//! Column names and the canonical job schema.
//!
//! Columns are referenced by stable string names. Stages may add derived
//! columns but never drop the canonical ones.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Canonical source columns
// ---------------------------------------------------------------------------

pub const ID: &str = "id";
pub const TITLE: &str = "title";
pub const COMPANY: &str = "company";
pub const LOCATION: &str = "location";
pub const REMOTE: &str = "remote";
pub const DESCRIPTION_TEXT: &str = "description_text";
pub const DESCRIPTION_HTML: &str = "description_html";
pub const SKILLS: &str = "skills";
pub const SALARY_MIN: &str = "salary_min";
pub const SALARY_MAX: &str = "salary_max";
pub const APPLY_URL: &str = "apply_url";
pub const POSTED_AT: &str = "posted_at";

// ---------------------------------------------------------------------------
// Optional source and normalized columns
// ---------------------------------------------------------------------------

pub const SALARY_TEXT: &str = "salary_text";
pub const SALARY_CURRENCY: &str = "salary_currency";
pub const EMPLOYMENT_TYPE: &str = "employment_type";
pub const CITY: &str = "city";
pub const REGION: &str = "region";
pub const COUNTRY: &str = "country";
pub const REMOTE_TYPE: &str = "remote_type";
pub const CONTENT_HASH: &str = "content_hash";

// ---------------------------------------------------------------------------
// Derived columns
// ---------------------------------------------------------------------------

pub const LABEL_SENIORITY: &str = "label_seniority";
pub const LABEL_ROLE_CATEGORY: &str = "label_role_category";
pub const LABEL_TECH_STACK: &str = "label_tech_stack";

pub const RATE_COMPLETENESS: &str = "rate_completeness";
pub const RATE_QUALITY: &str = "rate_quality";
pub const RATE_COMPOSITE: &str = "rate_composite";
pub const APPLICATION_FRICTION: &str = "application_friction";

pub const EXPERIENCE_YEARS_MIN: &str = "experience_years_min";
pub const EXPERIENCE_YEARS_MAX: &str = "experience_years_max";
pub const ENTRY_LEVEL_LIKELY: &str = "entry_level_likely";
pub const VISA_SPONSORSHIP_SIGNAL: &str = "visa_sponsorship_signal";
pub const ROLE_CLARITY_SCORE: &str = "role_clarity_score";
pub const SIGNAL_CONFIDENCE: &str = "signal_confidence";
pub const REQUIRED_SKILLS_EXTRACTED: &str = "required_skills_extracted";

pub const FIT_SCORE: &str = "fit_score";
pub const FIT_RANK: &str = "fit_rank";
pub const MISSING_REQUIREMENTS: &str = "missing_requirements";
pub const WHY_MATCH: &str = "why_match";

/// Prefix for per-component fit breakdown columns (`fit_skill_overlap`, ...).
pub const FIT_COMPONENT_PREFIX: &str = "fit_";

// ---------------------------------------------------------------------------
// Canonical schema
// ---------------------------------------------------------------------------

/// Logical type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogicalType {
    Text,
    Float,
    Int,
    Bool,
    List,
}

impl std::fmt::Display for LogicalType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Text => "text",
            Self::Float => "float",
            Self::Int => "int",
            Self::Bool => "bool",
            Self::List => "list",
        };
        f.write_str(name)
    }
}

/// The canonical job columns, in canonical order, with their logical types.
pub const CANONICAL_SCHEMA: &[(&str, LogicalType)] = &[
    (ID, LogicalType::Text),
    (TITLE, LogicalType::Text),
    (COMPANY, LogicalType::Text),
    (LOCATION, LogicalType::Text),
    (REMOTE, LogicalType::Bool),
    (DESCRIPTION_TEXT, LogicalType::Text),
    (DESCRIPTION_HTML, LogicalType::Text),
    (SKILLS, LogicalType::List),
    (SALARY_MIN, LogicalType::Float),
    (SALARY_MAX, LogicalType::Float),
    (APPLY_URL, LogicalType::Text),
    (POSTED_AT, LogicalType::Text),
];

/// Canonical type of `name`, if it is a canonical column.
pub fn canonical_type(name: &str) -> Option<LogicalType> {
    CANONICAL_SCHEMA
        .iter()
        .find(|(column, _)| *column == name)
        .map(|(_, ty)| *ty)
}
