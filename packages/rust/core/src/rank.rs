//! Fit scoring against a candidate profile.
//!
//! Every row gets one score per [`Component`], each in [0, 1] or `None` when
//! the row lacks the data (or the component does not apply to the profile).
//! The composite is a weighted average whose treatment of missing components
//! is set per component by [`MissingPolicy`]. Per-component scores are kept in
//! the output so every ranking can be explained.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, Utc};
use honestroles_shared::schema::{
    APPLICATION_FRICTION, APPLY_URL, CITY, COMPANY, COUNTRY, DESCRIPTION_TEXT, ENTRY_LEVEL_LIKELY,
    EXPERIENCE_YEARS_MIN, FIT_COMPONENT_PREFIX, FIT_RANK, FIT_SCORE, ID, LABEL_ROLE_CATEGORY,
    LABEL_SENIORITY, LABEL_TECH_STACK, LOCATION, MISSING_REQUIREMENTS, POSTED_AT, RATE_COMPOSITE,
    RATE_QUALITY, REGION, REMOTE, REMOTE_TYPE, REQUIRED_SKILLS_EXTRACTED, SALARY_CURRENCY,
    SALARY_MAX, SALARY_MIN, SIGNAL_CONFIDENCE, SKILLS, TITLE, VISA_SPONSORSHIP_SIGNAL, WHY_MATCH,
};
use honestroles_shared::{
    CandidateOverrides, Column, HonestRolesError, JobDataset, MissingConfig, MissingPolicy,
    RankConfig, Result,
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::label::{role_category, seniority_level};
use crate::rate::{WeightedComponent, weighted_average};
use crate::signals::extract_job_signals;
use crate::vocab;

// ---------------------------------------------------------------------------
// Candidate profile
// ---------------------------------------------------------------------------

/// Matching preferences for one candidate. Read-only once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateProfile {
    pub target_roles: Vec<String>,
    pub required_skills: Vec<String>,
    pub preferred_skills: Vec<String>,
    /// Acceptable seniority labels. Empty means derive from `graduation_year`.
    pub target_seniority: Vec<String>,
    pub preferred_cities: Vec<String>,
    pub preferred_regions: Vec<String>,
    pub preferred_countries: Vec<String>,
    pub remote_ok: bool,
    pub min_salary: Option<f64>,
    pub salary_currency: Option<String>,
    pub max_years_experience: u32,
    pub needs_visa_sponsorship: Option<bool>,
    pub graduation_year: Option<i32>,
    /// Application friction accepted without penalty.
    pub friction_tolerance: f64,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl CandidateProfile {
    /// A recent graduate looking for data and ML roles.
    pub fn new_grad() -> Self {
        Self {
            target_roles: strings(&["data scientist", "machine learning engineer", "data analyst"]),
            required_skills: strings(&["python", "sql"]),
            preferred_skills: strings(&[
                "pandas",
                "numpy",
                "scikit-learn",
                "statistics",
                "machine learning",
            ]),
            target_seniority: strings(&["intern", "junior", "entry"]),
            preferred_cities: Vec::new(),
            preferred_regions: Vec::new(),
            preferred_countries: strings(&["US", "CA"]),
            remote_ok: true,
            min_salary: None,
            salary_currency: Some("USD".into()),
            max_years_experience: 2,
            needs_visa_sponsorship: None,
            graduation_year: None,
            friction_tolerance: 0.35,
        }
    }

    /// A data practitioner with a few years of experience.
    pub fn mid_career_data() -> Self {
        Self {
            target_seniority: strings(&["mid", "senior"]),
            max_years_experience: 6,
            preferred_skills: strings(&["spark", "airflow", "dbt", "machine learning", "aws"]),
            friction_tolerance: 0.5,
            ..Self::new_grad()
        }
    }

    /// Built-in profile by name.
    pub fn preset(name: &str) -> Result<Self> {
        match name.trim().to_lowercase().replace('-', "_").as_str() {
            "new_grad" | "mds_new_grad" => Ok(Self::new_grad()),
            "mid_career_data" => Ok(Self::mid_career_data()),
            other => Err(HonestRolesError::config(format!(
                "unknown candidate profile '{other}' (expected new_grad or mid_career_data)"
            ))),
        }
    }

    /// Replace every field the overrides set.
    pub fn with_overrides(mut self, overrides: &CandidateOverrides) -> Self {
        let o = overrides.clone();
        if let Some(v) = o.target_roles {
            self.target_roles = v;
        }
        if let Some(v) = o.required_skills {
            self.required_skills = v;
        }
        if let Some(v) = o.preferred_skills {
            self.preferred_skills = v;
        }
        if let Some(v) = o.target_seniority {
            self.target_seniority = v;
        }
        if let Some(v) = o.preferred_cities {
            self.preferred_cities = v;
        }
        if let Some(v) = o.preferred_regions {
            self.preferred_regions = v;
        }
        if let Some(v) = o.preferred_countries {
            self.preferred_countries = v;
        }
        if let Some(v) = o.remote_ok {
            self.remote_ok = v;
        }
        if o.min_salary.is_some() {
            self.min_salary = o.min_salary;
        }
        if o.salary_currency.is_some() {
            self.salary_currency = o.salary_currency;
        }
        if let Some(v) = o.max_years_experience {
            self.max_years_experience = v;
        }
        if o.needs_visa_sponsorship.is_some() {
            self.needs_visa_sponsorship = o.needs_visa_sponsorship;
        }
        if o.graduation_year.is_some() {
            self.graduation_year = o.graduation_year;
        }
        if let Some(v) = o.friction_tolerance {
            self.friction_tolerance = v;
        }
        self
    }

    /// Ladder levels the profile accepts.
    fn seniority_band(&self, as_of: NaiveDate) -> BTreeSet<u8> {
        let explicit: BTreeSet<u8> = self
            .target_seniority
            .iter()
            .filter_map(|s| seniority_level(s))
            .collect();
        if !explicit.is_empty() {
            return explicit;
        }
        let Some(year) = self.graduation_year else {
            return BTreeSet::new();
        };
        let since = chrono::Datelike::year(&as_of).saturating_sub(year).max(0);
        match since {
            0..=2 => BTreeSet::from([0, 1]),
            3..=5 => BTreeSet::from([1, 2]),
            _ => BTreeSet::from([2, 3]),
        }
    }

    fn normalized_skills(skills: &[String]) -> BTreeSet<String> {
        skills
            .iter()
            .map(|s| {
                vocab::canonical_skill(s)
                    .map(String::from)
                    .unwrap_or_else(|| s.trim().to_lowercase())
            })
            .filter(|s| !s.is_empty())
            .collect()
    }
}

impl Default for CandidateProfile {
    fn default() -> Self {
        Self::new_grad()
    }
}

// ---------------------------------------------------------------------------
// Components and weights
// ---------------------------------------------------------------------------

/// A named fit component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Component {
    SkillOverlap,
    RoleAlignment,
    GraduationAlignment,
    Experience,
    Visa,
    SalaryFit,
    LocationFit,
    Active,
    Friction,
    Confidence,
    Quality,
}

impl Component {
    pub const ALL: [Component; 11] = [
        Self::SkillOverlap,
        Self::RoleAlignment,
        Self::GraduationAlignment,
        Self::Experience,
        Self::Visa,
        Self::SalaryFit,
        Self::LocationFit,
        Self::Active,
        Self::Friction,
        Self::Confidence,
        Self::Quality,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::SkillOverlap => "skill_overlap",
            Self::RoleAlignment => "role_alignment",
            Self::GraduationAlignment => "graduation_alignment",
            Self::Experience => "experience",
            Self::Visa => "visa",
            Self::SalaryFit => "salary_fit",
            Self::LocationFit => "location_fit",
            Self::Active => "active",
            Self::Friction => "friction",
            Self::Confidence => "confidence",
            Self::Quality => "quality",
        }
    }

    /// Breakdown column name, e.g. `fit_skill_overlap`.
    pub fn column_name(self) -> String {
        format!("{FIT_COMPONENT_PREFIX}{}", self.as_str())
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Component {
    type Err = HonestRolesError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s.trim())
            .ok_or_else(|| HonestRolesError::config(format!("unknown ranking component '{s}'")))
    }
}

/// Weight per component. Weights need not sum to 1 but must be finite and >= 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchWeights(BTreeMap<Component, f64>);

impl Default for MatchWeights {
    fn default() -> Self {
        Self(BTreeMap::from([
            (Component::SkillOverlap, 0.22),
            (Component::GraduationAlignment, 0.16),
            (Component::Experience, 0.12),
            (Component::RoleAlignment, 0.12),
            (Component::Visa, 0.08),
            (Component::SalaryFit, 0.08),
            (Component::LocationFit, 0.07),
            (Component::Active, 0.05),
            (Component::Friction, 0.04),
            (Component::Confidence, 0.03),
            (Component::Quality, 0.03),
        ]))
    }
}

impl MatchWeights {
    pub fn get(&self, component: Component) -> f64 {
        self.0.get(&component).copied().unwrap_or(0.0)
    }

    pub fn set(mut self, component: Component, weight: f64) -> Self {
        self.0.insert(component, weight);
        self
    }

    /// Apply overrides keyed by component name.
    pub fn with_overrides(mut self, overrides: &BTreeMap<String, f64>) -> Result<Self> {
        for (name, weight) in overrides {
            self.0.insert(name.parse()?, *weight);
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        for (component, weight) in &self.0 {
            if !weight.is_finite() || *weight < 0.0 {
                return Err(HonestRolesError::config(format!(
                    "weight for '{component}' must be a finite number >= 0, got {weight}"
                )));
            }
        }
        Ok(())
    }
}

/// Missing-component policy resolved per component.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MissingPolicies {
    default: MissingPolicy,
    overrides: BTreeMap<Component, MissingPolicy>,
}

impl MissingPolicies {
    pub fn uniform(policy: MissingPolicy) -> Self {
        Self {
            default: policy,
            overrides: BTreeMap::new(),
        }
    }

    pub fn from_config(config: &MissingConfig) -> Result<Self> {
        let mut overrides = BTreeMap::new();
        for (name, policy) in &config.overrides {
            overrides.insert(name.parse::<Component>()?, *policy);
        }
        Ok(Self {
            default: config.default,
            overrides,
        })
    }

    pub fn with(mut self, component: Component, policy: MissingPolicy) -> Self {
        self.overrides.insert(component, policy);
        self
    }

    pub fn for_component(&self, component: Component) -> MissingPolicy {
        self.overrides.get(&component).copied().unwrap_or(self.default)
    }
}

// ---------------------------------------------------------------------------
// Component scorers
// ---------------------------------------------------------------------------

/// Read-only view of one dataset row.
struct Row<'a> {
    ds: &'a JobDataset,
    row: usize,
}

impl<'a> Row<'a> {
    fn text(&self, column: &str) -> Option<&'a str> {
        self.ds
            .text_at(column, self.row)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    fn float(&self, column: &str) -> Option<f64> {
        self.ds.float_at(column, self.row)
    }

    fn skills(&self) -> BTreeSet<String> {
        [SKILLS, LABEL_TECH_STACK, REQUIRED_SKILLS_EXTRACTED]
            .into_iter()
            .filter_map(|c| self.ds.list_at(c, self.row))
            .flatten()
            .map(|s| {
                vocab::canonical_skill(s)
                    .map(String::from)
                    .unwrap_or_else(|| s.trim().to_lowercase())
            })
            .filter(|s| !s.is_empty())
            .collect()
    }

    fn is_remote(&self) -> bool {
        self.ds.bool_at(REMOTE, self.row) == Some(true)
            || self.text(REMOTE_TYPE).is_some_and(|t| t.eq_ignore_ascii_case("remote"))
    }
}

fn skill_overlap(row: &Row<'_>, profile: &CandidateProfile) -> (Option<f64>, Vec<String>) {
    let required = CandidateProfile::normalized_skills(&profile.required_skills);
    let preferred = CandidateProfile::normalized_skills(&profile.preferred_skills);
    let available = row.skills();
    let missing: Vec<String> = required.difference(&available).cloned().collect();

    if (required.is_empty() && preferred.is_empty()) || available.is_empty() {
        return (None, missing);
    }
    let fraction = |wanted: &BTreeSet<String>| {
        wanted.intersection(&available).count() as f64 / wanted.len() as f64
    };
    let score = match (required.is_empty(), preferred.is_empty()) {
        (false, false) => 0.85 * fraction(&required) + 0.15 * fraction(&preferred),
        (false, true) => fraction(&required),
        _ => fraction(&preferred),
    };
    (Some(score.min(1.0)), missing)
}

fn tokens(text: &str) -> BTreeSet<String> {
    static TOKEN_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"[a-z0-9]+").expect("valid regex"));
    TOKEN_RE
        .find_iter(&text.to_lowercase())
        .map(|m| m.as_str().to_string())
        .collect()
}

fn role_alignment(row: &Row<'_>, profile: &CandidateProfile) -> Option<f64> {
    let targets: Vec<String> = profile
        .target_roles
        .iter()
        .map(|r| r.trim().to_lowercase())
        .filter(|r| !r.is_empty())
        .collect();
    if targets.is_empty() {
        return None;
    }
    let title = row.text(TITLE).unwrap_or_default().to_lowercase();
    let text = format!("{title} {}", row.text(DESCRIPTION_TEXT).unwrap_or_default().to_lowercase());
    let label = row.text(LABEL_ROLE_CATEGORY);
    if text.trim().is_empty() && label.is_none() {
        return None;
    }

    if targets.iter().any(|r| title.contains(r.as_str())) {
        return Some(1.0);
    }
    if let Some(label) = label {
        if targets.iter().any(|r| role_category(r, "") == label) {
            return Some(0.9);
        }
    }
    if targets.iter().any(|r| text.contains(r.as_str())) {
        return Some(0.85);
    }

    let role_tokens: BTreeSet<String> = targets
        .iter()
        .flat_map(|r| tokens(r))
        .filter(|t| t.len() >= 3)
        .collect();
    let overlap = role_tokens.intersection(&tokens(&text)).count();
    if overlap > 0 {
        Some((overlap as f64 / role_tokens.len() as f64).clamp(0.35, 0.75))
    } else {
        Some(0.2)
    }
}

fn graduation_alignment(row: &Row<'_>, band: &BTreeSet<u8>) -> Option<f64> {
    if band.is_empty() {
        return None;
    }
    let level = match row.text(LABEL_SENIORITY).and_then(seniority_level) {
        Some(level) => level,
        None => match row.ds.bool_at(ENTRY_LEVEL_LIKELY, row.row)? {
            true => 1,
            false => 3,
        },
    };
    let distance = band.iter().map(|b| b.abs_diff(level)).min().unwrap_or(0);
    Some((1.0 - 0.35 * f64::from(distance)).max(0.0))
}

fn experience(row: &Row<'_>, profile: &CandidateProfile) -> Option<f64> {
    let minimum = row.ds.int_at(EXPERIENCE_YEARS_MIN, row.row)?;
    let allowed = i64::from(profile.max_years_experience);
    if minimum <= allowed {
        Some(1.0)
    } else {
        Some((1.0 - 0.25 * (minimum - allowed) as f64).max(0.0))
    }
}

fn visa(row: &Row<'_>, profile: &CandidateProfile) -> Option<f64> {
    if profile.needs_visa_sponsorship != Some(true) {
        return None;
    }
    row.ds
        .bool_at(VISA_SPONSORSHIP_SIGNAL, row.row)
        .map(|sponsors| if sponsors { 1.0 } else { 0.0 })
}

/// Highest disclosed salary figure of the row.
fn disclosed_salary(row: &Row<'_>) -> Option<f64> {
    row.float(SALARY_MAX).or_else(|| row.float(SALARY_MIN))
}

fn salary_fit(row: &Row<'_>, profile: &CandidateProfile) -> Option<f64> {
    let floor = profile.min_salary.filter(|f| *f > 0.0)?;
    let salary = disclosed_salary(row)?;
    if let (Some(currency), Some(wanted)) =
        (row.text(SALARY_CURRENCY), profile.salary_currency.as_deref())
    {
        if !currency.eq_ignore_ascii_case(wanted.trim()) {
            return Some(0.4);
        }
    }
    Some((salary / floor).clamp(0.0, 1.0))
}

fn location_fit(row: &Row<'_>, profile: &CandidateProfile) -> Option<f64> {
    if profile.remote_ok && row.is_remote() {
        return Some(1.0);
    }
    let lower = |values: &[String]| -> Vec<String> {
        values.iter().map(|s| s.trim().to_lowercase()).collect()
    };
    let cities = lower(&profile.preferred_cities);
    let regions = lower(&profile.preferred_regions);
    let countries: Vec<String> = profile
        .preferred_countries
        .iter()
        .map(|s| s.trim().to_uppercase())
        .collect();
    if cities.is_empty() && regions.is_empty() && countries.is_empty() {
        return None;
    }

    let city = row.text(CITY).map(str::to_lowercase);
    let region = row.text(REGION).map(str::to_lowercase);
    let country = row.text(COUNTRY).map(str::to_uppercase);
    let raw = row.text(LOCATION).map(str::to_lowercase);
    if city.is_none() && region.is_none() && country.is_none() && raw.is_none() {
        return None;
    }

    let raw = raw.unwrap_or_default();
    let score = if city.as_ref().is_some_and(|c| cities.contains(c)) {
        1.0
    } else if region.as_ref().is_some_and(|r| regions.contains(r)) {
        0.9
    } else if country.as_ref().is_some_and(|c| countries.contains(c)) {
        0.85
    } else if cities.iter().any(|c| !c.is_empty() && raw.contains(c.as_str())) {
        0.75
    } else if regions.iter().any(|r| !r.is_empty() && raw.contains(r.as_str())) {
        0.7
    } else {
        0.25
    };
    Some(score)
}

/// Days a posting stays fully active before its score starts to decay.
const ACTIVE_FULL_DAYS: i64 = 14;
/// Age at which a posting is assumed closed.
const ACTIVE_EXPIRED_DAYS: i64 = 60;

fn parse_posted_at(value: &str) -> Option<NaiveDate> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc).date_naive())
        .ok()
        .or_else(|| NaiveDate::parse_from_str(value.get(..10).unwrap_or(value), "%Y-%m-%d").ok())
}

fn active(row: &Row<'_>, as_of: NaiveDate) -> Option<f64> {
    let posted = parse_posted_at(row.text(POSTED_AT)?)?;
    let age = (as_of - posted).num_days();
    let score = if age <= ACTIVE_FULL_DAYS {
        1.0
    } else if age >= ACTIVE_EXPIRED_DAYS {
        0.0
    } else {
        1.0 - (age - ACTIVE_FULL_DAYS) as f64 / (ACTIVE_EXPIRED_DAYS - ACTIVE_FULL_DAYS) as f64
    };
    Some(score)
}

fn friction(row: &Row<'_>, profile: &CandidateProfile) -> Option<f64> {
    let value = row.float(APPLICATION_FRICTION)?.clamp(0.0, 1.0);
    let tolerance = profile.friction_tolerance.clamp(0.0, 0.99);
    if value <= tolerance {
        Some(1.0)
    } else {
        Some((1.0 - (value - tolerance) / (1.0 - tolerance)).max(0.0))
    }
}

fn quality(row: &Row<'_>) -> Option<f64> {
    row.float(RATE_COMPOSITE)
        .or_else(|| row.float(RATE_QUALITY))
        .map(|q| q.clamp(0.0, 1.0))
}

fn missing_requirements(
    row: &Row<'_>,
    profile: &CandidateProfile,
    missing_skills: &[String],
) -> Vec<String> {
    let mut missing = Vec::new();
    if !missing_skills.is_empty() {
        missing.push(format!("missing_skills:{}", missing_skills.join(",")));
    }
    if profile.needs_visa_sponsorship == Some(true)
        && row.ds.bool_at(VISA_SPONSORSHIP_SIGNAL, row.row) == Some(false)
    {
        missing.push("visa_sponsorship_not_available".to_string());
    }
    if row
        .ds
        .int_at(EXPERIENCE_YEARS_MIN, row.row)
        .is_some_and(|m| m > i64::from(profile.max_years_experience))
    {
        missing.push("experience_requirement_above_profile".to_string());
    }
    if let (Some(floor), Some(salary)) = (profile.min_salary, disclosed_salary(row)) {
        if salary < floor {
            missing.push("salary_below_minimum".to_string());
        }
    }
    missing
}

/// Readable one-line explanation of a score.
pub fn why_match(
    title: &str,
    components: &BTreeMap<Component, Option<f64>>,
    missing: &[String],
) -> String {
    let mut present: Vec<(Component, f64)> = components
        .iter()
        .filter_map(|(c, v)| v.map(|v| (*c, v)))
        .collect();
    present.sort_by(|a, b| b.1.total_cmp(&a.1));
    let strengths: Vec<&str> = present
        .iter()
        .take(3)
        .filter(|(_, v)| *v >= 0.65)
        .map(|(c, _)| c.as_str())
        .collect();

    let summary = if strengths.is_empty() {
        format!("{title}: moderate fit with mixed signals.")
    } else {
        format!("{title}: strong on {}.", strengths.join(", "))
    };
    if missing.is_empty() {
        summary
    } else {
        format!("{summary} Watchouts: {}.", missing.join(", "))
    }
}

// ---------------------------------------------------------------------------
// Ranking
// ---------------------------------------------------------------------------

/// Everything `rank_jobs` needs besides the dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct RankOptions {
    pub profile: CandidateProfile,
    pub weights: MatchWeights,
    pub missing: MissingPolicies,
    /// Keep only the best `top_n` rows.
    pub top_n: Option<usize>,
    /// Reference date for recency.
    pub as_of: NaiveDate,
}

impl RankOptions {
    pub fn new(profile: CandidateProfile) -> Self {
        Self {
            profile,
            weights: MatchWeights::default(),
            missing: MissingPolicies::default(),
            top_n: None,
            as_of: Utc::now().date_naive(),
        }
    }

    /// Resolve a `[stages.rank]` section.
    pub fn from_config(config: &RankConfig) -> Result<Self> {
        let profile = CandidateProfile::preset(&config.profile)?.with_overrides(&config.candidate);
        Ok(Self {
            profile,
            weights: MatchWeights::default().with_overrides(&config.weights)?,
            missing: MissingPolicies::from_config(&config.missing)?,
            top_n: Some(config.top_k),
            as_of: config.as_of.unwrap_or_else(|| Utc::now().date_naive()),
        })
    }
}

/// One ranked row with its explanation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedJob {
    /// 1-based position in the ranking.
    pub rank: usize,
    /// Row index in the dataset handed to `rank_jobs`.
    pub source_row: usize,
    pub id: Option<String>,
    pub title: Option<String>,
    pub company: Option<String>,
    pub apply_url: Option<String>,
    pub fit_score: f64,
    pub components: BTreeMap<Component, Option<f64>>,
    pub missing_requirements: Vec<String>,
    pub why_match: String,
    pub seniority: Option<String>,
    pub application_friction: Option<f64>,
    pub visa_sponsorship: Option<bool>,
}

/// Ranked dataset plus per-row records, best first.
#[derive(Debug, Clone, PartialEq)]
pub struct Ranking {
    pub dataset: JobDataset,
    pub records: Vec<RankedJob>,
}

fn score_row(row: &Row<'_>, options: &RankOptions, band: &BTreeSet<u8>) -> RankedJob {
    let profile = &options.profile;
    let (skills, missing_skills) = skill_overlap(row, profile);
    let components: BTreeMap<Component, Option<f64>> = Component::ALL
        .into_iter()
        .map(|component| {
            let value = match component {
                Component::SkillOverlap => skills,
                Component::RoleAlignment => role_alignment(row, profile),
                Component::GraduationAlignment => graduation_alignment(row, band),
                Component::Experience => experience(row, profile),
                Component::Visa => visa(row, profile),
                Component::SalaryFit => salary_fit(row, profile),
                Component::LocationFit => location_fit(row, profile),
                Component::Active => active(row, options.as_of),
                Component::Friction => friction(row, profile),
                Component::Confidence => row.float(SIGNAL_CONFIDENCE),
                Component::Quality => quality(row),
            };
            (component, value.map(|v| v.clamp(0.0, 1.0)))
        })
        .collect();

    let weighted: Vec<WeightedComponent> = components
        .iter()
        .map(|(component, value)| {
            WeightedComponent::new(*value, options.weights.get(*component))
                .with_missing(options.missing.for_component(*component))
        })
        .collect();
    let fit_score = weighted_average(&weighted).unwrap_or(0.0);

    let missing = missing_requirements(row, profile, &missing_skills);
    let title = row.text(TITLE);
    RankedJob {
        rank: 0,
        source_row: row.row,
        id: row.text(ID).map(String::from),
        title: title.map(String::from),
        company: row.text(COMPANY).map(String::from),
        apply_url: row.text(APPLY_URL).map(String::from),
        fit_score,
        why_match: why_match(title.unwrap_or("Untitled role"), &components, &missing),
        components,
        missing_requirements: missing,
        seniority: row.text(LABEL_SENIORITY).map(String::from),
        application_friction: row.float(APPLICATION_FRICTION),
        visa_sponsorship: row.ds.bool_at(VISA_SPONSORSHIP_SIGNAL, row.row),
    }
}

/// Score, sort, and annotate every row.
///
/// Signals are extracted first, so the input only needs the canonical columns.
/// Sorting is stable: equal scores keep their input order.
#[instrument(skip_all, fields(rows = dataset.row_count()))]
pub fn rank_jobs(dataset: JobDataset, options: &RankOptions) -> Result<Ranking> {
    options.weights.validate()?;
    let dataset = extract_job_signals(dataset)?;
    let band = options.profile.seniority_band(options.as_of);

    let mut records: Vec<RankedJob> = (0..dataset.row_count())
        .map(|row| score_row(&Row { ds: &dataset, row }, options, &band))
        .collect();
    records.sort_by(|a, b| b.fit_score.total_cmp(&a.fit_score));
    if let Some(limit) = options.top_n {
        records.truncate(limit);
    }
    for (position, record) in records.iter_mut().enumerate() {
        record.rank = position + 1;
    }

    let order: Vec<usize> = records.iter().map(|r| r.source_row).collect();
    let mut ranked = dataset
        .take(&order)?
        .with_column(FIT_SCORE, Column::Float(records.iter().map(|r| Some(r.fit_score)).collect()))?
        .with_column(FIT_RANK, Column::Int(records.iter().map(|r| Some(r.rank as i64)).collect()))?;
    for component in Component::ALL {
        let values = records
            .iter()
            .map(|r| r.components.get(&component).copied().flatten())
            .collect();
        ranked = ranked.with_column(component.column_name(), Column::Float(values))?;
    }
    let ranked = ranked
        .with_column(
            MISSING_REQUIREMENTS,
            Column::List(records.iter().map(|r| Some(r.missing_requirements.clone())).collect()),
        )?
        .with_column(
            WHY_MATCH,
            Column::Text(records.iter().map(|r| Some(r.why_match.clone())).collect()),
        )?;

    debug!(ranked = records.len(), "ranking complete");
    Ok(Ranking {
        dataset: ranked,
        records,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(values: &[Option<&str>]) -> Column {
        Column::Text(values.iter().map(|v| v.map(String::from)).collect())
    }

    fn list(values: &[&[&str]]) -> Column {
        Column::List(
            values
                .iter()
                .map(|v| Some(v.iter().map(|s| s.to_string()).collect()))
                .collect(),
        )
    }

    fn as_of() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 1).expect("date")
    }

    fn scenario() -> (JobDataset, RankOptions) {
        let ds = JobDataset::new(vec![
            ("id".into(), text(&[Some("py"), Some("java")])),
            ("skills".into(), list(&[&["python", "sql"], &["java"]])),
            ("label_seniority".into(), text(&[Some("entry"), Some("senior")])),
            ("salary_min".into(), Column::Float(vec![Some(60_000.0), Some(200_000.0)])),
        ])
        .expect("dataset");

        let profile = CandidateProfile::new_grad().with_overrides(&CandidateOverrides {
            required_skills: Some(vec!["python".into()]),
            target_seniority: Some(vec!["entry".into()]),
            min_salary: Some(50_000.0),
            ..CandidateOverrides::default()
        });
        let options = RankOptions {
            as_of: as_of(),
            ..RankOptions::new(profile)
        };
        (ds, options)
    }

    #[test]
    fn matching_row_ranks_first() {
        let (ds, options) = scenario();
        let ranking = rank_jobs(ds, &options).expect("rank");

        assert_eq!(ranking.records[0].id.as_deref(), Some("py"));
        assert_eq!(ranking.records[1].id.as_deref(), Some("java"));
        assert!(ranking.records[0].fit_score > ranking.records[1].fit_score);
        assert_eq!(ranking.records[1].components[&Component::SkillOverlap], Some(0.0));
        assert_eq!(ranking.records[0].rank, 1);

        assert_eq!(ranking.dataset.text_at(ID, 0), Some("py"));
        assert_eq!(ranking.dataset.int_at(FIT_RANK, 1), Some(2));
        assert_eq!(ranking.dataset.float_at("fit_skill_overlap", 1), Some(0.0));
        assert!(
            ranking.records[1]
                .missing_requirements
                .contains(&"missing_skills:python".to_string())
        );
    }

    #[test]
    fn ranking_is_deterministic() {
        let (ds, options) = scenario();
        let first = rank_jobs(ds.clone(), &options).expect("rank");
        let second = rank_jobs(ds, &options).expect("rank");
        assert_eq!(first, second);
    }

    #[test]
    fn ties_keep_input_order_and_top_n_truncates() {
        let ds = JobDataset::new(vec![
            ("id".into(), text(&[Some("a"), Some("b"), Some("c")])),
            ("title".into(), text(&[Some("Barista"), Some("Barista"), Some("Barista")])),
        ])
        .expect("dataset");
        let options = RankOptions {
            top_n: Some(2),
            as_of: as_of(),
            ..RankOptions::new(CandidateProfile::new_grad())
        };
        let ranking = rank_jobs(ds, &options).expect("rank");
        let ids: Vec<_> = ranking.records.iter().map(|r| r.id.as_deref()).collect();
        assert_eq!(ids, vec![Some("a"), Some("b")]);
        assert_eq!(ranking.dataset.row_count(), 2);
    }

    #[test]
    fn missing_salary_policy_is_explicit() {
        let ds = JobDataset::new(vec![
            ("id".into(), text(&[Some("1")])),
            ("skills".into(), list(&[&["python", "sql"]])),
        ])
        .expect("dataset");
        let profile = CandidateProfile {
            min_salary: Some(80_000.0),
            ..CandidateProfile::new_grad()
        };
        let excluded = RankOptions {
            as_of: as_of(),
            ..RankOptions::new(profile.clone())
        };
        let penalized = RankOptions {
            missing: MissingPolicies::default().with(Component::SalaryFit, MissingPolicy::Zero),
            ..excluded.clone()
        };

        let a = rank_jobs(ds.clone(), &excluded).expect("rank");
        let b = rank_jobs(ds, &penalized).expect("rank");
        assert_eq!(a.records[0].components[&Component::SalaryFit], None);
        assert!(b.records[0].fit_score < a.records[0].fit_score);
    }

    #[test]
    fn component_scorers() {
        let ds = JobDataset::new(vec![
            ("id".into(), text(&[Some("1"), Some("2")])),
            ("title".into(), text(&[Some("Data Analyst"), Some("Analytics Engineer")])),
            ("remote".into(), Column::Bool(vec![Some(true), Some(false)])),
            ("city".into(), text(&[None, Some("Toronto")])),
            ("country".into(), text(&[None, Some("CA")])),
            ("posted_at".into(), text(&[Some("2026-02-25"), Some("2026-01-08T10:00:00Z")])),
            ("application_friction".into(), Column::Float(vec![Some(0.2), Some(0.675)])),
        ])
        .expect("dataset");
        let profile = CandidateProfile::new_grad();
        let first = Row { ds: &ds, row: 0 };
        let second = Row { ds: &ds, row: 1 };

        assert_eq!(role_alignment(&first, &profile), Some(1.0));
        let partial = role_alignment(&second, &profile).expect("alignment");
        assert!((0.35..=0.75).contains(&partial));

        assert_eq!(location_fit(&first, &profile), Some(1.0));
        assert_eq!(location_fit(&second, &profile), Some(0.85));

        assert_eq!(active(&first, as_of()), Some(1.0));
        let aged = active(&second, as_of()).expect("active");
        assert!((aged - (1.0 - 38.0 / 46.0)).abs() < 1e-9);

        assert_eq!(friction(&first, &profile), Some(1.0));
        assert!((friction(&second, &profile).expect("friction") - 0.5).abs() < 1e-9);
    }

    #[test]
    fn graduation_band_from_year() {
        let profile = CandidateProfile {
            target_seniority: Vec::new(),
            graduation_year: Some(2025),
            ..CandidateProfile::new_grad()
        };
        assert_eq!(profile.seniority_band(as_of()), BTreeSet::from([0, 1]));
        let ds = JobDataset::new(vec![
            ("id".into(), text(&[Some("1"), Some("2")])),
            ("label_seniority".into(), text(&[Some("senior"), Some("staff")])),
        ])
        .expect("dataset");
        let band = profile.seniority_band(as_of());
        let senior = graduation_alignment(&Row { ds: &ds, row: 0 }, &band).expect("score");
        assert!((senior - 0.3).abs() < 1e-9);
        assert_eq!(graduation_alignment(&Row { ds: &ds, row: 1 }, &band), Some(0.0));

        let far_past = CandidateProfile {
            graduation_year: Some(i32::MIN),
            ..profile.clone()
        };
        assert_eq!(far_past.seniority_band(as_of()), BTreeSet::from([2, 3]));
        let far_future = CandidateProfile {
            graduation_year: Some(i32::MAX),
            ..profile
        };
        assert_eq!(far_future.seniority_band(as_of()), BTreeSet::from([0, 1]));
    }

    #[test]
    fn weights_and_presets_validate() {
        let bad = BTreeMap::from([("charisma".to_string(), 0.5)]);
        assert!(MatchWeights::default().with_overrides(&bad).is_err());
        let negative = BTreeMap::from([("visa".to_string(), -1.0)]);
        assert!(MatchWeights::default().with_overrides(&negative).is_err());
        assert!(CandidateProfile::preset("new-grad").is_ok());
        assert!(CandidateProfile::preset("astronaut").is_err());
        let total: f64 = Component::ALL.iter().map(|c| MatchWeights::default().get(*c)).sum();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn why_match_names_strengths_and_watchouts() {
        let components = BTreeMap::from([
            (Component::SkillOverlap, Some(0.9)),
            (Component::Visa, None),
            (Component::Quality, Some(0.3)),
        ]);
        let text = why_match("Analyst", &components, &["salary_below_minimum".to_string()]);
        assert_eq!(text, "Analyst: strong on skill_overlap. Watchouts: salary_below_minimum.");
        let weak = BTreeMap::from([(Component::Quality, Some(0.3))]);
        assert_eq!(why_match("Analyst", &weak, &[]), "Analyst: moderate fit with mixed signals.");
    }
}
