//! Data-quality profiling and a severity gate for CI.
//!
//! [`profile_dataset`] measures coverage and consistency of a job table,
//! [`build_findings`] turns the measurements into P0/P1/P2 findings, and
//! [`evaluate_gate`] decides pass/fail under configurable [`GateRules`].

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use honestroles_shared::schema::{
    APPLY_URL, COMPANY, DESCRIPTION_TEXT, LOCATION, POSTED_AT, SALARY_MAX, SALARY_MIN, TITLE,
};
use honestroles_shared::{HonestRolesError, JobDataset, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Fields whose coverage feeds the quality score, with their weights.
pub const QUALITY_FIELD_WEIGHTS: &[(&str, f64)] = &[
    (TITLE, 1.0),
    (COMPANY, 1.0),
    (DESCRIPTION_TEXT, 1.0),
    (APPLY_URL, 1.0),
    (LOCATION, 0.5),
    (POSTED_AT, 0.5),
    (SALARY_MIN, 0.25),
    (SALARY_MAX, 0.25),
];

// ---------------------------------------------------------------------------
// Profile
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FieldCoverage {
    pub non_null_count: usize,
    pub non_null_pct: f64,
}

/// Coverage and consistency measurements for one dataset.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetProfile {
    pub rows: usize,
    pub field_coverage: BTreeMap<String, FieldCoverage>,
    /// `100 - weighted null percent` over [`QUALITY_FIELD_WEIGHTS`].
    pub quality_score_percent: f64,
    /// Rows with `salary_min > salary_max`.
    pub salary_inversions: usize,
    pub title_equals_company_pct: f64,
    pub posted_at_pct: f64,
    /// Share of rows whose location is null or "unknown". `None` without a location column.
    pub unknown_location_pct: Option<f64>,
}

fn pct(count: usize, rows: usize) -> f64 {
    if rows == 0 {
        0.0
    } else {
        round4(count as f64 / rows as f64 * 100.0)
    }
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

fn non_null_count(dataset: &JobDataset, field: &str) -> usize {
    dataset
        .column(field)
        .map_or(0, |col| (0..dataset.row_count()).filter(|&row| col.is_present(row)).count())
}

/// Measure a dataset. An empty table scores 100 with zero coverage elsewhere.
pub fn profile_dataset(dataset: &JobDataset) -> DatasetProfile {
    let rows = dataset.row_count();

    let field_coverage: BTreeMap<String, FieldCoverage> = QUALITY_FIELD_WEIGHTS
        .iter()
        .map(|&(field, _)| {
            let count = non_null_count(dataset, field);
            (
                field.to_string(),
                FieldCoverage {
                    non_null_count: count,
                    non_null_pct: pct(count, rows),
                },
            )
        })
        .collect();

    let quality_score_percent = if rows == 0 {
        100.0
    } else {
        let total: f64 = QUALITY_FIELD_WEIGHTS.iter().map(|(_, w)| w).sum();
        let weighted_null: f64 = QUALITY_FIELD_WEIGHTS
            .iter()
            .map(|&(field, w)| w * (100.0 - field_coverage[field].non_null_pct))
            .sum::<f64>()
            / total;
        round4((100.0 - weighted_null).clamp(0.0, 100.0))
    };

    let salary_inversions = (0..rows)
        .filter(|&row| {
            matches!(
                (dataset.float_at(SALARY_MIN, row), dataset.float_at(SALARY_MAX, row)),
                (Some(min), Some(max)) if min > max
            )
        })
        .count();

    let title_equals_company = (0..rows)
        .filter(|&row| {
            matches!(
                (dataset.text_at(TITLE, row), dataset.text_at(COMPANY, row)),
                (Some(t), Some(c)) if t.trim() == c.trim()
            )
        })
        .count();

    let unknown_location_pct = dataset.has_column(LOCATION).then(|| {
        let unknown = (0..rows)
            .filter(|&row| {
                dataset.text_at(LOCATION, row).is_none_or(|loc| {
                    let loc = loc.trim();
                    loc.is_empty() || loc.eq_ignore_ascii_case("unknown")
                })
            })
            .count();
        pct(unknown, rows)
    });

    let profile = DatasetProfile {
        rows,
        posted_at_pct: field_coverage[POSTED_AT].non_null_pct,
        field_coverage,
        quality_score_percent,
        salary_inversions,
        title_equals_company_pct: pct(title_equals_company, rows),
        unknown_location_pct,
    };
    debug!(rows, score = profile.quality_score_percent, "dataset profiled");
    profile
}

// ---------------------------------------------------------------------------
// Findings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    P0,
    P1,
    P2,
}

impl Severity {
    pub const ALL: [Severity; 3] = [Severity::P0, Severity::P1, Severity::P2];
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::P0 => "P0",
            Self::P1 => "P1",
            Self::P2 => "P2",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Finding {
    pub severity: Severity,
    pub title: String,
    pub detail: String,
    pub recommendation: String,
}

fn finding(severity: Severity, title: &str, detail: String, recommendation: &str) -> Finding {
    Finding {
        severity,
        title: title.to_string(),
        detail,
        recommendation: recommendation.to_string(),
    }
}

/// Findings for a profile, sorted by severity then title.
pub fn build_findings(profile: &DatasetProfile) -> Vec<Finding> {
    let mut findings = Vec::new();

    let score = profile.quality_score_percent;
    if score < 90.0 {
        findings.push(finding(
            Severity::P1,
            "Low weighted quality score",
            format!("score_percent={score} is below 90."),
            "Prioritize high-weight fields with high null rates.",
        ));
    } else if score < 95.0 {
        findings.push(finding(
            Severity::P2,
            "Quality score below target",
            format!("score_percent={score} is below 95."),
            "Review top weighted-null columns and adjust extraction.",
        ));
    }

    if profile.salary_inversions > 0 {
        findings.push(finding(
            Severity::P0,
            "Invalid salary ranges detected",
            format!("{} rows have salary_min > salary_max.", profile.salary_inversions),
            "Normalize salary parsing and enforce min<=max before scoring.",
        ));
    }

    if profile.title_equals_company_pct >= 5.0 {
        findings.push(finding(
            Severity::P1,
            "Title appears to contain company names",
            format!("title_equals_company={}%.", profile.title_equals_company_pct),
            "Add source-specific title cleanup or fallback title extraction.",
        ));
    }

    if profile.posted_at_pct < 80.0 {
        findings.push(finding(
            Severity::P1,
            "Low posted_at coverage",
            format!("posted_at non-null coverage is {}%.", profile.posted_at_pct),
            "Improve date extraction or map the source's date field.",
        ));
    }

    if let Some(unknown) = profile.unknown_location_pct.filter(|&p| p >= 30.0) {
        findings.push(finding(
            Severity::P1,
            "Large unknown location share",
            format!("unknown location rows account for {unknown}%."),
            "Expand location extraction coverage.",
        ));
    }

    findings.sort_by(|a, b| a.severity.cmp(&b.severity).then_with(|| a.title.cmp(&b.title)));
    findings
}

// ---------------------------------------------------------------------------
// Gate
// ---------------------------------------------------------------------------

/// `[gate]` table of a rules file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GateRules {
    #[serde(default = "default_fail_on")]
    pub fail_on: Vec<Severity>,
    #[serde(default = "default_warn_on")]
    pub warn_on: Vec<Severity>,
    #[serde(default)]
    pub max_p0: usize,
    #[serde(default = "default_max")]
    pub max_p1: usize,
    #[serde(default = "default_max")]
    pub max_p2: usize,
}

fn default_fail_on() -> Vec<Severity> {
    vec![Severity::P0]
}

fn default_warn_on() -> Vec<Severity> {
    vec![Severity::P1]
}

fn default_max() -> usize {
    999_999
}

impl Default for GateRules {
    fn default() -> Self {
        Self {
            fail_on: default_fail_on(),
            warn_on: default_warn_on(),
            max_p0: 0,
            max_p1: default_max(),
            max_p2: default_max(),
        }
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RulesFile {
    #[serde(default)]
    gate: GateRules,
}

impl GateRules {
    /// Parse a rules document. A missing `[gate]` table yields the defaults.
    pub fn from_toml(content: &str) -> Result<Self> {
        let file: RulesFile = toml::from_str(content)
            .map_err(|e| HonestRolesError::config(format!("invalid gate rules: {e}")))?;
        let mut rules = file.gate;
        rules.fail_on.dedup();
        rules.warn_on.dedup();
        Ok(rules)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| HonestRolesError::io(path, e))?;
        Self::from_toml(&content).map_err(|e| match e {
            HonestRolesError::ConfigValidation { message } => {
                HonestRolesError::config(format!("{}: {message}", path.display()))
            }
            other => other,
        })
    }

    pub fn threshold(&self, severity: Severity) -> usize {
        match severity {
            Severity::P0 => self.max_p0,
            Severity::P1 => self.max_p1,
            Severity::P2 => self.max_p2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GateStatus {
    Pass,
    Fail,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GateCheck {
    pub severity: Severity,
    pub count: usize,
    pub threshold: usize,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GateReport {
    pub status: GateStatus,
    pub severity_counts: BTreeMap<Severity, usize>,
    pub failures: Vec<GateCheck>,
    pub warnings: Vec<GateCheck>,
    pub findings: Vec<Finding>,
    pub evaluated_rules: GateRules,
}

/// Fail when a `fail_on` severity exceeds its threshold; warn on any `warn_on` finding.
pub fn evaluate_gate(findings: &[Finding], rules: &GateRules) -> GateReport {
    let mut severity_counts: BTreeMap<Severity, usize> =
        Severity::ALL.iter().map(|&s| (s, 0)).collect();
    for f in findings {
        *severity_counts.entry(f.severity).or_default() += 1;
    }

    let mut failures = Vec::new();
    for &severity in &rules.fail_on {
        let count = severity_counts[&severity];
        let threshold = rules.threshold(severity);
        if count > threshold {
            failures.push(GateCheck {
                severity,
                count,
                threshold,
                detail: format!("{severity} findings count {count} exceeds threshold {threshold}."),
            });
        }
    }

    let mut warnings = Vec::new();
    for &severity in rules.warn_on.iter().filter(|s| !rules.fail_on.contains(s)) {
        let count = severity_counts[&severity];
        if count > 0 {
            warnings.push(GateCheck {
                severity,
                count,
                threshold: rules.threshold(severity),
                detail: format!("{severity} findings count is {count}."),
            });
        }
    }

    GateReport {
        status: if failures.is_empty() {
            GateStatus::Pass
        } else {
            GateStatus::Fail
        },
        severity_counts,
        failures,
        warnings,
        findings: findings.to_vec(),
        evaluated_rules: rules.clone(),
    }
}

#[cfg(test)]
mod tests {
    use honestroles_shared::Record;
    use serde_json::{Value, json};

    use super::*;

    fn dataset(values: Vec<Value>) -> JobDataset {
        let records: Vec<Record> = values
            .into_iter()
            .map(|v| v.as_object().expect("object").clone())
            .collect();
        JobDataset::from_records(&records).expect("dataset")
    }

    fn complete_row(id: &str) -> Value {
        json!({
            "id": id, "title": "Data Analyst", "company": "Acme",
            "description_text": "SQL dashboards.", "apply_url": "https://acme.com/jobs/1",
            "location": "Austin, TX", "posted_at": "2025-01-10",
            "salary_min": 80000.0, "salary_max": 100000.0,
        })
    }

    #[test]
    fn complete_dataset_has_no_findings() {
        let ds = dataset(vec![complete_row("1"), complete_row("2")]);
        let profile = profile_dataset(&ds);
        assert_eq!(profile.quality_score_percent, 100.0);
        assert_eq!(profile.unknown_location_pct, Some(0.0));
        assert!(build_findings(&profile).is_empty());
    }

    #[test]
    fn inversions_and_gaps_produce_sorted_findings() {
        let mut bad = complete_row("2");
        bad["salary_min"] = json!(200000.0);
        bad["title"] = json!("Acme");
        bad["posted_at"] = Value::Null;
        bad["location"] = json!("Unknown");
        let ds = dataset(vec![complete_row("1"), bad]);

        let profile = profile_dataset(&ds);
        assert_eq!(profile.salary_inversions, 1);
        assert_eq!(profile.title_equals_company_pct, 50.0);
        assert_eq!(profile.posted_at_pct, 50.0);
        assert_eq!(profile.unknown_location_pct, Some(50.0));

        let findings = build_findings(&profile);
        let severities: Vec<Severity> = findings.iter().map(|f| f.severity).collect();
        assert_eq!(severities[0], Severity::P0);
        assert!(severities.windows(2).all(|w| w[0] <= w[1]));
        let p1_titles: Vec<&str> = findings
            .iter()
            .filter(|f| f.severity == Severity::P1)
            .map(|f| f.title.as_str())
            .collect();
        assert_eq!(
            p1_titles,
            vec![
                "Large unknown location share",
                "Low posted_at coverage",
                "Title appears to contain company names",
            ]
        );
    }

    #[test]
    fn sparse_dataset_scores_low() {
        let ds = dataset(vec![json!({"id": "1", "title": "Analyst"})]);
        let profile = profile_dataset(&ds);
        assert!(profile.quality_score_percent < 90.0);
        assert!(build_findings(&profile).iter().any(|f| f.title == "Low weighted quality score"));
    }

    #[test]
    fn gate_fails_on_p0_and_warns_on_p1() {
        let findings = vec![
            finding(Severity::P0, "a", String::new(), ""),
            finding(Severity::P1, "b", String::new(), ""),
        ];
        let report = evaluate_gate(&findings, &GateRules::default());
        assert_eq!(report.status, GateStatus::Fail);
        assert_eq!(report.severity_counts[&Severity::P0], 1);
        assert_eq!(report.severity_counts[&Severity::P2], 0);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.warnings[0].severity, Severity::P1);

        let lenient = GateRules {
            max_p0: 1,
            ..GateRules::default()
        };
        assert_eq!(evaluate_gate(&findings, &lenient).status, GateStatus::Pass);
    }

    #[test]
    fn severities_in_both_lists_only_fail() {
        let rules = GateRules::from_toml(
            "[gate]\nfail_on = [\"P1\"]\nwarn_on = [\"P1\", \"P2\"]\nmax_p1 = 0\n",
        )
        .expect("rules");
        let findings = vec![finding(Severity::P1, "b", String::new(), "")];
        let report = evaluate_gate(&findings, &rules);
        assert_eq!(report.status, GateStatus::Fail);
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn rules_parse_with_defaults_and_reject_unknown_severity() {
        assert_eq!(GateRules::from_toml("").expect("empty"), GateRules::default());
        assert!(GateRules::from_toml("[gate]\nfail_on = [\"P9\"]\n").is_err());
        assert!(GateRules::from_toml("[gate]\nmax_p0 = -1\n").is_err());
    }
}
