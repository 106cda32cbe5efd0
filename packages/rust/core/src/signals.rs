//! Matching signals extracted from posting text: experience, entry level,
//! visa sponsorship, role clarity, and required skills.
//!
//! Values already present in the dataset win over extracted ones.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use honestroles_shared::schema::{
    DESCRIPTION_TEXT, ENTRY_LEVEL_LIKELY, EXPERIENCE_YEARS_MAX, EXPERIENCE_YEARS_MIN,
    REQUIRED_SKILLS_EXTRACTED, ROLE_CLARITY_SCORE, SIGNAL_CONFIDENCE, SKILLS, TITLE,
    VISA_SPONSORSHIP_SIGNAL,
};
use honestroles_shared::{Column, JobDataset, Result};
use regex::Regex;
use tracing::debug;

use crate::vocab;

/// Characters of description parsed for signals.
const SIGNAL_TEXT_MAX_CHARS: usize = 800;

/// Experience figures above this are treated as noise ("401k", "100 years").
const MAX_PLAUSIBLE_YEARS: i64 = 20;

const ENTRY_LEVEL_POSITIVE: &[&str] = &[
    "entry level",
    "entry-level",
    "new grad",
    "new graduate",
    "recent graduate",
    "early career",
    "graduate program",
    "intern",
    "internship",
    "junior",
];
const ENTRY_LEVEL_NEGATIVE: &[&str] =
    &["senior", "staff", "principal", "lead", "director", "vp", "head of"];

const VISA_POSITIVE: &[&str] = &[
    "visa sponsorship available",
    "we sponsor",
    "sponsor visa",
    "h-1b sponsorship",
    "h1b sponsorship",
    "opt accepted",
    "cpt accepted",
];
const VISA_NEGATIVE: &[&str] = &[
    "no sponsorship",
    "unable to sponsor",
    "will not sponsor",
    "cannot sponsor",
    "must be authorized to work",
    "without sponsorship",
];

const CLARITY_TERMS: &[&str] = &[
    "responsibilities",
    "requirements",
    "qualifications",
    "about the role",
    "what you'll do",
];

fn any_term(terms: &[&str]) -> Regex {
    let alternation = terms
        .iter()
        .map(|t| regex::escape(t).replace(' ', r"\s+"))
        .collect::<Vec<_>>()
        .join("|");
    let pattern = format!(r"(?i)(?:^|[^a-z0-9])(?:{alternation})(?:[^a-z0-9]|$)");
    Regex::new(&pattern).expect("valid regex")
}

static ENTRY_POSITIVE_RE: LazyLock<Regex> = LazyLock::new(|| any_term(ENTRY_LEVEL_POSITIVE));
static ENTRY_NEGATIVE_RE: LazyLock<Regex> = LazyLock::new(|| any_term(ENTRY_LEVEL_NEGATIVE));
static VISA_POSITIVE_RE: LazyLock<Regex> = LazyLock::new(|| any_term(VISA_POSITIVE));
static VISA_NEGATIVE_RE: LazyLock<Regex> = LazyLock::new(|| any_term(VISA_NEGATIVE));

// ---------------------------------------------------------------------------
// Experience
// ---------------------------------------------------------------------------

/// Explicit years-of-experience bounds mentioned in `text`.
pub fn extract_years(text: &str) -> (Option<i64>, Option<i64>) {
    static RANGE_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?i)\b(\d{1,2})\s*(?:-|to)\s*(\d{1,2})\+?\s*(?:years?|yrs?)\b")
            .expect("valid regex")
    });
    static MIN_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?i)\b(?:at\s+least\s+|min(?:imum)?\s+)?(\d{1,2})\+?\s*(?:years?|yrs?)\b")
            .expect("valid regex")
    });

    let mut min: Option<i64> = None;
    let mut max: Option<i64> = None;
    let mut widen = |low: i64, high: i64| {
        min = Some(min.map_or(low, |m| m.min(low)));
        max = Some(max.map_or(high, |m| m.max(high)));
    };

    for caps in RANGE_RE.captures_iter(text) {
        let (Some(a), Some(b)) = (caps[1].parse::<i64>().ok(), caps[2].parse::<i64>().ok()) else {
            continue;
        };
        let (low, high) = (a.min(b), a.max(b));
        if high <= MAX_PLAUSIBLE_YEARS {
            widen(low, high);
        }
    }
    for caps in MIN_RE.captures_iter(text) {
        if let Some(years) = caps[1].parse::<i64>().ok().filter(|y| *y <= MAX_PLAUSIBLE_YEARS) {
            widen(years, years);
        }
    }
    (min, max)
}

/// Typical experience band implied by seniority words in `text`.
pub fn years_from_seniority(text: &str) -> Option<(i64, i64)> {
    static RULES: LazyLock<Vec<(Regex, (i64, i64))>> = LazyLock::new(|| {
        [
            (
                r"(?i)\b(?:intern|entry[- ]level|new grad|new graduate|recent graduate|junior|jr)\b",
                (0, 2),
            ),
            (r"(?i)\bmid(?:-level)?\b", (2, 5)),
            (r"(?i)\b(?:senior|sr)\b", (4, 8)),
            (r"(?i)\b(?:staff|principal)\b", (7, 12)),
            (r"(?i)\b(?:lead|manager|director|head|vp|vice president|chief)\b", (6, 12)),
        ]
        .into_iter()
        .map(|(pattern, band)| (Regex::new(pattern).expect("valid regex"), band))
        .collect()
    });

    RULES
        .iter()
        .find(|(re, _)| re.is_match(text))
        .map(|(_, band)| *band)
}

// ---------------------------------------------------------------------------
// Classification signals
// ---------------------------------------------------------------------------

/// Whether the posting reads as entry level; `None` when nothing indicates either way.
pub fn entry_level_signal(text: &str, years_min: Option<i64>) -> Option<bool> {
    if ENTRY_POSITIVE_RE.is_match(text) {
        return Some(true);
    }
    if ENTRY_NEGATIVE_RE.is_match(text) {
        return Some(false);
    }
    years_min.map(|y| y <= 2)
}

/// Sponsorship stance; negative phrasing wins over positive.
pub fn visa_signal(text: &str) -> Option<bool> {
    if VISA_NEGATIVE_RE.is_match(text) {
        Some(false)
    } else if VISA_POSITIVE_RE.is_match(text) {
        Some(true)
    } else {
        None
    }
}

/// How clearly the posting describes the role, in [0, 1].
pub fn role_clarity(text: &str) -> f64 {
    if text.trim().is_empty() {
        return 0.0;
    }
    let length_score = (text.chars().count() as f64 / 1800.0).min(1.0);
    let lowered = text.to_lowercase();
    let structure = if CLARITY_TERMS.iter().any(|t| lowered.contains(t)) {
        0.15
    } else {
        0.0
    };
    (0.75 * length_score + structure).clamp(0.0, 1.0)
}

/// Confidence in the extracted signals, from 0.35 up to 0.95.
pub fn signal_confidence(
    years_min: Option<i64>,
    entry_level: Option<bool>,
    visa: Option<bool>,
    skills: &[String],
) -> f64 {
    let mut confidence = 0.35;
    if years_min.is_some() {
        confidence += 0.2;
    }
    if entry_level.is_some() {
        confidence += 0.2;
    }
    if visa.is_some() {
        confidence += 0.15;
    }
    if !skills.is_empty() {
        confidence += 0.2;
    }
    f64::min(confidence, 0.95)
}

fn signal_text(dataset: &JobDataset, row: usize) -> String {
    let title = dataset.text_at(TITLE, row).unwrap_or_default();
    let description = dataset.text_at(DESCRIPTION_TEXT, row).unwrap_or_default();
    let description = match description.char_indices().nth(SIGNAL_TEXT_MAX_CHARS) {
        Some((idx, _)) => &description[..idx],
        None => description,
    };
    format!("{title}\n{description}").trim().to_string()
}

fn required_skills(dataset: &JobDataset, row: usize, text: &str) -> Vec<String> {
    let mut skills: BTreeSet<String> = dataset
        .list_at(SKILLS, row)
        .unwrap_or_default()
        .iter()
        .filter_map(|s| vocab::canonical_skill(s))
        .map(String::from)
        .collect();
    skills.extend(vocab::extract_skills(text));
    skills.into_iter().collect()
}

// ---------------------------------------------------------------------------
// Dataset extraction
// ---------------------------------------------------------------------------

/// Add the matching signal columns used by ranking.
pub fn extract_job_signals(dataset: JobDataset) -> Result<JobDataset> {
    let rows = dataset.row_count();
    let mut years_min = Vec::with_capacity(rows);
    let mut years_max = Vec::with_capacity(rows);
    let mut entry = Vec::with_capacity(rows);
    let mut visa = Vec::with_capacity(rows);
    let mut clarity = Vec::with_capacity(rows);
    let mut confidence = Vec::with_capacity(rows);
    let mut skills = Vec::with_capacity(rows);

    for row in 0..rows {
        let text = signal_text(&dataset, row);

        let (found_min, found_max) = extract_years(&text);
        let inferred = years_from_seniority(&text);
        let mut min = dataset
            .int_at(EXPERIENCE_YEARS_MIN, row)
            .or(found_min)
            .or(inferred.map(|(low, _)| low));
        let mut max = dataset
            .int_at(EXPERIENCE_YEARS_MAX, row)
            .or(found_max)
            .or(inferred.map(|(_, high)| high));
        min = min.or(max);
        max = max.or(min);

        let entry_level = dataset
            .bool_at(ENTRY_LEVEL_LIKELY, row)
            .or_else(|| entry_level_signal(&text, min));
        let visa_stance = dataset
            .bool_at(VISA_SPONSORSHIP_SIGNAL, row)
            .or_else(|| visa_signal(&text));
        let row_skills = required_skills(&dataset, row, &text);

        confidence.push(Some(signal_confidence(min, entry_level, visa_stance, &row_skills)));
        clarity.push(Some(role_clarity(&text)));
        years_min.push(min);
        years_max.push(max);
        entry.push(entry_level);
        visa.push(visa_stance);
        skills.push(Some(row_skills));
    }

    debug!(rows, "job signals extracted");
    dataset
        .with_column(EXPERIENCE_YEARS_MIN, Column::Int(years_min))?
        .with_column(EXPERIENCE_YEARS_MAX, Column::Int(years_max))?
        .with_column(ENTRY_LEVEL_LIKELY, Column::Bool(entry))?
        .with_column(VISA_SPONSORSHIP_SIGNAL, Column::Bool(visa))?
        .with_column(ROLE_CLARITY_SCORE, Column::Float(clarity))?
        .with_column(SIGNAL_CONFIDENCE, Column::Float(confidence))?
        .with_column(REQUIRED_SKILLS_EXTRACTED, Column::List(skills))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(values: &[Option<&str>]) -> Column {
        Column::Text(values.iter().map(|v| v.map(String::from)).collect())
    }

    #[test]
    fn years_from_ranges_and_minimums() {
        assert_eq!(extract_years("Requires 2-4 years of experience"), (Some(2), Some(4)));
        assert_eq!(extract_years("at least 3 yrs with SQL"), (Some(3), Some(3)));
        assert_eq!(extract_years("5+ years"), (Some(5), Some(5)));
        assert_eq!(extract_years("our 100 years of history"), (None, None));
        assert_eq!(extract_years("no numbers here"), (None, None));
    }

    #[test]
    fn seniority_words_imply_bands() {
        assert_eq!(years_from_seniority("Junior Data Analyst"), Some((0, 2)));
        assert_eq!(years_from_seniority("Senior Engineer"), Some((4, 8)));
        assert_eq!(years_from_seniority("Engineering Manager"), Some((6, 12)));
        assert_eq!(years_from_seniority("Data Analyst"), None);
    }

    #[test]
    fn entry_level_and_visa() {
        assert_eq!(entry_level_signal("New Grad Engineer", Some(5)), Some(true));
        assert_eq!(entry_level_signal("Senior Engineer", None), Some(false));
        assert_eq!(entry_level_signal("Engineer", Some(1)), Some(true));
        assert_eq!(entry_level_signal("Engineer", None), None);
        assert_eq!(entry_level_signal("Leadership Coach", None), None);

        assert_eq!(visa_signal("Visa sponsorship available."), Some(true));
        assert_eq!(
            visa_signal("We sponsor, but candidates must be authorized to work"),
            Some(false)
        );
        assert_eq!(visa_signal("Great team"), None);
    }

    #[test]
    fn confidence_accumulates_and_caps() {
        assert_eq!(signal_confidence(None, None, None, &[]), 0.35);
        let all = signal_confidence(Some(1), Some(true), Some(false), &["python".to_string()]);
        assert_eq!(all, 0.95);
    }

    #[test]
    fn clarity_rewards_structure() {
        assert_eq!(role_clarity("  "), 0.0);
        assert!(role_clarity("Responsibilities: build models") > 0.15);
        assert!(role_clarity("build models") < 0.01);
    }

    #[test]
    fn extraction_keeps_source_values() {
        let ds = JobDataset::new(vec![
            ("id".into(), text(&[Some("1"), Some("2")])),
            ("title".into(), text(&[Some("Junior Data Analyst"), Some("Engineer")])),
            (
                "description_text".into(),
                text(&[Some("SQL and Python. 1-2 years."), Some("We sponsor visas")]),
            ),
            ("skills".into(), Column::List(vec![Some(vec!["Tableau".into()]), None])),
            ("experience_years_min".into(), Column::Int(vec![None, Some(7)])),
        ])
        .expect("dataset");

        let out = extract_job_signals(ds).expect("signals");
        assert_eq!(out.int_at(EXPERIENCE_YEARS_MIN, 0), Some(1));
        assert_eq!(out.int_at(EXPERIENCE_YEARS_MAX, 0), Some(2));
        assert_eq!(out.bool_at(ENTRY_LEVEL_LIKELY, 0), Some(true));
        assert_eq!(
            out.list_at(REQUIRED_SKILLS_EXTRACTED, 0),
            Some(&["python".to_string(), "sql".to_string(), "tableau".to_string()][..])
        );

        assert_eq!(out.int_at(EXPERIENCE_YEARS_MIN, 1), Some(7));
        assert_eq!(out.int_at(EXPERIENCE_YEARS_MAX, 1), Some(7));
        assert_eq!(out.bool_at(ENTRY_LEVEL_LIKELY, 1), Some(false));
        assert_eq!(out.bool_at(VISA_SPONSORSHIP_SIGNAL, 1), Some(true));
    }
}
