//! Heuristic labels: seniority, role category, and tech stack.
//!
//! Labels come from regex tables over the title and description. An optional
//! language model may override them per row; any failure there keeps the
//! heuristic label.

use std::sync::LazyLock;

use honestroles_shared::schema::{
    DESCRIPTION_TEXT, LABEL_ROLE_CATEGORY, LABEL_SENIORITY, LABEL_TECH_STACK, SKILLS, TITLE,
};
use honestroles_shared::{Column, JobDataset, Result};
use regex::Regex;
use serde_json::Value;
use tracing::{debug, warn};

use crate::llm::{self, LanguageModel};
use crate::vocab;

/// Characters of description considered for role and stack detection.
const DESCRIPTION_SCAN_CHARS: usize = 600;

// ---------------------------------------------------------------------------
// Seniority
// ---------------------------------------------------------------------------

/// Seniority labels in detection priority order.
pub const SENIORITY_LABELS: &[&str] = &[
    "intern",
    "junior",
    "mid",
    "senior",
    "staff",
    "principal",
    "lead",
    "director",
    "vp",
    "c_level",
];

static SENIORITY_PATTERNS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    [
        ("intern", r"(?i)\b(?:intern|internship|co-?op)\b"),
        (
            "junior",
            r"(?i)\b(?:junior|jr\.?|entry[- ]level|entry|new grad|new graduate|graduate|associate)\b",
        ),
        ("mid", r"(?i)\bmid(?:-level)?\b|\bintermediate\b"),
        ("senior", r"(?i)\b(?:senior|sr\.?)\b"),
        ("staff", r"(?i)\bstaff\b"),
        ("principal", r"(?i)\bprincipal\b"),
        ("lead", r"(?i)\b(?:lead|head of)\b"),
        ("director", r"(?i)\bdirector\b"),
        ("vp", r"(?i)\bvice president\b|\bvp\b"),
        ("c_level", r"(?i)\b(?:chief|ceo|cto|cfo|coo)\b"),
    ]
    .into_iter()
    .map(|(label, pattern)| (label, Regex::new(pattern).expect("valid regex")))
    .collect()
});

/// Seniority label for a job title; titles without a marker are `mid`.
pub fn seniority_from_title(title: &str) -> &'static str {
    SENIORITY_PATTERNS
        .iter()
        .find(|(_, re)| re.is_match(title))
        .map_or("mid", |(label, _)| label)
}

/// Position of a seniority label on the career ladder (intern = 0).
pub fn seniority_level(label: &str) -> Option<u8> {
    match label.trim().to_lowercase().as_str() {
        "intern" => Some(0),
        "junior" | "entry" | "new_grad" | "new grad" => Some(1),
        "mid" => Some(2),
        "senior" => Some(3),
        "staff" | "principal" | "lead" => Some(4),
        "director" | "vp" | "c_level" => Some(5),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Role category
// ---------------------------------------------------------------------------

/// Role categories in match priority order; `other` is the fallback.
pub const ROLE_CATEGORIES: &[&str] = &[
    "data_science",
    "ml",
    "data_engineering",
    "data_analytics",
    "devops",
    "security",
    "software_engineering",
    "product",
    "design",
    "marketing",
    "sales",
    "customer_success",
    "operations",
    "finance",
    "hr",
    "other",
];

const ROLE_KEYWORDS: &[(&str, &[&str])] = &[
    ("data_science", &["data scientist", "data science"]),
    (
        "ml",
        &[
            "machine learning",
            "ml engineer",
            "ai engineer",
            "deep learning",
            "mlops",
            "applied scientist",
        ],
    ),
    ("data_engineering", &["data engineer", "etl", "data platform", "data pipeline"]),
    (
        "data_analytics",
        &[
            "data analyst",
            "analytics",
            "business intelligence",
            "bi analyst",
            "business analyst",
        ],
    ),
    (
        "devops",
        &["devops", "site reliability", "sre", "platform engineer", "infrastructure engineer"],
    ),
    ("security", &["security", "cybersecurity", "infosec"]),
    (
        "software_engineering",
        &[
            "software engineer",
            "software developer",
            "developer",
            "backend",
            "frontend",
            "full stack",
            "fullstack",
            "programmer",
            "engineer",
        ],
    ),
    ("product", &["product manager", "product owner", "program manager"]),
    ("design", &["designer", "ux", "ui", "product design"]),
    ("marketing", &["marketing", "growth", "seo", "content strategist"]),
    ("sales", &["sales", "account executive", "business development"]),
    (
        "customer_success",
        &["customer success", "customer support", "technical support", "help desk"],
    ),
    ("operations", &["operations", "ops"]),
    ("finance", &["finance", "accounting", "fp&a", "controller", "accountant"]),
    ("hr", &["human resources", "recruiter", "talent", "people operations"]),
];

static ROLE_PATTERNS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    ROLE_KEYWORDS
        .iter()
        .map(|&(category, keywords)| {
            let alternation = keywords
                .iter()
                .map(|k| regex::escape(k).replace(' ', r"\s+"))
                .collect::<Vec<_>>()
                .join("|");
            let pattern = format!(r"(?i)(?:^|[^a-z0-9])(?:{alternation})(?:[^a-z0-9]|$)");
            (category, Regex::new(&pattern).expect("valid regex"))
        })
        .collect()
});

fn first_category(text: &str) -> Option<&'static str> {
    ROLE_PATTERNS
        .iter()
        .find(|(_, re)| re.is_match(text))
        .map(|(category, _)| *category)
}

/// Role category from the title, falling back to the start of the description.
pub fn role_category(title: &str, description: &str) -> &'static str {
    first_category(title)
        .or_else(|| first_category(prefix(description, DESCRIPTION_SCAN_CHARS)))
        .unwrap_or("other")
}

fn prefix(text: &str, chars: usize) -> &str {
    match text.char_indices().nth(chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

// ---------------------------------------------------------------------------
// Tech stack
// ---------------------------------------------------------------------------

/// Canonical technologies from listed skills, title, and description opening.
pub fn tech_stack(title: &str, description: &str, skills: &[String]) -> Vec<String> {
    let opening = prefix(description, DESCRIPTION_SCAN_CHARS);
    let mut stack = vocab::extract_tech(&format!("{title}\n{opening}"));
    stack.extend(
        skills
            .iter()
            .filter_map(|s| vocab::canonical_skill(s))
            .map(String::from),
    );
    stack.sort();
    stack.dedup();
    stack
}

// ---------------------------------------------------------------------------
// Dataset labeling
// ---------------------------------------------------------------------------

/// Add `label_seniority`, `label_role_category`, and `label_tech_stack`.
///
/// Rows without a title get null labels. Without a title column the dataset
/// passes through.
pub fn label_jobs(dataset: JobDataset) -> Result<JobDataset> {
    if !dataset.has_column(TITLE) {
        warn!(column = TITLE, "column missing, skipping heuristic labels");
        return Ok(dataset);
    }

    let rows = dataset.row_count();
    let mut seniority = Vec::with_capacity(rows);
    let mut roles = Vec::with_capacity(rows);
    let mut stacks = Vec::with_capacity(rows);

    for row in 0..rows {
        let title = dataset.text_at(TITLE, row).map(str::trim).unwrap_or_default();
        let description = dataset.text_at(DESCRIPTION_TEXT, row).unwrap_or_default();
        let skills = dataset.list_at(SKILLS, row).unwrap_or_default();

        if title.is_empty() {
            seniority.push(None);
            roles.push(None);
        } else {
            seniority.push(Some(seniority_from_title(title).to_string()));
            roles.push(Some(role_category(title, description).to_string()));
        }
        stacks.push(Some(tech_stack(title, description, skills)));
    }

    debug!(rows, "heuristic labels applied");
    dataset
        .with_column(LABEL_SENIORITY, Column::Text(seniority))?
        .with_column(LABEL_ROLE_CATEGORY, Column::Text(roles))?
        .with_column(LABEL_TECH_STACK, Column::List(stacks))
}

/// Labels returned by a language model for one posting.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LlmLabels {
    pub seniority: Option<String>,
    pub role_category: Option<String>,
    pub tech_stack: Option<Vec<String>>,
}

/// Ask `model` for labels. Unknown label values are discarded.
pub fn label_with_llm(
    title: &str,
    description: &str,
    model: &dyn LanguageModel,
) -> Option<LlmLabels> {
    let reply = match model.generate(&llm::label_prompt(title, description, ROLE_CATEGORIES)) {
        Ok(reply) => reply,
        Err(e) => {
            warn!(error = %e, "language model labeling failed, keeping heuristic labels");
            return None;
        }
    };
    let Some(payload) = llm::parse_json_object(&reply) else {
        warn!(reply = %reply, "unparseable labeling reply, keeping heuristic labels");
        return None;
    };

    let seniority = payload
        .get("seniority")
        .and_then(Value::as_str)
        .map(|s| s.trim().to_lowercase())
        .filter(|s| SENIORITY_LABELS.contains(&s.as_str()));
    let role_category = payload
        .get("role_category")
        .and_then(Value::as_str)
        .map(|s| s.trim().to_lowercase())
        .filter(|s| ROLE_CATEGORIES.contains(&s.as_str()));
    let tech_stack = payload.get("tech_stack").and_then(Value::as_array).map(|items| {
        let mut stack: Vec<String> = items
            .iter()
            .filter_map(Value::as_str)
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect();
        stack.sort();
        stack.dedup();
        stack
    });

    Some(LlmLabels {
        seniority,
        role_category,
        tech_stack,
    })
}

/// Override heuristic labels with model output where the model answers.
///
/// An unavailable model leaves the dataset unchanged.
pub fn apply_llm_labels(dataset: JobDataset, model: &dyn LanguageModel) -> Result<JobDataset> {
    if !model.is_available() {
        warn!("language model unavailable, keeping heuristic labels");
        return Ok(dataset);
    }

    let rows = dataset.row_count();
    let mut seniority: Vec<Option<String>> = column_or_nulls(&dataset, LABEL_SENIORITY);
    let mut roles: Vec<Option<String>> = column_or_nulls(&dataset, LABEL_ROLE_CATEGORY);
    let mut stacks: Vec<Option<Vec<String>>> = match dataset.list(LABEL_TECH_STACK) {
        Some(values) => values.to_vec(),
        None => vec![None; rows],
    };

    let mut answered = 0usize;
    for row in 0..rows {
        let title = dataset.text_at(TITLE, row).unwrap_or_default();
        let description = dataset.text_at(DESCRIPTION_TEXT, row).unwrap_or_default();
        if title.trim().is_empty() && description.trim().is_empty() {
            continue;
        }
        let Some(labels) = label_with_llm(title, description, model) else {
            continue;
        };
        answered += 1;
        if labels.seniority.is_some() {
            seniority[row] = labels.seniority;
        }
        if labels.role_category.is_some() {
            roles[row] = labels.role_category;
        }
        if labels.tech_stack.is_some() {
            stacks[row] = labels.tech_stack;
        }
    }

    debug!(rows, answered, "language model labels applied");
    dataset
        .with_column(LABEL_SENIORITY, Column::Text(seniority))?
        .with_column(LABEL_ROLE_CATEGORY, Column::Text(roles))?
        .with_column(LABEL_TECH_STACK, Column::List(stacks))
}

fn column_or_nulls(dataset: &JobDataset, name: &str) -> Vec<Option<String>> {
    match dataset.text(name) {
        Some(values) => values.to_vec(),
        None => vec![None; dataset.row_count()],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::StubModel;

    fn text(values: &[Option<&str>]) -> Column {
        Column::Text(values.iter().map(|v| v.map(String::from)).collect())
    }

    #[test]
    fn every_label_has_a_pattern() {
        let seniority: Vec<&str> = SENIORITY_PATTERNS.iter().map(|(label, _)| *label).collect();
        assert_eq!(seniority, SENIORITY_LABELS);
        let roles: Vec<&str> = ROLE_PATTERNS.iter().map(|(category, _)| *category).collect();
        let expected: Vec<&str> = ROLE_KEYWORDS.iter().map(|(category, _)| *category).collect();
        assert_eq!(roles, expected);
    }

    #[test]
    fn seniority_detection() {
        assert_eq!(seniority_from_title("Software Engineering Intern"), "intern");
        assert_eq!(seniority_from_title("Jr. Data Analyst"), "junior");
        assert_eq!(seniority_from_title("Entry Level Data Scientist"), "junior");
        assert_eq!(seniority_from_title("New Grad Software Engineer"), "junior");
        assert_eq!(seniority_from_title("Sr Backend Engineer"), "senior");
        assert_eq!(seniority_from_title("Staff ML Engineer"), "staff");
        assert_eq!(seniority_from_title("VP of Engineering"), "vp");
        assert_eq!(seniority_from_title("Data Engineer"), "mid");
        assert_eq!(seniority_from_title("Internal Tools Engineer"), "mid");
    }

    #[test]
    fn ladder_levels() {
        assert_eq!(seniority_level("intern"), Some(0));
        assert_eq!(seniority_level("entry"), Some(1));
        assert_eq!(seniority_level("Senior"), Some(3));
        assert_eq!(seniority_level("c_level"), Some(5));
        assert_eq!(seniority_level("wizard"), None);
    }

    #[test]
    fn role_categories_follow_priority() {
        assert_eq!(role_category("Data Scientist", ""), "data_science");
        assert_eq!(role_category("Machine Learning Engineer", ""), "ml");
        assert_eq!(role_category("Senior Data Engineer", ""), "data_engineering");
        assert_eq!(role_category("Site Reliability Engineer", ""), "devops");
        assert_eq!(role_category("Backend Engineer", ""), "software_engineering");
        assert_eq!(role_category("Associate", "Join our sales team"), "sales");
        assert_eq!(role_category("Barista", "Make coffee"), "other");
    }

    #[test]
    fn tech_stack_merges_text_and_skills() {
        let stack = tech_stack(
            "Python Developer",
            "Work with sklearn and k8s",
            &["PostgreSQL".to_string(), "juggling".to_string()],
        );
        assert_eq!(stack, vec!["kubernetes", "postgres", "python", "scikit-learn"]);
    }

    #[test]
    fn label_jobs_adds_columns() {
        let ds = JobDataset::new(vec![
            ("id".into(), text(&[Some("1"), Some("2")])),
            ("title".into(), text(&[Some("Senior Data Engineer"), None])),
            ("description_text".into(), text(&[Some("Airflow and Spark"), None])),
        ])
        .expect("dataset");

        let out = label_jobs(ds).expect("label");
        assert_eq!(out.text_at(LABEL_SENIORITY, 0), Some("senior"));
        assert_eq!(out.text_at(LABEL_ROLE_CATEGORY, 0), Some("data_engineering"));
        assert_eq!(
            out.list_at(LABEL_TECH_STACK, 0),
            Some(&["airflow".to_string(), "spark".to_string()][..])
        );
        assert_eq!(out.text_at(LABEL_SENIORITY, 1), None);
    }

    #[test]
    fn missing_title_column_passes_through() {
        let ds = JobDataset::new(vec![("id".into(), text(&[Some("1")]))]).expect("dataset");
        assert_eq!(label_jobs(ds.clone()).expect("label"), ds);
    }

    #[test]
    fn llm_overrides_valid_labels_only() {
        let ds = label_jobs(
            JobDataset::new(vec![
                ("id".into(), text(&[Some("1")])),
                ("title".into(), text(&[Some("Data Engineer")])),
            ])
            .expect("dataset"),
        )
        .expect("label");

        let model = StubModel::replying(
            r#"{"seniority": "Senior", "role_category": "astronaut", "tech_stack": ["Rust", "rust"]}"#,
        );
        let out = apply_llm_labels(ds, &model).expect("llm labels");
        assert_eq!(out.text_at(LABEL_SENIORITY, 0), Some("senior"));
        assert_eq!(out.text_at(LABEL_ROLE_CATEGORY, 0), Some("data_engineering"));
        assert_eq!(out.list_at(LABEL_TECH_STACK, 0), Some(&["rust".to_string()][..]));
    }

    #[test]
    fn unavailable_or_garbled_llm_keeps_heuristics() {
        let ds = label_jobs(
            JobDataset::new(vec![
                ("id".into(), text(&[Some("1")])),
                ("title".into(), text(&[Some("Junior Analyst")])),
            ])
            .expect("dataset"),
        )
        .expect("label");

        let unavailable = StubModel::unavailable();
        assert_eq!(apply_llm_labels(ds.clone(), &unavailable).expect("pass"), ds);
        assert_eq!(unavailable.calls(), 0);

        let garbled = StubModel::replying("I think it's senior?");
        assert_eq!(apply_llm_labels(ds.clone(), &garbled).expect("pass"), ds);
        assert_eq!(garbled.calls(), 1);
    }
}
