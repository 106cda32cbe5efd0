//! Listing ratings: completeness, description quality, composite, and friction.

use std::sync::LazyLock;

use honestroles_shared::schema::{
    APPLICATION_FRICTION, APPLY_URL, COMPANY, DESCRIPTION_TEXT, RATE_COMPLETENESS, RATE_COMPOSITE,
    RATE_QUALITY, TITLE,
};
use honestroles_shared::{Column, JobDataset, MissingPolicy, RateConfig, Result};
use regex::Regex;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use crate::llm::{self, LanguageModel};

/// Fields whose presence counts toward completeness.
pub const COMPLETENESS_FIELDS: &[&str] = &[TITLE, COMPANY, DESCRIPTION_TEXT, APPLY_URL];

/// Phrases that signal extra application work.
pub const FRICTION_TERMS: &[&str] = &[
    "cover letter required",
    "take-home",
    "take home",
    "portfolio required",
    "assessment",
    "case study",
    "references required",
];

// ---------------------------------------------------------------------------
// Weighting
// ---------------------------------------------------------------------------

/// One input to [`weighted_average`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeightedComponent {
    /// `None` when the row has no value for this component.
    pub value: Option<f64>,
    pub weight: f64,
    /// How a missing value is treated.
    pub missing: MissingPolicy,
}

impl WeightedComponent {
    pub fn new(value: Option<f64>, weight: f64) -> Self {
        Self {
            value,
            weight,
            missing: MissingPolicy::Exclude,
        }
    }

    pub fn with_missing(mut self, missing: MissingPolicy) -> Self {
        self.missing = missing;
        self
    }
}

/// Weighted mean over the components that count for this row.
///
/// Under [`MissingPolicy::Exclude`] a missing component is dropped from both
/// numerator and denominator. `Zero` and `Penalty` keep its full weight with a
/// substitute value. Returns `None` when no weight remains.
pub fn weighted_average(components: &[WeightedComponent]) -> Option<f64> {
    let mut total = 0.0;
    let mut weight_sum = 0.0;
    for component in components {
        if !component.weight.is_finite() || component.weight <= 0.0 {
            continue;
        }
        let value = match (component.value.filter(|v| v.is_finite()), component.missing) {
            (Some(value), _) => value,
            (None, MissingPolicy::Exclude) => continue,
            (None, MissingPolicy::Zero) => 0.0,
            (None, MissingPolicy::Penalty(value)) => value,
        };
        total += value.clamp(0.0, 1.0) * component.weight;
        weight_sum += component.weight;
    }
    (weight_sum > 0.0).then(|| total / weight_sum)
}

// ---------------------------------------------------------------------------
// Per-row scores
// ---------------------------------------------------------------------------

fn is_present(dataset: &JobDataset, field: &str, row: usize) -> bool {
    match dataset.column(field) {
        Some(Column::Text(values)) => values
            .get(row)
            .and_then(Option::as_deref)
            .is_some_and(|s| !s.trim().is_empty()),
        Some(Column::List(values)) => values
            .get(row)
            .and_then(Option::as_ref)
            .is_some_and(|l| !l.is_empty()),
        Some(column) => column.is_present(row),
        None => false,
    }
}

/// Fraction of `fields` present in `row`, over the fields the dataset has.
///
/// `None` when the dataset has none of them.
pub fn completeness(dataset: &JobDataset, row: usize, fields: &[&str]) -> Option<f64> {
    let existing: Vec<&str> = fields
        .iter()
        .copied()
        .filter(|f| dataset.has_column(f))
        .collect();
    if existing.is_empty() {
        return None;
    }
    let present = existing
        .iter()
        .filter(|f| is_present(dataset, f, row))
        .count();
    Some(present as f64 / existing.len() as f64)
}

/// Length and structure score for a description; `None` for empty text.
pub fn quality_heuristic(text: &str) -> Option<f64> {
    if text.trim().is_empty() {
        return None;
    }
    let length_score = (text.chars().count() as f64 / 2000.0).min(1.0);
    let bullet_score = if text.contains("- ") || text.contains("\n•") {
        0.2
    } else {
        0.0
    };
    Some((length_score * 0.8 + bullet_score).min(1.0))
}

/// Model-rated quality, or `None` when the reply has no usable score.
pub fn quality_with_llm(text: &str, model: &dyn LanguageModel) -> Option<f64> {
    let reply = match model.generate(&llm::quality_prompt(text)) {
        Ok(reply) => reply,
        Err(e) => {
            warn!(error = %e, "language model rating failed, using heuristic");
            return None;
        }
    };
    let score = llm::parse_json_object(&reply).and_then(|payload| match payload.get("score") {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    });
    match score.filter(|s: &f64| s.is_finite()) {
        Some(score) => Some(score.clamp(0.0, 1.0)),
        None => {
            warn!(reply = %reply, "unparseable rating reply, using heuristic");
            None
        }
    }
}

/// Completeness and quality combined with the configured weights.
pub fn composite_rating(
    completeness: Option<f64>,
    quality: Option<f64>,
    config: &RateConfig,
) -> Option<f64> {
    weighted_average(&[
        WeightedComponent::new(completeness, config.completeness_weight),
        WeightedComponent::new(quality, config.quality_weight),
    ])
}

static FRICTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    let alternation = FRICTION_TERMS
        .iter()
        .map(|t| regex::escape(t))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!("(?i){alternation}")).expect("valid regex")
});

/// How burdensome applying is likely to be, in [0, 1]; higher is worse.
pub fn application_friction(text: &str, apply_url: Option<&str>, completeness: f64) -> f64 {
    let mut burden: f64 = 0.2;
    if FRICTION_RE.is_match(text) {
        burden += 0.3;
    }
    if let Some(host) = apply_url
        .and_then(|u| Url::parse(u.trim()).ok())
        .and_then(|u| u.host_str().map(str::to_lowercase))
    {
        if host.contains("myworkdayjobs") || host.contains("workday") {
            burden += 0.1;
        } else if host.contains("greenhouse.io") || host.contains("lever.co") {
            burden -= 0.05;
        }
    }
    let missing_info = 1.0 - completeness.clamp(0.0, 1.0);
    (0.7 * burden.clamp(0.0, 1.0) + 0.3 * missing_info).clamp(0.0, 1.0)
}

// ---------------------------------------------------------------------------
// Dataset rating
// ---------------------------------------------------------------------------

/// Add `rate_completeness`, `rate_quality`, `rate_composite`, and `application_friction`.
///
/// `model` is consulted only when `config.use_llm` is set and the model
/// answers its availability probe.
pub fn rate_jobs(
    dataset: JobDataset,
    config: &RateConfig,
    model: Option<&dyn LanguageModel>,
) -> Result<JobDataset> {
    let rows = dataset.row_count();
    let model = match model {
        Some(model) if config.use_llm => {
            if model.is_available() {
                Some(model)
            } else {
                warn!("language model unavailable, rating with heuristics only");
                None
            }
        }
        _ => None,
    };

    let mut completeness_scores = Vec::with_capacity(rows);
    let mut quality_scores = Vec::with_capacity(rows);
    let mut composites = Vec::with_capacity(rows);
    let mut frictions = Vec::with_capacity(rows);

    for row in 0..rows {
        let text = dataset.text_at(DESCRIPTION_TEXT, row).unwrap_or_default();
        let completeness = completeness(&dataset, row, COMPLETENESS_FIELDS);
        let heuristic = quality_heuristic(text);
        let quality = match model {
            Some(model) if heuristic.is_some() => quality_with_llm(text, model).or(heuristic),
            _ => heuristic,
        };

        completeness_scores.push(completeness);
        quality_scores.push(quality);
        composites.push(composite_rating(completeness, quality, config));
        frictions.push(Some(application_friction(
            text,
            dataset.text_at(APPLY_URL, row),
            completeness.unwrap_or(0.0),
        )));
    }

    debug!(rows, llm = model.is_some(), "ratings computed");
    dataset
        .with_column(RATE_COMPLETENESS, Column::Float(completeness_scores))?
        .with_column(RATE_QUALITY, Column::Float(quality_scores))?
        .with_column(RATE_COMPOSITE, Column::Float(composites))?
        .with_column(APPLICATION_FRICTION, Column::Float(frictions))
}

/// Re-bound rate columns to [0, 1] after plugins ran; non-finite values become 0.
pub fn clamp_rate_columns(dataset: JobDataset) -> Result<JobDataset> {
    let mut dataset = dataset;
    for name in [RATE_COMPLETENESS, RATE_QUALITY, RATE_COMPOSITE, APPLICATION_FRICTION] {
        let Some(values) = dataset.float(name) else {
            continue;
        };
        let clamped: Vec<Option<f64>> = values
            .iter()
            .map(|v| {
                v.map(|x| if x.is_finite() { x.clamp(0.0, 1.0) } else { 0.0 })
            })
            .collect();
        dataset = dataset.with_column(name, Column::Float(clamped))?;
    }
    Ok(dataset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::StubModel;

    fn text(values: &[Option<&str>]) -> Column {
        Column::Text(values.iter().map(|v| v.map(String::from)).collect())
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn composite_excludes_missing_components() {
        let config = RateConfig::default();
        let both = composite_rating(Some(0.8), Some(0.4), &config).expect("composite");
        assert!(approx(both, 0.6));
        let only = composite_rating(Some(0.8), None, &config).expect("composite");
        assert!(approx(only, 0.8));
        assert_eq!(composite_rating(None, None, &config), None);
    }

    #[test]
    fn missing_policies_change_the_denominator() {
        let present = WeightedComponent::new(Some(0.8), 0.5);
        let missing = WeightedComponent::new(None, 0.5);

        let zero = weighted_average(&[present, missing.with_missing(MissingPolicy::Zero)]);
        assert!(approx(zero.expect("zero"), 0.4));

        let penalty =
            weighted_average(&[present, missing.with_missing(MissingPolicy::Penalty(0.2))]);
        assert!(approx(penalty.expect("penalty"), 0.5));

        assert_eq!(weighted_average(&[WeightedComponent::new(Some(1.0), 0.0)]), None);
    }

    #[test]
    fn completeness_counts_existing_fields_only() {
        let ds = JobDataset::new(vec![
            ("title".into(), text(&[Some("Analyst"), Some("Engineer")])),
            ("company".into(), text(&[Some("  "), Some("Acme")])),
        ])
        .expect("dataset");
        assert_eq!(completeness(&ds, 0, COMPLETENESS_FIELDS), Some(0.5));
        assert_eq!(completeness(&ds, 1, COMPLETENESS_FIELDS), Some(1.0));
        assert_eq!(completeness(&ds, 0, &["apply_url"]), None);
    }

    #[test]
    fn quality_rewards_length_and_bullets() {
        assert_eq!(quality_heuristic("   "), None);
        let short = quality_heuristic("Short text").expect("score");
        assert!(short < 0.01);
        let bulleted = quality_heuristic("Duties:\n- build\n- ship").expect("score");
        assert!(bulleted > 0.2 && bulleted < 0.21);
        assert_eq!(quality_heuristic(&"x".repeat(5000)), Some(0.8));
    }

    #[test]
    fn friction_reflects_process_and_host() {
        let easy =
            application_friction("Apply online", Some("https://boards.greenhouse.io/acme/1"), 1.0);
        assert!(approx(easy, 0.7 * 0.15));

        let hard = application_friction(
            "A take-home assignment is part of the process",
            Some("https://acme.wd5.myworkdayjobs.com/jobs/1"),
            0.5,
        );
        assert!(approx(hard, 0.7 * 0.6 + 0.3 * 0.5));

        let unparseable = application_friction("", Some("not a url"), 1.0);
        assert!(approx(unparseable, 0.14));
    }

    #[test]
    fn rate_jobs_adds_all_columns() {
        let ds = JobDataset::new(vec![
            ("id".into(), text(&[Some("1"), Some("2")])),
            ("title".into(), text(&[Some("Analyst"), Some("Engineer")])),
            ("description_text".into(), text(&[Some("- one\n- two"), None])),
        ])
        .expect("dataset");

        let out = rate_jobs(ds, &RateConfig::default(), None).expect("rate");
        assert_eq!(out.float_at(RATE_COMPLETENESS, 0), Some(1.0));
        assert_eq!(out.float_at(RATE_COMPLETENESS, 1), Some(0.5));
        assert!(out.float_at(RATE_QUALITY, 0).is_some());
        assert_eq!(out.float_at(RATE_QUALITY, 1), None);
        assert_eq!(out.float_at(RATE_COMPOSITE, 1), Some(0.5));
        assert!(out.float_at(APPLICATION_FRICTION, 1).is_some());
    }

    #[test]
    fn llm_quality_used_when_enabled_and_available() {
        let ds = JobDataset::new(vec![
            ("id".into(), text(&[Some("1")])),
            ("description_text".into(), text(&[Some("Build dashboards")])),
        ])
        .expect("dataset");
        let config = RateConfig {
            use_llm: true,
            ..RateConfig::default()
        };

        let model = StubModel::replying(r#"{"score": 1.7, "reason": "great"}"#);
        let out = rate_jobs(ds.clone(), &config, Some(&model)).expect("rate");
        assert_eq!(out.float_at(RATE_QUALITY, 0), Some(1.0));

        let down = StubModel::unavailable();
        let out = rate_jobs(ds.clone(), &config, Some(&down)).expect("rate");
        assert_eq!(out.float_at(RATE_QUALITY, 0), quality_heuristic("Build dashboards"));

        let disabled = StubModel::replying(r#"{"score": 0.9}"#);
        rate_jobs(ds, &RateConfig::default(), Some(&disabled)).expect("rate");
        assert_eq!(disabled.calls(), 0);
    }

    #[test]
    fn clamp_fixes_out_of_range_plugin_output() {
        let ds = JobDataset::new(vec![
            ("id".into(), text(&[Some("1"), Some("2"), Some("3")])),
            (
                RATE_COMPOSITE.into(),
                Column::Float(vec![Some(1.5), Some(f64::NAN), None]),
            ),
        ])
        .expect("dataset");
        let out = clamp_rate_columns(ds).expect("clamp");
        assert_eq!(out.float(RATE_COMPOSITE), Some(&[Some(1.0), Some(0.0), None][..]));
    }
}
