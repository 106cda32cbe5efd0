//! Location, salary, and employment-type normalization.
//!
//! Every function takes a dataset and returns a new one. A missing source
//! column is logged and the dataset passes through untouched.

use std::sync::LazyLock;

use honestroles_shared::schema::{
    CITY, COUNTRY, EMPLOYMENT_TYPE, LOCATION, REGION, REMOTE, REMOTE_TYPE, SALARY_CURRENCY,
    SALARY_MAX, SALARY_MIN, SALARY_TEXT,
};
use honestroles_shared::{Column, JobDataset, Result};
use regex::Regex;
use tracing::{debug, warn};

// ---------------------------------------------------------------------------
// Locations
// ---------------------------------------------------------------------------

/// Parsed parts of a free-form location string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocationParts {
    pub city: Option<String>,
    pub region: Option<String>,
    pub country: Option<String>,
    pub remote: bool,
}

/// Split `"City, Region, Country"` style strings.
///
/// Parenthesised qualifiers and a leading/trailing "Remote" are not part of the
/// place; they only set the remote flag.
pub fn parse_location(raw: &str) -> LocationParts {
    static REMOTE_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?i)\b(remote|anywhere|work from home|wfh)\b").expect("valid regex")
    });
    static PAREN_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\([^)]*\)").expect("valid regex"));

    let remote = REMOTE_RE.is_match(raw);
    let stripped = PAREN_RE.replace_all(raw, "");
    let parts: Vec<String> = stripped
        .split([',', '/', '|'])
        .map(str::trim)
        .filter(|p| !p.is_empty() && !REMOTE_RE.is_match(p))
        .map(String::from)
        .collect();

    let (city, region, country) = match parts.as_slice() {
        [] => (None, None, None),
        [only] => (None, None, Some(only.clone())),
        [city, country] => (Some(city.clone()), None, Some(country.clone())),
        [city, region, .., country] => (
            Some(city.clone()),
            Some(region.clone()),
            Some(country.clone()),
        ),
    };

    LocationParts {
        city,
        region,
        country,
        remote,
    }
}

/// Derive `city`, `region`, `country`, and `remote_type` from `location`.
pub fn normalize_locations(dataset: JobDataset) -> Result<JobDataset> {
    let Some(locations) = dataset.text(LOCATION) else {
        warn!(column = LOCATION, "column missing, skipping location normalization");
        return Ok(dataset);
    };

    let rows = dataset.row_count();
    let mut cities = Vec::with_capacity(rows);
    let mut regions = Vec::with_capacity(rows);
    let mut countries = Vec::with_capacity(rows);
    let mut remote_types = Vec::with_capacity(rows);

    for (row, raw) in locations.iter().enumerate() {
        let parts = raw.as_deref().map(parse_location).unwrap_or_default();
        let remote = parts.remote || dataset.bool_at(REMOTE, row).unwrap_or(false);
        cities.push(parts.city);
        regions.push(parts.region);
        countries.push(parts.country);
        remote_types.push(remote.then(|| "remote".to_string()));
    }

    debug!(rows, "locations normalized");
    dataset
        .with_column(CITY, Column::Text(cities))?
        .with_column(REGION, Column::Text(regions))?
        .with_column(COUNTRY, Column::Text(countries))?
        .with_column(REMOTE_TYPE, Column::Text(remote_types))
}

// ---------------------------------------------------------------------------
// Salaries
// ---------------------------------------------------------------------------

/// Parse a salary range like `$90,000 - $120,000` or `90k to 120k`.
///
/// A `k` suffix on the upper bound applies to both ends when the lower bound
/// has none (`90-120k`).
pub fn parse_salary_range(text: &str) -> Option<(f64, f64)> {
    static RANGE_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(
            r"(?i)[$€£]?\s*(\d{1,3}(?:[,.]?\d{3})*(?:\.\d+)?)\s*(k)?\s*(?:-|–|—|to)\s*[$€£]?\s*(\d{1,3}(?:[,.]?\d{3})*(?:\.\d+)?)\s*(k)?",
        )
        .expect("valid regex")
    });

    RANGE_RE.captures_iter(text).find_map(|caps| {
        let low = parse_amount(&caps[1])?;
        let high = parse_amount(&caps[3])?;
        let low_k = caps.get(2).is_some();
        let high_k = caps.get(4).is_some();

        let low = if low_k || (high_k && low < 1000.0) { low * 1000.0 } else { low };
        let high = if high_k { high * 1000.0 } else { high };

        // Bare small ranges ("2-4 years") are not salaries.
        (high >= 1000.0 && low <= high).then_some((low, high))
    })
}

/// Parse `90,000`, `55.000`, or `92.5` into a number.
fn parse_amount(raw: &str) -> Option<f64> {
    let digits = raw.replace(',', "");
    let digits = match digits.rsplit_once('.') {
        Some((_, tail)) if tail.len() == 3 => digits.replace('.', ""),
        _ => digits,
    };
    digits.parse().ok()
}

/// Currency code implied by symbols or codes in `text`.
pub fn detect_currency(text: &str) -> &'static str {
    let upper = text.to_uppercase();
    if text.contains('€') || upper.contains("EUR") {
        "EUR"
    } else if text.contains('£') || upper.contains("GBP") {
        "GBP"
    } else if upper.contains("CAD") {
        "CAD"
    } else {
        "USD"
    }
}

/// Fill null `salary_min`/`salary_max` from `salary_text`, and set `salary_currency`.
pub fn normalize_salaries(dataset: JobDataset) -> Result<JobDataset> {
    let Some(texts) = dataset.text(SALARY_TEXT) else {
        debug!(column = SALARY_TEXT, "column missing, skipping salary parsing");
        return Ok(dataset);
    };

    let rows = dataset.row_count();
    let mut mins: Vec<Option<f64>> = (0..rows).map(|r| dataset.float_at(SALARY_MIN, r)).collect();
    let mut maxs: Vec<Option<f64>> = (0..rows).map(|r| dataset.float_at(SALARY_MAX, r)).collect();
    let mut currencies: Vec<Option<String>> = match dataset.text(SALARY_CURRENCY) {
        Some(existing) => existing.to_vec(),
        None => vec![None; rows],
    };

    let mut parsed = 0usize;
    for (row, text) in texts.iter().enumerate() {
        let Some(text) = text.as_deref() else {
            continue;
        };
        if let Some((low, high)) = parse_salary_range(text) {
            if mins[row].is_none() {
                mins[row] = Some(low);
            }
            if maxs[row].is_none() {
                maxs[row] = Some(high);
            }
            parsed += 1;
        }
        if currencies[row].is_none() {
            currencies[row] = Some(detect_currency(text).to_string());
        }
    }

    for (row, currency) in currencies.iter_mut().enumerate() {
        if currency.is_none() && (mins[row].is_some() || maxs[row].is_some()) {
            *currency = Some("USD".to_string());
        }
    }

    debug!(rows, parsed, "salaries normalized");
    dataset
        .with_column(SALARY_MIN, Column::Float(mins))?
        .with_column(SALARY_MAX, Column::Float(maxs))?
        .with_column(SALARY_CURRENCY, Column::Text(currencies))
}

// ---------------------------------------------------------------------------
// Employment types
// ---------------------------------------------------------------------------

/// Canonical employment type for a raw value.
pub fn canonical_employment_type(raw: &str) -> Option<String> {
    static NON_WORD_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"[^a-z0-9]+").expect("valid regex"));

    let lowered = raw.trim().to_lowercase();
    if lowered.is_empty() {
        return None;
    }
    let snake = NON_WORD_RE.replace_all(&lowered, "_").trim_matches('_').to_string();
    let canonical = match snake.as_str() {
        "full_time" | "fulltime" | "permanent" | "regular" => "full_time",
        "part_time" | "parttime" => "part_time",
        "contract" | "contractor" | "freelance" | "temporary" | "temp" => "contract",
        "intern" | "internship" | "co_op" | "coop" => "intern",
        _ => return Some(snake),
    };
    Some(canonical.to_string())
}

/// Rewrite `employment_type` to canonical snake_case values.
pub fn normalize_employment_types(dataset: JobDataset) -> Result<JobDataset> {
    let Some(values) = dataset.text(EMPLOYMENT_TYPE) else {
        debug!(column = EMPLOYMENT_TYPE, "column missing, skipping employment type normalization");
        return Ok(dataset);
    };
    let normalized = values
        .iter()
        .map(|v| v.as_deref().and_then(canonical_employment_type))
        .collect();
    dataset.with_column(EMPLOYMENT_TYPE, Column::Text(normalized))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(values: &[Option<&str>]) -> Column {
        Column::Text(values.iter().map(|v| v.map(String::from)).collect())
    }

    #[test]
    fn location_parts() {
        assert_eq!(
            parse_location("Austin, TX, United States"),
            LocationParts {
                city: Some("Austin".into()),
                region: Some("TX".into()),
                country: Some("United States".into()),
                remote: false,
            }
        );
        assert_eq!(
            parse_location("Berlin, Germany (Hybrid)"),
            LocationParts {
                city: Some("Berlin".into()),
                region: None,
                country: Some("Germany".into()),
                remote: false,
            }
        );
        let remote = parse_location("Remote - Canada");
        assert!(remote.remote);
        assert_eq!(parse_location("Remote").country, None);
    }

    #[test]
    fn normalize_locations_adds_columns() {
        let ds = JobDataset::new(vec![
            ("id".into(), text(&[Some("1"), Some("2"), Some("3")])),
            ("location".into(), text(&[Some("Toronto, Canada"), Some("Remote"), None])),
            ("remote".into(), Column::Bool(vec![Some(false), None, Some(true)])),
        ])
        .expect("dataset");

        let out = normalize_locations(ds).expect("normalize");
        assert_eq!(out.text_at(CITY, 0), Some("Toronto"));
        assert_eq!(out.text_at(COUNTRY, 0), Some("Canada"));
        assert_eq!(out.text_at(REMOTE_TYPE, 0), None);
        assert_eq!(out.text_at(REMOTE_TYPE, 1), Some("remote"));
        assert_eq!(out.text_at(REMOTE_TYPE, 2), Some("remote"));
    }

    #[test]
    fn missing_location_column_passes_through() {
        let ds = JobDataset::new(vec![("id".into(), text(&[Some("1")]))]).expect("dataset");
        let out = normalize_locations(ds.clone()).expect("normalize");
        assert_eq!(out, ds);
    }

    #[test]
    fn salary_ranges() {
        assert_eq!(parse_salary_range("$90,000 - $120,000"), Some((90_000.0, 120_000.0)));
        assert_eq!(parse_salary_range("90k to 120k"), Some((90_000.0, 120_000.0)));
        assert_eq!(parse_salary_range("90-120k per year"), Some((90_000.0, 120_000.0)));
        assert_eq!(parse_salary_range("€55.000 – €70.000"), Some((55_000.0, 70_000.0)));
        assert_eq!(parse_salary_range("2-4 years of experience"), None);
        assert_eq!(parse_salary_range("competitive"), None);
    }

    #[test]
    fn normalize_salaries_fills_only_nulls() {
        let ds = JobDataset::new(vec![
            ("id".into(), text(&[Some("1"), Some("2"), Some("3")])),
            (
                "salary_text".into(),
                text(&[Some("$90,000 - $120,000"), Some("£40k-£50k"), None]),
            ),
            ("salary_min".into(), Column::Float(vec![Some(95_000.0), None, None])),
        ])
        .expect("dataset");

        let out = normalize_salaries(ds).expect("normalize");
        assert_eq!(out.float_at(SALARY_MIN, 0), Some(95_000.0));
        assert_eq!(out.float_at(SALARY_MAX, 0), Some(120_000.0));
        assert_eq!(out.float_at(SALARY_MIN, 1), Some(40_000.0));
        assert_eq!(out.text_at(SALARY_CURRENCY, 0), Some("USD"));
        assert_eq!(out.text_at(SALARY_CURRENCY, 1), Some("GBP"));
        assert_eq!(out.text_at(SALARY_CURRENCY, 2), None);
    }

    #[test]
    fn employment_types() {
        assert_eq!(canonical_employment_type("Full Time").as_deref(), Some("full_time"));
        assert_eq!(canonical_employment_type("full-time").as_deref(), Some("full_time"));
        assert_eq!(canonical_employment_type("Internship").as_deref(), Some("intern"));
        assert_eq!(
            canonical_employment_type("Seasonal Worker").as_deref(),
            Some("seasonal_worker")
        );
        assert_eq!(canonical_employment_type("  "), None);
    }
}
