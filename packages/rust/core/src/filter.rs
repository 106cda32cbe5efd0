//! Boolean-mask predicates and the filter chain that combines them.
//!
//! Every predicate in a chain sees the same input dataset. Masks are combined
//! with AND or OR and applied once, so predicates compose without cascading
//! row removal.

use std::collections::HashSet;

use honestroles_shared::schema::{
    CITY, COUNTRY, DESCRIPTION_TEXT, LOCATION, REGION, REMOTE, REMOTE_TYPE, SALARY_CURRENCY,
    SALARY_MAX, SALARY_MIN, SKILLS, TITLE,
};
use honestroles_shared::{ChainMode, FilterConfig, HonestRolesError, JobDataset, Result};
use tracing::{debug, warn};

/// A row predicate producing one boolean per row.
pub trait Predicate: Send + Sync {
    fn name(&self) -> &str;
    fn mask(&self, dataset: &JobDataset) -> Result<Vec<bool>>;
}

impl<F> Predicate for F
where
    F: Fn(&JobDataset) -> Result<Vec<bool>> + Send + Sync,
{
    fn name(&self) -> &str {
        "closure"
    }

    fn mask(&self, dataset: &JobDataset) -> Result<Vec<bool>> {
        self(dataset)
    }
}

fn all_true(dataset: &JobDataset) -> Vec<bool> {
    vec![true; dataset.row_count()]
}

fn lowered_set(values: &[String]) -> HashSet<String> {
    values.iter().map(|v| v.trim().to_lowercase()).collect()
}

fn lowered_at(dataset: &JobDataset, column: &str, row: usize) -> String {
    dataset
        .text_at(column, row)
        .map(|s| s.trim().to_lowercase())
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Built-in predicates
// ---------------------------------------------------------------------------

/// Keep rows in the given cities, regions, or countries, optionally remote only.
///
/// City matching falls back to a substring search of `location` when no
/// normalized `city` column exists.
#[derive(Debug, Clone, Default)]
pub struct ByLocation {
    pub cities: Vec<String>,
    pub regions: Vec<String>,
    pub countries: Vec<String>,
    pub remote_only: bool,
}

impl Predicate for ByLocation {
    fn name(&self) -> &str {
        "by_location"
    }

    fn mask(&self, dataset: &JobDataset) -> Result<Vec<bool>> {
        let mut mask = all_true(dataset);
        let cities = lowered_set(&self.cities);
        let regions = lowered_set(&self.regions);
        let countries = lowered_set(&self.countries);

        if !cities.is_empty() {
            if dataset.has_column(CITY) {
                for (row, keep) in mask.iter_mut().enumerate() {
                    *keep &= cities.contains(&lowered_at(dataset, CITY, row));
                }
            } else if dataset.has_column(LOCATION) {
                for (row, keep) in mask.iter_mut().enumerate() {
                    let location = lowered_at(dataset, LOCATION, row);
                    *keep &= cities.iter().any(|c| location.contains(c.as_str()));
                }
            } else {
                warn!(predicate = self.name(), "no city or location column, city filter skipped");
            }
        }
        for (set, column) in [(&regions, REGION), (&countries, COUNTRY)] {
            if set.is_empty() {
                continue;
            }
            if !dataset.has_column(column) {
                warn!(predicate = self.name(), column, "column missing, filter skipped");
                continue;
            }
            for (row, keep) in mask.iter_mut().enumerate() {
                *keep &= set.contains(&lowered_at(dataset, column, row));
            }
        }
        if self.remote_only {
            mask = RemoteOnly
                .mask(dataset)?
                .into_iter()
                .zip(mask)
                .map(|(a, b)| a && b)
                .collect();
        }
        Ok(mask)
    }
}

/// Keep rows whose salary range overlaps `[min, max]`, in `currency` when given.
///
/// Rows without a disclosed bound are compared as 0.
#[derive(Debug, Clone, Default)]
pub struct BySalary {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub currency: Option<String>,
}

impl Predicate for BySalary {
    fn name(&self) -> &str {
        "by_salary"
    }

    fn mask(&self, dataset: &JobDataset) -> Result<Vec<bool>> {
        if !dataset.has_column(SALARY_MIN) || !dataset.has_column(SALARY_MAX) {
            warn!(predicate = self.name(), "salary columns missing, all rows kept");
            return Ok(all_true(dataset));
        }
        let currency = self.currency.as_deref().map(str::to_uppercase);
        let check_currency = currency.is_some() && dataset.has_column(SALARY_CURRENCY);

        Ok((0..dataset.row_count())
            .map(|row| {
                let mut keep = true;
                if check_currency {
                    let row_currency = dataset
                        .text_at(SALARY_CURRENCY, row)
                        .map(str::to_uppercase)
                        .unwrap_or_default();
                    keep &= currency.as_deref() == Some(row_currency.as_str());
                }
                if let Some(min) = self.min {
                    keep &= dataset.float_at(SALARY_MAX, row).unwrap_or(0.0) >= min;
                }
                if let Some(max) = self.max {
                    keep &= dataset.float_at(SALARY_MIN, row).unwrap_or(0.0) <= max;
                }
                keep
            })
            .collect())
    }
}

/// Keep rows listing every required skill and none of the excluded ones.
#[derive(Debug, Clone, Default)]
pub struct BySkills {
    pub required: Vec<String>,
    pub excluded: Vec<String>,
}

impl Predicate for BySkills {
    fn name(&self) -> &str {
        "by_skills"
    }

    fn mask(&self, dataset: &JobDataset) -> Result<Vec<bool>> {
        if !dataset.has_column(SKILLS) {
            warn!(predicate = self.name(), column = SKILLS, "column missing, all rows kept");
            return Ok(all_true(dataset));
        }
        let required = lowered_set(&self.required);
        let excluded = lowered_set(&self.excluded);

        Ok((0..dataset.row_count())
            .map(|row| {
                let skills: HashSet<String> = dataset
                    .list_at(SKILLS, row)
                    .unwrap_or_default()
                    .iter()
                    .map(|s| s.trim().to_lowercase())
                    .collect();
                required.is_subset(&skills) && excluded.is_disjoint(&skills)
            })
            .collect())
    }
}

/// Substring keyword search over text columns (title and description by default).
#[derive(Debug, Clone, Default)]
pub struct ByKeywords {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    pub columns: Vec<String>,
}

impl Predicate for ByKeywords {
    fn name(&self) -> &str {
        "by_keywords"
    }

    fn mask(&self, dataset: &JobDataset) -> Result<Vec<bool>> {
        let include: Vec<String> = self.include.iter().map(|t| t.to_lowercase()).collect();
        let exclude: Vec<String> = self.exclude.iter().map(|t| t.to_lowercase()).collect();
        if include.is_empty() && exclude.is_empty() {
            return Ok(all_true(dataset));
        }

        let columns: Vec<&str> = if self.columns.is_empty() {
            vec![TITLE, DESCRIPTION_TEXT]
        } else {
            self.columns.iter().map(String::as_str).collect()
        };
        let existing: Vec<&str> = columns.into_iter().filter(|c| dataset.has_column(c)).collect();
        if existing.is_empty() {
            warn!(predicate = self.name(), "no searchable text columns, all rows kept");
            return Ok(all_true(dataset));
        }

        Ok((0..dataset.row_count())
            .map(|row| {
                let text = existing
                    .iter()
                    .filter_map(|c| dataset.text_at(c, row))
                    .collect::<Vec<_>>()
                    .join(" ")
                    .to_lowercase();
                let included =
                    include.is_empty() || include.iter().any(|t| text.contains(t.as_str()));
                let clean = exclude.iter().all(|t| !text.contains(t.as_str()));
                included && clean
            })
            .collect())
    }
}

/// Keep rows where every listed field holds a value. Unknown fields are ignored.
#[derive(Debug, Clone, Default)]
pub struct ByCompleteness {
    pub required_fields: Vec<String>,
}

impl Predicate for ByCompleteness {
    fn name(&self) -> &str {
        "by_completeness"
    }

    fn mask(&self, dataset: &JobDataset) -> Result<Vec<bool>> {
        let columns: Vec<_> = self
            .required_fields
            .iter()
            .filter_map(|f| dataset.column(f))
            .collect();
        Ok((0..dataset.row_count())
            .map(|row| columns.iter().all(|c| c.is_present(row)))
            .collect())
    }
}

/// Keep rows flagged remote, either by `remote` or by `remote_type`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RemoteOnly;

impl Predicate for RemoteOnly {
    fn name(&self) -> &str {
        "remote_only"
    }

    fn mask(&self, dataset: &JobDataset) -> Result<Vec<bool>> {
        if !dataset.has_column(REMOTE) && !dataset.has_column(REMOTE_TYPE) {
            warn!(predicate = self.name(), "no remote columns, all rows kept");
            return Ok(all_true(dataset));
        }
        Ok((0..dataset.row_count())
            .map(|row| {
                dataset.bool_at(REMOTE, row).unwrap_or(false)
                    || lowered_at(dataset, REMOTE_TYPE, row) == "remote"
            })
            .collect())
    }
}

// ---------------------------------------------------------------------------
// FilterChain
// ---------------------------------------------------------------------------

/// An ordered list of predicates combined with AND or OR.
pub struct FilterChain {
    mode: ChainMode,
    predicates: Vec<Box<dyn Predicate>>,
}

impl FilterChain {
    pub fn new(mode: ChainMode) -> Self {
        Self {
            mode,
            predicates: Vec::new(),
        }
    }

    /// Append a predicate.
    pub fn add(mut self, predicate: impl Predicate + 'static) -> Self {
        self.predicates.push(Box::new(predicate));
        self
    }

    /// Chain built from the `[stages.filter]` options.
    pub fn from_config(config: &FilterConfig) -> Self {
        let mut chain = Self::new(config.mode);
        if config.remote_only {
            chain = chain.add(RemoteOnly);
        }
        if config.min_salary.is_some() || config.max_salary.is_some() {
            chain = chain.add(BySalary {
                min: config.min_salary,
                max: config.max_salary,
                currency: None,
            });
        }
        if !config.required_keywords.is_empty() || !config.excluded_keywords.is_empty() {
            chain = chain.add(ByKeywords {
                include: config.required_keywords.clone(),
                exclude: config.excluded_keywords.clone(),
                columns: Vec::new(),
            });
        }
        if !config.required_fields.is_empty() {
            chain = chain.add(ByCompleteness {
                required_fields: config.required_fields.clone(),
            });
        }
        chain
    }

    pub fn mode(&self) -> ChainMode {
        self.mode
    }

    pub fn len(&self) -> usize {
        self.predicates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    /// Evaluate every predicate on `dataset`, combine the masks, and keep matching rows.
    ///
    /// Row order and the column set are preserved. An empty chain returns the
    /// input unchanged.
    pub fn apply(&self, dataset: &JobDataset) -> Result<JobDataset> {
        if self.predicates.is_empty() {
            return Ok(dataset.clone());
        }

        let rows = dataset.row_count();
        let mut combined: Option<Vec<bool>> = None;
        for predicate in &self.predicates {
            let mask = predicate.mask(dataset)?;
            if mask.len() != rows {
                return Err(HonestRolesError::dataset(format!(
                    "predicate '{}' returned {} mask entries for {rows} rows",
                    predicate.name(),
                    mask.len()
                )));
            }
            combined = Some(match combined {
                None => mask,
                Some(acc) => acc
                    .into_iter()
                    .zip(mask)
                    .map(|(a, b)| match self.mode {
                        ChainMode::And => a && b,
                        ChainMode::Or => a || b,
                    })
                    .collect(),
            });
        }

        let mask = combined.unwrap_or_else(|| all_true(dataset));
        let result = dataset.filter_rows(&mask)?;
        debug!(
            predicates = self.predicates.len(),
            rows_in = rows,
            rows_out = result.row_count(),
            "filter chain applied"
        );
        Ok(result)
    }
}

impl std::fmt::Debug for FilterChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterChain")
            .field("mode", &self.mode)
            .field(
                "predicates",
                &self.predicates.iter().map(|p| p.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}
