//! Cleaning for raw job postings: HTML to text, field normalization, and dedup.
//!
//! All functions are dataset-in, dataset-out and degrade to a pass-through
//! when the columns they read are absent.

mod cleanup;
pub mod dedup;
pub mod html;
pub mod normalize;

pub use dedup::{content_hash, dedup};
pub use html::html_to_text;
pub use normalize::{
    LocationParts, canonical_employment_type, detect_currency, normalize_employment_types,
    normalize_locations, normalize_salaries, parse_location, parse_salary_range,
};
