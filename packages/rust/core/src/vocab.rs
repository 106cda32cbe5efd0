//! Skill and technology alias tables shared by labeling and signal extraction.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

/// Technologies: canonical name and the aliases found in postings.
const TECH_ALIASES: &[(&str, &[&str])] = &[
    ("python", &["python"]),
    ("sql", &["sql"]),
    ("pandas", &["pandas"]),
    ("numpy", &["numpy"]),
    ("scikit-learn", &["scikit-learn", "sklearn", "scikit learn"]),
    ("spark", &["spark", "apache spark", "pyspark"]),
    ("airflow", &["airflow", "apache airflow"]),
    ("dbt", &["dbt"]),
    ("tableau", &["tableau"]),
    ("power bi", &["power bi", "powerbi"]),
    ("pytorch", &["pytorch"]),
    ("tensorflow", &["tensorflow"]),
    ("snowflake", &["snowflake"]),
    ("bigquery", &["bigquery"]),
    ("aws", &["aws", "amazon web services"]),
    ("gcp", &["gcp", "google cloud", "google cloud platform"]),
    ("azure", &["azure", "microsoft azure"]),
    ("javascript", &["javascript"]),
    ("typescript", &["typescript"]),
    ("react", &["react", "reactjs"]),
    ("node", &["nodejs", "node.js"]),
    ("docker", &["docker"]),
    ("kubernetes", &["kubernetes", "k8s"]),
    ("postgres", &["postgres", "postgresql"]),
    ("mysql", &["mysql"]),
    ("java", &["java"]),
    ("c++", &["c++", "cpp"]),
    ("c#", &["c#", "csharp"]),
    ("go", &["golang"]),
    ("rust", &["rust"]),
    ("linux", &["linux"]),
    ("git", &["git"]),
    ("bash", &["bash"]),
    ("terraform", &["terraform"]),
    ("excel", &["excel", "microsoft excel"]),
];

/// Non-technical skills that count toward skill overlap but not the tech stack.
const GENERAL_ALIASES: &[(&str, &[&str])] = &[
    ("statistics", &["statistics"]),
    ("machine learning", &["machine learning"]),
    ("deep learning", &["deep learning"]),
    ("nlp", &["nlp", "natural language processing"]),
    ("communication", &["communication"]),
    ("leadership", &["leadership"]),
    ("project management", &["project management"]),
    ("stakeholder management", &["stakeholder management"]),
    ("agile", &["agile"]),
    ("scrum", &["scrum"]),
    ("analytics", &["analytics"]),
    ("product management", &["product management", "product owner"]),
    ("ux", &["user experience"]),
    ("recruiting", &["recruiting", "talent acquisition"]),
];

/// Case-insensitive whole-term pattern for `term`, treating spaces as `\s+`.
///
/// Terms may end in symbols (`c++`, `c#`), so boundaries are "not a letter or
/// digit" rather than `\b`.
pub(crate) fn term_pattern(term: &str) -> String {
    let escaped = regex::escape(term).replace(' ', r"\s+");
    format!(r"(?i)(?:^|[^a-z0-9]){escaped}(?:[^a-z0-9]|$)")
}

struct AliasMatcher {
    canonical: &'static str,
    pattern: Regex,
}

fn compile(table: &[(&'static str, &[&str])]) -> Vec<AliasMatcher> {
    table
        .iter()
        .flat_map(|&(canonical, aliases)| {
            aliases.iter().filter_map(move |alias| {
                Regex::new(&term_pattern(alias))
                    .ok()
                    .map(|pattern| AliasMatcher { canonical, pattern })
            })
        })
        .collect()
}

static TECH_MATCHERS: LazyLock<Vec<AliasMatcher>> = LazyLock::new(|| compile(TECH_ALIASES));
static GENERAL_MATCHERS: LazyLock<Vec<AliasMatcher>> = LazyLock::new(|| compile(GENERAL_ALIASES));

fn scan(text: &str, matchers: &[AliasMatcher], found: &mut BTreeSet<String>) {
    for matcher in matchers {
        if matcher.pattern.is_match(text) {
            found.insert(matcher.canonical.to_string());
        }
    }
}

/// Canonical technologies mentioned in `text`, sorted and unique.
pub fn extract_tech(text: &str) -> Vec<String> {
    let mut found = BTreeSet::new();
    scan(text, &TECH_MATCHERS, &mut found);
    found.into_iter().collect()
}

/// Canonical technologies and general skills mentioned in `text`.
pub fn extract_skills(text: &str) -> Vec<String> {
    let mut found = BTreeSet::new();
    scan(text, &TECH_MATCHERS, &mut found);
    scan(text, &GENERAL_MATCHERS, &mut found);
    found.into_iter().collect()
}

/// Canonical name for a single skill token, e.g. `"K8s"` to `"kubernetes"`.
pub fn canonical_skill(token: &str) -> Option<&'static str> {
    let token = token.trim().to_lowercase().replace('-', " ");
    TECH_ALIASES
        .iter()
        .chain(GENERAL_ALIASES)
        .find(|(canonical, aliases)| {
            canonical.replace('-', " ") == token
                || aliases.iter().any(|a| a.replace('-', " ") == token)
        })
        .map(|(canonical, _)| *canonical)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tech_aliases_resolve() {
        let found = extract_tech("We use sklearn, K8s and Golang on AWS. Python 3 too.");
        assert_eq!(found, vec!["aws", "go", "kubernetes", "python", "scikit-learn"]);
    }

    #[test]
    fn word_boundaries_hold() {
        assert!(extract_tech("javascript developer").contains(&"javascript".to_string()));
        assert!(!extract_tech("javascript developer").contains(&"java".to_string()));
        assert_eq!(extract_tech("strong C++ and C# skills"), vec!["c#", "c++"]);
        assert!(extract_tech("gitlab ci").is_empty());
    }

    #[test]
    fn general_skills_only_in_skill_extraction() {
        let text = "Machine   learning and statistics with Python";
        assert_eq!(extract_tech(text), vec!["python"]);
        assert_eq!(extract_skills(text), vec!["machine learning", "python", "statistics"]);
    }

    #[test]
    fn canonical_tokens() {
        assert_eq!(canonical_skill("K8s"), Some("kubernetes"));
        assert_eq!(canonical_skill("go"), Some("go"));
        assert_eq!(canonical_skill("Scikit-Learn"), Some("scikit-learn"));
        assert_eq!(canonical_skill("basket weaving"), None);
    }
}
