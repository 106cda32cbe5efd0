//! Application plan: a recommended action and concrete next steps per ranked job.

use std::fmt;

use honestroles_shared::{HonestRolesError, PlanConfig, Result};
use serde::Serialize;

use crate::rank::{CandidateProfile, RankedJob};

/// Score and friction cut-offs that map a ranked job to an action.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PlanThresholds {
    /// Minimum fit score to apply.
    pub apply_threshold: f64,
    /// Minimum fit score worth researching further.
    pub research_threshold: f64,
    /// Application friction above which applying needs extra time.
    pub max_friction: f64,
}

impl Default for PlanThresholds {
    fn default() -> Self {
        Self {
            apply_threshold: 0.7,
            research_threshold: 0.45,
            max_friction: 0.5,
        }
    }
}

impl PlanThresholds {
    pub fn from_config(config: &PlanConfig) -> Result<Self> {
        let thresholds = Self {
            apply_threshold: config.apply_threshold,
            research_threshold: config.research_threshold,
            max_friction: config.max_friction,
        };
        thresholds.validate()?;
        Ok(thresholds)
    }

    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("apply_threshold", self.apply_threshold),
            ("research_threshold", self.research_threshold),
            ("max_friction", self.max_friction),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(HonestRolesError::config(format!(
                    "{name} must be within [0, 1], got {value}"
                )));
            }
        }
        if self.research_threshold > self.apply_threshold {
            return Err(HonestRolesError::config(
                "research_threshold must not exceed apply_threshold",
            ));
        }
        Ok(())
    }
}

/// Recommended action for one job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanAction {
    ApplyNow,
    ApplyBudgetMoreTime,
    ResearchFurther,
    Skip,
}

impl PlanAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ApplyNow => "apply_now",
            Self::ApplyBudgetMoreTime => "apply_budget_more_time",
            Self::ResearchFurther => "research_further",
            Self::Skip => "skip",
        }
    }
}

impl fmt::Display for PlanAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the application plan.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApplicationPlanEntry {
    pub rank: usize,
    pub id: Option<String>,
    pub title: Option<String>,
    pub company: Option<String>,
    pub apply_url: Option<String>,
    pub fit_score: f64,
    pub action: PlanAction,
    pub estimated_effort_minutes: u32,
    pub next_actions: Vec<String>,
}

/// Action for a score and raw application friction. Unknown friction counts as low.
pub fn choose_action(
    fit_score: f64,
    friction: Option<f64>,
    thresholds: &PlanThresholds,
) -> PlanAction {
    if fit_score >= thresholds.apply_threshold {
        if friction.is_some_and(|f| f > thresholds.max_friction) {
            PlanAction::ApplyBudgetMoreTime
        } else {
            PlanAction::ApplyNow
        }
    } else if fit_score >= thresholds.research_threshold {
        PlanAction::ResearchFurther
    } else {
        PlanAction::Skip
    }
}

fn effort_minutes(seniority: Option<&str>, action: PlanAction) -> u32 {
    let base = match seniority {
        Some("senior" | "staff" | "principal" | "lead" | "director" | "vp" | "c_level") => 25,
        Some("junior" | "intern" | "entry") => 12,
        _ => 15,
    };
    if action == PlanAction::ApplyBudgetMoreTime {
        base + 15
    } else {
        base
    }
}

fn next_actions(job: &RankedJob, profile: &CandidateProfile) -> Vec<String> {
    let missing = &job.missing_requirements;
    let has = |tag: &str| missing.iter().any(|m| m == tag);
    let mut actions = Vec::new();

    if let Some(skills) = missing.iter().find_map(|m| m.strip_prefix("missing_skills:")) {
        actions.push(format!("Highlight projects/coursework covering: {skills}."));
    }
    actions.push("Tailor resume bullets to listed responsibilities and impact metrics.".into());
    if has("experience_requirement_above_profile") {
        actions.push("Use a summary section to frame equivalent internship/research depth.".into());
    }
    if profile.needs_visa_sponsorship == Some(true) {
        match job.visa_sponsorship {
            None => actions.push("Confirm sponsorship policy during recruiter screen.".to_string()),
            Some(false) => {
                actions.push("Deprioritize unless a referral can validate sponsorship.".to_string())
            }
            Some(true) => {}
        }
    }
    if has("salary_below_minimum") {
        actions.push("Prioritize only if brand/network upside outweighs compensation gap.".into());
    }
    if missing.is_empty() {
        actions.push("Apply now; strong profile alignment for an early-career candidate.".into());
    }
    actions
}

/// Map every ranked job to an action, effort estimate, and next steps.
pub fn build_application_plan(
    ranked: &[RankedJob],
    profile: &CandidateProfile,
    thresholds: &PlanThresholds,
) -> Vec<ApplicationPlanEntry> {
    ranked
        .iter()
        .map(|job| {
            let action = choose_action(job.fit_score, job.application_friction, thresholds);
            ApplicationPlanEntry {
                rank: job.rank,
                id: job.id.clone(),
                title: job.title.clone(),
                company: job.company.clone(),
                apply_url: job.apply_url.clone(),
                fit_score: job.fit_score,
                action,
                estimated_effort_minutes: effort_minutes(job.seniority.as_deref(), action),
                next_actions: next_actions(job, profile),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn job(score: f64, friction: Option<f64>, missing: &[&str]) -> RankedJob {
        RankedJob {
            rank: 1,
            source_row: 0,
            id: Some("1".into()),
            title: Some("Data Analyst".into()),
            company: Some("Acme".into()),
            apply_url: None,
            fit_score: score,
            components: BTreeMap::new(),
            missing_requirements: missing.iter().map(|s| s.to_string()).collect(),
            why_match: String::new(),
            seniority: Some("junior".into()),
            application_friction: friction,
            visa_sponsorship: None,
        }
    }

    #[test]
    fn actions_follow_thresholds() {
        let t = PlanThresholds::default();
        assert_eq!(choose_action(0.8, Some(0.2), &t), PlanAction::ApplyNow);
        assert_eq!(choose_action(0.8, Some(0.9), &t), PlanAction::ApplyBudgetMoreTime);
        assert_eq!(choose_action(0.8, None, &t), PlanAction::ApplyNow);
        assert_eq!(choose_action(0.5, Some(0.1), &t), PlanAction::ResearchFurther);
        assert_eq!(choose_action(0.1, Some(0.1), &t), PlanAction::Skip);

        let strict = PlanThresholds {
            apply_threshold: 0.9,
            ..t
        };
        assert_eq!(choose_action(0.8, Some(0.2), &strict), PlanAction::ResearchFurther);
    }

    #[test]
    fn thresholds_validate() {
        let inverted = PlanThresholds {
            apply_threshold: 0.3,
            research_threshold: 0.6,
            max_friction: 0.5,
        };
        assert!(inverted.validate().is_err());
        assert!(
            PlanThresholds {
                max_friction: 1.5,
                ..PlanThresholds::default()
            }
            .validate()
            .is_err()
        );
        assert!(PlanThresholds::from_config(&PlanConfig::default()).is_ok());
    }

    #[test]
    fn plan_entries_carry_effort_and_next_actions() {
        let profile = CandidateProfile {
            needs_visa_sponsorship: Some(true),
            ..CandidateProfile::new_grad()
        };
        let jobs = [
            job(0.9, Some(0.8), &["missing_skills:sql", "salary_below_minimum"]),
            job(0.9, Some(0.1), &[]),
        ];
        let plan = build_application_plan(&jobs, &profile, &PlanThresholds::default());

        assert_eq!(plan[0].action, PlanAction::ApplyBudgetMoreTime);
        assert_eq!(plan[0].estimated_effort_minutes, 27);
        assert_eq!(
            plan[0].next_actions,
            vec![
                "Highlight projects/coursework covering: sql.",
                "Tailor resume bullets to listed responsibilities and impact metrics.",
                "Confirm sponsorship policy during recruiter screen.",
                "Prioritize only if brand/network upside outweighs compensation gap.",
            ]
        );

        assert_eq!(plan[1].action, PlanAction::ApplyNow);
        assert_eq!(plan[1].estimated_effort_minutes, 12);
        assert!(plan[1].next_actions.last().is_some_and(|a| a.starts_with("Apply now")));
    }
}
