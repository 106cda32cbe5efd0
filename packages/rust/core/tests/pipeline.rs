//! End-to-end runs through the runtime with plugins registered from a manifest.

use std::path::Path;
use std::sync::{Arc, Mutex};

use honestroles_core::{PlanAction, Runtime, SilentProgress, Stage};
use honestroles_plugins::{PluginCatalog, PluginRegistry};
use honestroles_shared::schema::{FIT_SCORE, RATE_COMPOSITE, TITLE};
use honestroles_shared::{
    Column, HonestRolesError, JobDataset, PluginKind, Record, parse_pipeline_config,
    parse_plugin_manifest,
};
use serde_json::json;

fn jobs() -> JobDataset {
    let records: Vec<Record> = vec![
        json!({
            "id": "a", "title": "Junior Data Scientist", "company": "Acme",
            "description_html": "<p>Entry level. <b>Python</b>, SQL and pandas. Visa sponsorship available.</p>",
            "skills": ["python", "sql", "pandas"], "remote": true,
            "apply_url": "https://boards.greenhouse.io/acme/1", "posted_at": "2025-01-12",
            "salary_min": 90000.0, "salary_max": 110000.0, "salary_currency": "USD",
        }),
        json!({
            "id": "b", "title": "Senior Staff Platform Engineer", "company": "Globex",
            "description_text": "Rust, Kubernetes. 12+ years of experience. Cover letter required.",
            "remote": false, "location": "Berlin, Germany",
            "apply_url": "https://globex.wd5.myworkdayjobs.com/job/2", "posted_at": "2024-03-01",
        }),
        json!({
            "id": "c", "title": "Data Analyst", "company": "Initech",
            "description_text": "SQL dashboards and reporting. 1-2 years of experience.",
            "skills": ["sql"], "remote": true, "posted_at": "2025-01-05",
        }),
        json!({
            "id": "a-dup", "title": "Junior Data Scientist", "company": "Acme",
            "description_html": "<p>Entry level. <b>Python</b>, SQL and pandas. Visa sponsorship available.</p>",
            "apply_url": "https://boards.greenhouse.io/acme/1",
        }),
    ]
    .into_iter()
    .map(|v| v.as_object().expect("object").clone())
    .collect();
    JobDataset::from_records(&records).expect("dataset")
}

fn pipeline(extra: &str) -> honestroles_shared::PipelineConfig {
    let toml = format!(
        "[input]\npath = \"jobs.jsonl\"\n\n[stages.rank]\nas_of = \"2025-01-15\"\n\n{extra}"
    );
    parse_pipeline_config(&toml, Path::new("/tmp")).expect("pipeline config")
}

/// Appends `settings.tag` to a `trace` column so tests can observe order.
fn tracing_catalog(seen: Arc<Mutex<Vec<String>>>) -> PluginCatalog {
    let mut catalog = PluginCatalog::new();
    catalog.export_typed("tests", "trace", PluginKind::Label, move |ds, ctx| {
        let tag = ctx.settings.get_str("tag").unwrap_or("?").to_string();
        seen.lock().expect("lock").push(tag.clone());
        let trace: Vec<Option<String>> = (0..ds.row_count())
            .map(|row| {
                let prev = ds.text_at("trace", row).unwrap_or_default();
                Some(format!("{prev}{tag}"))
            })
            .collect();
        Ok(ds.clone().with_column("trace", Column::Text(trace))?)
    });
    catalog.export_typed("tests", "reject_all", PluginKind::Filter, |_ds, _ctx| {
        Err("upstream feed unavailable".into())
    });
    catalog.export_typed("tests", "boost", PluginKind::Rate, |ds, ctx| {
        let bump = ctx.settings.get_f64("bump").unwrap_or(0.0);
        let rated: Vec<Option<f64>> = (0..ds.row_count())
            .map(|row| ds.float_at(RATE_COMPOSITE, row).map(|v| v + bump))
            .collect();
        Ok(ds.clone().with_column(RATE_COMPOSITE, Column::Float(rated))?)
    });
    catalog
}

#[test]
fn full_run_ranks_and_plans() {
    let runtime = Runtime::new(pipeline(""), PluginRegistry::empty()).expect("runtime");
    let run = runtime.run_dataset(jobs(), &SilentProgress).expect("run");

    assert_eq!(run.diagnostics.stage_rows.input, Some(4));
    assert_eq!(run.diagnostics.stage_rows.clean, Some(3), "duplicate posting removed");
    assert!(run.diagnostics.non_fatal_errors.is_empty());

    let ranking = run.ranking.expect("ranking");
    let ids: Vec<&str> = ranking.records.iter().filter_map(|r| r.id.as_deref()).collect();
    assert_eq!(ids.first(), Some(&"a"));
    assert_eq!(ids.last(), Some(&"b"));
    assert!(
        ranking
            .records
            .windows(2)
            .all(|w| w[0].fit_score >= w[1].fit_score)
    );
    assert!(run.dataset.has_column(FIT_SCORE));

    let top = &run.plan[0];
    assert_eq!(top.rank, 1);
    assert_eq!(top.id.as_deref(), Some("a"));
    let worst = run.plan.last().expect("plan entry");
    assert_eq!(worst.action, PlanAction::Skip);
}

#[test]
fn runs_are_deterministic() {
    let runtime = Runtime::new(pipeline(""), PluginRegistry::empty()).expect("runtime");
    let first = runtime.run_dataset(jobs(), &SilentProgress).expect("first");
    let second = runtime.run_dataset(jobs(), &SilentProgress).expect("second");
    assert_eq!(first.dataset, second.dataset);
    assert_eq!(first.plan, second.plan);
    assert_ne!(first.diagnostics.run_id, second.diagnostics.run_id);
}

#[test]
fn plugins_run_in_manifest_order() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let catalog = tracing_catalog(Arc::clone(&seen));
    let manifest = parse_plugin_manifest(
        r#"
[[plugins]]
name = "late"
kind = "label"
reference = "tests:trace"
order = 5
settings = { tag = "L" }

[[plugins]]
name = "early"
kind = "label"
reference = "tests:trace"
order = 1
settings = { tag = "E" }

[[plugins]]
name = "boost"
kind = "rate"
reference = "tests:boost"
settings = { bump = 0.5 }
"#,
    )
    .expect("manifest");
    let registry = PluginRegistry::from_manifest_config(&manifest, &catalog).expect("registry");
    assert_eq!(registry.list(Some(PluginKind::Label)), vec!["early", "late"]);

    let runtime = Runtime::new(pipeline(""), registry).expect("runtime");
    let run = runtime.run_dataset(jobs(), &SilentProgress).expect("run");

    assert_eq!(*seen.lock().expect("lock"), vec!["E", "L"]);
    assert_eq!(run.dataset.text_at("trace", 0), Some("EL"));
    assert_eq!(run.diagnostics.plugins.label, 2);
    assert_eq!(run.diagnostics.plugins.rate, 1);
    for row in 0..run.dataset.row_count() {
        let composite = run.dataset.float_at(RATE_COMPOSITE, row).expect("composite");
        assert!((0.0..=1.0).contains(&composite), "composite clamped after plugins");
    }
}

fn failing_registry() -> PluginRegistry {
    let catalog = tracing_catalog(Arc::new(Mutex::new(Vec::new())));
    let manifest = parse_plugin_manifest(
        "[[plugins]]\nname = \"feed\"\nkind = \"filter\"\nreference = \"tests:reject_all\"\n",
    )
    .expect("manifest");
    PluginRegistry::from_manifest_config(&manifest, &catalog).expect("registry")
}

#[test]
fn plugin_failure_aborts_under_fail_fast() {
    let runtime = Runtime::new(pipeline("[runtime]\nfail_fast = true\n"), failing_registry())
        .expect("runtime");
    let err = runtime
        .run_dataset(jobs(), &SilentProgress)
        .expect_err("plugin failure");
    match err {
        HonestRolesError::PluginExecution { plugin_name, stage_kind, detail } => {
            assert_eq!(plugin_name, "feed");
            assert_eq!(stage_kind, "filter");
            assert!(detail.contains("upstream feed unavailable"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn plugin_failure_is_recorded_when_continuing() {
    let runtime = Runtime::new(pipeline("[runtime]\nfail_fast = false\n"), failing_registry())
        .expect("runtime");
    let run = runtime.run_dataset(jobs(), &SilentProgress).expect("run");

    assert_eq!(run.diagnostics.non_fatal_errors.len(), 1);
    let recorded = &run.diagnostics.non_fatal_errors[0];
    assert_eq!(recorded.stage, Stage::Filter);
    assert_eq!(recorded.error_type, "PluginExecutionError");
    assert_eq!(run.diagnostics.stage_rows.filter, None);
    assert_eq!(run.dataset.row_count(), 3, "filter input flowed on");
    assert!(run.dataset.text(TITLE).is_some());
    assert!(!run.plan.is_empty());
}
