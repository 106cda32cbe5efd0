//! Plugin definitions and the context handed to each plugin call.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use honestroles_shared::{JobDataset, PluginKind, PluginSpec};
use serde_json::Value;

use crate::contract::Signature;

/// Error type a plugin function may return.
pub type PluginFailure = Box<dyn std::error::Error + Send + Sync>;

/// A plugin function: takes the current dataset and its stage context, returns a new dataset.
pub type PluginFn =
    Arc<dyn Fn(&JobDataset, &StageContext) -> Result<JobDataset, PluginFailure> + Send + Sync>;

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Frozen plugin settings from the manifest. Cloning shares the same map.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Settings(Arc<BTreeMap<String, Value>>);

impl Settings {
    pub fn new(values: BTreeMap<String, Value>) -> Self {
        Self(Arc::new(values))
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key)?.as_str()
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.get(key)?.as_f64()
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key)?.as_bool()
    }

    /// A list of strings; non-string items are skipped.
    pub fn get_str_list(&self, key: &str) -> Option<Vec<String>> {
        let items = self.get(key)?.as_array()?;
        Some(
            items
                .iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect(),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }
}

// ---------------------------------------------------------------------------
// Contexts
// ---------------------------------------------------------------------------

/// Paths and stage options of the runtime that is invoking a plugin.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeExecutionContext {
    pub pipeline_config_path: Option<PathBuf>,
    pub plugin_manifest_path: Option<PathBuf>,
    /// The `[stages]` table as JSON.
    pub stage_options: Value,
}

/// Per-invocation context. A fresh value is built for every plugin call.
#[derive(Debug, Clone)]
pub struct StageContext {
    pub plugin_name: String,
    pub kind: PluginKind,
    pub settings: Settings,
    pub runtime: Option<Arc<RuntimeExecutionContext>>,
}

impl StageContext {
    /// Context for running `plugin` under an optional runtime.
    pub fn for_plugin(
        plugin: &PluginDefinition,
        runtime: Option<Arc<RuntimeExecutionContext>>,
    ) -> Self {
        Self {
            plugin_name: plugin.name.clone(),
            kind: plugin.kind,
            settings: plugin.settings.clone(),
            runtime,
        }
    }
}

// ---------------------------------------------------------------------------
// PluginDefinition
// ---------------------------------------------------------------------------

/// A loaded and validated plugin. Immutable once built.
#[derive(Clone)]
pub struct PluginDefinition {
    pub name: String,
    pub kind: PluginKind,
    /// The `module:function` reference it was resolved from.
    pub reference: String,
    pub func: PluginFn,
    pub signature: Signature,
    pub order: i64,
    pub enabled: bool,
    pub settings: Settings,
    pub spec: PluginSpec,
}

impl PluginDefinition {
    /// Deterministic execution sort key.
    pub fn sort_key(&self) -> (PluginKind, i64, &str) {
        (self.kind, self.order, self.name.as_str())
    }

    /// Call the plugin function.
    pub fn invoke(
        &self,
        dataset: &JobDataset,
        ctx: &StageContext,
    ) -> Result<JobDataset, PluginFailure> {
        (self.func)(dataset, ctx)
    }
}

impl fmt::Debug for PluginDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginDefinition")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("reference", &self.reference)
            .field("signature", &self.signature.to_string())
            .field("order", &self.order)
            .field("enabled", &self.enabled)
            .field("settings", &self.settings)
            .field("spec", &self.spec)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn settings_typed_getters() {
        let settings = Settings::new(BTreeMap::from([
            ("threshold".to_string(), json!(0.8)),
            ("label".to_string(), json!("priority")),
            ("strict".to_string(), json!(true)),
            ("hosts".to_string(), json!(["greenhouse.io", 3, "lever.co"])),
        ]));

        assert_eq!(settings.get_f64("threshold"), Some(0.8));
        assert_eq!(settings.get_str("label"), Some("priority"));
        assert_eq!(settings.get_bool("strict"), Some(true));
        assert_eq!(
            settings.get_str_list("hosts"),
            Some(vec!["greenhouse.io".to_string(), "lever.co".to_string()])
        );
        assert_eq!(settings.get_f64("label"), None);
    }

    #[test]
    fn settings_clones_share_storage() {
        let settings = Settings::new(BTreeMap::from([("a".to_string(), json!(1))]));
        let copy = settings.clone();
        assert!(Arc::ptr_eq(&settings.0, &copy.0));
    }
}
