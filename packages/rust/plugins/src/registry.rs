//! Immutable, ordered plugin registry.
//!
//! Plugins are held sorted by `(kind, order, name)`. That sort is the only
//! ordering guarantee plugins get, and because it is kind-major every kind's
//! plugins form one contiguous slice.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use honestroles_shared::{
    HonestRolesError, PluginKind, PluginManifest, Result, load_plugin_manifest,
};
use serde::Serialize;
use tracing::info;

use crate::catalog::PluginCatalog;
use crate::loader::load_plugins;
use crate::types::PluginDefinition;

/// Number of registered plugins per kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PluginCounts {
    pub filter: usize,
    pub label: usize,
    pub rate: usize,
}

/// Validated plugin definitions in deterministic execution order.
///
/// Built once per runtime and shared by reference; clones share storage.
#[derive(Debug, Clone, Default)]
pub struct PluginRegistry {
    plugins: Arc<[PluginDefinition]>,
}

impl PluginRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build from already-loaded definitions. No I/O.
    ///
    /// Rejects duplicate `(kind, name)` pairs.
    pub fn from_plugins(plugins: impl IntoIterator<Item = PluginDefinition>) -> Result<Self> {
        let mut plugins: Vec<PluginDefinition> = plugins.into_iter().collect();
        let mut seen = HashSet::new();
        for plugin in &plugins {
            if !seen.insert((plugin.kind, plugin.name.as_str())) {
                return Err(HonestRolesError::config(format!(
                    "duplicate plugin name '{}' for kind '{}'",
                    plugin.name, plugin.kind
                )));
            }
        }
        plugins.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
        Ok(Self {
            plugins: plugins.into(),
        })
    }

    /// Load, validate, and keep the enabled plugins of an in-memory manifest.
    pub fn from_manifest_config(
        manifest: &PluginManifest,
        catalog: &PluginCatalog,
    ) -> Result<Self> {
        Self::from_plugins(load_plugins(manifest, catalog)?)
    }

    /// Load a manifest file and build the registry from it.
    pub fn from_manifest(path: &Path, catalog: &PluginCatalog) -> Result<Self> {
        let manifest = load_plugin_manifest(path)?;
        let registry = Self::from_manifest_config(&manifest, catalog)?;
        info!(
            path = %path.display(),
            plugins = registry.len(),
            "plugin registry loaded"
        );
        Ok(registry)
    }

    /// Plugin names in execution order, optionally limited to one kind.
    pub fn list(&self, kind: Option<PluginKind>) -> Vec<&str> {
        match kind {
            Some(kind) => self.plugins_for_kind(kind).iter().map(|p| p.name.as_str()).collect(),
            None => self.plugins.iter().map(|p| p.name.as_str()).collect(),
        }
    }

    /// Ordered definitions for one kind.
    pub fn plugins_for_kind(&self, kind: PluginKind) -> &[PluginDefinition] {
        let start = self.plugins.partition_point(|p| p.kind < kind);
        let end = self.plugins.partition_point(|p| p.kind <= kind);
        &self.plugins[start..end]
    }

    pub fn counts(&self) -> PluginCounts {
        PluginCounts {
            filter: self.plugins_for_kind(PluginKind::Filter).len(),
            label: self.plugins_for_kind(PluginKind::Label).len(),
            rate: self.plugins_for_kind(PluginKind::Rate).len(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &PluginDefinition> {
        self.plugins.iter()
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}
