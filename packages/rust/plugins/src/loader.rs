//! Manifest loading: resolve references, validate signatures, freeze settings.

use honestroles_shared::{HonestRolesError, PluginManifest, PluginManifestItem, Result};
use tracing::{debug, warn};

use crate::catalog::PluginCatalog;
use crate::contract::Contract;
use crate::types::{PluginDefinition, Settings};

/// Resolve and validate one manifest entry.
///
/// Fails with `PluginLoad` when the reference cannot be resolved and with
/// `PluginValidation` (listing every violation) when the declared signature
/// does not match the contract for the entry's kind.
pub fn load_plugin_item(
    item: &PluginManifestItem,
    catalog: &PluginCatalog,
) -> Result<PluginDefinition> {
    let export = catalog.resolve(&item.reference)?;

    let contract = Contract::for_kind(item.kind);
    let violations = contract.check(&export.signature);
    if !violations.is_empty() {
        return Err(HonestRolesError::PluginValidation {
            plugin_name: item.name.clone(),
            kind: item.kind.to_string(),
            expected: contract.expected.to_string(),
            found: export.signature.to_string(),
            violations,
        });
    }

    debug!(plugin = %item.name, kind = %item.kind, reference = %item.reference, "plugin resolved");

    Ok(PluginDefinition {
        name: item.name.clone(),
        kind: item.kind,
        reference: item.reference.clone(),
        func: export.func.clone(),
        signature: export.signature.clone(),
        order: item.order,
        enabled: item.enabled,
        settings: Settings::new(item.settings.clone()),
        spec: item.spec.clone(),
    })
}

/// Load the enabled plugins of a manifest for execution.
///
/// Any load or validation failure of an enabled entry aborts. Disabled entries
/// are still resolved and checked so problems surface early, but a failure
/// there is only logged. The result holds enabled plugins sorted by
/// `(kind, order, name)`.
pub fn load_plugins(
    manifest: &PluginManifest,
    catalog: &PluginCatalog,
) -> Result<Vec<PluginDefinition>> {
    let mut loaded = Vec::with_capacity(manifest.plugins.len());
    for item in &manifest.plugins {
        match load_plugin_item(item, catalog) {
            Ok(plugin) if plugin.enabled => loaded.push(plugin),
            Ok(plugin) => debug!(plugin = %plugin.name, "plugin disabled, skipping"),
            Err(e) if !item.enabled => {
                warn!(
                    plugin = %item.name,
                    kind = %item.kind,
                    error = %e,
                    "disabled plugin failed to load"
                );
            }
            Err(e) => return Err(e),
        }
    }
    loaded.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
    Ok(loaded)
}

/// Outcome of loading one manifest entry during inspection.
#[derive(Debug)]
pub struct PluginInspection {
    pub name: String,
    pub kind: honestroles_shared::PluginKind,
    pub reference: String,
    pub order: i64,
    pub enabled: bool,
    pub result: Result<PluginDefinition>,
}

impl PluginInspection {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Load every entry independently, in manifest order, without aborting on failures.
///
/// Used by listing and validation tooling so one bad entry never hides the others.
pub fn inspect_manifest(
    manifest: &PluginManifest,
    catalog: &PluginCatalog,
) -> Vec<PluginInspection> {
    manifest
        .plugins
        .iter()
        .map(|item| PluginInspection {
            name: item.name.clone(),
            kind: item.kind,
            reference: item.reference.clone(),
            order: item.order,
            enabled: item.enabled,
            result: load_plugin_item(item, catalog),
        })
        .collect()
}
