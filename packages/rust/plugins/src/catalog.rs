//! Instance-scoped catalog of exported plugin functions.
//!
//! A catalog maps `module -> function -> export`. Host applications build one
//! per runtime and hand it to the loader; there is no process-wide
//! registration state.

use std::collections::BTreeMap;
use std::sync::Arc;

use honestroles_shared::{HonestRolesError, JobDataset, PluginKind, Result};

use crate::contract::Signature;
use crate::types::{PluginFailure, PluginFn, StageContext};

/// A function exported under a module, together with its declared signature.
#[derive(Clone)]
pub struct PluginExport {
    pub signature: Signature,
    pub func: PluginFn,
}

impl std::fmt::Debug for PluginExport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginExport")
            .field("signature", &self.signature.to_string())
            .finish_non_exhaustive()
    }
}

/// Resolves `module:function` references to exported plugin functions.
#[derive(Debug, Clone, Default)]
pub struct PluginCatalog {
    modules: BTreeMap<String, BTreeMap<String, PluginExport>>,
}

impl PluginCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Export `func` under `module:function` with an explicit declared signature.
    ///
    /// Re-exporting the same reference replaces the earlier export.
    pub fn export<F>(
        &mut self,
        module: &str,
        function: &str,
        signature: Signature,
        func: F,
    ) -> &mut Self
    where
        F: Fn(&JobDataset, &StageContext) -> std::result::Result<JobDataset, PluginFailure>
            + Send
            + Sync
            + 'static,
    {
        self.modules.entry(module.to_string()).or_default().insert(
            function.to_string(),
            PluginExport {
                signature,
                func: Arc::new(func),
            },
        );
        self
    }

    /// Export `func` with the canonical signature for `kind`.
    pub fn export_typed<F>(
        &mut self,
        module: &str,
        function: &str,
        kind: PluginKind,
        func: F,
    ) -> &mut Self
    where
        F: Fn(&JobDataset, &StageContext) -> std::result::Result<JobDataset, PluginFailure>
            + Send
            + Sync
            + 'static,
    {
        self.export(module, function, Signature::canonical(kind), func)
    }

    /// Resolve a `module:function` reference.
    pub fn resolve(&self, reference: &str) -> Result<&PluginExport> {
        let Some((module, function)) = reference.split_once(':') else {
            return Err(HonestRolesError::plugin_load(
                reference,
                "invalid reference, expected 'module:function'",
            ));
        };
        let (module, function) = (module.trim(), function.trim());
        if module.is_empty() || function.is_empty() {
            return Err(HonestRolesError::plugin_load(
                reference,
                "invalid reference, expected 'module:function'",
            ));
        }

        let exports = self.modules.get(module).ok_or_else(|| {
            HonestRolesError::plugin_load(reference, format!("module '{module}' not found"))
        })?;
        exports.get(function).ok_or_else(|| {
            HonestRolesError::plugin_load(
                reference,
                format!("function '{function}' not found in module '{module}'"),
            )
        })
    }

    /// All exported references, sorted.
    pub fn references(&self) -> Vec<String> {
        self.modules
            .iter()
            .flat_map(|(module, exports)| {
                exports.keys().map(move |function| format!("{module}:{function}"))
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}
