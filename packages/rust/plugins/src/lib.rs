//! Plugin contract, catalog, loader, and registry.
//!
//! Third parties extend the filter, label, and rate stages with functions of
//! shape `(dataset, context) -> dataset`. Functions are exported into a
//! [`PluginCatalog`] under `module:function` references, a manifest selects
//! and configures them, and the loader validates each declared signature
//! against the [`Contract`] for its kind before anything runs. The resulting
//! [`PluginRegistry`] is immutable and instance-scoped.

pub mod catalog;
pub mod contract;
pub mod loader;
pub mod registry;
pub mod types;

pub use catalog::{PluginCatalog, PluginExport};
pub use contract::{Contract, Param, ParamKind, Signature, TypeTag};
pub use loader::{PluginInspection, inspect_manifest, load_plugin_item, load_plugins};
pub use registry::{PluginCounts, PluginRegistry};
pub use types::{
    PluginDefinition, PluginFailure, PluginFn, RuntimeExecutionContext, Settings, StageContext,
};

pub use honestroles_shared::{PluginKind, PluginSpec};
