//! Core domain types shared across HonestRoles crates.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::HonestRolesError;

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper identifying one pipeline run (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// PluginKind
// ---------------------------------------------------------------------------

/// The stage a plugin extends. Ordering follows pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginKind {
    Filter,
    Label,
    Rate,
}

impl PluginKind {
    pub const ALL: [PluginKind; 3] = [Self::Filter, Self::Label, Self::Rate];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Filter => "filter",
            Self::Label => "label",
            Self::Rate => "rate",
        }
    }
}

impl std::fmt::Display for PluginKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PluginKind {
    type Err = HonestRolesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "filter" => Ok(Self::Filter),
            "label" => Ok(Self::Label),
            "rate" => Ok(Self::Rate),
            other => Err(HonestRolesError::config(format!(
                "unknown plugin kind '{other}': expected filter, label, or rate"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// PluginSpec
// ---------------------------------------------------------------------------

/// Version and capability metadata a plugin declares in its manifest entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PluginSpec {
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default = "default_plugin_version")]
    pub plugin_version: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
}

impl Default for PluginSpec {
    fn default() -> Self {
        Self {
            api_version: default_api_version(),
            plugin_version: default_plugin_version(),
            capabilities: Vec::new(),
        }
    }
}

fn default_api_version() -> String {
    "1.0".into()
}
fn default_plugin_version() -> String {
    "0.1.0".into()
}
