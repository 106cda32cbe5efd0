//! Declared plugin signatures and the per-kind contract they are checked against.
//!
//! Every exported plugin function ships a [`Signature`] describing its
//! parameters and return type. Before a plugin can run, the loader compares that
//! signature structurally with [`Contract::for_kind`] and collects every
//! mismatch, so a broken plugin produces one complete report instead of a
//! trickle of single errors.

use std::fmt;

use honestroles_shared::PluginKind;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Signature description
// ---------------------------------------------------------------------------

/// Semantic type named by a parameter or return annotation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TypeTag {
    JobDataset,
    FilterStageContext,
    LabelStageContext,
    RateStageContext,
    Mapping,
    Text,
    Float,
    Bool,
    Unit,
    Named(String),
}

impl TypeTag {
    /// The context type a plugin of `kind` receives.
    pub fn context_for(kind: PluginKind) -> Self {
        match kind {
            PluginKind::Filter => Self::FilterStageContext,
            PluginKind::Label => Self::LabelStageContext,
            PluginKind::Rate => Self::RateStageContext,
        }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::JobDataset => f.write_str("JobDataset"),
            Self::FilterStageContext => f.write_str("FilterStageContext"),
            Self::LabelStageContext => f.write_str("LabelStageContext"),
            Self::RateStageContext => f.write_str("RateStageContext"),
            Self::Mapping => f.write_str("Mapping"),
            Self::Text => f.write_str("str"),
            Self::Float => f.write_str("float"),
            Self::Bool => f.write_str("bool"),
            Self::Unit => f.write_str("()"),
            Self::Named(name) => f.write_str(name),
        }
    }
}

/// How an argument is passed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParamKind {
    Positional,
    KeywordOnly,
    Variadic,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub kind: ParamKind,
    pub annotation: Option<TypeTag>,
}

impl Param {
    /// A positional parameter with a type annotation.
    pub fn positional(name: impl Into<String>, annotation: TypeTag) -> Self {
        Self {
            name: name.into(),
            kind: ParamKind::Positional,
            annotation: Some(annotation),
        }
    }
}

impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ParamKind::Positional => {}
            ParamKind::KeywordOnly => f.write_str("*, ")?,
            ParamKind::Variadic => f.write_str("*")?,
        }
        f.write_str(&self.name)?;
        if let Some(annotation) = &self.annotation {
            write!(f, ": {annotation}")?;
        }
        Ok(())
    }
}

/// A declared function signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub params: Vec<Param>,
    pub returns: Option<TypeTag>,
}

impl Signature {
    /// The canonical `(dataset, context) -> JobDataset` signature for `kind`.
    pub fn canonical(kind: PluginKind) -> Self {
        Self {
            params: vec![
                Param::positional("dataset", TypeTag::JobDataset),
                Param::positional("context", TypeTag::context_for(kind)),
            ],
            returns: Some(TypeTag::JobDataset),
        }
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{param}")?;
        }
        f.write_str(")")?;
        match &self.returns {
            Some(ret) => write!(f, " -> {ret}"),
            None => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// Contract
// ---------------------------------------------------------------------------

/// The shape a plugin of one kind must declare.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contract {
    pub kind: PluginKind,
    pub expected: Signature,
}

impl Contract {
    pub fn for_kind(kind: PluginKind) -> Self {
        Self {
            kind,
            expected: Signature::canonical(kind),
        }
    }

    /// Compare `found` against the contract and list every violation.
    ///
    /// An empty result means the signature conforms.
    pub fn check(&self, found: &Signature) -> Vec<String> {
        let mut violations = Vec::new();
        let expected = &self.expected.params;

        if found.params.len() != expected.len() {
            violations.push(format!(
                "expected {} parameters, found {}",
                expected.len(),
                found.params.len()
            ));
        }

        for (position, want) in expected.iter().enumerate() {
            let Some(got) = found.params.get(position) else {
                violations.push(format!(
                    "missing parameter {} '{}: {}'",
                    position + 1,
                    want.name,
                    describe(&want.annotation)
                ));
                continue;
            };
            if got.name != want.name {
                violations.push(format!(
                    "parameter {} must be named '{}', found '{}'",
                    position + 1,
                    want.name,
                    got.name
                ));
            }
            if got.kind != ParamKind::Positional {
                violations.push(format!(
                    "parameter {} '{}' must be positional, found {:?}",
                    position + 1,
                    got.name,
                    got.kind
                ));
            }
            match &got.annotation {
                None => violations.push(format!(
                    "parameter {} '{}' is missing a type annotation (expected {})",
                    position + 1,
                    got.name,
                    describe(&want.annotation)
                )),
                Some(tag) if Some(tag) != want.annotation.as_ref() => violations.push(format!(
                    "parameter {} '{}' must be annotated as {}, found {tag}",
                    position + 1,
                    got.name,
                    describe(&want.annotation)
                )),
                Some(_) => {}
            }
        }

        for extra in found.params.iter().skip(expected.len()) {
            violations.push(format!("unexpected extra parameter '{extra}'"));
        }

        match &found.returns {
            None => violations.push(format!(
                "missing return annotation (expected {})",
                describe(&self.expected.returns)
            )),
            Some(tag) if Some(tag) != self.expected.returns.as_ref() => violations.push(format!(
                "return annotation must be {}, found {tag}",
                describe(&self.expected.returns)
            )),
            Some(_) => {}
        }

        violations
    }
}

fn describe(tag: &Option<TypeTag>) -> String {
    tag.as_ref()
        .map_or_else(|| "<none>".to_string(), ToString::to_string)
}
