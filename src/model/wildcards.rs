//! XSD element wildcards
//!
//! This module implements `xs:any` for element content: the namespace
//! constraint that decides which element names a wildcard admits, and the
//! processContents mode it was declared with.
//!
//! Reference: https://www.w3.org/TR/xmlschema11-1/#Wildcards

use crate::error::SchemaStructureError;
use crate::namespaces::QName;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Process contents mode for wildcards
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessContents {
    /// Validate strictly - element must be declared
    #[default]
    Strict,
    /// Validate if declaration found, otherwise accept
    Lax,
    /// Skip validation entirely
    Skip,
}

impl ProcessContents {
    /// Parse from string value
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "strict" => Some(Self::Strict),
            "lax" => Some(Self::Lax),
            "skip" => Some(Self::Skip),
            _ => None,
        }
    }
}

impl std::fmt::Display for ProcessContents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Strict => write!(f, "strict"),
            Self::Lax => write!(f, "lax"),
            Self::Skip => write!(f, "skip"),
        }
    }
}

/// Namespace constraint for wildcards.
///
/// The empty string stands for "no namespace" inside the sets.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "kind", content = "namespaces")]
pub enum NamespaceConstraint {
    /// Any namespace is allowed (##any)
    #[default]
    Any,
    /// Any namespace except the target namespace and no namespace (##other)
    Other,
    /// Specific set of allowed namespaces
    Enumeration(BTreeSet<String>),
    /// XSD 1.1: Set of disallowed namespaces (notNamespace)
    Not(BTreeSet<String>),
}

impl NamespaceConstraint {
    /// Create from namespace attribute value
    pub fn from_namespace_attr(
        value: &str,
        target_namespace: Option<&str>,
    ) -> Result<Self, SchemaStructureError> {
        match value.trim() {
            "##any" => Ok(Self::Any),
            "##other" => Ok(Self::Other),
            value => Ok(Self::Enumeration(namespace_set(
                value,
                target_namespace,
                "namespace",
            )?)),
        }
    }

    /// Create from notNamespace attribute (XSD 1.1)
    pub fn from_not_namespace_attr(
        value: &str,
        target_namespace: Option<&str>,
    ) -> Result<Self, SchemaStructureError> {
        Ok(Self::Not(namespace_set(value, target_namespace, "notNamespace")?))
    }

    /// Check if a namespace is allowed by this constraint
    pub fn is_allowed(&self, namespace: &str, target_namespace: Option<&str>) -> bool {
        match self {
            Self::Any => true,
            Self::Other => {
                !namespace.is_empty() && Some(namespace) != target_namespace
            }
            Self::Enumeration(set) => set.contains(namespace),
            Self::Not(set) => !set.contains(namespace),
        }
    }
}

fn namespace_set(
    value: &str,
    target_namespace: Option<&str>,
    attribute: &str,
) -> Result<BTreeSet<String>, SchemaStructureError> {
    let mut namespaces = BTreeSet::new();
    for ns in value.split_whitespace() {
        match ns {
            "##local" => {
                namespaces.insert(String::new());
            }
            "##targetNamespace" => {
                namespaces.insert(target_namespace.unwrap_or_default().to_string());
            }
            s if s.starts_with("##") => {
                return Err(SchemaStructureError::new(format!(
                    "wrong value '{}' in '{}' attribute",
                    s, attribute
                )));
            }
            uri => {
                namespaces.insert(uri.to_string());
            }
        }
    }
    Ok(namespaces)
}

/// An `xs:any` wildcard as seen by the content model
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Wildcard {
    /// Namespace constraint
    pub namespace: NamespaceConstraint,
    /// Process contents mode
    pub process_contents: ProcessContents,
    /// Target namespace of the schema that declared the wildcard
    pub target_namespace: Option<String>,
}

impl Wildcard {
    /// A wildcard matching any element
    pub fn any() -> Self {
        Self::default()
    }

    /// A wildcard with the given constraint declared in `target_namespace`
    pub fn new(namespace: NamespaceConstraint, target_namespace: Option<&str>) -> Self {
        Self {
            namespace,
            process_contents: ProcessContents::default(),
            target_namespace: target_namespace.map(String::from),
        }
    }

    /// Set the process contents mode
    pub fn with_process_contents(mut self, process_contents: ProcessContents) -> Self {
        self.process_contents = process_contents;
        self
    }

    /// Check whether an element name is admitted by this wildcard
    pub fn matches(&self, name: &QName) -> bool {
        self.namespace
            .is_allowed(name.namespace_or_empty(), self.target_namespace.as_deref())
    }
}
