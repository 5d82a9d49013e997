//! XML namespace handling
//!
//! This module provides qualified names (QNames) in Clark notation
//! (`{namespace}local`) and the well-known namespaces the walker inspects.

use crate::error::{Error, Result};
use crate::names::is_valid_ncname;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// XML Namespace URI
pub type NamespaceUri = String;

/// XML Schema instance namespace (`xsi:nil`, `xsi:type`)
pub const XSI_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema-instance";

/// XMLNS namespace
pub const XMLNS_NAMESPACE: &str = "http://www.w3.org/2000/xmlns/";

/// Qualified name (QName) - combination of namespace and local name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct QName {
    /// Namespace URI (None for no namespace)
    pub namespace: Option<NamespaceUri>,
    /// Local name
    pub local_name: String,
}

impl QName {
    /// Create a new QName
    pub fn new(namespace: Option<impl Into<String>>, local_name: impl Into<String>) -> Self {
        let namespace: Option<String> = namespace.map(Into::into);
        Self {
            namespace: namespace.filter(|ns| !ns.is_empty()),
            local_name: local_name.into(),
        }
    }

    /// Create a QName without a namespace
    pub fn local(local_name: impl Into<String>) -> Self {
        Self {
            namespace: None,
            local_name: local_name.into(),
        }
    }

    /// Create a QName with a namespace
    pub fn namespaced(namespace: impl Into<String>, local_name: impl Into<String>) -> Self {
        Self::new(Some(namespace), local_name)
    }

    /// Namespace URI, or the empty string for no namespace
    pub fn namespace_or_empty(&self) -> &str {
        self.namespace.as_deref().unwrap_or("")
    }

    /// Check whether this is `xsi:nil`
    pub fn is_xsi_nil(&self) -> bool {
        self.namespace.as_deref() == Some(XSI_NAMESPACE) && self.local_name == "nil"
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{{{}}}{}", ns, self.local_name),
            None => write!(f, "{}", self.local_name),
        }
    }
}

impl FromStr for QName {
    type Err = Error;

    /// Parse Clark notation: `{namespace}local` or a bare `local`
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let (namespace, local) = match s.strip_prefix('{') {
            Some(rest) => {
                let (ns, local) = rest
                    .split_once('}')
                    .ok_or_else(|| Error::Name(format!("Unterminated namespace in '{}'", s)))?;
                (Some(ns), local)
            }
            None => (None, s),
        };

        if !is_valid_ncname(local) {
            return Err(Error::Name(format!("Invalid local name in '{}'", s)));
        }

        Ok(QName::new(namespace, local))
    }
}

impl TryFrom<String> for QName {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<QName> for String {
    fn from(name: QName) -> Self {
        name.to_string()
    }
}
