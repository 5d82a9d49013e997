//! Error types for xmlschema-docpath
//!
//! This module defines all error types used throughout the library.
//! Schema problems surface while building an automaton, document problems
//! while walking a document, and internal inconsistencies indicate a defect
//! in the automaton graph itself.

use std::fmt;
use thiserror::Error;

use crate::namespaces::QName;

/// Result type alias using the crate Error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for automaton generation and document walks
#[derive(Error, Debug)]
pub enum Error {
    /// The schema's particle tree contains an unresolvable or unsupported construct
    #[error("schema structure error: {0}")]
    SchemaStructure(#[from] SchemaStructureError),

    /// A document event could not be placed anywhere in the content model
    #[error("validation failure: {0}")]
    Validation(#[from] ValidationFailure),

    /// A precondition of the path finder or the automaton was violated
    #[error("internal inconsistency: {0}")]
    Internal(String),

    /// Limit exceeded error
    #[error("limit exceeded: {0}")]
    LimitExceeded(String),

    /// Name error (invalid XML name)
    #[error("name error: {0}")]
    Name(String),

    /// XML parsing error
    #[error("XML error: {0}")]
    Xml(String),

    /// Schema model description error
    #[error("model error: {0}")]
    Model(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this error rejects document content, as opposed to a broken
    /// schema, configuration or automaton
    pub fn is_validation(&self) -> bool {
        matches!(self, Error::Validation(_))
    }

    pub(crate) fn internal(message: impl Into<String>) -> Self {
        Error::Internal(message.into())
    }
}

/// A document event that no interpretation of the content model accepts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationFailure {
    /// Error message
    pub message: String,
    /// Qualified name of the offending element, if the event had one
    pub name: Option<QName>,
    /// Names that would have been accepted (or are still required)
    pub expected: Vec<QName>,
    /// Element path at the time of failure
    pub path: Option<String>,
    /// Underlying rejection reason
    pub reason: Option<String>,
}

impl ValidationFailure {
    /// Create a new validation failure
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            name: None,
            expected: Vec::new(),
            path: None,
            reason: None,
        }
    }

    /// Set the offending element name
    pub fn with_name(mut self, name: QName) -> Self {
        self.name = Some(name);
        self
    }

    /// Set the expected element names
    pub fn with_expected(mut self, expected: Vec<QName>) -> Self {
        self.expected = expected;
        self
    }

    /// Set the path where the walk failed
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Set the reason
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

impl fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;

        if let Some(ref reason) = self.reason {
            write!(f, "\n\nReason: {}", reason)?;
        }

        if !self.expected.is_empty() {
            let names: Vec<String> = self.expected.iter().map(|n| n.to_string()).collect();
            write!(f, "\n\nExpected: {}", names.join(", "))?;
        }

        if let Some(ref path) = self.path {
            write!(f, "\n\nPath: {}", path)?;
        }

        Ok(())
    }
}

impl std::error::Error for ValidationFailure {}

/// A particle that cannot be turned into automaton nodes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaStructureError {
    /// Error message
    pub message: String,
    /// Schema component that caused the error
    pub component: Option<String>,
}

impl SchemaStructureError {
    /// Create a new schema structure error
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            component: None,
        }
    }

    /// Set the schema component
    pub fn with_component(mut self, component: impl Into<String>) -> Self {
        self.component = Some(component.into());
        self
    }
}

impl fmt::Display for SchemaStructureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;

        if let Some(ref component) = self.component {
            write!(f, "\n\nComponent: {}", component)?;
        }

        Ok(())
    }
}

impl std::error::Error for SchemaStructureError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_failure_display() {
        let err = ValidationFailure::new("Element 'foo' is not expected")
            .with_name(QName::local("foo"))
            .with_expected(vec![QName::local("bar")])
            .with_reason("No route reaches 'foo'")
            .with_path("/root/foo");

        let msg = format!("{}", err);
        assert!(msg.contains("Element 'foo' is not expected"));
        assert!(msg.contains("Reason:"));
        assert!(msg.contains("Expected: bar"));
        assert!(msg.contains("Path: /root/foo"));
    }

    #[test]
    fn test_schema_structure_error_display() {
        let err = SchemaStructureError::new("Unresolved element reference")
            .with_component("{urn:test}missing");

        let msg = format!("{}", err);
        assert!(msg.contains("Unresolved element reference"));
        assert!(msg.contains("Component: {urn:test}missing"));
    }

    #[test]
    fn test_error_conversion() {
        let err: Error = ValidationFailure::new("test").into();
        assert!(err.is_validation());

        let err: Error = SchemaStructureError::new("test").into();
        assert!(matches!(err, Error::SchemaStructure(_)));
        assert!(!err.is_validation());
    }
}
