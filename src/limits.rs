//! Limits and constraints for automaton generation and document walks
//!
//! This module defines the limits that bound resource usage. A `Limits`
//! value is passed explicitly to the schema set, the generator and the path
//! finder; nothing here is process-wide.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Limits configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    /// Maximum number of automaton nodes generated for one root
    pub max_automaton_nodes: usize,

    /// Maximum element nesting depth of a walked document
    pub max_document_depth: usize,

    /// Maximum number of routes retried to place one rejected event
    pub max_backtracks: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_automaton_nodes: 100_000,
            max_document_depth: 1000,
            max_backtracks: 100_000,
        }
    }
}

impl Limits {
    /// Create a new Limits with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Create strict limits (more restrictive)
    pub fn strict() -> Self {
        Self {
            max_automaton_nodes: 10_000,
            max_document_depth: 100,
            max_backtracks: 1_000,
        }
    }

    /// Check if the automaton node count is within limits
    pub fn check_automaton_nodes(&self, count: usize) -> Result<()> {
        if count > self.max_automaton_nodes {
            Err(Error::LimitExceeded(format!(
                "Automaton node count {} exceeds maximum {}",
                count, self.max_automaton_nodes
            )))
        } else {
            Ok(())
        }
    }

    /// Check if the document depth is within limits
    pub fn check_document_depth(&self, depth: usize) -> Result<()> {
        if depth > self.max_document_depth {
            Err(Error::LimitExceeded(format!(
                "Document depth {} exceeds maximum {}",
                depth, self.max_document_depth
            )))
        } else {
            Ok(())
        }
    }

    /// Check if the backtrack count is within limits
    pub fn check_backtracks(&self, count: usize) -> Result<()> {
        if count > self.max_backtracks {
            Err(Error::LimitExceeded(format!(
                "Backtrack count {} exceeds maximum {}",
                count, self.max_backtracks
            )))
        } else {
            Ok(())
        }
    }
}
