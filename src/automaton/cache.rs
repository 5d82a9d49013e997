//! In-process automaton cache
//!
//! Automatons are immutable once built, so one `Arc<Automaton>` per root
//! element can back any number of walks.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::Result;
use crate::model::{ElementId, SchemaModel};

use super::generator::AutomatonGenerator;
use super::node::Automaton;

/// Cache of generated automatons keyed by root element identity
#[derive(Debug, Default)]
pub struct AutomatonCache {
    automatons: HashMap<ElementId, Arc<Automaton>>,
}

impl AutomatonCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the automaton for `root`, generating it on first use.
    ///
    /// A failed generation is not cached.
    pub fn get_or_generate<M: SchemaModel + ?Sized>(
        &mut self,
        model: &M,
        root: ElementId,
    ) -> Result<Arc<Automaton>> {
        if let Some(automaton) = self.automatons.get(&root) {
            return Ok(Arc::clone(automaton));
        }
        let automaton = Arc::new(AutomatonGenerator::new(model).generate(root)?);
        self.automatons.insert(root, Arc::clone(&automaton));
        Ok(automaton)
    }

    /// Cached automaton for `root`, if any
    pub fn get(&self, root: ElementId) -> Option<Arc<Automaton>> {
        self.automatons.get(&root).cloned()
    }

    /// Number of cached automatons
    pub fn len(&self) -> usize {
        self.automatons.len()
    }

    /// Check if the cache is empty
    pub fn is_empty(&self) -> bool {
        self.automatons.is_empty()
    }

    /// Drop every cached automaton
    pub fn clear(&mut self) {
        self.automatons.clear();
    }
}
