//! Document nodes
//!
//! The dynamic side of a walk: one [`DocumentNode`] per automaton node
//! entered at a given edge position of a given parent iteration. Repeats of
//! the same particle re-enter the same document node and bump its
//! iteration, so children are kept per iteration.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::automaton::NodeId;
use crate::namespaces::QName;

/// Handle of a document node within its walk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocId(pub(crate) usize);

impl DocId {
    /// Raw arena index
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for DocId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

/// A vertex of the per-walk document tree
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentNode {
    pub(crate) automaton_node: NodeId,
    pub(crate) parent: Option<DocId>,
    pub(crate) position: Option<usize>,
    pub(crate) iteration: u64,
    pub(crate) children: BTreeMap<u64, BTreeMap<usize, DocId>>,
    pub(crate) names: BTreeMap<u64, QName>,
    pub(crate) nil: BTreeSet<u64>,
}

impl DocumentNode {
    pub(crate) fn new(automaton_node: NodeId, parent: Option<DocId>, position: Option<usize>) -> Self {
        Self {
            automaton_node,
            parent,
            position,
            iteration: 1,
            children: BTreeMap::new(),
            names: BTreeMap::new(),
            nil: BTreeSet::new(),
        }
    }

    /// The automaton node this document node instantiates
    pub fn automaton_node(&self) -> NodeId {
        self.automaton_node
    }

    /// Parent document node; None for the root
    pub fn parent(&self) -> Option<DocId> {
        self.parent
    }

    /// Edge position of this node within its parent's automaton node
    pub fn position(&self) -> Option<usize> {
        self.position
    }

    /// Number of times this node has been entered (1-based)
    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    /// Children recorded for every iteration
    pub fn children_by_iteration(&self) -> &BTreeMap<u64, BTreeMap<usize, DocId>> {
        &self.children
    }

    /// Children of one iteration, keyed by edge position
    pub fn children(&self, iteration: u64) -> Option<&BTreeMap<usize, DocId>> {
        self.children.get(&iteration)
    }

    /// Child at `position` during `iteration`
    pub fn child(&self, iteration: u64, position: usize) -> Option<DocId> {
        self.children.get(&iteration)?.get(&position).copied()
    }

    /// Element name matched on `iteration`; set for ELEMENT and WILDCARD nodes
    pub fn name(&self, iteration: u64) -> Option<&QName> {
        self.names.get(&iteration)
    }

    /// Whether the element was nilled on `iteration`
    pub fn is_nil(&self, iteration: u64) -> bool {
        self.nil.contains(&iteration)
    }

    pub(crate) fn current_children(&self) -> Option<&BTreeMap<usize, DocId>> {
        self.children.get(&self.iteration)
    }
}

/// Walk state of a document node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    /// Not entered in the parent's current iteration
    Unvisited,
    /// On the cursor, currently at `position` of `iteration`
    InProgress {
        /// Current iteration
        iteration: u64,
        /// Last edge entered in this iteration
        position: Option<usize>,
    },
    /// Left with its content complete
    Satisfied,
    /// The walk was rejected while this node was open
    Failed,
}
