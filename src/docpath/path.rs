//! Walk paths
//!
//! Every decision the path finder commits is appended as a [`PathStep`].
//! Steps double as the undo journal: popping a step reverts exactly what it
//! did, which is how a wrong branch is rewound.

use std::fmt;
use std::sync::Arc;

use crate::automaton::{Automaton, AutomatonNode, NodeKind};
use crate::namespaces::QName;

use super::document::{DocId, DocumentNode};

/// What a path step did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Entered a document node created by this step
    Child,
    /// Re-entered an existing document node for its next iteration
    Sibling,
    /// Left a document node
    Parent,
    /// Accepted text content
    Content,
    /// Started an element skipped under a wildcard
    SkipStart,
    /// Ended an element skipped under a wildcard
    SkipEnd,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Direction::Child => "child",
            Direction::Sibling => "sibling",
            Direction::Parent => "parent",
            Direction::Content => "content",
            Direction::SkipStart => "skip-start",
            Direction::SkipEnd => "skip-end",
        };
        write!(f, "{}", name)
    }
}

/// Cursor entry for a document node currently open
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Frame {
    pub(crate) doc: DocId,
    /// Edge entered last during the current iteration
    pub(crate) position: Option<usize>,
    pub(crate) nil: bool,
    /// Open elements nested under a wildcard match
    pub(crate) skip_depth: usize,
    /// Index of the start-element event that opened an element frame
    pub(crate) event: usize,
}

impl Frame {
    pub(crate) fn new(doc: DocId) -> Self {
        Self {
            doc,
            position: None,
            nil: false,
            skip_depth: 0,
            event: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Undo {
    /// Restore the parent frame's position after popping the entered frame
    Enter { previous_position: Option<usize> },
    /// Push the exited frame back
    Exit(Frame),
    Nothing,
}

/// One committed decision of a walk
#[derive(Debug, Clone, PartialEq)]
pub struct PathStep {
    /// Document node the step applies to
    pub doc: DocId,
    /// What the step did
    pub direction: Direction,
    /// Iteration of `doc` once the step was applied
    pub iteration: u64,
    /// Edge position within the parent, for Child and Sibling steps
    pub position: Option<usize>,
    /// Accepted text, for Content steps
    pub text: Option<String>,
    /// Element name, for SkipStart steps
    pub name: Option<QName>,
    pub(crate) undo: Undo,
}

impl PathStep {
    pub(crate) fn new(doc: DocId, direction: Direction, iteration: u64, undo: Undo) -> Self {
        Self {
            doc,
            direction,
            iteration,
            position: None,
            text: None,
            name: None,
            undo,
        }
    }
}

/// The outcome of a walk: the document node tree and the steps that built it
#[derive(Debug, Clone)]
pub struct DocumentPath {
    pub(crate) automaton: Arc<Automaton>,
    pub(crate) nodes: Vec<DocumentNode>,
    pub(crate) steps: Vec<PathStep>,
    pub(crate) root: Option<DocId>,
}

impl DocumentPath {
    /// The automaton the document was walked against
    pub fn automaton(&self) -> &Automaton {
        &self.automaton
    }

    /// Root document node, once the root element has been matched
    pub fn root(&self) -> Option<DocId> {
        self.root
    }

    /// Document node by handle
    pub fn node(&self, id: DocId) -> Option<&DocumentNode> {
        self.nodes.get(id.0)
    }

    /// Automaton node a document node instantiates
    pub fn automaton_node(&self, id: DocId) -> Option<&AutomatonNode> {
        self.automaton.get(self.node(id)?.automaton_node)
    }

    /// Child of `id` at `position` during `iteration`
    pub fn child(&self, id: DocId, iteration: u64, position: usize) -> Option<DocId> {
        self.node(id)?.child(iteration, position)
    }

    /// All document nodes in creation order
    pub fn nodes(&self) -> impl Iterator<Item = (DocId, &DocumentNode)> {
        self.nodes.iter().enumerate().map(|(i, node)| (DocId(i), node))
    }

    /// Number of document nodes
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Check if nothing has been matched yet
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The committed steps in order
    pub fn steps(&self) -> &[PathStep] {
        &self.steps
    }

    /// Every matched element occurrence in document order, as
    /// (document node, iteration, element name)
    pub fn elements(&self) -> Vec<(DocId, u64, QName)> {
        self.steps
            .iter()
            .filter(|step| matches!(step.direction, Direction::Child | Direction::Sibling))
            .filter_map(|step| {
                let name = self.node(step.doc)?.name(step.iteration)?;
                Some((step.doc, step.iteration, name.clone()))
            })
            .collect()
    }

    /// Accepted text in document order
    pub fn texts(&self) -> Vec<(DocId, &str)> {
        self.steps
            .iter()
            .filter_map(|step| Some((step.doc, step.text.as_deref()?)))
            .collect()
    }

    fn label(&self, id: DocId, iteration: u64) -> String {
        let (Some(doc), Some(node)) = (self.node(id), self.automaton_node(id)) else {
            return format!("{} <missing>", id);
        };
        match node.kind() {
            NodeKind::Element(info) => {
                let nil = if doc.is_nil(iteration) { " nil" } else { "" };
                format!("{} ({}){}", info.name, info.type_info.kind, nil)
            }
            NodeKind::Wildcard(_) => match doc.name(iteration) {
                Some(name) => format!("any {}", name),
                None => "any".to_string(),
            },
            _ => node.node_type().to_string(),
        }
    }

    fn write_node(
        &self,
        f: &mut fmt::Formatter<'_>,
        id: DocId,
        position: Option<usize>,
        depth: usize,
    ) -> fmt::Result {
        let Some(doc) = self.node(id) else {
            return Ok(());
        };
        let indent = "  ".repeat(depth);
        let slot = position.map(|p| format!("{}: ", p)).unwrap_or_default();

        if doc.iteration <= 1 {
            writeln!(f, "{}{}{}", indent, slot, self.label(id, 1))?;
            for (&p, &child) in doc.children(1).into_iter().flatten() {
                self.write_node(f, child, Some(p), depth + 1)?;
            }
            return Ok(());
        }

        writeln!(f, "{}{}{} x{}", indent, slot, node_title(self, id), doc.iteration)?;
        for iteration in 1..=doc.iteration {
            writeln!(f, "{}  [{}] {}", indent, iteration, self.label(id, iteration))?;
            for (&p, &child) in doc.children(iteration).into_iter().flatten() {
                self.write_node(f, child, Some(p), depth + 2)?;
            }
        }
        Ok(())
    }
}

fn node_title(path: &DocumentPath, id: DocId) -> String {
    match path.automaton_node(id) {
        Some(node) => match node.kind() {
            NodeKind::Element(info) => info.name.to_string(),
            _ => node.node_type().to_string(),
        },
        None => id.to_string(),
    }
}

impl fmt::Display for DocumentPath {
    /// Indented document node tree; repeated nodes list each iteration
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.root {
            Some(root) => self.write_node(f, root, None, 0),
            None => writeln!(f, "(empty)"),
        }
    }
}
