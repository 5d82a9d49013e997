//! Automaton nodes
//!
//! The static grammar graph built once per root element. Nodes live in an
//! arena owned by [`Automaton`] and refer to each other by [`NodeId`], so
//! recursive content models become back-edges instead of unrolled copies.

use std::fmt;

use crate::error::{Error, Result};
use crate::model::{ElementId, Occurs, TypeInfo, Wildcard};
use crate::namespaces::QName;

/// Handle of a node within its automaton
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    /// Raw arena index
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Element data carried by ELEMENT nodes
#[derive(Debug, Clone, PartialEq)]
pub struct ElementInfo {
    /// Qualified element name
    pub name: QName,
    /// Resolved type classification
    pub type_info: TypeInfo,
    /// Whether `xsi:nil` is permitted
    pub nillable: bool,
    /// Abstract elements never match a document element
    pub abstract_element: bool,
    /// Declaration this node was built from
    pub declaration: ElementId,
}

/// The kind of an automaton node, with kind-specific data
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// Element declaration
    Element(ElementInfo),
    /// Ordered group
    Sequence,
    /// Alternatives
    Choice,
    /// Unordered group
    All,
    /// Head element followed by its substitutes
    SubstitutionGroup,
    /// Any element admitted by the wildcard
    Wildcard(Wildcard),
}

/// Data-less discriminant of [`NodeKind`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeType {
    /// Element declaration
    Element,
    /// Ordered group
    Sequence,
    /// Alternatives
    Choice,
    /// Unordered group
    All,
    /// Substitution group
    SubstitutionGroup,
    /// Wildcard
    Wildcard,
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NodeType::Element => "element",
            NodeType::Sequence => "sequence",
            NodeType::Choice => "choice",
            NodeType::All => "all",
            NodeType::SubstitutionGroup => "substitutionGroup",
            NodeType::Wildcard => "any",
        };
        write!(f, "{}", name)
    }
}

/// A vertex of the grammar graph
#[derive(Debug, Clone, PartialEq)]
pub struct AutomatonNode {
    pub(crate) kind: NodeKind,
    pub(crate) occurs: Occurs,
    pub(crate) next: Vec<NodeId>,
    pub(crate) content_emptiable: bool,
}

impl AutomatonNode {
    pub(crate) fn new(kind: NodeKind, occurs: Occurs) -> Self {
        Self {
            kind,
            occurs,
            next: Vec::new(),
            content_emptiable: false,
        }
    }

    /// The node kind
    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    /// The node kind without data
    pub fn node_type(&self) -> NodeType {
        match self.kind {
            NodeKind::Element(_) => NodeType::Element,
            NodeKind::Sequence => NodeType::Sequence,
            NodeKind::Choice => NodeType::Choice,
            NodeKind::All => NodeType::All,
            NodeKind::SubstitutionGroup => NodeType::SubstitutionGroup,
            NodeKind::Wildcard(_) => NodeType::Wildcard,
        }
    }

    /// Occurrence bounds
    pub fn occurs(&self) -> Occurs {
        self.occurs
    }

    /// Minimum occurrences
    pub fn min_occurs(&self) -> u32 {
        self.occurs.min
    }

    /// Maximum occurrences (None = unbounded)
    pub fn max_occurs(&self) -> Option<u32> {
        self.occurs.max
    }

    /// Outgoing edges in declaration order.
    ///
    /// ELEMENT: its content model, if any. Groups: member particles.
    /// SUBSTITUTION_GROUP: the head followed by every substitute.
    pub fn next_states(&self) -> &[NodeId] {
        &self.next
    }

    /// Element data, for ELEMENT nodes
    pub fn element(&self) -> Option<&ElementInfo> {
        match &self.kind {
            NodeKind::Element(info) => Some(info),
            _ => None,
        }
    }

    /// Wildcard, for WILDCARD nodes
    pub fn wildcard(&self) -> Option<&Wildcard> {
        match &self.kind {
            NodeKind::Wildcard(wildcard) => Some(wildcard),
            _ => None,
        }
    }

    /// Whether one occurrence of this node can match no document elements.
    /// Always false for elements and wildcards.
    pub fn content_emptiable(&self) -> bool {
        self.content_emptiable
    }

    /// Whether this node may be absent altogether
    pub fn is_emptiable(&self) -> bool {
        self.occurs.is_emptiable() || self.content_emptiable
    }

    /// Whether `count` occurrences satisfy the lower bound. Occurrences
    /// still missing are acceptable when each could match nothing.
    pub fn is_satisfied_by(&self, count: u64) -> bool {
        !self.occurs.is_missing(count) || self.content_emptiable
    }

    /// Check whether a document element name matches this node directly
    pub fn matches(&self, name: &QName) -> bool {
        match &self.kind {
            NodeKind::Element(info) => !info.abstract_element && info.name == *name,
            NodeKind::Wildcard(wildcard) => wildcard.matches(name),
            _ => false,
        }
    }
}

/// Immutable grammar graph for one root element
#[derive(Debug, Clone, PartialEq)]
pub struct Automaton {
    pub(crate) nodes: Vec<AutomatonNode>,
    pub(crate) start: NodeId,
    pub(crate) root: ElementId,
}

impl Automaton {
    /// The start node: the root ELEMENT, or a SUBSTITUTION_GROUP when the
    /// root element heads one
    pub fn start(&self) -> NodeId {
        self.start
    }

    /// The start node itself
    pub fn start_node(&self) -> &AutomatonNode {
        // Automatons only come out of the generator, and `start` is a handle
        // it allocated
        &self.nodes[self.start.0]
    }

    /// Declaration the automaton was built for
    pub fn root_element(&self) -> ElementId {
        self.root
    }

    /// Node by handle
    pub fn get(&self, id: NodeId) -> Option<&AutomatonNode> {
        self.nodes.get(id.0)
    }

    /// Node by handle; a dangling handle is an internal inconsistency
    pub fn node(&self, id: NodeId) -> Result<&AutomatonNode> {
        self.nodes
            .get(id.0)
            .ok_or_else(|| Error::internal(format!("automaton has no node {}", id)))
    }

    /// Target of edge `position` of node `id`
    pub fn edge(&self, id: NodeId, position: usize) -> Result<NodeId> {
        self.node(id)?
            .next
            .get(position)
            .copied()
            .ok_or_else(|| Error::internal(format!("node {} has no edge {}", id, position)))
    }

    /// Number of nodes
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Always false; an automaton holds at least its start node
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All nodes with their handles
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &AutomatonNode)> {
        self.nodes.iter().enumerate().map(|(i, node)| (NodeId(i), node))
    }

    /// Element names that can begin a fresh occurrence of `id`
    pub fn first_names(&self, id: NodeId) -> Vec<QName> {
        let mut names = Vec::new();
        self.collect_first_names(id, &mut names);
        names
    }

    fn collect_first_names(&self, id: NodeId, names: &mut Vec<QName>) {
        let Some(node) = self.get(id) else { return };
        match &node.kind {
            NodeKind::Element(info) => {
                if !info.abstract_element && !names.contains(&info.name) {
                    names.push(info.name.clone());
                }
            }
            NodeKind::Wildcard(_) => {}
            NodeKind::Sequence => {
                for &edge in &node.next {
                    self.collect_first_names(edge, names);
                    if !self.get(edge).is_some_and(AutomatonNode::is_emptiable) {
                        break;
                    }
                }
            }
            NodeKind::Choice | NodeKind::All | NodeKind::SubstitutionGroup => {
                for &edge in &node.next {
                    self.collect_first_names(edge, names);
                }
            }
        }
    }

    /// Element names of which at least one must still appear for `id` to
    /// be satisfied
    pub fn required_names(&self, id: NodeId) -> Vec<QName> {
        let Some(node) = self.get(id) else {
            return Vec::new();
        };
        match &node.kind {
            NodeKind::Element(_) | NodeKind::Wildcard(_) | NodeKind::SubstitutionGroup => {
                self.first_names(id)
            }
            NodeKind::Sequence | NodeKind::All => node
                .next
                .iter()
                .find(|&&edge| !self.get(edge).is_some_and(AutomatonNode::is_emptiable))
                .map(|&edge| self.required_names(edge))
                .unwrap_or_default(),
            NodeKind::Choice => {
                let mut names = Vec::new();
                for &edge in &node.next {
                    for name in self.required_names(edge) {
                        if !names.contains(&name) {
                            names.push(name);
                        }
                    }
                }
                names
            }
        }
    }

    fn describe(&self, id: NodeId) -> String {
        let Some(node) = self.get(id) else {
            return format!("{} <missing>", id);
        };
        match &node.kind {
            NodeKind::Element(info) => {
                format!("{} element {} {} ({})", id, info.name, node.occurs, info.type_info.kind)
            }
            NodeKind::Wildcard(wildcard) => format!(
                "{} any {} ({})",
                id, node.occurs, wildcard.process_contents
            ),
            _ => format!("{} {} {}", id, node.node_type(), node.occurs),
        }
    }
}

impl fmt::Display for Automaton {
    /// One line per node followed by its edges
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (id, node) in self.iter() {
            let marker = if id == self.start { "*" } else { " " };
            write!(f, "{}{}", marker, self.describe(id))?;
            if !node.next.is_empty() {
                let edges: Vec<String> = node.next.iter().map(|n| n.to_string()).collect();
                write!(f, " -> [{}]", edges.join(", "))?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
