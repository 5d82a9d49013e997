//! Automaton generation
//!
//! Walks a root element's particle tree depth-first and produces the
//! [`Automaton`] reachable from it. Element nodes are memoized by
//! declaration identity and occurrence bounds, and element content by
//! declaration identity, so a recursive schema yields back-edges and a node
//! count independent of any document.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::error::{Result, SchemaStructureError};
use crate::limits::Limits;
use crate::model::{Compositor, ElementId, ModelGroup, Occurs, Particle, SchemaModel, Term};
use crate::namespaces::QName;

use super::node::{Automaton, AutomatonNode, ElementInfo, NodeId, NodeKind};

/// Builds automatons from a schema model
pub struct AutomatonGenerator<'a, M: SchemaModel + ?Sized> {
    model: &'a M,
    limits: Limits,
    nodes: Vec<AutomatonNode>,
    elements: HashMap<(ElementId, Occurs), NodeId>,
    substitutions: HashMap<(ElementId, Occurs), NodeId>,
    contents: HashMap<ElementId, Option<NodeId>>,
    /// Named groups being expanded since the last element boundary
    open_groups: Vec<QName>,
}

impl<'a, M: SchemaModel + ?Sized> AutomatonGenerator<'a, M> {
    /// Create a generator using the model's limits
    pub fn new(model: &'a M) -> Self {
        Self::with_limits(model, model.limits())
    }

    /// Create a generator with explicit limits
    pub fn with_limits(model: &'a M, limits: Limits) -> Self {
        Self {
            model,
            limits,
            nodes: Vec::new(),
            elements: HashMap::new(),
            substitutions: HashMap::new(),
            contents: HashMap::new(),
            open_groups: Vec::new(),
        }
    }

    /// Generate the automaton for a root element declaration.
    ///
    /// On error nothing is returned; the partially built graph is dropped
    /// with the generator.
    pub fn generate(mut self, root: ElementId) -> Result<Automaton> {
        let start = self.element_particle(root, Occurs::once())?;
        self.compute_emptiable();

        let automaton = Automaton {
            nodes: self.nodes,
            start,
            root,
        };
        debug!(
            root = %describe_root(self.model, root),
            nodes = automaton.len(),
            "Generated automaton"
        );
        Ok(automaton)
    }

    /// Generate the automaton for a global element looked up by name
    pub fn generate_global(self, name: &QName) -> Result<Automaton> {
        let root = self.model.global_element(name).ok_or_else(|| {
            SchemaStructureError::new("root element is not declared globally")
                .with_component(name.to_string())
        })?;
        self.generate(root)
    }

    fn push(&mut self, node: AutomatonNode) -> Result<NodeId> {
        let id = NodeId(self.nodes.len());
        self.nodes.push(node);
        self.limits.check_automaton_nodes(self.nodes.len())?;
        Ok(id)
    }

    fn particle(&mut self, particle: &'a Particle) -> Result<NodeId> {
        let model = self.model;
        match &particle.term {
            Term::Element(id) => self.element_particle(*id, particle.occurs),
            Term::ElementRef(name) => {
                let id = model.global_element(name).ok_or_else(|| {
                    SchemaStructureError::new("unresolved element reference")
                        .with_component(name.to_string())
                })?;
                self.element_particle(id, particle.occurs)
            }
            Term::Group(group) => self.group(group, particle.occurs),
            Term::GroupRef(name) => {
                let group = model.named_group(name).ok_or_else(|| {
                    SchemaStructureError::new("unresolved model group reference")
                        .with_component(name.to_string())
                })?;
                if self.open_groups.contains(name) {
                    return Err(SchemaStructureError::new("circular model group reference")
                        .with_component(name.to_string())
                        .into());
                }
                self.open_groups.push(name.clone());
                let node = self.group(group, particle.occurs);
                self.open_groups.pop();
                node
            }
            Term::Any(wildcard) => {
                self.push(AutomatonNode::new(NodeKind::Wildcard(wildcard.clone()), particle.occurs))
            }
        }
    }

    fn group(&mut self, group: &'a ModelGroup, occurs: Occurs) -> Result<NodeId> {
        let node = self.push(AutomatonNode::new(group_kind(group.compositor), occurs))?;
        self.group_members(node, group)?;
        Ok(node)
    }

    fn group_members(&mut self, node: NodeId, group: &'a ModelGroup) -> Result<()> {
        for member in &group.particles {
            let edge = self.particle(member)?;
            self.nodes[node.0].next.push(edge);
        }
        Ok(())
    }

    /// An element particle: a plain ELEMENT node, or a SUBSTITUTION_GROUP
    /// node when the element heads a substitution group
    fn element_particle(&mut self, id: ElementId, occurs: Occurs) -> Result<NodeId> {
        let members = self.substitution_members(id);
        if members.is_empty() {
            return self.element(id, occurs);
        }
        if let Some(&node) = self.substitutions.get(&(id, occurs)) {
            return Ok(node);
        }

        let node = self.push(AutomatonNode::new(NodeKind::SubstitutionGroup, occurs))?;
        self.substitutions.insert((id, occurs), node);
        for member in std::iter::once(id).chain(members) {
            let edge = self.element(member, Occurs::once())?;
            self.nodes[node.0].next.push(edge);
        }
        Ok(node)
    }

    /// Every element that may stand in for `head`, transitively, in
    /// declaration order
    fn substitution_members(&self, head: ElementId) -> Vec<ElementId> {
        let mut seen = HashSet::from([head]);
        let mut members = Vec::new();
        let mut pending: Vec<ElementId> = self.model.substitutes(head).into_iter().rev().collect();
        while let Some(member) = pending.pop() {
            if seen.insert(member) {
                members.push(member);
                pending.extend(self.model.substitutes(member).into_iter().rev());
            }
        }
        members
    }

    fn element(&mut self, id: ElementId, occurs: Occurs) -> Result<NodeId> {
        if let Some(&node) = self.elements.get(&(id, occurs)) {
            return Ok(node);
        }

        let model = self.model;
        let decl = model.element(id).ok_or_else(|| {
            SchemaStructureError::new(format!("unknown element declaration {}", id.index()))
        })?;
        if decl.type_info.kind.is_simple() && decl.content.is_some() {
            return Err(SchemaStructureError::new("simple type with element content")
                .with_component(decl.name.to_string())
                .into());
        }

        let info = ElementInfo {
            name: decl.name.clone(),
            type_info: decl.type_info.clone(),
            nillable: decl.nillable,
            abstract_element: decl.abstract_element,
            declaration: id,
        };
        let node = self.push(AutomatonNode::new(NodeKind::Element(info), occurs))?;
        self.elements.insert((id, occurs), node);

        if let Some(content) = self.content(id)? {
            self.nodes[node.0].next.push(content);
        }
        Ok(node)
    }

    /// The content node of a declaration, shared by every ELEMENT node
    /// built from it. The node is registered before its members are
    /// expanded so that recursion finds it.
    fn content(&mut self, id: ElementId) -> Result<Option<NodeId>> {
        if let Some(&content) = self.contents.get(&id) {
            return Ok(content);
        }

        let model = self.model;
        let Some(particle) = model.element(id).and_then(|decl| decl.content.as_ref()) else {
            self.contents.insert(id, None);
            return Ok(None);
        };

        let saved_groups = std::mem::take(&mut self.open_groups);
        let content = match &particle.term {
            Term::Group(group) => {
                let node = self.push(AutomatonNode::new(group_kind(group.compositor), particle.occurs))?;
                self.contents.insert(id, Some(node));
                self.group_members(node, group)?;
                node
            }
            Term::GroupRef(name) => {
                let group = model.named_group(name).ok_or_else(|| {
                    SchemaStructureError::new("unresolved model group reference")
                        .with_component(name.to_string())
                })?;
                let node = self.push(AutomatonNode::new(group_kind(group.compositor), particle.occurs))?;
                self.contents.insert(id, Some(node));
                self.open_groups.push(name.clone());
                self.group_members(node, group)?;
                node
            }
            // A lone element or wildcard is wrapped in a sequence
            Term::Element(_) | Term::ElementRef(_) | Term::Any(_) => {
                let node = self.push(AutomatonNode::new(NodeKind::Sequence, Occurs::once()))?;
                self.contents.insert(id, Some(node));
                let edge = self.particle(particle)?;
                self.nodes[node.0].next.push(edge);
                node
            }
        };
        self.open_groups = saved_groups;
        Ok(Some(content))
    }

    /// Fill in `content_emptiable` for every group node. Groups only nest
    /// through elements, which are never content-emptiable, so the
    /// recursion below stops at element boundaries.
    fn compute_emptiable(&mut self) {
        let mut memo: Vec<Option<bool>> = vec![None; self.nodes.len()];
        for index in 0..self.nodes.len() {
            let emptiable = content_emptiable(&self.nodes, NodeId(index), &mut memo);
            self.nodes[index].content_emptiable = emptiable;
        }
    }
}

fn content_emptiable(nodes: &[AutomatonNode], id: NodeId, memo: &mut Vec<Option<bool>>) -> bool {
    if let Some(known) = memo[id.0] {
        return known;
    }
    let node = &nodes[id.0];
    let member_emptiable = |edge: NodeId, memo: &mut Vec<Option<bool>>| {
        nodes[edge.0].occurs.is_emptiable() || content_emptiable(nodes, edge, memo)
    };
    let emptiable = match node.kind {
        NodeKind::Element(_) | NodeKind::Wildcard(_) => false,
        NodeKind::Sequence | NodeKind::All => {
            node.next.iter().all(|&edge| member_emptiable(edge, memo))
        }
        NodeKind::Choice | NodeKind::SubstitutionGroup => {
            node.next.is_empty() || node.next.iter().any(|&edge| member_emptiable(edge, memo))
        }
    };
    memo[id.0] = Some(emptiable);
    emptiable
}

fn group_kind(compositor: Compositor) -> NodeKind {
    match compositor {
        Compositor::Sequence => NodeKind::Sequence,
        Compositor::Choice => NodeKind::Choice,
        Compositor::All => NodeKind::All,
    }
}

fn describe_root<M: SchemaModel + ?Sized>(model: &M, root: ElementId) -> String {
    model
        .element(root)
        .map(|decl| decl.name.to_string())
        .unwrap_or_else(|| format!("#{}", root.index()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automaton::node::NodeType;
    use crate::error::Error;
    use crate::model::{ElementDecl, SchemaSet, TypeInfo, Wildcard};

    fn qn(local: &str) -> QName {
        QName::namespaced("urn:test", local)
    }

    #[test]
    fn test_simple_sequence() {
        let mut schema = SchemaSet::new(Some("urn:test"));
        let a = schema.add_local(ElementDecl::atomic(qn("a")));
        let root = schema
            .add_global(ElementDecl::complex(
                qn("root"),
                Particle::sequence(
                    vec![
                        Particle::element(a, Occurs::optional()),
                        Particle::any(Wildcard::any(), Occurs::zero_or_more()),
                    ],
                    Occurs::once(),
                ),
            ))
            .unwrap();

        let automaton = AutomatonGenerator::new(&schema).generate(root).unwrap();
        let start = automaton.start_node();
        assert_eq!(start.node_type(), NodeType::Element);
        assert_eq!(start.element().unwrap().name, qn("root"));

        let seq = automaton.node(start.next_states()[0]).unwrap();
        assert_eq!(seq.node_type(), NodeType::Sequence);
        assert!(seq.content_emptiable());

        let types: Vec<NodeType> = seq
            .next_states()
            .iter()
            .map(|&id| automaton.node(id).unwrap().node_type())
            .collect();
        assert_eq!(types, vec![NodeType::Element, NodeType::Wildcard]);
        assert_eq!(automaton.len(), 4);
    }

    #[test]
    fn test_recursive_element_reuses_nodes() {
        let mut schema = SchemaSet::new(None);
        let node = schema
            .add_global(ElementDecl::new(qn("node"), TypeInfo::complex()))
            .unwrap();
        schema
            .set_content(
                node,
                Particle::sequence(vec![Particle::element(node, Occurs::optional())], Occurs::once()),
            )
            .unwrap();

        let automaton = AutomatonGenerator::new(&schema).generate(node).unwrap();
        // root element, shared content sequence, optional self reference
        assert_eq!(automaton.len(), 3);

        let content = automaton.start_node().next_states()[0];
        let inner = automaton.node(content).unwrap().next_states()[0];
        assert_eq!(automaton.node(inner).unwrap().next_states(), &[content]);
    }

    #[test]
    fn test_dangling_reference() {
        let mut schema = SchemaSet::new(None);
        let root = schema
            .add_global(ElementDecl::complex(
                qn("root"),
                Particle::sequence(
                    vec![Particle::element_ref(qn("missing"), Occurs::once())],
                    Occurs::once(),
                ),
            ))
            .unwrap();

        let err = AutomatonGenerator::new(&schema).generate(root).unwrap_err();
        assert!(matches!(err, Error::SchemaStructure(_)));
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn test_circular_group_reference() {
        let mut schema = SchemaSet::new(None);
        schema
            .add_group(
                qn("loop"),
                ModelGroup::new(
                    Compositor::Sequence,
                    vec![Particle::group_ref(qn("loop"), Occurs::optional())],
                ),
            )
            .unwrap();
        let root = schema
            .add_global(ElementDecl::complex(
                qn("root"),
                Particle::group_ref(qn("loop"), Occurs::once()),
            ))
            .unwrap();

        let err = AutomatonGenerator::new(&schema).generate(root).unwrap_err();
        assert!(err.to_string().contains("circular"));
    }

    #[test]
    fn test_node_limit() {
        let mut schema = SchemaSet::new(None);
        let a = schema.add_local(ElementDecl::atomic(qn("a")));
        let root = schema
            .add_global(ElementDecl::complex(
                qn("root"),
                Particle::sequence(
                    vec![Particle::element(a, Occurs::once()); 10],
                    Occurs::once(),
                ),
            ))
            .unwrap();

        let limits = Limits {
            max_automaton_nodes: 2,
            ..Limits::default()
        };
        let err = AutomatonGenerator::with_limits(&schema, limits)
            .generate(root)
            .unwrap_err();
        assert!(matches!(err, Error::LimitExceeded(_)));
    }

    #[test]
    fn test_transitive_substitutes() {
        let mut schema = SchemaSet::new(None);
        let head = schema
            .add_global(ElementDecl::atomic(qn("head")).abstract_element())
            .unwrap();
        let s1 = schema
            .add_global(ElementDecl::atomic(qn("s1")).substitutes(qn("head")))
            .unwrap();
        let s2 = schema
            .add_global(ElementDecl::atomic(qn("s2")).substitutes(qn("head")))
            .unwrap();
        let s1a = schema
            .add_global(ElementDecl::atomic(qn("s1a")).substitutes(qn("s1")))
            .unwrap();

        let generator = AutomatonGenerator::new(&schema);
        assert_eq!(generator.substitution_members(head), vec![s1, s1a, s2]);
    }
}
