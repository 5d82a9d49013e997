//! Schema model capability and its in-memory implementation
//!
//! The automaton generator reads element declarations, named groups and
//! substitution group membership through the [`SchemaModel`] trait.
//! [`SchemaSet`] is a resolved, in-memory set of declarations that
//! implements it.

use indexmap::IndexMap;

use crate::error::{Error, Result, SchemaStructureError};
use crate::limits::Limits;
use crate::namespaces::QName;

use super::elements::ElementDecl;
use super::groups::{ModelGroup, Particle};

/// Identity of an element declaration within a schema model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementId(usize);

impl ElementId {
    /// Create an identity from a raw index
    pub fn new(index: usize) -> Self {
        Self(index)
    }

    /// Raw index of this identity
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Read-only access to resolved schema declarations
pub trait SchemaModel {
    /// Target namespace of the schema
    fn target_namespace(&self) -> Option<&str>;

    /// Element declaration by identity
    fn element(&self, id: ElementId) -> Option<&ElementDecl>;

    /// Global element declaration by qualified name
    fn global_element(&self, name: &QName) -> Option<ElementId>;

    /// Named model group by qualified name
    fn named_group(&self, name: &QName) -> Option<&ModelGroup>;

    /// Direct members of the substitution group headed by `head`, in
    /// declaration order
    fn substitutes(&self, head: ElementId) -> Vec<ElementId>;

    /// Limits to apply when building automatons from this model
    fn limits(&self) -> Limits {
        Limits::default()
    }
}

/// In-memory schema model
#[derive(Debug, Clone, Default)]
pub struct SchemaSet {
    target_namespace: Option<String>,
    elements: Vec<ElementDecl>,
    globals: IndexMap<QName, ElementId>,
    groups: IndexMap<QName, ModelGroup>,
    limits: Limits,
}

impl SchemaSet {
    /// Create an empty schema set
    pub fn new(target_namespace: Option<&str>) -> Self {
        Self::with_limits(target_namespace, Limits::default())
    }

    /// Create an empty schema set with explicit limits
    pub fn with_limits(target_namespace: Option<&str>, limits: Limits) -> Self {
        Self {
            target_namespace: target_namespace.map(String::from),
            elements: Vec::new(),
            globals: IndexMap::new(),
            groups: IndexMap::new(),
            limits,
        }
    }

    /// Add a global element declaration
    pub fn add_global(&mut self, decl: ElementDecl) -> Result<ElementId> {
        if self.globals.contains_key(&decl.name) {
            return Err(SchemaStructureError::new("duplicate global element declaration")
                .with_component(decl.name.to_string())
                .into());
        }
        let name = decl.name.clone();
        let id = self.add_local(decl);
        self.globals.insert(name, id);
        Ok(id)
    }

    /// Add a local element declaration
    pub fn add_local(&mut self, decl: ElementDecl) -> ElementId {
        let id = ElementId(self.elements.len());
        self.elements.push(decl);
        id
    }

    /// Add a named model group
    pub fn add_group(&mut self, name: QName, group: ModelGroup) -> Result<()> {
        if self.groups.contains_key(&name) {
            return Err(SchemaStructureError::new("duplicate model group definition")
                .with_component(name.to_string())
                .into());
        }
        self.groups.insert(name, group);
        Ok(())
    }

    /// Replace the content model of a declaration. Lets recursive content
    /// refer to the declaration's own identity.
    pub fn set_content(&mut self, id: ElementId, content: Particle) -> Result<()> {
        let decl = self
            .elements
            .get_mut(id.0)
            .ok_or_else(|| Error::Model(format!("unknown element id {}", id.0)))?;
        decl.content = Some(content);
        Ok(())
    }

    /// Global element declarations in declaration order
    pub fn global_elements(&self) -> impl Iterator<Item = (&QName, ElementId)> {
        self.globals.iter().map(|(name, id)| (name, *id))
    }

    /// Number of element declarations, local and global
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Check if the set holds no declarations
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

impl SchemaModel for SchemaSet {
    fn target_namespace(&self) -> Option<&str> {
        self.target_namespace.as_deref()
    }

    fn element(&self, id: ElementId) -> Option<&ElementDecl> {
        self.elements.get(id.0)
    }

    fn global_element(&self, name: &QName) -> Option<ElementId> {
        self.globals.get(name).copied()
    }

    fn named_group(&self, name: &QName) -> Option<&ModelGroup> {
        self.groups.get(name)
    }

    fn substitutes(&self, head: ElementId) -> Vec<ElementId> {
        let Some(head_decl) = self.element(head) else {
            return Vec::new();
        };
        self.globals
            .values()
            .copied()
            .filter(|id| *id != head)
            .filter(|id| {
                self.elements[id.0].substitution_group.as_ref() == Some(&head_decl.name)
            })
            .collect()
    }

    fn limits(&self) -> Limits {
        self.limits
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::elements::TypeInfo;
    use crate::model::particles::Occurs;

    fn qn(local: &str) -> QName {
        QName::namespaced("urn:test", local)
    }

    #[test]
    fn test_add_and_lookup() {
        let mut schema = SchemaSet::new(Some("urn:test"));
        let a = schema.add_global(ElementDecl::atomic(qn("a"))).unwrap();
        let local = schema.add_local(ElementDecl::atomic(qn("local")));

        assert_eq!(schema.global_element(&qn("a")), Some(a));
        assert_eq!(schema.global_element(&qn("local")), None);
        assert_eq!(schema.element(local).unwrap().name, qn("local"));
        assert_eq!(schema.len(), 2);
        assert_eq!(schema.target_namespace(), Some("urn:test"));
    }

    #[test]
    fn test_duplicate_global() {
        let mut schema = SchemaSet::new(None);
        schema.add_global(ElementDecl::atomic(qn("a"))).unwrap();
        let err = schema.add_global(ElementDecl::atomic(qn("a"))).unwrap_err();
        assert!(matches!(err, Error::SchemaStructure(_)));
    }

    #[test]
    fn test_substitutes_in_declaration_order() {
        let mut schema = SchemaSet::new(None);
        let head = schema
            .add_global(ElementDecl::new(qn("head"), TypeInfo::complex()))
            .unwrap();
        let s2 = schema
            .add_global(ElementDecl::atomic(qn("s2")).substitutes(qn("head")))
            .unwrap();
        schema.add_global(ElementDecl::atomic(qn("unrelated"))).unwrap();
        let s1 = schema
            .add_global(ElementDecl::atomic(qn("s1")).substitutes(qn("head")))
            .unwrap();

        assert_eq!(schema.substitutes(head), vec![s2, s1]);
        assert!(schema.substitutes(s1).is_empty());
    }

    #[test]
    fn test_set_content() {
        let mut schema = SchemaSet::new(None);
        let node = schema
            .add_global(ElementDecl::new(qn("node"), TypeInfo::complex()))
            .unwrap();
        schema
            .set_content(node, Particle::element(node, Occurs::zero_or_more()))
            .unwrap();
        assert!(schema.element(node).unwrap().content.is_some());
        assert!(schema
            .set_content(ElementId::new(99), Particle::element(node, Occurs::once()))
            .is_err());
    }
}
