//! XSD Element declarations
//!
//! This module implements element declarations as the content model sees
//! them: a qualified name, a resolved type classification, the particle
//! content of complex types and substitution group membership.
//!
//! Reference: https://www.w3.org/TR/xmlschema11-1/#Element_Declarations

use crate::namespaces::QName;
use serde::{Deserialize, Serialize};

use super::groups::Particle;

/// Classification of an element's resolved type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeKind {
    /// Atomic simple type
    Atomic,
    /// List simple type
    List,
    /// Union simple type
    Union,
    /// Complex type
    Complex,
}

impl TypeKind {
    /// Check if this is a simple type classification
    pub fn is_simple(&self) -> bool {
        !matches!(self, TypeKind::Complex)
    }
}

impl std::fmt::Display for TypeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Atomic => write!(f, "atomic"),
            Self::List => write!(f, "list"),
            Self::Union => write!(f, "union"),
            Self::Complex => write!(f, "complex"),
        }
    }
}

/// Resolved type information of an element
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeInfo {
    /// Type classification
    pub kind: TypeKind,
    /// Name of the type, when it is a named type
    #[serde(default)]
    pub name: Option<QName>,
    /// Whether character data may be interleaved with child elements
    #[serde(default)]
    pub mixed: bool,
}

impl TypeInfo {
    /// Create type info of the given kind
    pub fn new(kind: TypeKind) -> Self {
        Self {
            kind,
            name: None,
            mixed: false,
        }
    }

    /// Atomic simple type
    pub fn atomic() -> Self {
        Self::new(TypeKind::Atomic)
    }

    /// List simple type
    pub fn list() -> Self {
        Self::new(TypeKind::List)
    }

    /// Union simple type
    pub fn union() -> Self {
        Self::new(TypeKind::Union)
    }

    /// Complex type with element-only content
    pub fn complex() -> Self {
        Self::new(TypeKind::Complex)
    }

    /// Complex type with mixed content
    pub fn mixed() -> Self {
        Self {
            mixed: true,
            ..Self::complex()
        }
    }

    /// Set the type name
    pub fn named(mut self, name: QName) -> Self {
        self.name = Some(name);
        self
    }

    /// Whether text content is permitted
    pub fn allows_text(&self) -> bool {
        self.kind.is_simple() || self.mixed
    }
}

/// XSD Element declaration
#[derive(Debug, Clone, PartialEq)]
pub struct ElementDecl {
    /// Element name
    pub name: QName,

    /// Resolved type classification
    pub type_info: TypeInfo,

    /// Content model particle (complex types with element content only)
    pub content: Option<Particle>,

    /// Whether this element is abstract
    pub abstract_element: bool,

    /// Whether this element is nillable
    pub nillable: bool,

    /// Substitution group head element name
    pub substitution_group: Option<QName>,
}

impl ElementDecl {
    /// Create an element declaration without content
    pub fn new(name: QName, type_info: TypeInfo) -> Self {
        Self {
            name,
            type_info,
            content: None,
            abstract_element: false,
            nillable: false,
            substitution_group: None,
        }
    }

    /// Element with an atomic simple type
    pub fn atomic(name: QName) -> Self {
        Self::new(name, TypeInfo::atomic())
    }

    /// Element with a complex type and the given content model
    pub fn complex(name: QName, content: Particle) -> Self {
        Self::new(name, TypeInfo::complex()).with_content(content)
    }

    /// Set the content model
    pub fn with_content(mut self, content: Particle) -> Self {
        self.content = Some(content);
        self
    }

    /// Set the type information
    pub fn with_type(mut self, type_info: TypeInfo) -> Self {
        self.type_info = type_info;
        self
    }

    /// Mark as nillable
    pub fn nillable(mut self) -> Self {
        self.nillable = true;
        self
    }

    /// Mark as abstract
    pub fn abstract_element(mut self) -> Self {
        self.abstract_element = true;
        self
    }

    /// Declare membership in the substitution group headed by `head`
    pub fn substitutes(mut self, head: QName) -> Self {
        self.substitution_group = Some(head);
        self
    }
}
