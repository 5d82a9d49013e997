//! XSD Model Groups and particles
//!
//! This module implements the particle tree of XSD content models:
//! - xs:sequence - ordered content
//! - xs:choice - alternative content
//! - xs:all - unordered content
//!
//! plus element declarations, element references, named group references
//! and wildcards as particle terms.
//!
//! Reference: https://www.w3.org/TR/xmlschema11-1/#Model_Groups

use crate::namespaces::QName;
use serde::{Deserialize, Serialize};

use super::particles::Occurs;
use super::schema::ElementId;
use super::wildcards::Wildcard;

/// Model group compositor type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compositor {
    /// Ordered sequence of particles
    #[default]
    Sequence,
    /// One of multiple alternatives
    Choice,
    /// Unordered set of particles
    All,
}

impl std::fmt::Display for Compositor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sequence => write!(f, "sequence"),
            Self::Choice => write!(f, "choice"),
            Self::All => write!(f, "all"),
        }
    }
}

/// The term of a particle
#[derive(Debug, Clone, PartialEq)]
pub enum Term {
    /// Element declaration, by identity
    Element(ElementId),
    /// Reference to a global element declaration, resolved by name
    ElementRef(QName),
    /// Nested model group
    Group(ModelGroup),
    /// Reference to a named model group
    GroupRef(QName),
    /// Wildcard (xs:any)
    Any(Wildcard),
}

/// A term together with its occurrence bounds
#[derive(Debug, Clone, PartialEq)]
pub struct Particle {
    /// Occurrence constraints
    pub occurs: Occurs,
    /// The particle's term
    pub term: Term,
}

impl Particle {
    /// Create a new particle
    pub fn new(term: Term, occurs: Occurs) -> Self {
        Self { occurs, term }
    }

    /// Element declaration particle
    pub fn element(id: ElementId, occurs: Occurs) -> Self {
        Self::new(Term::Element(id), occurs)
    }

    /// Element reference particle, resolved by name
    pub fn element_ref(name: QName, occurs: Occurs) -> Self {
        Self::new(Term::ElementRef(name), occurs)
    }

    /// Wildcard particle
    pub fn any(wildcard: Wildcard, occurs: Occurs) -> Self {
        Self::new(Term::Any(wildcard), occurs)
    }

    /// Named group reference particle
    pub fn group_ref(name: QName, occurs: Occurs) -> Self {
        Self::new(Term::GroupRef(name), occurs)
    }

    /// Sequence particle
    pub fn sequence(particles: Vec<Particle>, occurs: Occurs) -> Self {
        Self::new(Term::Group(ModelGroup::new(Compositor::Sequence, particles)), occurs)
    }

    /// Choice particle
    pub fn choice(particles: Vec<Particle>, occurs: Occurs) -> Self {
        Self::new(Term::Group(ModelGroup::new(Compositor::Choice, particles)), occurs)
    }

    /// All particle
    pub fn all(particles: Vec<Particle>, occurs: Occurs) -> Self {
        Self::new(Term::Group(ModelGroup::new(Compositor::All, particles)), occurs)
    }
}

/// XSD Model Group (sequence, choice, all)
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ModelGroup {
    /// Model type (sequence, choice, all)
    pub compositor: Compositor,
    /// Particles in this group, in declaration order
    pub particles: Vec<Particle>,
}

impl ModelGroup {
    /// Create a new model group
    pub fn new(compositor: Compositor, particles: Vec<Particle>) -> Self {
        Self {
            compositor,
            particles,
        }
    }

    /// Check if group is empty
    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }

    /// Number of particles
    pub fn len(&self) -> usize {
        self.particles.len()
    }
}
