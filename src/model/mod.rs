//! XML Schema model
//!
//! The resolved, type-annotated particle tree that automatons are built
//! from. Parsing schema documents is not part of this crate; declarations
//! are assembled through [`SchemaSet`] directly or loaded from a JSON model
//! description (see [`crate::loaders`]).

pub mod elements;
pub mod groups;
pub mod particles;
pub mod schema;
pub mod wildcards;

// Re-exports
pub use elements::{ElementDecl, TypeInfo, TypeKind};
pub use groups::{Compositor, ModelGroup, Particle, Term};
pub use particles::{parse_occurs, Occurs};
pub use schema::{ElementId, SchemaModel, SchemaSet};
pub use wildcards::{NamespaceConstraint, ProcessContents, Wildcard};
