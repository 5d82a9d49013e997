//! # xmlschema-docpath
//!
//! Matches XML documents, event by event, against the content models of an
//! XML Schema.
//!
//! A root element's resolved particle tree is compiled once into an
//! [`Automaton`]: a possibly cyclic graph of element, sequence, choice, all,
//! substitution group and wildcard nodes. A [`PathFinder`] then walks a
//! document through it, backtracking over ambiguous branches, and records
//! the interpretation it settles on as a [`DocumentPath`].
//!
//! ## Features
//!
//! - Memoized automaton generation; recursive schemas yield back-edges
//! - Substitution groups, abstract and nillable elements, wildcards
//! - Backtracking across events with explicit undo records
//! - Streaming (quick-xml) and tree (roxmltree) event sources
//! - JSON model descriptions for the schema side
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use xmlschema_docpath::{load_model_file, read_str, AutomatonGenerator, PathFinder, QName};
//!
//! let schema = load_model_file("model.json")?;
//! let root: QName = "{urn:example}root".parse()?;
//! let automaton = Arc::new(AutomatonGenerator::new(&schema).generate_global(&root)?);
//!
//! let mut finder = PathFinder::new(automaton);
//! read_str("<root xmlns='urn:example'/>", &mut finder)?;
//! println!("{}", finder.into_path());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

// Foundation
pub mod error;
pub mod limits;

// Names
pub mod names;
pub mod namespaces;

// Schema side
pub mod loaders;
pub mod model;

// Automatons and document walks
pub mod automaton;
pub mod docpath;

// Re-exports for convenience
pub use automaton::{Automaton, AutomatonCache, AutomatonGenerator, AutomatonNode, NodeId, NodeKind, NodeType};
pub use docpath::{
    read_file, read_str, walk_dom, walk_str, Attribute, ContentHandler, Direction, DocId, DocumentNode,
    DocumentPath, NodeState, PathFinder, PathStep, WalkStats,
};
pub use error::{Error, Result, SchemaStructureError, ValidationFailure};
pub use limits::Limits;
pub use loaders::{load_model_file, load_model_str, ModelLoader};
pub use model::{ElementDecl, ElementId, Occurs, Particle, SchemaModel, SchemaSet, TypeInfo, TypeKind};
pub use namespaces::QName;

/// Version of the xmlschema-docpath library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
