//! Document walks
//!
//! A [`PathFinder`] is fed the events of one document, places each element
//! in a shared [`crate::automaton::Automaton`] and builds the document node
//! tree and step path that record how the document was matched.

pub mod document;
pub mod events;
pub mod finder;
pub mod path;

// Re-exports
pub use document::{DocId, DocumentNode, NodeState};
pub use events::{read_file, read_str, walk_dom, walk_str, Attribute, ContentHandler};
pub use finder::{PathFinder, WalkStats};
pub use path::{Direction, DocumentPath, PathStep};
