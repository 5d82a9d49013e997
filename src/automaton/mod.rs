//! Content model automatons
//!
//! An [`Automaton`] is the grammar graph of one root element, built once by
//! [`AutomatonGenerator`] and shared read-only by every document walk.

pub mod cache;
pub mod generator;
pub mod node;

// Re-exports
pub use cache::AutomatonCache;
pub use generator::AutomatonGenerator;
pub use node::{Automaton, AutomatonNode, ElementInfo, NodeId, NodeKind, NodeType};
