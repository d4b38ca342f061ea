//! The Mica annotations database
//!
//! Compile-time facts (types, captures, resolved symbols, references,
//! definition sites) threaded between phases, keyed by the identity of tree
//! nodes and symbols. The typer speculates through a clonable local overlay
//! and commits winners into the global store.

pub mod keys;
pub mod overlay;
pub mod store;

pub use keys::{add_reference, annotate_block_type, annotate_value_type, anns};
pub use overlay::Annotations;
pub use store::{Annotation, AnnotationId, AnnotationStore, AnnotationsDb, Fact, FactValue, Key};
