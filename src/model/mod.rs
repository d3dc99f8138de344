//! In-memory process graph consumed read-only by the engine.
//!
//! Definitions arrive already parsed, either deserialized from JSON or
//! assembled with [`ProcessBuilder`]. XML parsing is not handled here.

mod builder;
mod elements;

pub use builder::ProcessBuilder;
pub use elements::{
    Element, ElementKind, IoMapping, ProcessDefinition, SequenceFlow, TaskDefinition,
};
