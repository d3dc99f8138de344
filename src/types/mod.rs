//! Core types for the BPMN engine.
//!
//! This module provides foundational types used throughout the system:
//! - **IDs**: Strongly-typed identifiers (ElementId, FlowId, BpmnProcessId)
//! - **Errors**: Application error types with thiserror derives
//! - **Config**: Configuration structures for the engine and observability

mod config;
mod errors;
mod ids;

pub use config::{Config, EngineConfig, KeyGeneratorKind, ObservabilityConfig};
pub use errors::{Error, Result};
pub use ids::{BpmnProcessId, ElementId, FlowId};
