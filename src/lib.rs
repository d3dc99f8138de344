//! # BPMN Engine - Process Execution Runtime
//!
//! Rust implementation of a lightweight BPMN execution runtime providing:
//! - Process definition registry with versioning
//! - Exclusive and parallel gateway routing
//! - A small condition/expression language over process variables
//! - Service task jobs driven by registered handlers
//! - Hierarchical variable scopes with explicit propagation
//!
//! ## Architecture
//!
//! The engine owns definitions, instances and handlers; each instance is
//! walked by a token-based orchestrator under its own lock:
//! ```text
//!                    ┌──────────────────────────────────┐
//!   create/run    →  │            BpmnEngine            │
//!                    │  ┌──────────┐  ┌──────────────┐  │
//!                    │  │Definition│  │   Handler    │  │
//!                    │  │ Registry │  │   Registry   │  │
//!                    │  └──────────┘  └──────────────┘  │
//!                    │  ┌──────────────────────────┐    │
//!                    │  │ Instance (Mutex)         │    │
//!                    │  │  Orchestrator → Gateway  │    │
//!                    │  │       ↓          ↓       │    │
//!                    │  │     Jobs     Expression  │    │
//!                    │  │       ↓                  │    │
//!                    │  │   Variable scopes        │    │
//!                    │  └──────────────────────────┘    │
//!                    └──────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```
//! use bpmn_engine::model::{ProcessBuilder, TaskDefinition};
//! use bpmn_engine::{BpmnEngine, InstanceState, VariableScope};
//!
//! let definition = ProcessBuilder::new("order")
//!     .start_event("start")
//!     .service_task("charge", TaskDefinition::new().task_type("payment"))
//!     .end_event("end")
//!     .flow("start", "charge")
//!     .flow("charge", "end")
//!     .build()
//!     .unwrap();
//!
//! let engine = BpmnEngine::new("example");
//! let process = engine.load_process(definition).unwrap();
//! engine.new_task_handler().task_type("payment").handler(|job| {
//!     job.set_variable("paid", true);
//!     let _ = job.complete();
//! });
//!
//! let instance = engine
//!     .create_and_run_instance(process.process_key, VariableScope::new())
//!     .unwrap();
//! assert_eq!(instance.state, InstanceState::Completed);
//! ```

// Enforce strict safety at compile time
#![deny(unsafe_code)]
#![warn(missing_debug_implementations)]
#![warn(rust_2018_idioms)]

// Re-export public API
pub mod engine;
pub mod expression;
pub mod model;
pub mod types;
pub mod variables;

// Internal utilities
pub mod observability;

pub use engine::{
    ActivatedJob, BpmnEngine, InstanceState, JobState, KeyGenerator, ProcessInfo,
    ProcessInstanceInfo,
};
pub use types::{Config, Error, Result};
pub use variables::VariableScope;
