//! BPMN engine facade.
//!
//! The engine owns the definition registry, all process instances and the
//! task handler registry. Every instance sits behind its own lock, so runs of
//! different instances proceed in parallel while work on one instance is
//! serialized. The key generator is the only state shared between instances.
//!
//! Handlers run while their instance is locked and must not call back into
//! the engine for that same instance.

mod activated;
pub mod gateway;
mod handlers;
mod instance;
pub mod jobs;
pub mod keys;
mod mappings;
mod orchestrator;

pub use activated::ActivatedJob;
pub use handlers::{HandlerSelector, TaskHandler, TaskHandlerBuilder, TaskHandlerRegistration};
pub use instance::{InstanceState, ProcessInfo, ProcessInstanceInfo};
pub use jobs::{Job, JobState};
pub use keys::{KeyGenerator, SequentialKeyGenerator, SnowflakeKeyGenerator};

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use handlers::HandlerRegistry;
use instance::ProcessInstance;
use orchestrator::RunContext;

use crate::model::ProcessDefinition;
use crate::types::{EngineConfig, Error, Result};
use crate::variables::VariableScope;

/// Default bound on elements walked per run.
pub const DEFAULT_MAX_STEPS_PER_RUN: u32 = 10_000;

pub struct BpmnEngine {
    name: String,
    keys: Arc<dyn KeyGenerator>,
    max_steps_per_run: u32,
    processes: RwLock<Vec<Arc<ProcessInfo>>>,
    instances: RwLock<BTreeMap<i64, Arc<Mutex<ProcessInstance>>>>,
    handlers: RwLock<HandlerRegistry>,
}

impl BpmnEngine {
    /// Engine with a sequential key generator starting at 1.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_key_generator(name, Arc::new(SequentialKeyGenerator::default()))
    }

    pub fn with_key_generator(name: impl Into<String>, keys: Arc<dyn KeyGenerator>) -> Self {
        Self {
            name: name.into(),
            keys,
            max_steps_per_run: DEFAULT_MAX_STEPS_PER_RUN,
            processes: RwLock::new(Vec::new()),
            instances: RwLock::new(BTreeMap::new()),
            handlers: RwLock::new(HandlerRegistry::default()),
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        let keys: Arc<dyn KeyGenerator> = Arc::from(keys::from_config(config));
        Self::with_key_generator(config.name.clone(), keys).with_max_steps(config.max_steps_per_run)
    }

    pub fn with_max_steps(mut self, max_steps_per_run: u32) -> Self {
        self.max_steps_per_run = max_steps_per_run;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    // =========================================================================
    // Definitions
    // =========================================================================

    /// Register a process definition.
    ///
    /// Loading an identical definition again returns the registered one.
    /// A changed definition with the same process id becomes a new version
    /// under a fresh process key.
    pub fn load_process(&self, definition: ProcessDefinition) -> Result<Arc<ProcessInfo>> {
        definition.validate()?;

        let mut processes = self.processes.write().unwrap_or_else(PoisonError::into_inner);
        let latest = processes
            .iter()
            .filter(|p| p.bpmn_process_id == definition.id)
            .max_by_key(|p| p.version);

        if let Some(existing) = latest {
            if *existing.definition == definition {
                tracing::debug!(
                    "process_already_loaded: process={}, version={}, process_key={}",
                    existing.bpmn_process_id,
                    existing.version,
                    existing.process_key
                );
                return Ok(Arc::clone(existing));
            }
        }

        let version = latest.map_or(1, |p| p.version + 1);
        let info = Arc::new(ProcessInfo {
            bpmn_process_id: definition.id.clone(),
            version,
            process_key: self.keys.generate_key(),
            definition: Arc::new(definition),
        });
        processes.push(Arc::clone(&info));

        tracing::info!(
            "process_loaded: engine={}, process={}, version={}, process_key={}",
            self.name,
            info.bpmn_process_id,
            info.version,
            info.process_key
        );
        Ok(info)
    }

    /// Deserialize, validate and register a JSON process definition.
    pub fn load_process_from_json(&self, json: &str) -> Result<Arc<ProcessInfo>> {
        self.load_process(ProcessDefinition::from_json_str(json)?)
    }

    pub fn find_process(&self, process_key: i64) -> Option<Arc<ProcessInfo>> {
        self.processes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|p| p.process_key == process_key)
            .cloned()
    }

    /// All versions registered for a process id, oldest first.
    pub fn find_processes(&self, bpmn_process_id: &str) -> Vec<Arc<ProcessInfo>> {
        let mut found: Vec<_> = self
            .processes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|p| p.bpmn_process_id == *bpmn_process_id)
            .cloned()
            .collect();
        found.sort_by_key(|p| p.version);
        found
    }

    // =========================================================================
    // Handlers
    // =========================================================================

    /// Start registering a task handler.
    ///
    /// ```
    /// # use bpmn_engine::BpmnEngine;
    /// let engine = BpmnEngine::new("docs");
    /// engine.new_task_handler().id("task-a").handler(|job| {
    ///     job.set_variable("done", true);
    ///     let _ = job.complete();
    /// });
    /// ```
    pub fn new_task_handler(&self) -> TaskHandlerBuilder<'_> {
        TaskHandlerBuilder::new(self)
    }

    pub(crate) fn register_handler(&self, selector: HandlerSelector, handler: TaskHandler) {
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .register(selector, handler);
    }

    // =========================================================================
    // Instances
    // =========================================================================

    /// Create a READY instance of the given process with seeded variables.
    pub fn create_instance(
        &self,
        process_key: i64,
        variables: impl Into<VariableScope>,
    ) -> Result<ProcessInstanceInfo> {
        let process = self
            .find_process(process_key)
            .ok_or_else(|| Error::not_found(format!("process key {}", process_key)))?;

        let instance = ProcessInstance::new(self.keys.generate_key(), process, variables.into());
        let info = instance.info();
        self.instances
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(instance.key, Arc::new(Mutex::new(instance)));

        tracing::info!(
            "instance_created: instance_key={}, process={}, version={}, variables={}",
            info.instance_key,
            info.bpmn_process_id,
            info.version,
            info.variables.len()
        );
        Ok(info)
    }

    /// Create an instance and run it until it completes, fails or parks.
    ///
    /// On error the instance is kept in FAILED state and remains inspectable
    /// through [`instances`](Self::instances).
    pub fn create_and_run_instance(
        &self,
        process_key: i64,
        variables: impl Into<VariableScope>,
    ) -> Result<ProcessInstanceInfo> {
        let created = self.create_instance(process_key, variables)?;
        self.run_or_continue_instance(created.instance_key)
    }

    /// Run a READY instance, or continue an ACTIVE one from its parked tasks.
    pub fn run_or_continue_instance(&self, instance_key: i64) -> Result<ProcessInstanceInfo> {
        let slot = self
            .instance_slot(instance_key)
            .ok_or_else(|| Error::not_found(format!("process instance {}", instance_key)))?;

        // Snapshot so handlers registered while this run is going do not deadlock.
        let handlers = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        let mut instance = slot.lock().unwrap_or_else(PoisonError::into_inner);
        let ctx = RunContext {
            keys: self.keys.as_ref(),
            handlers: &handlers,
            max_steps: self.max_steps_per_run,
        };
        orchestrator::run(&mut instance, &ctx)?;
        Ok(instance.info())
    }

    /// Snapshot of one instance.
    pub fn find_process_instance(&self, instance_key: i64) -> Option<ProcessInstanceInfo> {
        self.instance_slot(instance_key)
            .map(|slot| slot.lock().unwrap_or_else(PoisonError::into_inner).info())
    }

    /// Snapshots of all instances, ordered by key.
    pub fn instances(&self) -> Vec<ProcessInstanceInfo> {
        let slots: Vec<_> = self
            .instances
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        slots
            .iter()
            .map(|slot| slot.lock().unwrap_or_else(PoisonError::into_inner).info())
            .collect()
    }

    fn instance_slot(&self, instance_key: i64) -> Option<Arc<Mutex<ProcessInstance>>> {
        self.instances
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&instance_key)
            .cloned()
    }
}

impl fmt::Debug for BpmnEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BpmnEngine")
            .field("name", &self.name)
            .field("max_steps_per_run", &self.max_steps_per_run)
            .field(
                "processes",
                &self.processes.read().unwrap_or_else(PoisonError::into_inner).len(),
            )
            .field(
                "instances",
                &self.instances.read().unwrap_or_else(PoisonError::into_inner).len(),
            )
            .field(
                "handlers",
                &self.handlers.read().unwrap_or_else(PoisonError::into_inner).len(),
            )
            .finish()
    }
}
