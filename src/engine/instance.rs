//! Process definitions as registered, and process instances.
//!
//! Instance state transitions:
//! ```text
//! READY → ACTIVE → {COMPLETED | FAILED}
//!   ↓
//! FAILED
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;

use super::jobs::{Job, JobState};
use crate::model::ProcessDefinition;
use crate::types::{BpmnProcessId, ElementId, Error, Result};
use crate::variables::VariableScope;

/// A registered process definition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessInfo {
    pub bpmn_process_id: BpmnProcessId,
    pub version: i32,
    pub process_key: i64,
    #[serde(skip)]
    pub definition: Arc<ProcessDefinition>,
}

/// Process instance lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum InstanceState {
    Ready,
    Active,
    Completed,
    Failed,
}

impl InstanceState {
    pub fn is_terminal(self) -> bool {
        matches!(self, InstanceState::Completed | InstanceState::Failed)
    }

    /// Check if transition is valid.
    pub fn can_transition_to(self, to: InstanceState) -> bool {
        match (self, to) {
            (InstanceState::Ready, InstanceState::Active) => true,
            (InstanceState::Ready, InstanceState::Failed) => true,
            (InstanceState::Active, InstanceState::Completed) => true,
            (InstanceState::Active, InstanceState::Failed) => true,
            // COMPLETED and FAILED are terminal
            _ => false,
        }
    }
}

impl fmt::Display for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InstanceState::Ready => "READY",
            InstanceState::Active => "ACTIVE",
            InstanceState::Completed => "COMPLETED",
            InstanceState::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

/// Mutable runtime state of one instance. Owned by the engine behind a
/// per-instance lock.
#[derive(Debug)]
pub(crate) struct ProcessInstance {
    pub(crate) key: i64,
    pub(crate) process: Arc<ProcessInfo>,
    pub(crate) state: InstanceState,
    pub(crate) variables: VariableScope,
    pub(crate) jobs: Vec<Job>,
    pub(crate) created_at: DateTime<Utc>,
    /// Tokens waiting to be walked.
    pub(crate) tokens: VecDeque<ElementId>,
    /// Tokens resting at tasks that have not completed.
    pub(crate) parked: Vec<ElementId>,
    /// Tokens that reached a parallel join, per gateway.
    pub(crate) join_arrivals: HashMap<ElementId, usize>,
    pub(crate) failure_reason: Option<String>,
}

impl ProcessInstance {
    pub(crate) fn new(key: i64, process: Arc<ProcessInfo>, variables: VariableScope) -> Self {
        Self {
            key,
            process,
            state: InstanceState::Ready,
            variables,
            jobs: Vec::new(),
            created_at: Utc::now(),
            tokens: VecDeque::new(),
            parked: Vec::new(),
            join_arrivals: HashMap::new(),
            failure_reason: None,
        }
    }

    pub(crate) fn transition(&mut self, to: InstanceState) -> Result<()> {
        if !self.state.can_transition_to(to) {
            return Err(Error::state_transition(format!(
                "instance {}: cannot transition from {} to {}",
                self.key, self.state, to
            )));
        }
        self.state = to;
        Ok(())
    }

    /// Mark the instance FAILED unless it already reached a terminal state.
    pub(crate) fn mark_failed(&mut self, reason: impl Into<String>) {
        if self.state.is_terminal() {
            return;
        }
        let reason = reason.into();
        tracing::warn!(
            "instance_failed: instance_key={}, process={}, reason={}",
            self.key,
            self.process.bpmn_process_id,
            reason
        );
        self.state = InstanceState::Failed;
        self.failure_reason = Some(reason);
    }

    pub(crate) fn job(&self, element_id: &ElementId) -> Option<&Job> {
        self.jobs.iter().find(|j| j.element_id == *element_id)
    }

    pub(crate) fn info(&self) -> ProcessInstanceInfo {
        ProcessInstanceInfo {
            instance_key: self.key,
            bpmn_process_id: self.process.bpmn_process_id.clone(),
            process_key: self.process.process_key,
            version: self.process.version,
            state: self.state,
            variables: self.variables.variables().clone(),
            jobs: self.jobs.clone(),
            parked_elements: self.parked.clone(),
            created_at: self.created_at,
            failure_reason: self.failure_reason.clone(),
        }
    }
}

/// Snapshot of an instance, detached from the engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessInstanceInfo {
    pub instance_key: i64,
    pub bpmn_process_id: BpmnProcessId,
    pub process_key: i64,
    pub version: i32,
    pub state: InstanceState,
    pub variables: BTreeMap<String, serde_json::Value>,
    pub jobs: Vec<Job>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub parked_elements: Vec<ElementId>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

impl ProcessInstanceInfo {
    pub fn get_variable(&self, key: &str) -> Option<&serde_json::Value> {
        self.variables.get(key)
    }

    pub fn job(&self, element_id: &str) -> Option<&Job> {
        self.jobs.iter().find(|j| j.element_id == *element_id)
    }

    /// Jobs in the given state, in creation order.
    pub fn jobs_in_state(&self, state: JobState) -> impl Iterator<Item = &Job> {
        self.jobs.iter().filter(move |j| j.state == state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ProcessBuilder;

    fn process_info() -> Arc<ProcessInfo> {
        let definition = ProcessBuilder::new("p")
            .start_event("start")
            .end_event("end")
            .flow("start", "end")
            .build()
            .unwrap();
        Arc::new(ProcessInfo {
            bpmn_process_id: definition.id.clone(),
            version: 1,
            process_key: 10,
            definition: Arc::new(definition),
        })
    }

    #[test]
    fn test_valid_transitions() {
        assert!(InstanceState::Ready.can_transition_to(InstanceState::Active));
        assert!(InstanceState::Ready.can_transition_to(InstanceState::Failed));
        assert!(InstanceState::Active.can_transition_to(InstanceState::Completed));
        assert!(InstanceState::Active.can_transition_to(InstanceState::Failed));
    }

    #[test]
    fn test_terminal_states_are_sticky() {
        for terminal in [InstanceState::Completed, InstanceState::Failed] {
            assert!(terminal.is_terminal());
            for to in [
                InstanceState::Ready,
                InstanceState::Active,
                InstanceState::Completed,
                InstanceState::Failed,
            ] {
                assert!(!terminal.can_transition_to(to));
            }
        }
        assert!(!InstanceState::Ready.can_transition_to(InstanceState::Completed));
    }

    #[test]
    fn test_transition_rejects_invalid() {
        let mut instance = ProcessInstance::new(1, process_info(), VariableScope::new());
        assert!(matches!(
            instance.transition(InstanceState::Completed),
            Err(Error::StateTransition(_))
        ));
        instance.transition(InstanceState::Active).unwrap();
        instance.transition(InstanceState::Completed).unwrap();
        assert_eq!(instance.state, InstanceState::Completed);
    }

    #[test]
    fn test_mark_failed_keeps_terminal_state() {
        let mut instance = ProcessInstance::new(1, process_info(), VariableScope::new());
        instance.transition(InstanceState::Active).unwrap();
        instance.transition(InstanceState::Completed).unwrap();
        instance.mark_failed("late failure");
        assert_eq!(instance.state, InstanceState::Completed);
        assert_eq!(instance.failure_reason, None);
    }

    #[test]
    fn test_snapshot_serializes_state_uppercase() {
        let instance = ProcessInstance::new(
            7,
            process_info(),
            VariableScope::from_variables([("price", serde_json::json!(3))]),
        );
        let json = serde_json::to_value(instance.info()).unwrap();
        assert_eq!(json["state"], "READY");
        assert_eq!(json["instance_key"], 7);
        assert_eq!(json["variables"]["price"], 3);
        assert_eq!(json["bpmn_process_id"], "p");
    }
}
