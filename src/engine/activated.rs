//! The handler-facing view of one job activation.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::fmt;

use super::instance::{InstanceState, ProcessInfo};
use super::jobs::Job;
use crate::types::{BpmnProcessId, ElementId, Error, Result};
use crate::variables::{Propagation, ScopeFrame};

/// How a handler resolved its activation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Resolution {
    Completed,
    Failed(String),
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolution::Completed => f.write_str("completed"),
            Resolution::Failed(reason) => write!(f, "failed ({})", reason),
        }
    }
}

/// A job handed to a task handler for exactly one invocation.
///
/// Reads see the activation-local scope first (input mapping results and
/// [`set_variable_local`](Self::set_variable_local) writes), then variables
/// set via [`set_variable`](Self::set_variable), then the instance scope.
/// `set_variable` writes reach the instance only when the job completes.
///
/// The handler must call exactly one of [`complete`](Self::complete) or
/// [`fail`](Self::fail). A second call is rejected and the first one stands.
#[derive(Debug)]
pub struct ActivatedJob<'a> {
    process: &'a ProcessInfo,
    instance_key: i64,
    instance_state: InstanceState,
    key: i64,
    element_instance_key: i64,
    element_id: ElementId,
    created_at: DateTime<Utc>,
    scope: ScopeFrame<'a>,
    resolution: Option<Resolution>,
}

impl<'a> ActivatedJob<'a> {
    pub(crate) fn new(
        job: &Job,
        process: &'a ProcessInfo,
        instance_state: InstanceState,
        scope: ScopeFrame<'a>,
    ) -> Self {
        Self {
            process,
            instance_key: job.process_instance_key,
            instance_state,
            key: job.job_key,
            element_instance_key: job.element_instance_key,
            element_id: job.element_id.clone(),
            created_at: job.created_at,
            scope,
            resolution: None,
        }
    }

    /// Key of the owning process instance.
    pub fn instance_key(&self) -> i64 {
        self.instance_key
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// State of the owning instance when the job was activated.
    pub fn state(&self) -> InstanceState {
        self.instance_state
    }

    /// The job key.
    pub fn key(&self) -> i64 {
        self.key
    }

    pub fn element_instance_key(&self) -> i64 {
        self.element_instance_key
    }

    pub fn get_variable(&self, key: &str) -> Option<Value> {
        self.scope.get_variable(key)
    }

    /// Set a variable that propagates to the instance on completion.
    pub fn set_variable(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.scope.set_variable(key, value.into());
    }

    /// Set a variable visible only during this activation.
    pub fn set_variable_local(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.scope.set_variable_local(key, value.into());
    }

    pub fn process_instance_key(&self) -> i64 {
        self.instance_key
    }

    pub fn bpmn_process_id(&self) -> &BpmnProcessId {
        &self.process.bpmn_process_id
    }

    pub fn process_definition_version(&self) -> i32 {
        self.process.version
    }

    pub fn process_definition_key(&self) -> i64 {
        self.process.process_key
    }

    pub fn element_id(&self) -> &ElementId {
        &self.element_id
    }

    pub fn is_resolved(&self) -> bool {
        self.resolution.is_some()
    }

    pub fn complete(&mut self) -> Result<()> {
        self.resolve(Resolution::Completed)
    }

    pub fn fail(&mut self, reason: impl Into<String>) -> Result<()> {
        self.resolve(Resolution::Failed(reason.into()))
    }

    fn resolve(&mut self, resolution: Resolution) -> Result<()> {
        if let Some(existing) = &self.resolution {
            return Err(Error::state_transition(format!(
                "job {} at element '{}' is already {}",
                self.key, self.element_id, existing
            )));
        }
        self.resolution = Some(resolution);
        Ok(())
    }

    pub(crate) fn scope_mut(&mut self) -> &mut ScopeFrame<'a> {
        &mut self.scope
    }

    pub(crate) fn take_resolution(&mut self) -> Option<Resolution> {
        self.resolution.take()
    }

    pub(crate) fn into_propagation(self) -> Propagation {
        self.scope.into_propagation()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::jobs::JobState;
    use crate::model::ProcessBuilder;
    use crate::variables::{PropagationTarget, VariableScope};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Arc;

    fn fixture() -> (ProcessInfo, Job, VariableScope) {
        let definition = ProcessBuilder::new("order")
            .start_event("start")
            .end_event("end")
            .flow("start", "end")
            .build()
            .unwrap();
        let process = ProcessInfo {
            bpmn_process_id: definition.id.clone(),
            version: 3,
            process_key: 100,
            definition: Arc::new(definition),
        };
        let job = Job {
            element_id: "task-a".into(),
            element_instance_key: 11,
            process_instance_key: 10,
            job_key: 12,
            state: JobState::Active,
            created_at: Utc::now(),
            failure_reason: None,
        };
        let scope = VariableScope::from_variables([("price", json!(10))]);
        (process, job, scope)
    }

    #[test]
    fn test_exposes_job_and_process_identifiers() {
        let (process, job, scope) = fixture();
        let activated = ActivatedJob::new(&job, &process, InstanceState::Active, scope.child());

        assert_eq!(activated.key(), 12);
        assert_eq!(activated.element_instance_key(), 11);
        assert_eq!(activated.instance_key(), 10);
        assert_eq!(activated.process_instance_key(), 10);
        assert_eq!(activated.bpmn_process_id(), "order");
        assert_eq!(activated.process_definition_version(), 3);
        assert_eq!(activated.process_definition_key(), 100);
        assert_eq!(activated.element_id(), "task-a");
        assert_eq!(activated.state(), InstanceState::Active);
        assert_eq!(activated.created_at(), job.created_at);
    }

    #[test]
    fn test_local_shadows_instance_scope() {
        let (process, job, scope) = fixture();
        let mut activated = ActivatedJob::new(&job, &process, InstanceState::Active, scope.child());

        assert_eq!(activated.get_variable("price"), Some(json!(10)));
        activated.set_variable("price", 20);
        assert_eq!(activated.get_variable("price"), Some(json!(20)));
        activated.set_variable_local("price", 30);
        assert_eq!(activated.get_variable("price"), Some(json!(30)));
        assert_eq!(activated.get_variable("missing"), None);
    }

    #[test]
    fn test_only_set_variable_propagates() {
        let (process, job, mut scope) = fixture();
        let propagation = {
            let mut activated =
                ActivatedJob::new(&job, &process, InstanceState::Active, scope.child());
            activated.set_variable("approved", true);
            activated.set_variable_local("scratch", "tmp");
            activated.complete().unwrap();
            activated.into_propagation()
        };
        scope.apply_propagation(propagation);
        assert_eq!(scope.get_variable("approved"), Some(&json!(true)));
        assert_eq!(scope.get_variable("scratch"), None);
    }

    #[test]
    fn test_double_complete_rejected() {
        let (process, job, scope) = fixture();
        let mut activated = ActivatedJob::new(&job, &process, InstanceState::Active, scope.child());

        activated.complete().unwrap();
        assert!(matches!(activated.complete(), Err(Error::StateTransition(_))));
        assert!(matches!(activated.fail("late"), Err(Error::StateTransition(_))));
        assert_eq!(activated.take_resolution(), Some(Resolution::Completed));
    }

    #[test]
    fn test_double_fail_keeps_first_reason() {
        let (process, job, scope) = fixture();
        let mut activated = ActivatedJob::new(&job, &process, InstanceState::Active, scope.child());

        activated.fail("out of stock").unwrap();
        assert!(activated.is_resolved());
        assert!(activated.fail("second").is_err());
        assert!(activated.complete().is_err());
        assert_eq!(
            activated.take_resolution(),
            Some(Resolution::Failed("out of stock".to_string()))
        );
    }
}
