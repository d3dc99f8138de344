//! Job lifecycle: one record per task element within an instance.
//!
//! ```text
//! ACTIVE → {COMPLETED | FAILED}
//! ```
//!
//! Terminal states are sticky. A job is created the first time a token
//! reaches its element and reused on every later visit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use super::activated::{ActivatedJob, Resolution};
use super::handlers::TaskHandler;
use super::instance::ProcessInstance;
use super::keys::KeyGenerator;
use super::mappings;
use crate::model::Element;
use crate::types::{ElementId, Error, Result};
use crate::variables::{Propagation, PropagationTarget};

/// Job lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JobState {
    Active,
    Completed,
    Failed,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }

    pub fn can_transition_to(self, to: JobState) -> bool {
        matches!(
            (self, to),
            (JobState::Active, JobState::Completed) | (JobState::Active, JobState::Failed)
        )
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobState::Active => "ACTIVE",
            JobState::Completed => "COMPLETED",
            JobState::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

/// Runtime record of one task element in one instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub element_id: ElementId,
    pub element_instance_key: i64,
    pub process_instance_key: i64,
    /// Distinct from `element_instance_key`; allocated once with the job.
    pub job_key: i64,
    pub state: JobState,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

impl Job {
    fn new(element_id: ElementId, process_instance_key: i64, keys: &dyn KeyGenerator) -> Self {
        let element_instance_key = keys.generate_key();
        let job_key = keys.generate_key();
        Self {
            element_id,
            element_instance_key,
            process_instance_key,
            job_key,
            state: JobState::Active,
            created_at: Utc::now(),
            failure_reason: None,
        }
    }

    fn transition(&mut self, to: JobState) -> Result<()> {
        if !self.state.can_transition_to(to) {
            return Err(Error::state_transition(format!(
                "job {} at element '{}': cannot transition from {} to {}",
                self.job_key, self.element_id, self.state, to
            )));
        }
        self.state = to;
        Ok(())
    }

    pub(crate) fn complete(&mut self) -> Result<()> {
        self.transition(JobState::Completed)
    }

    pub(crate) fn fail(&mut self, reason: impl Into<String>) -> Result<()> {
        self.transition(JobState::Failed)?;
        self.failure_reason = Some(reason.into());
        Ok(())
    }
}

fn job_index(
    jobs: &mut Vec<Job>,
    element_id: &ElementId,
    process_instance_key: i64,
    keys: &dyn KeyGenerator,
) -> usize {
    if let Some(index) = jobs.iter().position(|j| j.element_id == *element_id) {
        return index;
    }
    let job = Job::new(element_id.clone(), process_instance_key, keys);
    tracing::debug!(
        "job_created: instance_key={}, element={}, element_instance_key={}, job_key={}",
        process_instance_key,
        element_id,
        job.element_instance_key,
        job.job_key
    );
    jobs.push(job);
    jobs.len() - 1
}

/// Return the job for `element_id`, creating it on first use.
pub fn find_or_create_job<'j>(
    jobs: &'j mut Vec<Job>,
    element_id: &ElementId,
    process_instance_key: i64,
    keys: &dyn KeyGenerator,
) -> &'j mut Job {
    let index = job_index(jobs, element_id, process_instance_key, keys);
    &mut jobs[index]
}

enum Activation {
    Completed(Propagation),
    Failed(String),
    Unresolved,
    MappingFailed(Error),
}

fn activate(element: &Element, handler: &TaskHandler, mut job: ActivatedJob<'_>) -> Activation {
    if let Err(err) = mappings::apply_input_mappings(element, job.scope_mut()) {
        return Activation::MappingFailed(err);
    }

    // A panic in the handler fails the job as `fail` would.
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| handler(&mut job))) {
        let message = panic_message(payload.as_ref());
        return Activation::Failed(format!("handler panicked: {}", message));
    }

    match job.take_resolution() {
        None => Activation::Unresolved,
        Some(Resolution::Failed(reason)) => Activation::Failed(reason),
        Some(Resolution::Completed) => {
            if let Err(err) = mappings::apply_output_mappings(element, job.scope_mut()) {
                return Activation::MappingFailed(err);
            }
            Activation::Completed(job.into_propagation())
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}

/// Drive the job of a service task element.
///
/// Returns `Ok(true)` once the job is COMPLETED and its variables have been
/// propagated to the instance. `Ok(false)` covers every other outcome that is
/// not an error: no handler registered (parked), handler returned without
/// resolving, or handler called `fail`. A failing input or output mapping
/// marks the job and the instance FAILED and is returned as an error; in that
/// case nothing propagates, even if the handler had completed.
pub(crate) fn handle_service_task(
    instance: &mut ProcessInstance,
    element: &Element,
    handler: Option<&TaskHandler>,
    keys: &dyn KeyGenerator,
) -> Result<bool> {
    let index = job_index(&mut instance.jobs, &element.id, instance.key, keys);
    let job = instance.jobs[index].clone();

    if job.state.is_terminal() {
        tracing::debug!(
            "job_already_terminal: instance_key={}, element={}, state={}",
            instance.key,
            element.id,
            job.state
        );
        return Ok(job.state == JobState::Completed);
    }

    let Some(handler) = handler else {
        tracing::debug!(
            "job_parked_without_handler: instance_key={}, element={}",
            instance.key,
            element.id
        );
        return Ok(false);
    };

    let outcome = activate(
        element,
        handler,
        ActivatedJob::new(&job, &instance.process, instance.state, instance.variables.child()),
    );

    let record = &mut instance.jobs[index];
    match outcome {
        Activation::Completed(propagation) => {
            record.complete()?;
            let written = instance.variables.apply_propagation(propagation);
            tracing::debug!(
                "job_completed: instance_key={}, element={}, job_key={}, propagated={}",
                instance.key,
                element.id,
                job.job_key,
                written
            );
            Ok(true)
        }
        Activation::Failed(reason) => {
            tracing::warn!(
                "job_failed: instance_key={}, element={}, job_key={}, reason={}",
                instance.key,
                element.id,
                job.job_key,
                reason
            );
            record.fail(reason)?;
            Ok(false)
        }
        Activation::Unresolved => {
            tracing::debug!(
                "job_unresolved: instance_key={}, element={}, job_key={}",
                instance.key,
                element.id,
                job.job_key
            );
            Ok(false)
        }
        Activation::MappingFailed(err) => {
            record.fail(err.to_string())?;
            instance.mark_failed(err.to_string());
            Err(err)
        }
    }
}
