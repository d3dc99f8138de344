//! Instance execution: walks tokens through the process graph.
//!
//! A run pops tokens until none are left. Tasks that do not complete park
//! their token; the next run of the same instance picks parked tokens up
//! again. Any error fails the instance and is returned to the caller.

use std::sync::Arc;

use super::gateway;
use super::handlers::HandlerRegistry;
use super::instance::{InstanceState, ProcessInstance};
use super::jobs::{self, JobState};
use super::keys::KeyGenerator;
use crate::model::{Element, ElementKind, ProcessDefinition};
use crate::types::{ElementId, Error, Result};

/// Collaborators of one run.
pub(crate) struct RunContext<'e> {
    pub(crate) keys: &'e dyn KeyGenerator,
    pub(crate) handlers: &'e HandlerRegistry,
    pub(crate) max_steps: u32,
}

/// Start a READY instance or continue an ACTIVE one.
pub(crate) fn run(instance: &mut ProcessInstance, ctx: &RunContext<'_>) -> Result<()> {
    match instance.state {
        InstanceState::Ready => {
            let definition = Arc::clone(&instance.process.definition);
            instance
                .tokens
                .extend(definition.start_events().map(|e| e.id.clone()));
            instance.transition(InstanceState::Active)?;
            tracing::info!(
                "instance_started: instance_key={}, process={}, version={}",
                instance.key,
                instance.process.bpmn_process_id,
                instance.process.version
            );
        }
        InstanceState::Active => {
            let parked = std::mem::take(&mut instance.parked);
            tracing::debug!(
                "instance_resumed: instance_key={}, parked={}",
                instance.key,
                parked.len()
            );
            instance.tokens.extend(parked);
        }
        state => {
            return Err(Error::state_transition(format!(
                "instance {} is {} and cannot run",
                instance.key, state
            )));
        }
    }

    if let Err(err) = walk(instance, ctx) {
        instance.tokens.clear();
        instance.mark_failed(err.to_string());
        return Err(err);
    }

    if instance.parked.is_empty() && instance.join_arrivals.is_empty() {
        instance.transition(InstanceState::Completed)?;
        tracing::info!(
            "instance_completed: instance_key={}, jobs={}",
            instance.key,
            instance.jobs.len()
        );
    } else {
        tracing::info!(
            "instance_waiting: instance_key={}, parked={}, waiting_joins={}",
            instance.key,
            instance.parked.len(),
            instance.join_arrivals.len()
        );
    }
    Ok(())
}

fn walk(instance: &mut ProcessInstance, ctx: &RunContext<'_>) -> Result<()> {
    let definition = Arc::clone(&instance.process.definition);
    let mut steps: u32 = 0;

    while let Some(element_id) = instance.tokens.pop_front() {
        steps += 1;
        if steps > ctx.max_steps {
            return Err(Error::StepLimitExceeded {
                instance_key: instance.key,
                limit: ctx.max_steps,
            });
        }

        let element = definition.element(element_id.as_str()).ok_or_else(|| {
            Error::not_found(format!(
                "element '{}' in process '{}'",
                element_id, definition.id
            ))
        })?;
        tracing::debug!(
            "element_reached: instance_key={}, element={}, kind={}",
            instance.key,
            element.id,
            element.kind.as_str()
        );

        let next = step(instance, &definition, element, ctx)?;
        instance.tokens.extend(next);
    }
    Ok(())
}

/// Process one token at `element`; returns the elements that receive tokens.
fn step(
    instance: &mut ProcessInstance,
    definition: &ProcessDefinition,
    element: &Element,
    ctx: &RunContext<'_>,
) -> Result<Vec<ElementId>> {
    let outgoing = definition.outgoing_flows(element.id.as_str());

    match &element.kind {
        ElementKind::StartEvent => Ok(gateway::all_targets(&outgoing)),
        ElementKind::EndEvent => Ok(Vec::new()),
        ElementKind::ServiceTask(_) => {
            let handler = ctx.handlers.resolve(element);
            if jobs::handle_service_task(instance, element, handler.as_ref(), ctx.keys)? {
                return Ok(gateway::all_targets(&outgoing));
            }
            if let Some(job) = instance.job(&element.id) {
                if job.state == JobState::Failed {
                    return Err(Error::JobFailed {
                        element_id: element.id.to_string(),
                        reason: job.failure_reason.clone().unwrap_or_default(),
                    });
                }
            }
            instance.parked.push(element.id.clone());
            Ok(Vec::new())
        }
        ElementKind::ExclusiveGateway => {
            let flow =
                gateway::select_exclusive_flow(element.id.as_str(), &outgoing, &instance.variables)?;
            Ok(vec![flow.target_ref.clone()])
        }
        ElementKind::ParallelGateway => {
            let incoming = definition.incoming_flow_count(element.id.as_str());
            if incoming > 1 {
                let arrived = instance
                    .join_arrivals
                    .entry(element.id.clone())
                    .or_insert(0);
                *arrived += 1;
                if *arrived < incoming {
                    tracing::debug!(
                        "join_waiting: instance_key={}, gateway={}, arrived={}, expected={}",
                        instance.key,
                        element.id,
                        arrived,
                        incoming
                    );
                    return Ok(Vec::new());
                }
                instance.join_arrivals.remove(&element.id);
            }
            Ok(gateway::all_targets(&outgoing))
        }
    }
}
