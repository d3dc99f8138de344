//! Task handler registry.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::activated::ActivatedJob;
use super::BpmnEngine;
use crate::model::Element;
use crate::types::ElementId;

/// A task handler. Invoked synchronously with the activated job.
pub type TaskHandler = Arc<dyn Fn(&mut ActivatedJob<'_>) + Send + Sync>;

/// What a handler is registered for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HandlerSelector {
    ElementId(ElementId),
    TaskType(String),
}

/// Handlers keyed by element id or task type. Element ids win.
#[derive(Clone, Default)]
pub(crate) struct HandlerRegistry {
    by_element: HashMap<ElementId, TaskHandler>,
    by_task_type: HashMap<String, TaskHandler>,
}

impl HandlerRegistry {
    /// Register a handler, replacing any previous one for the same selector.
    pub(crate) fn register(&mut self, selector: HandlerSelector, handler: TaskHandler) {
        let replaced = match &selector {
            HandlerSelector::ElementId(id) => self.by_element.insert(id.clone(), handler),
            HandlerSelector::TaskType(t) => self.by_task_type.insert(t.clone(), handler),
        };
        tracing::debug!(
            "handler_registered: selector={:?}, replaced={}",
            selector,
            replaced.is_some()
        );
    }

    pub(crate) fn resolve(&self, element: &Element) -> Option<TaskHandler> {
        self.by_element.get(element.id.as_str()).cloned().or_else(|| {
            element
                .task_definition()
                .and_then(|t| t.task_type.as_deref())
                .and_then(|t| self.by_task_type.get(t).cloned())
        })
    }

    pub(crate) fn len(&self) -> usize {
        self.by_element.len() + self.by_task_type.len()
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("by_element", &self.by_element.keys().collect::<Vec<_>>())
            .field("by_task_type", &self.by_task_type.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Entry point of `engine.new_task_handler()`: choose what to handle.
#[derive(Debug)]
#[must_use = "select an element id or task type, then call .handler(..)"]
pub struct TaskHandlerBuilder<'e> {
    engine: &'e BpmnEngine,
}

impl<'e> TaskHandlerBuilder<'e> {
    pub(crate) fn new(engine: &'e BpmnEngine) -> Self {
        Self { engine }
    }

    /// Handle the element with this id.
    pub fn id(self, element_id: impl Into<ElementId>) -> TaskHandlerRegistration<'e> {
        TaskHandlerRegistration {
            engine: self.engine,
            selector: HandlerSelector::ElementId(element_id.into()),
        }
    }

    /// Handle every task of this type without a handler of its own.
    pub fn task_type(self, task_type: impl Into<String>) -> TaskHandlerRegistration<'e> {
        TaskHandlerRegistration {
            engine: self.engine,
            selector: HandlerSelector::TaskType(task_type.into()),
        }
    }
}

#[derive(Debug)]
#[must_use = "call .handler(..) to register"]
pub struct TaskHandlerRegistration<'e> {
    engine: &'e BpmnEngine,
    selector: HandlerSelector,
}

impl TaskHandlerRegistration<'_> {
    pub fn handler<F>(self, handler: F)
    where
        F: Fn(&mut ActivatedJob<'_>) + Send + Sync + 'static,
    {
        self.engine.register_handler(self.selector, Arc::new(handler));
    }
}
