//! Fluent construction of process definitions in code.

use super::elements::{Element, ElementKind, ProcessDefinition, SequenceFlow, TaskDefinition};
use crate::types::{BpmnProcessId, Result};

/// Builds a [`ProcessDefinition`], validating it on [`ProcessBuilder::build`].
///
/// Flow ids are generated (`flow-1`, `flow-2`, ...) in the order flows are
/// added, which is also the order gateways evaluate them in.
#[derive(Debug, Clone)]
pub struct ProcessBuilder {
    definition: ProcessDefinition,
}

impl ProcessBuilder {
    pub fn new(id: impl Into<BpmnProcessId>) -> Self {
        Self {
            definition: ProcessDefinition {
                id: id.into(),
                name: None,
                elements: Vec::new(),
                sequence_flows: Vec::new(),
            },
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.definition.name = Some(name.into());
        self
    }

    pub fn element(mut self, element: Element) -> Self {
        self.definition.elements.push(element);
        self
    }

    pub fn start_event(self, id: &str) -> Self {
        self.element(Element::new(id, ElementKind::StartEvent))
    }

    pub fn end_event(self, id: &str) -> Self {
        self.element(Element::new(id, ElementKind::EndEvent))
    }

    pub fn service_task(self, id: &str, task: TaskDefinition) -> Self {
        self.element(Element::new(id, ElementKind::ServiceTask(task)))
    }

    pub fn exclusive_gateway(self, id: &str) -> Self {
        self.element(Element::new(id, ElementKind::ExclusiveGateway))
    }

    pub fn parallel_gateway(self, id: &str) -> Self {
        self.element(Element::new(id, ElementKind::ParallelGateway))
    }

    pub fn sequence_flow(mut self, flow: SequenceFlow) -> Self {
        self.definition.sequence_flows.push(flow);
        self
    }

    pub fn flow(self, source: &str, target: &str) -> Self {
        let id = self.next_flow_id();
        self.sequence_flow(SequenceFlow::new(id, source, target))
    }

    pub fn conditional_flow(self, source: &str, target: &str, condition: &str) -> Self {
        let id = self.next_flow_id();
        self.sequence_flow(SequenceFlow::new(id, source, target).with_condition(condition))
    }

    pub fn default_flow(self, source: &str, target: &str) -> Self {
        let id = self.next_flow_id();
        self.sequence_flow(SequenceFlow::new(id, source, target).as_default())
    }

    fn next_flow_id(&self) -> String {
        format!("flow-{}", self.definition.sequence_flows.len() + 1)
    }

    pub fn build(self) -> Result<ProcessDefinition> {
        self.definition.validate()?;
        Ok(self.definition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_builds_exclusive_gateway_process() {
        let def = ProcessBuilder::new("exclusive")
            .name("Exclusive gateway")
            .start_event("start")
            .exclusive_gateway("gw")
            .service_task("task-a", TaskDefinition::new().task_type("a"))
            .service_task("task-b", TaskDefinition::new())
            .end_event("end")
            .flow("start", "gw")
            .conditional_flow("gw", "task-a", "price > 0")
            .default_flow("gw", "task-b")
            .flow("task-a", "end")
            .flow("task-b", "end")
            .build()
            .unwrap();

        assert_eq!(def.name.as_deref(), Some("Exclusive gateway"));
        let gw_flows: Vec<(&str, Option<&str>, bool)> = def
            .outgoing_flows("gw")
            .iter()
            .map(|f| (f.id.as_str(), f.condition(), f.default))
            .collect();
        assert_eq!(
            gw_flows,
            vec![("flow-2", Some("price > 0"), false), ("flow-3", None, true)]
        );
    }

    #[test]
    fn test_build_validates() {
        let result = ProcessBuilder::new("broken")
            .start_event("start")
            .flow("start", "missing")
            .build();
        assert!(result.is_err());
    }
}
