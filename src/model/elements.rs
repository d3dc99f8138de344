//! Process graph elements and sequence flows.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::types::{BpmnProcessId, ElementId, Error, FlowId, Result};

/// An already-parsed process definition graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessDefinition {
    pub id: BpmnProcessId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub elements: Vec<Element>,
    #[serde(default)]
    pub sequence_flows: Vec<SequenceFlow>,
}

impl ProcessDefinition {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let definition: ProcessDefinition = serde_json::from_str(json)?;
        definition.validate()?;
        Ok(definition)
    }

    pub fn element(&self, id: &str) -> Option<&Element> {
        self.elements.iter().find(|e| e.id == *id)
    }

    pub fn flow(&self, id: &str) -> Option<&SequenceFlow> {
        self.sequence_flows.iter().find(|f| f.id == *id)
    }

    pub fn start_events(&self) -> impl Iterator<Item = &Element> {
        self.elements
            .iter()
            .filter(|e| matches!(e.kind, ElementKind::StartEvent))
    }

    /// Outgoing flows of `element_id`, in declaration order.
    pub fn outgoing_flows(&self, element_id: &str) -> Vec<&SequenceFlow> {
        self.sequence_flows
            .iter()
            .filter(|f| f.source_ref == *element_id)
            .collect()
    }

    pub fn incoming_flow_count(&self, element_id: &str) -> usize {
        self.sequence_flows
            .iter()
            .filter(|f| f.target_ref == *element_id)
            .count()
    }

    /// Structural checks applied when a definition is loaded.
    pub fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(Error::validation("process id cannot be empty"));
        }

        let mut element_ids = HashSet::new();
        for element in &self.elements {
            if element.id.is_empty() {
                return Err(Error::validation(format!(
                    "process '{}' has an element with an empty id",
                    self.id
                )));
            }
            if !element_ids.insert(element.id.as_str()) {
                return Err(Error::validation(format!(
                    "duplicate element id '{}' in process '{}'",
                    element.id, self.id
                )));
            }
        }

        if self.start_events().next().is_none() {
            return Err(Error::validation(format!(
                "process '{}' has no start event",
                self.id
            )));
        }

        let mut flow_ids = HashSet::new();
        let mut gateways_with_default = HashSet::new();
        for flow in &self.sequence_flows {
            if !flow_ids.insert(flow.id.as_str()) {
                return Err(Error::validation(format!(
                    "duplicate sequence flow id '{}'",
                    flow.id
                )));
            }
            for endpoint in [&flow.source_ref, &flow.target_ref] {
                if !element_ids.contains(endpoint.as_str()) {
                    return Err(Error::validation(format!(
                        "sequence flow '{}' references unknown element '{}'",
                        flow.id, endpoint
                    )));
                }
            }
            if flow.default {
                let source_is_exclusive = self
                    .element(flow.source_ref.as_str())
                    .map_or(false, |e| matches!(e.kind, ElementKind::ExclusiveGateway));
                if !source_is_exclusive {
                    return Err(Error::validation(format!(
                        "default flow '{}' must leave an exclusive gateway",
                        flow.id
                    )));
                }
                if !gateways_with_default.insert(flow.source_ref.as_str()) {
                    return Err(Error::validation(format!(
                        "gateway '{}' has more than one default flow",
                        flow.source_ref
                    )));
                }
            }
        }

        for mapping in self.elements.iter().flat_map(|e| {
            e.input_mapping().iter().chain(e.output_mapping())
        }) {
            if mapping.target.is_empty() {
                return Err(Error::validation(format!(
                    "mapping from '{}' has an empty target",
                    mapping.source
                )));
            }
        }

        Ok(())
    }
}

/// A node of the process graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    pub id: ElementId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(flatten)]
    pub kind: ElementKind,
}

impl Element {
    pub fn new(id: impl Into<ElementId>, kind: ElementKind) -> Self {
        Self {
            id: id.into(),
            name: None,
            kind,
        }
    }

    pub fn id(&self) -> &ElementId {
        &self.id
    }

    pub fn task_definition(&self) -> Option<&TaskDefinition> {
        match &self.kind {
            ElementKind::ServiceTask(task) => Some(task),
            _ => None,
        }
    }

    /// Input mappings; empty for anything but a task.
    pub fn input_mapping(&self) -> &[IoMapping] {
        self.task_definition()
            .map(|t| t.input_mapping.as_slice())
            .unwrap_or_default()
    }

    /// Output mappings; empty for anything but a task.
    pub fn output_mapping(&self) -> &[IoMapping] {
        self.task_definition()
            .map(|t| t.output_mapping.as_slice())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ElementKind {
    StartEvent,
    EndEvent,
    ServiceTask(TaskDefinition),
    ExclusiveGateway,
    ParallelGateway,
}

impl ElementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ElementKind::StartEvent => "start_event",
            ElementKind::EndEvent => "end_event",
            ElementKind::ServiceTask(_) => "service_task",
            ElementKind::ExclusiveGateway => "exclusive_gateway",
            ElementKind::ParallelGateway => "parallel_gateway",
        }
    }
}

/// Service task configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskDefinition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_type: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub input_mapping: Vec<IoMapping>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub output_mapping: Vec<IoMapping>,
}

impl TaskDefinition {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn task_type(mut self, task_type: impl Into<String>) -> Self {
        self.task_type = Some(task_type.into());
        self
    }

    pub fn input(mut self, source: impl Into<String>, target: impl Into<String>) -> Self {
        self.input_mapping.push(IoMapping::new(source, target));
        self
    }

    pub fn output(mut self, source: impl Into<String>, target: impl Into<String>) -> Self {
        self.output_mapping.push(IoMapping::new(source, target));
        self
    }
}

/// `target` receives the value of the `source` expression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IoMapping {
    pub source: String,
    pub target: String,
}

impl IoMapping {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
        }
    }
}

/// A directed edge, optionally guarded by a condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceFlow {
    pub id: FlowId,
    pub source_ref: ElementId,
    pub target_ref: ElementId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition_expression: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub default: bool,
}

impl SequenceFlow {
    pub fn new(
        id: impl Into<FlowId>,
        source_ref: impl Into<ElementId>,
        target_ref: impl Into<ElementId>,
    ) -> Self {
        Self {
            id: id.into(),
            source_ref: source_ref.into(),
            target_ref: target_ref.into(),
            condition_expression: None,
            default: false,
        }
    }

    pub fn with_condition(mut self, expression: impl Into<String>) -> Self {
        self.condition_expression = Some(expression.into());
        self
    }

    pub fn as_default(mut self) -> Self {
        self.default = true;
        self
    }

    /// Condition text, treating blank strings as absent.
    pub fn condition(&self) -> Option<&str> {
        self.condition_expression
            .as_deref()
            .filter(|c| !c.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const DEFINITION: &str = r#"{
        "id": "order-process",
        "elements": [
            {"id": "start", "type": "start_event"},
            {"id": "gw", "type": "exclusive_gateway"},
            {"id": "task-a", "type": "service_task", "task_type": "ship",
             "input_mapping": [{"source": "=price * 2", "target": "doubled"}]},
            {"id": "end", "type": "end_event"}
        ],
        "sequence_flows": [
            {"id": "f1", "source_ref": "start", "target_ref": "gw"},
            {"id": "f2", "source_ref": "gw", "target_ref": "task-a", "condition_expression": "price > 0"},
            {"id": "f3", "source_ref": "gw", "target_ref": "end", "default": true},
            {"id": "f4", "source_ref": "task-a", "target_ref": "end"}
        ]
    }"#;

    #[test]
    fn test_deserialize_definition() {
        let def = ProcessDefinition::from_json_str(DEFINITION).unwrap();
        assert_eq!(def.id, "order-process");
        assert_eq!(def.elements.len(), 4);

        let task = def.element("task-a").unwrap();
        let task_def = task.task_definition().unwrap();
        assert_eq!(task_def.task_type.as_deref(), Some("ship"));
        assert_eq!(
            task.input_mapping(),
            &[IoMapping::new("=price * 2", "doubled")]
        );
        assert!(task.output_mapping().is_empty());

        let outgoing: Vec<&str> = def.outgoing_flows("gw").iter().map(|f| f.id.as_str()).collect();
        assert_eq!(outgoing, vec!["f2", "f3"]);
        assert!(def.flow("f3").unwrap().default);
        assert_eq!(def.incoming_flow_count("end"), 2);
    }

    #[test]
    fn test_serialize_round_trip_is_stable() {
        let def = ProcessDefinition::from_json_str(DEFINITION).unwrap();
        let json = serde_json::to_string(&def).unwrap();
        let back = ProcessDefinition::from_json_str(&json).unwrap();
        assert_eq!(back, def);
    }

    #[test]
    fn test_blank_condition_is_absent() {
        let flow = SequenceFlow::new("f", "a", "b").with_condition("   ");
        assert_eq!(flow.condition(), None);
    }

    fn minimal() -> ProcessDefinition {
        ProcessDefinition {
            id: "p".into(),
            name: None,
            elements: vec![
                Element::new("start", ElementKind::StartEvent),
                Element::new("end", ElementKind::EndEvent),
            ],
            sequence_flows: vec![SequenceFlow::new("f1", "start", "end")],
        }
    }

    #[test]
    fn test_validate_accepts_minimal() {
        assert!(minimal().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_structural_errors() {
        let mut no_start = minimal();
        no_start.elements.remove(0);
        no_start.sequence_flows.clear();
        assert!(no_start.validate().is_err());

        let mut duplicate = minimal();
        duplicate.elements.push(Element::new("end", ElementKind::EndEvent));
        assert!(duplicate.validate().is_err());

        let mut dangling = minimal();
        dangling.sequence_flows.push(SequenceFlow::new("f2", "start", "nowhere"));
        assert!(dangling.validate().is_err());

        let mut default_off_event = minimal();
        default_off_event.sequence_flows[0].default = true;
        let err = default_off_event.validate().unwrap_err();
        assert!(err.to_string().contains("exclusive gateway"));
    }

    #[test]
    fn test_validate_rejects_two_defaults() {
        let mut def = minimal();
        def.elements.push(Element::new("gw", ElementKind::ExclusiveGateway));
        def.sequence_flows = vec![
            SequenceFlow::new("f1", "start", "gw"),
            SequenceFlow::new("f2", "gw", "end").as_default(),
            SequenceFlow::new("f3", "gw", "end").as_default(),
        ];
        assert!(def.validate().is_err());
    }
}
