//! Input and output variable mappings of task elements.

use crate::expression::evaluate_expression;
use crate::model::{Element, IoMapping};
use crate::types::{Error, Result};
use crate::variables::ScopeFrame;

/// Evaluate input mappings into the frame's local entries, in order.
///
/// Each mapping sees the results of the ones before it. The first failure
/// aborts the whole mapping.
pub(crate) fn apply_input_mappings(element: &Element, frame: &mut ScopeFrame<'_>) -> Result<usize> {
    apply(element, element.input_mapping(), frame, |frame, target, value| {
        frame.set_variable_local(target, value)
    })
}

/// Evaluate output mappings against the job's full view and stage the
/// results for propagation to the instance.
pub(crate) fn apply_output_mappings(element: &Element, frame: &mut ScopeFrame<'_>) -> Result<usize> {
    apply(element, element.output_mapping(), frame, |frame, target, value| {
        frame.set_variable(target, value)
    })
}

fn apply<F>(
    element: &Element,
    mappings: &[IoMapping],
    frame: &mut ScopeFrame<'_>,
    mut write: F,
) -> Result<usize>
where
    F: FnMut(&mut ScopeFrame<'_>, String, serde_json::Value),
{
    for mapping in mappings {
        let value = evaluate_expression(&mapping.source, &*frame)
            .map_err(|e| Error::mapping(element.id.as_str(), mapping.target.as_str(), e))?;
        tracing::trace!(
            "mapping_evaluated: element={}, target={}, source={}",
            element.id,
            mapping.target,
            mapping.source
        );
        write(frame, mapping.target.clone(), value);
    }
    Ok(mappings.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::EvaluationError;
    use crate::model::{ElementKind, TaskDefinition};
    use crate::variables::VariableScope;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn task(definition: TaskDefinition) -> Element {
        Element::new("task-a", ElementKind::ServiceTask(definition))
    }

    #[test]
    fn test_input_mappings_are_local_and_sequential() {
        let scope = VariableScope::from_variables([("price", json!(10))]);
        let element = task(
            TaskDefinition::new()
                .input("= price * 2", "doubled")
                .input("doubled + 1", "plus_one"),
        );

        let mut frame = scope.child();
        assert_eq!(apply_input_mappings(&element, &mut frame).unwrap(), 2);
        assert_eq!(frame.get_variable("plus_one"), Some(json!(21)));
        assert!(frame.staged_variables().is_empty());
        assert_eq!(frame.local_variables().len(), 2);
    }

    #[test]
    fn test_output_mappings_are_staged() {
        let scope = VariableScope::from_variables([("price", json!(10))]);
        let element = task(TaskDefinition::new().output("price > 5", "expensive"));

        let mut frame = scope.child();
        apply_output_mappings(&element, &mut frame).unwrap();
        assert_eq!(frame.staged_variables().get("expensive"), Some(&json!(true)));
        assert!(frame.local_variables().is_empty());
    }

    #[test]
    fn test_failure_names_element_and_target() {
        let scope = VariableScope::new();
        let element = task(TaskDefinition::new().input("missing + 1", "total"));

        let mut frame = scope.child();
        let err = apply_input_mappings(&element, &mut frame).unwrap_err();
        match err {
            Error::MappingEvaluation {
                element_id,
                target,
                source,
            } => {
                assert_eq!(element_id, "task-a");
                assert_eq!(target, "total");
                assert_eq!(source, EvaluationError::UndefinedVariable("missing".to_string()));
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert!(frame.local_variables().is_empty());
    }

    #[test]
    fn test_non_task_has_no_mappings() {
        let scope = VariableScope::new();
        let element = Element::new("gw", ElementKind::ExclusiveGateway);
        let mut frame = scope.child();
        assert_eq!(apply_input_mappings(&element, &mut frame).unwrap(), 0);
        assert_eq!(apply_output_mappings(&element, &mut frame).unwrap(), 0);
    }
}
