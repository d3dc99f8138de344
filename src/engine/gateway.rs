//! Gateway decision logic.

use crate::expression::evaluate_condition;
use crate::model::SequenceFlow;
use crate::types::{ElementId, Error, Result};
use crate::variables::VariableLookup;

/// Choose the single outgoing flow of an exclusive gateway.
///
/// Flows are tested in declaration order. The default flow and flows without
/// a condition take no part in the pass; the first condition that evaluates
/// to `true` wins and no later condition is evaluated. Without a match the
/// default flow is taken. Evaluation errors are returned as they are, never
/// read as `false`.
pub fn select_exclusive_flow<'d>(
    gateway_id: &str,
    flows: &[&'d SequenceFlow],
    variables: &dyn VariableLookup,
) -> Result<&'d SequenceFlow> {
    let mut default_flow = None;

    for &flow in flows {
        if flow.default {
            if default_flow.is_none() {
                default_flow = Some(flow);
            }
            continue;
        }
        let Some(condition) = flow.condition() else {
            continue;
        };
        if evaluate_condition(condition, variables)? {
            tracing::debug!(
                "exclusive_flow_selected: gateway={}, flow={}, condition={}",
                gateway_id,
                flow.id,
                condition
            );
            return Ok(flow);
        }
    }

    match default_flow {
        Some(flow) => {
            tracing::debug!(
                "exclusive_default_flow_selected: gateway={}, flow={}",
                gateway_id,
                flow.id
            );
            Ok(flow)
        }
        None => Err(Error::NoMatchingFlow {
            gateway_id: gateway_id.to_string(),
        }),
    }
}

/// Targets of every outgoing flow, conditions ignored. Used for parallel
/// gateways and for implicit forks out of events and tasks.
pub fn all_targets(flows: &[&SequenceFlow]) -> Vec<ElementId> {
    flows.iter().map(|f| f.target_ref.clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::EvaluationError;
    use crate::variables::NoVariables;
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};
    use std::collections::HashMap;

    fn vars(entries: &[(&str, Value)]) -> HashMap<String, Value> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn flows() -> Vec<SequenceFlow> {
        vec![
            SequenceFlow::new("to-a", "gw", "task-a").with_condition("price > 0"),
            SequenceFlow::new("to-b", "gw", "task-b").with_condition("= price < 0"),
        ]
    }

    fn select<'d>(flows: &'d [SequenceFlow], variables: &dyn VariableLookup) -> Result<&'d SequenceFlow> {
        let refs: Vec<&SequenceFlow> = flows.iter().collect();
        select_exclusive_flow("gw", &refs, variables)
    }

    #[test]
    fn test_first_true_condition_wins() {
        let flows = flows();
        let flow = select(&flows, &vars(&[("price", json!(-50))])).unwrap();
        assert_eq!(flow.target_ref, "task-b");

        let flow = select(&flows, &vars(&[("price", json!(50))])).unwrap();
        assert_eq!(flow.target_ref, "task-a");
    }

    #[test]
    fn test_declaration_order_breaks_ties() {
        let flows = vec![
            SequenceFlow::new("first", "gw", "task-a").with_condition("true"),
            SequenceFlow::new("second", "gw", "task-b").with_condition("true"),
        ];
        assert_eq!(select(&flows, &NoVariables).unwrap().id, "first");
    }

    #[test]
    fn test_short_circuit_skips_later_conditions() {
        // The second condition would fail on the undefined variable.
        let flows = vec![
            SequenceFlow::new("first", "gw", "task-a").with_condition("price == 0"),
            SequenceFlow::new("second", "gw", "task-b").with_condition("unknown > 1"),
        ];
        let flow = select(&flows, &vars(&[("price", json!(0))])).unwrap();
        assert_eq!(flow.id, "first");
    }

    #[test]
    fn test_default_flow_when_nothing_matches() {
        let mut flows = flows();
        flows.insert(0, SequenceFlow::new("fallback", "gw", "task-c").as_default());

        let flow = select(&flows, &vars(&[("price", json!(0))])).unwrap();
        assert_eq!(flow.id, "fallback");
    }

    #[test]
    fn test_default_flow_is_skipped_during_pass() {
        let flows = vec![
            SequenceFlow::new("fallback", "gw", "task-c")
                .with_condition("true")
                .as_default(),
            SequenceFlow::new("to-a", "gw", "task-a").with_condition("true"),
        ];
        assert_eq!(select(&flows, &NoVariables).unwrap().id, "to-a");
    }

    #[test]
    fn test_unconditioned_flows_are_ignored() {
        let flows = vec![
            SequenceFlow::new("plain", "gw", "task-c"),
            SequenceFlow::new("to-a", "gw", "task-a").with_condition("true"),
        ];
        assert_eq!(select(&flows, &NoVariables).unwrap().id, "to-a");
    }

    #[test]
    fn test_no_match_and_no_default_is_error() {
        let flows = flows();
        let err = select(&flows, &vars(&[("price", json!(0))])).unwrap_err();
        assert!(matches!(err, Error::NoMatchingFlow { ref gateway_id } if gateway_id == "gw"));
    }

    #[test]
    fn test_missing_variables_propagate_evaluation_error() {
        let mut flows = flows();
        flows.push(SequenceFlow::new("fallback", "gw", "task-c").as_default());

        let err = select(&flows, &NoVariables).unwrap_err();
        assert!(matches!(
            err,
            Error::Evaluation(EvaluationError::UndefinedVariable(ref name)) if name == "price"
        ));
    }

    #[test]
    fn test_non_boolean_condition_is_error() {
        let flows = vec![SequenceFlow::new("to-a", "gw", "task-a").with_condition("price + 1")];
        let err = select(&flows, &vars(&[("price", json!(1))])).unwrap_err();
        assert!(matches!(
            err,
            Error::Evaluation(EvaluationError::TypeMismatch(_))
        ));
    }

    #[test]
    fn test_all_targets_keeps_order() {
        let flows = flows();
        let refs: Vec<&SequenceFlow> = flows.iter().collect();
        assert_eq!(
            all_targets(&refs),
            vec![ElementId::from("task-a"), ElementId::from("task-b")]
        );
    }
}
