use crate::types::{AttributePath, Diagnostic, Dynamic};

#[derive(Debug, Clone)]
pub struct PlanModifyRequest {
    /// Prior state value, null on create
    pub state: Dynamic,
    /// Planned value so far
    pub plan: Dynamic,
    pub config: Dynamic,
    pub attribute_path: AttributePath,
}

#[derive(Debug, Clone)]
pub struct PlanModifyResponse {
    pub plan_value: Dynamic,
    pub requires_replace: bool,
    pub diagnostics: Vec<Diagnostic>,
}

impl PlanModifyResponse {
    fn keep(request: PlanModifyRequest) -> Self {
        Self {
            plan_value: request.plan,
            requires_replace: false,
            diagnostics: Vec::new(),
        }
    }
}

/// Trait for modifying terraform plan behavior
///
/// Plan modifiers run after defaults and computed handling and can:
/// - Modify the planned value
/// - Mark an attribute as requiring replacement
/// - Add warnings or errors to the plan
pub trait PlanModifier: Send + Sync {
    fn description(&self) -> String {
        String::new()
    }

    /// Modify the plan for an attribute
    fn modify_plan(&self, request: PlanModifyRequest) -> PlanModifyResponse;
}

/// Marks an attribute as requiring replacement when it changes on an
/// existing resource. An unknown planned value counts as a change.
pub struct RequiresReplace;

impl PlanModifier for RequiresReplace {
    fn description(&self) -> String {
        "changing this attribute forces a new resource".to_string()
    }

    fn modify_plan(&self, request: PlanModifyRequest) -> PlanModifyResponse {
        let requires_replace = value_changed(&request.state, &request.plan);
        PlanModifyResponse {
            requires_replace,
            ..PlanModifyResponse::keep(request)
        }
    }
}

/// Uses the prior state value when the planned value is unknown
///
/// Typical for computed attributes such as `id` that never change after
/// creation.
pub struct UseStateForUnknown;

impl PlanModifier for UseStateForUnknown {
    fn description(&self) -> String {
        "once set, the value of this attribute in state will not change".to_string()
    }

    fn modify_plan(&self, request: PlanModifyRequest) -> PlanModifyResponse {
        let plan_value = match (&request.plan, &request.state) {
            (Dynamic::Unknown, state) if !state.is_null() => state.clone(),
            _ => request.plan.clone(),
        };

        PlanModifyResponse {
            plan_value,
            ..PlanModifyResponse::keep(request)
        }
    }
}

/// Requires replacement when the value changes and `predicate` agrees.
pub struct RequiresReplaceIf<F>
where
    F: Fn(&PlanModifyRequest) -> bool + Send + Sync,
{
    predicate: F,
    description: String,
}

impl<F> RequiresReplaceIf<F>
where
    F: Fn(&PlanModifyRequest) -> bool + Send + Sync,
{
    pub fn new(predicate: F, description: impl Into<String>) -> Self {
        Self {
            predicate,
            description: description.into(),
        }
    }
}

impl<F> PlanModifier for RequiresReplaceIf<F>
where
    F: Fn(&PlanModifyRequest) -> bool + Send + Sync,
{
    fn description(&self) -> String {
        self.description.clone()
    }

    fn modify_plan(&self, request: PlanModifyRequest) -> PlanModifyResponse {
        let requires_replace =
            value_changed(&request.state, &request.plan) && (self.predicate)(&request);
        PlanModifyResponse {
            requires_replace,
            ..PlanModifyResponse::keep(request)
        }
    }
}

/// Whether an existing value differs from the planned one.
fn value_changed(state: &Dynamic, plan: &Dynamic) -> bool {
    match (state, plan) {
        (Dynamic::Null, _) => false,
        (_, Dynamic::Unknown) => true,
        (state, plan) => !values_equal(state, plan),
    }
}

/// Structural equality that tolerates float rounding.
pub fn values_equal(a: &Dynamic, b: &Dynamic) -> bool {
    match (a, b) {
        (Dynamic::Null, Dynamic::Null) => true,
        (Dynamic::Unknown, Dynamic::Unknown) => true,
        (Dynamic::Bool(a), Dynamic::Bool(b)) => a == b,
        (Dynamic::Number(a), Dynamic::Number(b)) => (a - b).abs() < f64::EPSILON,
        (Dynamic::String(a), Dynamic::String(b)) => a == b,
        (Dynamic::List(a), Dynamic::List(b)) => {
            a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| values_equal(x, y))
        }
        (Dynamic::Map(a), Dynamic::Map(b)) => {
            a.len() == b.len()
                && a.iter()
                    .all(|(k, v)| b.get(k).is_some_and(|v2| values_equal(v, v2)))
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn request(state: Dynamic, plan: Dynamic) -> PlanModifyRequest {
        PlanModifyRequest {
            config: plan.clone(),
            state,
            plan,
            attribute_path: AttributePath::new("cidr_block"),
        }
    }

    #[test]
    fn requires_replace_does_not_trigger_on_same_value() {
        let response = RequiresReplace.modify_plan(request(
            Dynamic::from("10.0.0.0/16"),
            Dynamic::from("10.0.0.0/16"),
        ));

        assert!(!response.requires_replace);
        assert!(response.diagnostics.is_empty());
    }

    #[test]
    fn requires_replace_triggers_on_different_value() {
        let response = RequiresReplace.modify_plan(request(
            Dynamic::from("10.0.0.0/16"),
            Dynamic::from("10.1.0.0/16"),
        ));

        assert!(response.requires_replace);
        assert_eq!(response.plan_value, Dynamic::from("10.1.0.0/16"));
    }

    #[test]
    fn requires_replace_ignores_create() {
        let response = RequiresReplace.modify_plan(request(Dynamic::Null, Dynamic::from("x")));
        assert!(!response.requires_replace);
    }

    #[test]
    fn requires_replace_treats_unknown_plan_as_change() {
        let response = RequiresReplace.modify_plan(request(Dynamic::from("x"), Dynamic::Unknown));
        assert!(response.requires_replace);
    }

    #[test]
    fn requires_replace_compares_nested_values() {
        let a = Dynamic::Map(HashMap::from([("ocpus".to_string(), Dynamic::Number(1.0))]));
        let b = Dynamic::Map(HashMap::from([("ocpus".to_string(), Dynamic::Number(2.0))]));

        assert!(!RequiresReplace.modify_plan(request(a.clone(), a.clone())).requires_replace);
        assert!(RequiresReplace.modify_plan(request(a, b)).requires_replace);
    }

    #[test]
    fn use_state_for_unknown_copies_prior_value() {
        let response = UseStateForUnknown.modify_plan(request(
            Dynamic::from("ocid1.vcn.oc1..aaa"),
            Dynamic::Unknown,
        ));
        assert_eq!(response.plan_value, Dynamic::from("ocid1.vcn.oc1..aaa"));
    }

    #[test]
    fn use_state_for_unknown_keeps_unknown_on_create() {
        let response = UseStateForUnknown.modify_plan(request(Dynamic::Null, Dynamic::Unknown));
        assert_eq!(response.plan_value, Dynamic::Unknown);
    }

    #[test]
    fn use_state_for_unknown_leaves_known_plan() {
        let response =
            UseStateForUnknown.modify_plan(request(Dynamic::from("old"), Dynamic::from("new")));
        assert_eq!(response.plan_value, Dynamic::from("new"));
    }

    #[test]
    fn requires_replace_if_consults_predicate() {
        // Growing is an in-place update, shrinking forces replacement.
        let modifier = RequiresReplaceIf::new(
            |req: &PlanModifyRequest| match (req.state.as_f64(), req.plan.as_f64()) {
                (Some(old), Some(new)) => new < old,
                _ => false,
            },
            "boot volume size can only grow in place",
        );

        let grow = modifier.modify_plan(request(Dynamic::Number(50.0), Dynamic::Number(100.0)));
        assert!(!grow.requires_replace);

        let shrink = modifier.modify_plan(request(Dynamic::Number(100.0), Dynamic::Number(50.0)));
        assert!(shrink.requires_replace);

        let same = modifier.modify_plan(request(Dynamic::Number(50.0), Dynamic::Number(50.0)));
        assert!(!same.requires_replace);
    }
}
