//! Plan modifiers.
//!
//! A plan modifier is provider code attached to an attribute or block. During
//! planning it sees the configuration, prior state, and proposed plan values
//! at one path and may rewrite the plan value, request a resource
//! replacement, update private state, or raise diagnostics.
//!
//! Modifiers run in the order they were attached. Each one starts from the
//! plan value, replace flag, and private state left by the previous one, so a
//! modifier that leaves a response field alone keeps the earlier result.

use std::fmt;
use std::sync::Arc;

use crate::data::Data;
use crate::diag::Diagnostics;
use crate::path::Path;
use crate::privatestate::ProviderData;
use crate::types::Value;

/// What a plan modifier gets to look at.
#[derive(Debug, Clone, Copy)]
pub struct PlanModifierRequest<'a> {
    /// Path of the attribute or block being planned.
    pub path: &'a Path,
    /// The whole resource configuration.
    pub config: &'a Data,
    /// The whole prior state. Null when the resource is being created.
    pub state: &'a Data,
    /// The whole plan, including the writes of every attribute and block
    /// planned before this one. Null when the resource is being destroyed.
    pub plan: &'a Data,
    /// Provider metadata configuration.
    pub provider_meta: &'a Data,
    /// Configuration value at `path`.
    pub config_value: &'a Value,
    /// Prior state value at `path`.
    pub state_value: &'a Value,
    /// Plan value at `path`, as left by the previous modifier.
    pub plan_value: &'a Value,
}

/// What a plan modifier hands back.
#[derive(Debug, Clone)]
pub struct PlanModifierResponse {
    /// The plan value. Starts as the request's plan value.
    pub plan_value: Value,
    /// Whether a change at this path forces replacement. Starts as the
    /// decision of the previous modifier.
    pub requires_replace: bool,
    /// Provider private state. Read and write keys here.
    pub private: ProviderData,
    /// Diagnostics raised by the modifier. Any error stops the remaining
    /// modifiers at this path.
    pub diagnostics: Diagnostics,
}

/// Provider code run against one attribute or block during planning.
pub trait PlanModifier: Send + Sync {
    /// Human-readable description, used in logs and documentation.
    fn description(&self) -> String;

    /// Adjust the planned value at `req.path`.
    fn modify_plan(&self, req: &PlanModifierRequest<'_>, resp: &mut PlanModifierResponse);
}

/// An ordered list of plan modifiers.
#[derive(Clone, Default)]
pub struct PlanModifiers(Vec<Arc<dyn PlanModifier>>);

impl PlanModifiers {
    /// Create an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a modifier.
    pub fn push(&mut self, modifier: impl PlanModifier + 'static) {
        self.0.push(Arc::new(modifier));
    }

    /// Append a shared modifier.
    pub fn push_arc(&mut self, modifier: Arc<dyn PlanModifier>) {
        self.0.push(modifier);
    }

    /// Iterate in declared order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn PlanModifier>> {
        self.0.iter()
    }

    /// Number of modifiers.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no modifiers.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for PlanModifiers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.0.iter().map(|m| m.description()))
            .finish()
    }
}

/// Whether the request describes an in-place update that changes the value.
fn value_changes_on_update(req: &PlanModifierRequest<'_>) -> bool {
    // creation
    if req.state.is_null() {
        return false;
    }
    // destruction
    if req.plan.is_null() {
        return false;
    }
    req.plan_value != req.state_value
}

/// Requires replacement whenever the value changes on update.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequiresReplace;

impl PlanModifier for RequiresReplace {
    fn description(&self) -> String {
        "If the value of this attribute changes, the resource will be destroyed and recreated."
            .to_string()
    }

    fn modify_plan(&self, req: &PlanModifierRequest<'_>, resp: &mut PlanModifierResponse) {
        if value_changes_on_update(req) {
            resp.requires_replace = true;
        }
    }
}

/// Requires replacement when the value changes on update and the condition
/// agrees. A `false` answer keeps whatever earlier modifiers decided.
pub struct RequiresReplaceIf<F> {
    description: String,
    condition: F,
}

impl<F> RequiresReplaceIf<F>
where
    F: Fn(&PlanModifierRequest<'_>, &mut Diagnostics) -> bool + Send + Sync,
{
    /// Create the modifier from a condition.
    pub fn new(description: impl Into<String>, condition: F) -> Self {
        Self {
            description: description.into(),
            condition,
        }
    }
}

impl<F> PlanModifier for RequiresReplaceIf<F>
where
    F: Fn(&PlanModifierRequest<'_>, &mut Diagnostics) -> bool + Send + Sync,
{
    fn description(&self) -> String {
        self.description.clone()
    }

    fn modify_plan(&self, req: &PlanModifierRequest<'_>, resp: &mut PlanModifierResponse) {
        if !value_changes_on_update(req) {
            return;
        }
        if (self.condition)(req, &mut resp.diagnostics) {
            resp.requires_replace = true;
        }
    }
}

/// Requires replacement when a configured value changes on update.
///
/// Removing the value from configuration does not force replacement.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequiresReplaceIfConfigured;

impl PlanModifier for RequiresReplaceIfConfigured {
    fn description(&self) -> String {
        "If the value of this attribute is configured and changes, the resource will be \
         destroyed and recreated."
            .to_string()
    }

    fn modify_plan(&self, req: &PlanModifierRequest<'_>, resp: &mut PlanModifierResponse) {
        if req.config_value.is_null() {
            return;
        }
        if value_changes_on_update(req) {
            resp.requires_replace = true;
        }
    }
}

/// Keeps the prior state value instead of showing an unknown in the plan.
///
/// Useful for computed values that never change after creation, such as IDs.
#[derive(Debug, Clone, Copy, Default)]
pub struct UseStateForUnknown;

impl PlanModifier for UseStateForUnknown {
    fn description(&self) -> String {
        "Once set, the value of this attribute in state will not change.".to_string()
    }

    fn modify_plan(&self, req: &PlanModifierRequest<'_>, resp: &mut PlanModifierResponse) {
        if req.state.is_null() || req.state_value.is_null() {
            return;
        }
        if !req.plan_value.is_unknown() {
            return;
        }
        // an unknown config value means the value is derived from something else
        if req.config_value.is_unknown() {
            return;
        }
        resp.plan_value = req.state_value.clone();
    }
}

/// A plan modifier built from a closure.
pub struct PlanModifierFn<F> {
    description: String,
    modify: F,
}

impl<F> PlanModifierFn<F>
where
    F: Fn(&PlanModifierRequest<'_>, &mut PlanModifierResponse) + Send + Sync,
{
    /// Wrap a closure.
    pub fn new(description: impl Into<String>, modify: F) -> Self {
        Self {
            description: description.into(),
            modify,
        }
    }
}

impl<F> PlanModifier for PlanModifierFn<F>
where
    F: Fn(&PlanModifierRequest<'_>, &mut PlanModifierResponse) + Send + Sync,
{
    fn description(&self) -> String {
        self.description.clone()
    }

    fn modify_plan(&self, req: &PlanModifierRequest<'_>, resp: &mut PlanModifierResponse) {
        (self.modify)(req, resp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::DataDescription;
    use crate::diag::Diagnostic;
    use crate::schema::{Attribute, Schema};
    use crate::types::AttributeType;
    use serde_json::json;

    struct Trees {
        config: Data,
        state: Data,
        plan: Data,
        meta: Data,
    }

    fn trees(
        config: serde_json::Value,
        state: serde_json::Value,
        plan: serde_json::Value,
    ) -> Trees {
        let schema = Arc::new(
            Schema::v0()
                .with_attribute("name", Attribute::optional_string())
                .with_attribute("id", Attribute::computed_string()),
        );
        let build = |description, json: serde_json::Value| {
            Data::from_json(description, schema.clone(), &json).unwrap()
        };
        Trees {
            config: build(DataDescription::Configuration, config),
            state: build(DataDescription::State, state),
            plan: build(DataDescription::Plan, plan),
            meta: Data::null(DataDescription::ProviderMeta, Arc::new(Schema::v0())),
        }
    }

    fn run(
        modifier: &dyn PlanModifier,
        trees: &Trees,
        attribute: &str,
        plan_override: Option<Value>,
    ) -> PlanModifierResponse {
        let path = Path::root(attribute);
        let config_value = trees.config.value_at_path(&path).unwrap();
        let state_value = trees.state.value_at_path(&path).unwrap();
        let plan_value = plan_override.unwrap_or_else(|| trees.plan.value_at_path(&path).unwrap());
        let req = PlanModifierRequest {
            path: &path,
            config: &trees.config,
            state: &trees.state,
            plan: &trees.plan,
            provider_meta: &trees.meta,
            config_value: &config_value,
            state_value: &state_value,
            plan_value: &plan_value,
        };
        let mut resp = PlanModifierResponse {
            plan_value: plan_value.clone(),
            requires_replace: false,
            private: ProviderData::empty(),
            diagnostics: Diagnostics::new(),
        };
        modifier.modify_plan(&req, &mut resp);
        resp
    }

    #[test]
    fn test_requires_replace_on_change() {
        let t = trees(json!({"name": "new"}), json!({"name": "old"}), json!({"name": "new"}));
        assert!(run(&RequiresReplace, &t, "name", None).requires_replace);
    }

    #[test]
    fn test_requires_replace_skips_create_destroy_and_no_change() {
        let create = trees(json!({"name": "new"}), json!(null), json!({"name": "new"}));
        assert!(!run(&RequiresReplace, &create, "name", None).requires_replace);

        let destroy = trees(json!(null), json!({"name": "old"}), json!(null));
        assert!(!run(&RequiresReplace, &destroy, "name", None).requires_replace);

        let same = trees(json!({"name": "a"}), json!({"name": "a"}), json!({"name": "a"}));
        assert!(!run(&RequiresReplace, &same, "name", None).requires_replace);
    }

    #[test]
    fn test_requires_replace_if() {
        let t = trees(json!({"name": "new"}), json!({"name": "old"}), json!({"name": "new"}));

        let never = RequiresReplaceIf::new(
            "never",
            |_: &PlanModifierRequest<'_>, _: &mut Diagnostics| false,
        );
        assert!(!run(&never, &t, "name", None).requires_replace);

        let warn = RequiresReplaceIf::new(
            "warns",
            |_: &PlanModifierRequest<'_>, diags: &mut Diagnostics| {
                diags.push(Diagnostic::warning("Replacing"));
                true
            },
        );
        let resp = run(&warn, &t, "name", None);
        assert!(resp.requires_replace);
        assert_eq!(resp.diagnostics.warnings_count(), 1);
    }

    #[test]
    fn test_requires_replace_if_configured() {
        let removed = trees(json!({"name": null}), json!({"name": "old"}), json!({"name": null}));
        assert!(!run(&RequiresReplaceIfConfigured, &removed, "name", None).requires_replace);

        let changed = trees(json!({"name": "new"}), json!({"name": "old"}), json!({"name": "new"}));
        assert!(run(&RequiresReplaceIfConfigured, &changed, "name", None).requires_replace);
    }

    #[test]
    fn test_use_state_for_unknown() {
        let t = trees(json!({}), json!({"id": "i-123"}), json!({}));
        let unknown = Some(Value::Unknown(AttributeType::String));

        let resp = run(&UseStateForUnknown, &t, "id", unknown.clone());
        assert_eq!(resp.plan_value, Value::string("i-123"));

        let create = trees(json!({}), json!(null), json!({}));
        let resp = run(&UseStateForUnknown, &create, "id", unknown);
        assert!(resp.plan_value.is_unknown());

        // known plan values are left alone
        let resp = run(&UseStateForUnknown, &t, "id", Some(Value::string("i-999")));
        assert_eq!(resp.plan_value, Value::string("i-999"));
    }

    #[test]
    fn test_plan_modifier_fn() {
        let t = trees(json!({"name": "a"}), json!(null), json!({"name": "a"}));
        let upper = PlanModifierFn::new(
            "uppercase",
            |req: &PlanModifierRequest<'_>, resp: &mut PlanModifierResponse| {
                if let Value::String(s) = req.plan_value {
                    resp.plan_value = Value::string(s.to_uppercase());
                }
            },
        );
        assert_eq!(upper.description(), "uppercase");
        assert_eq!(run(&upper, &t, "name", None).plan_value, Value::string("A"));
    }

    #[test]
    fn test_plan_modifiers_debug_lists_descriptions() {
        let mut modifiers = PlanModifiers::new();
        modifiers.push(UseStateForUnknown);
        assert_eq!(
            format!("{:?}", modifiers),
            r#"["Once set, the value of this attribute in state will not change."]"#
        );
    }
}
