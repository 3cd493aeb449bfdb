//! Schema-wide plan modification.
//!
//! [`modify_schema_plan`] walks every top-level attribute and block of a
//! schema and hands each one to the attribute or block engine. All engines
//! share one [`ModifySchemaPlanResponse`]: plan writes, replace paths,
//! private state, and diagnostics accumulate there in depth-first order.
//!
//! The helpers at the bottom of this module are the parts of a walk frame
//! that attributes and blocks have in common.

use tracing::debug;

use crate::attribute_plan_modification::modify_attribute_plan;
use crate::block_plan_modification::modify_block_plan;
use crate::data::Data;
use crate::diag::{Diagnostic, Diagnostics};
use crate::path::{Path, Paths};
use crate::planmodifier::{PlanModifierRequest, PlanModifierResponse, PlanModifiers};
use crate::privatestate::ProviderData;
use crate::schema::Schema;
use crate::types::Value;

/// Input of a schema-wide plan modification.
#[derive(Debug, Clone)]
pub struct ModifySchemaPlanRequest {
    /// Resource configuration.
    pub config: Data,
    /// Prior state.
    pub state: Data,
    /// Proposed new state.
    pub plan: Data,
    /// Provider metadata configuration.
    pub provider_meta: Data,
    /// Provider private state from the prior state, if any.
    pub private: Option<ProviderData>,
}

/// Output of a schema-wide plan modification.
#[derive(Debug, Clone)]
pub struct ModifySchemaPlanResponse {
    /// The plan, with every modifier's result written back.
    pub plan: Data,
    /// Paths whose changes force resource replacement.
    pub requires_replace: Paths,
    /// Provider private state after the last modifier that touched it.
    pub private: ProviderData,
    /// Everything reported during the walk.
    pub diagnostics: Diagnostics,
}

impl ModifySchemaPlanResponse {
    /// A response seeded from the request: the proposed plan and incoming
    /// private state, no replace paths and no diagnostics.
    pub fn new(req: &ModifySchemaPlanRequest) -> Self {
        Self {
            plan: req.plan.clone(),
            requires_replace: Paths::new(),
            private: req.private.clone().unwrap_or_default(),
            diagnostics: Diagnostics::new(),
        }
    }
}

/// One frame of the walk: the node's path and the trees to read from.
///
/// Configuration and state values are looked up in the request trees. The
/// plan is always read from the response, which already holds the writes of
/// every node visited so far.
#[derive(Debug, Clone)]
pub struct ModifyAttributePlanRequest<'a> {
    /// Path of the node.
    pub path: Path,
    /// Resource configuration.
    pub config: &'a Data,
    /// Prior state.
    pub state: &'a Data,
    /// Provider metadata configuration.
    pub provider_meta: &'a Data,
}

impl<'a> ModifyAttributePlanRequest<'a> {
    /// The frame for a top-level attribute or block.
    pub fn root(req: &'a ModifySchemaPlanRequest, name: &str) -> Self {
        Self {
            path: Path::root(name),
            config: &req.config,
            state: &req.state,
            provider_meta: &req.provider_meta,
        }
    }

    /// The same trees at another path.
    pub fn at(&self, path: Path) -> Self {
        Self {
            path,
            config: self.config,
            state: self.state,
            provider_meta: self.provider_meta,
        }
    }
}

/// Run every plan modifier in the schema.
pub fn modify_schema_plan(
    schema: &Schema,
    req: &ModifySchemaPlanRequest,
    resp: &mut ModifySchemaPlanResponse,
) {
    for (name, attribute) in &schema.block.attributes {
        modify_attribute_plan(attribute, &ModifyAttributePlanRequest::root(req, name), resp);
    }

    for (name, block) in &schema.block.blocks {
        modify_block_plan(block, &ModifyAttributePlanRequest::root(req, name), resp);
    }
}

/// Values of one node in the three trees.
pub(crate) struct NodeValues {
    pub(crate) config: Value,
    pub(crate) state: Value,
    pub(crate) plan: Value,
}

/// Look up the node's values. The first failed lookup is reported and ends
/// the frame.
pub(crate) fn lookup_values(
    req: &ModifyAttributePlanRequest<'_>,
    resp: &mut ModifySchemaPlanResponse,
) -> Option<NodeValues> {
    let config = read(req.config, &req.path, &mut resp.diagnostics)?;
    let state = read(req.state, &req.path, &mut resp.diagnostics)?;
    let plan = read(&resp.plan, &req.path, &mut resp.diagnostics)?;
    Some(NodeValues {
        config,
        state,
        plan,
    })
}

fn read(data: &Data, path: &Path, diagnostics: &mut Diagnostics) -> Option<Value> {
    match data.value_at_path(path) {
        Ok(value) => Some(value),
        Err(err) => {
            diagnostics.push(data.read_error(path, &err));
            None
        },
    }
}

/// Run the modifiers in declared order, threading the plan value, replace
/// flag, and private state through them.
///
/// Returns the final plan value and replace flag, or `None` when a modifier
/// raised an error.
pub(crate) fn run_plan_modifiers(
    modifiers: &PlanModifiers,
    req: &ModifyAttributePlanRequest<'_>,
    values: NodeValues,
    resp: &mut ModifySchemaPlanResponse,
) -> Option<(Value, bool)> {
    let NodeValues {
        config,
        state,
        mut plan,
    } = values;
    let mut requires_replace = false;

    for modifier in modifiers.iter() {
        let description = modifier.description();

        let mut modifier_resp = PlanModifierResponse {
            plan_value: plan.clone(),
            requires_replace,
            private: std::mem::take(&mut resp.private),
            diagnostics: Diagnostics::new(),
        };
        let modifier_req = PlanModifierRequest {
            path: &req.path,
            config: req.config,
            state: req.state,
            plan: &resp.plan,
            provider_meta: req.provider_meta,
            config_value: &config,
            state_value: &state,
            plan_value: &plan,
        };

        debug!(description = %description, "Calling provider defined plan modifier");
        modifier.modify_plan(&modifier_req, &mut modifier_resp);
        debug!(description = %description, "Called provider defined plan modifier");

        let PlanModifierResponse {
            plan_value,
            requires_replace: replace,
            private,
            diagnostics,
        } = modifier_resp;

        let failed = diagnostics.has_error();
        resp.diagnostics.append(diagnostics);
        resp.private = private;

        if failed {
            return None;
        }

        plan = plan_value;
        requires_replace = replace;
    }

    Some((plan, requires_replace))
}

/// Record the replace decision and write the plan value back. Returns
/// `false` when the write failed.
pub(crate) fn commit_plan_value(
    req: &ModifyAttributePlanRequest<'_>,
    plan_value: &Value,
    requires_replace: bool,
    resp: &mut ModifySchemaPlanResponse,
) -> bool {
    if requires_replace {
        resp.requires_replace.append(req.path.clone());
    }

    match resp.plan.set_at_path(&req.path, plan_value.clone()) {
        Ok(()) => true,
        Err(err) => {
            let diagnostic = resp.plan.write_error(&req.path, &err);
            resp.diagnostics.push(diagnostic);
            false
        },
    }
}

/// The set element currently at `index` in the response plan.
///
/// Child frames can rewrite a set element, so every child path is built from
/// the element as it is now.
pub(crate) fn current_set_element(
    resp: &ModifySchemaPlanResponse,
    path: &Path,
    index: usize,
) -> Option<Value> {
    match resp.plan.value_at_path(path) {
        Ok(Value::Set { elements, .. }) => elements.into_iter().nth(index),
        _ => None,
    }
}

/// The diagnostic for a value whose shape does not fit the nesting mode.
pub(crate) fn walk_error(
    kind: &str,
    path: &Path,
    value: &Value,
    nesting_mode: impl std::fmt::Debug,
) -> Diagnostic {
    Diagnostic::error(format!("{} Plan Modification Error", kind))
        .with_detail(format!(
            "{} plan modifier cannot walk schema. Report this to the provider developer:\n\n\
             unknown {} value type ({}) for nesting mode ({:?}) at path: {}",
            kind,
            kind.to_lowercase(),
            value.kind_name(),
            nesting_mode,
            path
        ))
        .with_attribute(path.clone())
}
