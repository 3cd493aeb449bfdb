//! Plan modification for one nested block and everything below it.
//!
//! Blocks walk like attributes, except that every block instance has two
//! kinds of children: attributes, which go to the attribute engine, and
//! nested blocks, which come back here. Both kinds are visited for one
//! instance before moving on to the next.
//!
//! Minimum and maximum item counts are not checked here. They belong to
//! configuration validation.

use tracing::debug_span;

use crate::attribute_plan_modification::modify_attribute_plan;
use crate::schema::{Block, BlockNestingMode, NestedBlock};
use crate::schema_plan_modification::{
    commit_plan_value, current_set_element, lookup_values, run_plan_modifiers, walk_error,
    ModifyAttributePlanRequest, ModifySchemaPlanResponse,
};
use crate::types::Value;

/// Run the block's plan modifiers, write the result into the response plan,
/// then recurse into every block instance.
pub fn modify_block_plan(
    block: &NestedBlock,
    req: &ModifyAttributePlanRequest<'_>,
    resp: &mut ModifySchemaPlanResponse,
) {
    let span = debug_span!("modify_block_plan", attribute_path = %req.path);
    let _enter = span.enter();

    let Some(values) = lookup_values(req, resp) else {
        return;
    };

    let Some((plan_value, requires_replace)) =
        run_plan_modifiers(&block.plan_modifiers, req, values, resp)
    else {
        return;
    };

    if !commit_plan_value(req, &plan_value, requires_replace, resp) {
        return;
    }

    if !plan_value.is_known() {
        return;
    }

    match (block.nesting_mode, &plan_value) {
        (BlockNestingMode::List, Value::List { elements, .. }) => {
            for index in 0..elements.len() {
                modify_block_instance(&block.block, &req.at(req.path.at_list_index(index)), resp);
            }
        },
        (BlockNestingMode::Set, Value::Set { elements, .. }) => {
            for index in 0..elements.len() {
                for (name, attribute) in &block.block.attributes {
                    let Some(element) = current_set_element(resp, &req.path, index) else {
                        return;
                    };
                    let path = req.path.at_set_value(element).at_name(name);
                    modify_attribute_plan(attribute, &req.at(path), resp);
                }
                for (name, nested) in &block.block.blocks {
                    let Some(element) = current_set_element(resp, &req.path, index) else {
                        return;
                    };
                    let path = req.path.at_set_value(element).at_name(name);
                    modify_block_plan(nested, &req.at(path), resp);
                }
            }
        },
        (BlockNestingMode::Single, Value::Object { .. }) => {
            modify_block_instance(&block.block, req, resp);
        },
        (nesting_mode, value) => {
            resp.diagnostics
                .push(walk_error("Block", &req.path, value, nesting_mode));
        },
    }
}

/// Visit the attributes, then the nested blocks, of one block instance.
fn modify_block_instance(
    block: &Block,
    req: &ModifyAttributePlanRequest<'_>,
    resp: &mut ModifySchemaPlanResponse,
) {
    for (name, attribute) in &block.attributes {
        modify_attribute_plan(attribute, &req.at(req.path.at_name(name)), resp);
    }
    for (name, nested) in &block.blocks {
        modify_block_plan(nested, &req.at(req.path.at_name(name)), resp);
    }
}
