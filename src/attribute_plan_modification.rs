//! Plan modification for one attribute and everything nested below it.

use tracing::debug_span;

use crate::schema::{Attribute, NestingMode};
use crate::schema_plan_modification::{
    commit_plan_value, current_set_element, lookup_values, run_plan_modifiers, walk_error,
    ModifyAttributePlanRequest, ModifySchemaPlanResponse,
};
use crate::types::Value;

/// Run the attribute's plan modifiers, write the result into the response
/// plan, then recurse into nested attributes.
///
/// A failed lookup, a modifier error, or a failed write ends the walk for
/// this attribute and its children only. Null and unknown values have no
/// children to visit.
pub fn modify_attribute_plan(
    attribute: &Attribute,
    req: &ModifyAttributePlanRequest<'_>,
    resp: &mut ModifySchemaPlanResponse,
) {
    let span = debug_span!("modify_attribute_plan", attribute_path = %req.path);
    let _enter = span.enter();

    let Some(values) = lookup_values(req, resp) else {
        return;
    };

    let Some((plan_value, requires_replace)) =
        run_plan_modifiers(&attribute.plan_modifiers, req, values, resp)
    else {
        return;
    };

    if !commit_plan_value(req, &plan_value, requires_replace, resp) {
        return;
    }

    let Some(nested) = attribute.nested_attributes() else {
        return;
    };

    if !plan_value.is_known() {
        return;
    }

    match (nested.nesting_mode, &plan_value) {
        (NestingMode::List, Value::List { elements, .. }) => {
            for index in 0..elements.len() {
                let element = req.path.at_list_index(index);
                for (name, child) in &nested.attributes {
                    modify_attribute_plan(child, &req.at(element.at_name(name)), resp);
                }
            }
        },
        (NestingMode::Set, Value::Set { elements, .. }) => {
            for index in 0..elements.len() {
                for (name, child) in &nested.attributes {
                    let Some(element) = current_set_element(resp, &req.path, index) else {
                        return;
                    };
                    let path = req.path.at_set_value(element).at_name(name);
                    modify_attribute_plan(child, &req.at(path), resp);
                }
            }
        },
        (NestingMode::Map, Value::Map { elements, .. }) => {
            for key in elements.keys() {
                let element = req.path.at_map_key(key.clone());
                for (name, child) in &nested.attributes {
                    modify_attribute_plan(child, &req.at(element.at_name(name)), resp);
                }
            }
        },
        (NestingMode::Single, Value::Object { attributes, .. }) => {
            if attributes.is_empty() {
                return;
            }
            for (name, child) in &nested.attributes {
                modify_attribute_plan(child, &req.at(req.path.at_name(name)), resp);
            }
        },
        (nesting_mode, value) => {
            resp.diagnostics
                .push(walk_error("Attribute", &req.path, value, nesting_mode));
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use crate::data::{Data, DataDescription};
    use crate::path::Path;
    use crate::planmodifier::{
        PlanModifier, PlanModifierFn, PlanModifierRequest, PlanModifierResponse,
    };
    use crate::schema::{AttributeFlags, NestedAttributes, Schema};
    use crate::schema_plan_modification::{modify_schema_plan, ModifySchemaPlanRequest};
    use crate::types::AttributeType;
    use serde_json::json;

    /// Records every path the modifier is called at.
    fn recorder(seen: &Arc<Mutex<Vec<String>>>) -> impl PlanModifier {
        let seen = seen.clone();
        PlanModifierFn::new(
            "record",
            move |req: &PlanModifierRequest<'_>, _: &mut PlanModifierResponse| {
                seen.lock().unwrap().push(req.path.to_string());
            },
        )
    }

    fn nested_schema(mode: NestingMode, seen: &Arc<Mutex<Vec<String>>>) -> Arc<Schema> {
        Arc::new(Schema::v0().with_attribute(
            "rules",
            Attribute::nested(
                NestedAttributes::new(mode)
                    .with_attribute(
                        "port",
                        Attribute::optional_int64().with_plan_modifier(recorder(seen)),
                    )
                    .with_attribute("proto", Attribute::optional_string()),
                AttributeFlags::optional(),
            ),
        ))
    }

    fn request(schema: &Arc<Schema>, doc: &serde_json::Value) -> ModifySchemaPlanRequest {
        let build = |description| Data::from_json(description, schema.clone(), doc).unwrap();
        ModifySchemaPlanRequest {
            config: build(DataDescription::Configuration),
            state: build(DataDescription::State),
            plan: build(DataDescription::Plan),
            provider_meta: Data::null(DataDescription::ProviderMeta, Arc::new(Schema::v0())),
            private: None,
        }
    }

    fn run_request(
        schema: &Arc<Schema>,
        req: &ModifySchemaPlanRequest,
    ) -> ModifySchemaPlanResponse {
        let mut resp = ModifySchemaPlanResponse::new(req);
        modify_schema_plan(schema, req, &mut resp);
        resp
    }

    fn run(schema: &Arc<Schema>, doc: serde_json::Value) -> ModifySchemaPlanResponse {
        run_request(schema, &request(schema, &doc))
    }

    #[test]
    fn test_list_nested_recursion() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let schema = nested_schema(NestingMode::List, &seen);

        let resp = run(&schema, json!({"rules": [{"port": 22}, {"port": 443}]}));

        assert!(resp.diagnostics.is_empty());
        assert_eq!(*seen.lock().unwrap(), vec!["rules[0].port", "rules[1].port"]);
    }

    #[test]
    fn test_map_nested_recursion() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let schema = nested_schema(NestingMode::Map, &seen);

        let resp = run(
            &schema,
            json!({"rules": {"ssh": {"port": 22}, "https": {"port": 443}}}),
        );

        assert!(resp.diagnostics.is_empty());
        assert_eq!(
            *seen.lock().unwrap(),
            vec![r#"rules["https"].port"#, r#"rules["ssh"].port"#]
        );
    }

    #[test]
    fn test_single_nested_recursion() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let schema = nested_schema(NestingMode::Single, &seen);

        let resp = run(&schema, json!({"rules": {"port": 22}}));

        assert!(resp.diagnostics.is_empty());
        assert_eq!(*seen.lock().unwrap(), vec!["rules.port"]);
    }

    #[test]
    fn test_null_nested_value_is_not_walked() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let schema = nested_schema(NestingMode::List, &seen);

        let resp = run(&schema, json!({"rules": null}));

        assert!(resp.diagnostics.is_empty());
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_set_children_use_post_modification_values() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let bump = PlanModifierFn::new(
            "bump ports",
            |req: &PlanModifierRequest<'_>, resp: &mut PlanModifierResponse| {
                let Value::Set {
                    element_type,
                    elements,
                } = req.plan_value
                else {
                    return;
                };
                let AttributeType::Object(types) = element_type else {
                    return;
                };
                let bumped = elements
                    .iter()
                    .map(|element| {
                        let port = match element.attribute("port") {
                            Some(Value::Int64(port)) => Value::Int64(port + 1000),
                            _ => Value::Null(AttributeType::Int64),
                        };
                        Value::object(types.clone(), [("port", port)])
                    })
                    .collect();
                resp.plan_value = Value::set(element_type.clone(), bumped);
            },
        );
        let schema = Arc::new(Schema::v0().with_attribute(
            "rules",
            Attribute::nested(
                NestedAttributes::new(NestingMode::Set).with_attribute(
                    "port",
                    Attribute::optional_int64().with_plan_modifier(recorder(&seen)),
                ),
                AttributeFlags::optional(),
            )
            .with_plan_modifier(bump),
        ));

        let resp = run(&schema, json!({"rules": [{"port": 22}]}));

        assert!(resp.diagnostics.is_empty());
        assert_eq!(*seen.lock().unwrap(), vec!["rules[Value({port: 1022})].port"]);
    }

    #[test]
    fn test_set_child_rewrite_readdresses_next_child() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let double = PlanModifierFn::new(
            "double",
            |req: &PlanModifierRequest<'_>, resp: &mut PlanModifierResponse| {
                if let Value::Int64(port) = req.plan_value {
                    resp.plan_value = Value::Int64(port * 2);
                }
            },
        );
        let schema = Arc::new(Schema::v0().with_attribute(
            "rules",
            Attribute::nested(
                NestedAttributes::new(NestingMode::Set)
                    .with_attribute(
                        "a_port",
                        Attribute::optional_int64().with_plan_modifier(double),
                    )
                    .with_attribute(
                        "b_proto",
                        Attribute::optional_string().with_plan_modifier(recorder(&seen)),
                    ),
                AttributeFlags::optional(),
            ),
        ));

        let resp = run(&schema, json!({"rules": [{"a_port": 21, "b_proto": "tcp"}]}));

        assert!(resp.diagnostics.is_empty());
        assert_eq!(
            *seen.lock().unwrap(),
            vec![r#"rules[Value({a_port: 42, b_proto: "tcp"})].b_proto"#]
        );
        assert_eq!(
            resp.plan.raw.to_json(),
            json!({"rules": [{"a_port": 42, "b_proto": "tcp"}]})
        );
    }

    #[test]
    fn test_set_child_rewrite_cannot_merge_elements() {
        let pin = PlanModifierFn::new(
            "pin port",
            |_: &PlanModifierRequest<'_>, resp: &mut PlanModifierResponse| {
                resp.plan_value = Value::Int64(2);
            },
        );
        let schema = Arc::new(Schema::v0().with_attribute(
            "rules",
            Attribute::nested(
                NestedAttributes::new(NestingMode::Set)
                    .with_attribute("p", Attribute::optional_int64().with_plan_modifier(pin)),
                AttributeFlags::optional(),
            ),
        ));
        let req = request(&schema, &json!({"rules": [{"p": 1}, {"p": 2}]}));

        let resp = run_request(&schema, &req);

        assert_eq!(resp.diagnostics.errors_count(), 1);
        let diag = &resp.diagnostics[0];
        assert_eq!(diag.summary, "Plan Write Error");
        assert!(diag
            .detail
            .as_deref()
            .unwrap()
            .contains("set already contains the element {p: 2}"));
        assert_eq!(resp.plan.raw, req.plan.raw);
    }

    #[test]
    fn test_wrong_typed_nested_value_is_a_write_error() {
        let schema = Arc::new(Schema::v0().with_attribute(
            "rules",
            Attribute::nested(
                NestedAttributes::new(NestingMode::List)
                    .with_attribute("port", Attribute::optional_int64()),
                AttributeFlags::optional(),
            )
            .with_plan_modifier(PlanModifierFn::new(
                "wrong shape",
                |_: &PlanModifierRequest<'_>, resp: &mut PlanModifierResponse| {
                    resp.plan_value =
                        Value::map(AttributeType::String, [("a", Value::string("b"))]);
                },
            )),
        ));

        let resp = run(&schema, json!({"rules": []}));

        assert_eq!(resp.diagnostics.errors_count(), 1);
        let diag = &resp.diagnostics[0];
        assert_eq!(diag.summary, "Plan Write Error");
        assert_eq!(diag.attribute, Some(Path::root("rules")));
        assert!(diag
            .detail
            .as_deref()
            .unwrap()
            .ends_with("expected list of object, found map of string"));
    }

    #[test]
    fn test_shape_mismatch_is_reported() {
        let schema = Arc::new(Schema::v0().with_attribute(
            "rules",
            Attribute::nested(
                NestedAttributes::new(NestingMode::List)
                    .with_attribute("port", Attribute::optional_int64()),
                AttributeFlags::optional(),
            ),
        ));
        let mut req = request(&schema, &json!({"rules": []}));
        let AttributeType::Object(types) = schema.object_type() else {
            panic!("schema type is an object");
        };
        // a plan tree that bypassed type checking
        req.plan.raw = Value::object(
            types,
            [("rules", Value::map(AttributeType::String, [("a", Value::string("b"))]))],
        );

        let resp = run_request(&schema, &req);

        assert_eq!(resp.diagnostics.errors_count(), 1);
        let diag = &resp.diagnostics[0];
        assert_eq!(diag.summary, "Attribute Plan Modification Error");
        assert_eq!(diag.attribute, Some(Path::root("rules")));
        let detail = diag.detail.as_deref().unwrap();
        assert!(detail.ends_with(
            "unknown attribute value type (map) for nesting mode (List) at path: rules"
        ));
    }
}
