//! Plan orchestration for a provider's resources.
//!
//! This module provides the [`Resource`] trait that providers implement and
//! the [`Server`] registry that answers plan requests. A plan request goes
//! through these stages:
//!
//! 1. Computed attributes left null in configuration are marked unknown
//! 2. Attribute and block plan modifiers run over the whole schema
//! 3. The resource's own [`Resource::modify_plan`] runs
//! 4. Replacement paths are normalised and private state is encoded
//!
//! Transport is left to the embedding RPC adapter. Errors that surface as
//! [`ProviderError`] convert into `tonic::Status` there.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, error, instrument, trace};

use crate::data::{Data, DataDescription};
use crate::diag::{Diagnostic, Diagnostics};
use crate::error::ProviderError;
use crate::path::{Path, PathStep, Paths};
use crate::privatestate::{PrivateData, ProviderData};
use crate::schema::Schema;
use crate::schema_plan_modification::{
    modify_schema_plan, ModifySchemaPlanRequest, ModifySchemaPlanResponse,
};
use crate::types::Value;

/// Trait that provider resources implement.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use hemmer_provider_framework::planmodifier::RequiresReplace;
/// use hemmer_provider_framework::schema::{Attribute, Schema};
/// use hemmer_provider_framework::server::Resource;
///
/// struct Bucket;
///
/// #[async_trait::async_trait]
/// impl Resource for Bucket {
///     fn schema(&self) -> Arc<Schema> {
///         Arc::new(
///             Schema::v0()
///                 .with_attribute(
///                     "name",
///                     Attribute::required_string().with_plan_modifier(RequiresReplace),
///                 )
///                 .with_attribute("id", Attribute::computed_string()),
///         )
///     }
/// }
/// ```
#[async_trait::async_trait]
pub trait Resource: Send + Sync + 'static {
    /// The resource schema.
    fn schema(&self) -> Arc<Schema>;

    /// Adjust the plan after every attribute and block plan modifier ran.
    ///
    /// Called for destroy plans too, in which case `req.plan` is null.
    /// The default implementation changes nothing.
    async fn modify_plan(
        &self,
        _req: &ModifyResourcePlanRequest,
        _resp: &mut ModifyResourcePlanResponse,
    ) {
    }
}

/// Input of [`Resource::modify_plan`].
#[derive(Debug, Clone)]
pub struct ModifyResourcePlanRequest {
    /// Resource configuration.
    pub config: Data,
    /// Prior state. Null when the resource is being created.
    pub state: Data,
    /// The plan after attribute and block plan modifiers.
    pub plan: Data,
    /// Provider metadata configuration.
    pub provider_meta: Data,
}

/// Output of [`Resource::modify_plan`].
#[derive(Debug, Clone)]
pub struct ModifyResourcePlanResponse {
    /// The plan. Starts as the request's plan.
    pub plan: Data,
    /// Additional paths whose changes force replacement.
    pub requires_replace: Paths,
    /// Provider private state.
    pub private: ProviderData,
    /// Diagnostics raised by the resource.
    pub diagnostics: Diagnostics,
}

/// A plan request for one resource instance.
#[derive(Debug, Clone, Default)]
pub struct PlanResourceChangeRequest {
    /// Registered resource type name.
    pub resource_type: String,
    /// Resource configuration. `None` reads as null.
    pub config: Option<Value>,
    /// Prior state. `None` reads as null (create).
    pub prior_state: Option<Value>,
    /// Proposed new state. `None` reads as null (destroy).
    pub proposed_new_state: Option<Value>,
    /// Provider metadata configuration, with its own schema.
    pub provider_meta: Option<Data>,
    /// Private state bytes stored with the prior state.
    pub prior_private: Vec<u8>,
}

impl PlanResourceChangeRequest {
    /// A request for the given resource type with every input absent.
    pub fn new(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            ..Self::default()
        }
    }

    /// Set the configuration.
    pub fn with_config(mut self, config: Value) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the prior state.
    pub fn with_prior_state(mut self, state: Value) -> Self {
        self.prior_state = Some(state);
        self
    }

    /// Set the proposed new state.
    pub fn with_proposed_new_state(mut self, plan: Value) -> Self {
        self.proposed_new_state = Some(plan);
        self
    }

    /// Set the provider metadata configuration.
    pub fn with_provider_meta(mut self, provider_meta: Data) -> Self {
        self.provider_meta = Some(provider_meta);
        self
    }

    /// Set the prior private state bytes.
    pub fn with_prior_private(mut self, private: impl Into<Vec<u8>>) -> Self {
        self.prior_private = private.into();
        self
    }
}

/// The answer to a [`PlanResourceChangeRequest`].
#[derive(Debug, Clone, Default)]
pub struct PlanResourceChangeResponse {
    /// The planned new state. `None` when the resource type is unknown.
    pub planned_state: Option<Data>,
    /// Private state bytes to store with the planned state.
    pub planned_private: Vec<u8>,
    /// Sorted, deduplicated paths whose changes force replacement.
    pub requires_replace: Paths,
    /// Everything reported while planning.
    pub diagnostics: Diagnostics,
}

/// Registry of resources, keyed by type name.
#[derive(Clone, Default)]
pub struct Server {
    resources: BTreeMap<String, Arc<dyn Resource>>,
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("resources", &self.resources.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Server {
    /// Create an empty server.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a resource under a type name.
    pub fn with_resource(
        mut self,
        resource_type: impl Into<String>,
        resource: impl Resource,
    ) -> Self {
        self.resources.insert(resource_type.into(), Arc::new(resource));
        self
    }

    /// Registered resource type names, sorted.
    pub fn resource_types(&self) -> impl Iterator<Item = &str> {
        self.resources.keys().map(String::as_str)
    }

    /// Look up a resource by type name.
    pub fn resource(&self, resource_type: &str) -> Result<Arc<dyn Resource>, ProviderError> {
        self.resources
            .get(resource_type)
            .cloned()
            .ok_or_else(|| ProviderError::UnknownResource(resource_type.to_string()))
    }

    /// Plan a change to one resource instance.
    #[instrument(
        skip(self, req),
        name = "plan_resource_change",
        fields(resource_type = %req.resource_type)
    )]
    pub async fn plan_resource_change(
        &self,
        req: PlanResourceChangeRequest,
    ) -> PlanResourceChangeResponse {
        let mut resp = PlanResourceChangeResponse::default();

        let resource = match self.resource(&req.resource_type) {
            Ok(resource) => resource,
            Err(err) => {
                error!(error = %err, "Plan requested for unknown resource type");
                resp.diagnostics.push(
                    Diagnostic::error("Resource Type Not Found").with_detail(format!(
                        "{}. This is always an issue with the provider and should be reported to \
                         the provider developers.",
                        err
                    )),
                );
                return resp;
            },
        };

        let schema = resource.schema();
        let trees = request_trees(&schema, req.config, req.prior_state, req.proposed_new_state);
        let (config, state, mut planned) = match trees {
            Ok(trees) => trees,
            Err(err) => {
                error!(error = %err, "Plan request does not match the resource schema");
                resp.diagnostics
                    .push(Diagnostic::error("Invalid Plan Request").with_detail(err.to_string()));
                return resp;
            },
        };
        let provider_meta = req
            .provider_meta
            .unwrap_or_else(|| Data::null(DataDescription::ProviderMeta, Arc::new(Schema::v0())));

        let mut private = match PrivateData::from_bytes(&req.prior_private) {
            Ok(private) => private,
            Err(diagnostic) => {
                resp.diagnostics.push(diagnostic);
                return resp;
            },
        };

        if !planned.is_null() && planned.raw != state.raw {
            trace!("Marking computed null configuration values as unknown in the plan");
            let path = Path::empty();
            let marked = mark_computed_nils_unknown(&mut planned.raw, &path, &config.raw, &schema);
            if let Err(err) = marked {
                resp.diagnostics.push(
                    Diagnostic::error("Error Modifying Planned State").with_detail(format!(
                        "There was an unexpected error updating the plan. This is always a \
                         problem with the provider. Please report the following to the \
                         provider developer:\n\n{}",
                        err
                    )),
                );
                resp.planned_state = Some(planned);
                return resp;
            }
        }

        if !planned.is_null() {
            let schema_req = ModifySchemaPlanRequest {
                config: config.clone(),
                state: state.clone(),
                plan: planned,
                provider_meta: provider_meta.clone(),
                private: private.provider.clone(),
            };
            let mut schema_resp = ModifySchemaPlanResponse::new(&schema_req);
            modify_schema_plan(&schema, &schema_req, &mut schema_resp);

            let ModifySchemaPlanResponse {
                plan,
                requires_replace,
                private: provider_private,
                diagnostics,
            } = schema_resp;

            planned = plan;
            resp.requires_replace.extend(requires_replace);
            resp.diagnostics.append(diagnostics);
            private.provider = Some(provider_private).filter(|p| !p.is_empty());

            if resp.diagnostics.has_error() {
                resp.planned_state = Some(planned);
                return resp;
            }
        }

        let resource_req = ModifyResourcePlanRequest {
            config,
            state,
            plan: planned.clone(),
            provider_meta,
        };
        let mut resource_resp = ModifyResourcePlanResponse {
            plan: planned,
            requires_replace: Paths::new(),
            private: private.provider_data(),
            diagnostics: Diagnostics::new(),
        };

        debug!("Calling provider defined Resource ModifyPlan");
        resource.modify_plan(&resource_req, &mut resource_resp).await;
        debug!("Called provider defined Resource ModifyPlan");

        resp.diagnostics.append(resource_resp.diagnostics);
        resp.requires_replace.extend(resource_resp.requires_replace);
        resp.requires_replace.normalise();
        resp.planned_state = Some(resource_resp.plan);
        private.provider = Some(resource_resp.private).filter(|p| !p.is_empty());

        match private.to_bytes() {
            Ok(bytes) => resp.planned_private = bytes,
            Err(diagnostic) => resp.diagnostics.push(diagnostic),
        }

        resp
    }
}

/// The configuration, prior state, and proposed plan trees of a request.
fn request_trees(
    schema: &Arc<Schema>,
    config: Option<Value>,
    state: Option<Value>,
    plan: Option<Value>,
) -> Result<(Data, Data, Data), ProviderError> {
    Ok((
        request_tree(schema, DataDescription::Configuration, config)?,
        request_tree(schema, DataDescription::State, state)?,
        request_tree(schema, DataDescription::Plan, plan)?,
    ))
}

/// Wrap a request value with the resource schema. An absent value is null.
fn request_tree(
    schema: &Arc<Schema>,
    description: DataDescription,
    value: Option<Value>,
) -> Result<Data, ProviderError> {
    let Some(raw) = value else {
        return Ok(Data::null(description, schema.clone()));
    };
    let expected = schema.object_type();
    if raw.ty() != expected {
        return Err(ProviderError::InvalidRequest(format!(
            "the {} is a {} value, but the resource schema describes an object",
            description,
            raw.kind_name()
        )));
    }
    Ok(Data::new(description, schema.clone(), raw))
}

/// Replace every null attribute the configuration leaves unset with an
/// unknown value, if the schema marks it computed.
///
/// Only attribute positions are candidates. Null blocks and values inside
/// attributes without nested attributes are left alone.
fn mark_computed_nils_unknown(
    value: &mut Value,
    path: &Path,
    config: &Value,
    schema: &Schema,
) -> Result<(), ProviderError> {
    match value {
        Value::Null(ty) => {
            if !matches!(path.last_step(), Some(PathStep::AttributeName(_))) {
                return Ok(());
            }
            if config_value_at(config, path).is_some_and(|config| !config.is_null()) {
                trace!(
                    attribute_path = %path,
                    "Attribute not null in configuration, not marking unknown"
                );
                return Ok(());
            }
            let ty = ty.clone();
            match schema.attribute_at_path(path) {
                Ok(attribute) if attribute.flags.computed => {
                    debug!(
                        attribute_path = %path,
                        "Marking computed attribute that is null in the configuration as unknown"
                    );
                    *value = Value::Unknown(ty);
                },
                Ok(_) => {},
                Err(
                    ProviderError::PathIsBlock(_) | ProviderError::PathInsideAtomicAttribute(_),
                ) => {},
                Err(err) => {
                    error!(
                        attribute_path = %path,
                        error = %err,
                        "Couldn't find attribute in resource schema"
                    );
                    return Err(err);
                },
            }
        },
        Value::List { elements, .. } => {
            for (index, element) in elements.iter_mut().enumerate() {
                mark_computed_nils_unknown(element, &path.at_list_index(index), config, schema)?;
            }
        },
        Value::Set { elements, .. } => {
            for element in elements.iter_mut() {
                let element_path = path.at_set_value(element.clone());
                mark_computed_nils_unknown(element, &element_path, config, schema)?;
            }
        },
        Value::Map { elements, .. } => {
            for (key, element) in elements.iter_mut() {
                mark_computed_nils_unknown(element, &path.at_map_key(key.clone()), config, schema)?;
            }
        },
        Value::Object {
            attribute_types,
            attributes,
        } => {
            for (name, ty) in attribute_types.iter() {
                attributes
                    .entry(name.clone())
                    .or_insert_with(|| Value::Null(ty.clone()));
            }
            for (name, attribute) in attributes.iter_mut() {
                mark_computed_nils_unknown(attribute, &path.at_name(name), config, schema)?;
            }
        },
        Value::Unknown(_)
        | Value::String(_)
        | Value::Int64(_)
        | Value::Float64(_)
        | Value::Bool(_) => {},
    }
    Ok(())
}

/// Walk the configuration tree. `None` when the path does not exist there.
fn config_value_at<'a>(config: &'a Value, path: &Path) -> Option<&'a Value> {
    let mut current = config;
    for step in path.steps() {
        current = match (current, step) {
            (Value::Object { attributes, .. }, PathStep::AttributeName(name)) => {
                attributes.get(name)?
            },
            (Value::List { elements, .. }, PathStep::ElementKeyInt(index)) => {
                elements.get(*index)?
            },
            (Value::Set { elements, .. }, PathStep::ElementKeyValue(value)) => {
                elements.iter().find(|element| *element == value)?
            },
            (Value::Map { elements, .. }, PathStep::ElementKeyString(key)) => elements.get(key)?,
            _ => return None,
        };
    }
    Some(current)
}
