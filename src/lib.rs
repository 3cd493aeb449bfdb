//! Hemmer Provider Framework
//!
//! This crate is the plan modification runtime for Hemmer providers. It
//! follows the pattern established by
//! [terraform-plugin-framework](https://github.com/hashicorp/terraform-plugin-framework).
//!
//! # Overview
//!
//! During planning the orchestration engine hands a provider three value
//! trees for a resource: the configuration, the prior state, and the
//! proposed new state. The framework walks the resource schema depth first,
//! and at every attribute and block runs the plan modifiers the provider
//! attached there. Modifiers may:
//!
//! - Rewrite the planned value
//! - Request that the resource be replaced
//! - Read and write provider private state
//! - Raise diagnostics
//!
//! The crate provides:
//!
//! - **Typed values and paths**: [`types::Value`] trees addressed by [`path::Path`]
//! - **Schema types**: attributes, nested attributes, and nested blocks with plan modifiers
//! - **Plan modification engines**: per attribute, per block, and for a whole schema
//! - **Built-in modifiers**: `RequiresReplace`, `RequiresReplaceIf`,
//!   `RequiresReplaceIfConfigured`, `UseStateForUnknown`
//! - **Resource planning**: [`Server::plan_resource_change`] runs the full pipeline
//! - **Validation**: required attributes, types, and block item counts
//! - **Testing**: harnesses and assertion helpers for provider authors
//! - **Logging**: Integration with `tracing` for structured logging
//!
//! # Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use hemmer_provider_framework::{
//!     planmodifier::{RequiresReplace, UseStateForUnknown},
//!     schema::{Attribute, Schema},
//!     server::{PlanResourceChangeRequest, Resource, Server},
//!     types::Value,
//! };
//! use serde_json::json;
//!
//! struct Bucket;
//!
//! #[async_trait::async_trait]
//! impl Resource for Bucket {
//!     fn schema(&self) -> Arc<Schema> {
//!         Arc::new(
//!             Schema::v0()
//!                 .with_attribute(
//!                     "name",
//!                     Attribute::required_string().with_plan_modifier(RequiresReplace),
//!                 )
//!                 .with_attribute(
//!                     "id",
//!                     Attribute::computed_string().with_plan_modifier(UseStateForUnknown),
//!                 ),
//!         )
//!     }
//! }
//!
//! # tokio_test::block_on(async {
//! let server = Server::new().with_resource("bucket", Bucket);
//! let ty = Bucket.schema().object_type();
//! let prior = Value::from_json(&ty, &json!({"name": "logs", "id": "b-1"})).unwrap();
//! let proposed = Value::from_json(&ty, &json!({"name": "audit", "id": "b-1"})).unwrap();
//! let config = Value::from_json(&ty, &json!({"name": "audit"})).unwrap();
//!
//! let resp = server
//!     .plan_resource_change(
//!         PlanResourceChangeRequest::new("bucket")
//!             .with_config(config)
//!             .with_prior_state(prior)
//!             .with_proposed_new_state(proposed),
//!     )
//!     .await;
//!
//! assert!(!resp.diagnostics.has_error());
//! assert_eq!(resp.requires_replace.len(), 1);
//! # });
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod attribute_plan_modification;
pub mod block_plan_modification;
pub mod data;
pub mod diag;
pub mod error;
pub mod logging;
pub mod path;
pub mod planmodifier;
pub mod privatestate;
pub mod schema;
pub mod schema_plan_modification;
pub mod server;
pub mod testing;
pub mod types;
pub mod validation;

// Re-export main types at crate root
pub use attribute_plan_modification::modify_attribute_plan;
pub use block_plan_modification::modify_block_plan;
pub use data::{Data, DataDescription};
pub use diag::{Diagnostic, DiagnosticSeverity, Diagnostics};
pub use error::ProviderError;
pub use logging::{init_logging, init_logging_with_default, try_init_logging};
pub use path::{Path, PathStep, Paths};
pub use planmodifier::{PlanModifier, PlanModifierRequest, PlanModifierResponse};
pub use privatestate::{PrivateData, ProviderData};
pub use schema::{Attribute, AttributeFlags, Block, NestedAttributes, NestedBlock, Schema};
pub use schema_plan_modification::{
    modify_schema_plan, ModifyAttributePlanRequest, ModifySchemaPlanRequest,
    ModifySchemaPlanResponse,
};
pub use server::{
    ModifyResourcePlanRequest, ModifyResourcePlanResponse, PlanResourceChangeRequest,
    PlanResourceChangeResponse, Resource, Server,
};
pub use types::{AttributeType, Value};
pub use validation::{is_valid, validate, validate_result};

// Re-export async_trait for convenience
pub use async_trait::async_trait;

// Re-export commonly used external types
pub use serde_json;
pub use tonic;
pub use tracing;
