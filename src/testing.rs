//! Testing utilities for plan modifiers and resources.
//!
//! This module lets provider authors exercise a plan modifier at one path,
//! or a whole schema walk, without building a plan request by hand.
//!
//! # Example
//!
//! ```
//! use hemmer_provider_framework::path::Path;
//! use hemmer_provider_framework::planmodifier::RequiresReplace;
//! use hemmer_provider_framework::schema::{Attribute, Schema};
//! use hemmer_provider_framework::testing::PlanModifierTester;
//! use serde_json::json;
//!
//! let schema = Schema::v0().with_attribute("name", Attribute::required_string());
//! let tester = PlanModifierTester::new(schema)
//!     .with_config(json!({"name": "new"})).unwrap()
//!     .with_state(json!({"name": "old"})).unwrap()
//!     .with_plan(json!({"name": "new"})).unwrap();
//!
//! let resp = tester.run(&RequiresReplace, &Path::root("name")).unwrap();
//! assert!(resp.requires_replace);
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::data::{Data, DataDescription};
use crate::diag::{Diagnostic, Diagnostics};
use crate::error::ProviderError;
use crate::path::{Path, Paths};
use crate::planmodifier::{PlanModifier, PlanModifierRequest, PlanModifierResponse};
use crate::privatestate::ProviderData;
use crate::schema::Schema;
use crate::schema_plan_modification::{
    modify_schema_plan, ModifySchemaPlanRequest, ModifySchemaPlanResponse,
};

/// A test harness for plan modifiers.
///
/// Holds configuration, prior state, and plan trees for one schema. Trees
/// not set explicitly are null.
#[derive(Debug, Clone)]
pub struct PlanModifierTester {
    schema: Arc<Schema>,
    config: Data,
    state: Data,
    plan: Data,
    provider_meta: Data,
    private: ProviderData,
}

impl PlanModifierTester {
    /// Create a tester with null configuration, state, and plan.
    pub fn new(schema: Schema) -> Self {
        let schema = Arc::new(schema);
        Self {
            config: Data::null(DataDescription::Configuration, schema.clone()),
            state: Data::null(DataDescription::State, schema.clone()),
            plan: Data::null(DataDescription::Plan, schema.clone()),
            provider_meta: Data::null(DataDescription::ProviderMeta, Arc::new(Schema::v0())),
            private: ProviderData::empty(),
            schema,
        }
    }

    /// The schema under test.
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Set the configuration from a JSON document.
    pub fn with_config(mut self, json: serde_json::Value) -> Result<Self, TestError> {
        self.config = Data::from_json(DataDescription::Configuration, self.schema.clone(), &json)?;
        Ok(self)
    }

    /// Set the prior state from a JSON document.
    pub fn with_state(mut self, json: serde_json::Value) -> Result<Self, TestError> {
        self.state = Data::from_json(DataDescription::State, self.schema.clone(), &json)?;
        Ok(self)
    }

    /// Set the proposed plan from a JSON document.
    pub fn with_plan(mut self, json: serde_json::Value) -> Result<Self, TestError> {
        self.plan = Data::from_json(DataDescription::Plan, self.schema.clone(), &json)?;
        Ok(self)
    }

    /// Set the provider metadata configuration.
    pub fn with_provider_meta(mut self, provider_meta: Data) -> Self {
        self.provider_meta = provider_meta;
        self
    }

    /// Set the provider private state the modifier starts from.
    pub fn with_private(mut self, private: ProviderData) -> Self {
        self.private = private;
        self
    }

    /// Run a single modifier at `path`, without walking the schema.
    ///
    /// The response is returned as the modifier left it, diagnostics
    /// included.
    pub fn run(
        &self,
        modifier: &dyn PlanModifier,
        path: &Path,
    ) -> Result<PlanModifierResponse, TestError> {
        let config_value = self.config.value_at_path(path)?;
        let state_value = self.state.value_at_path(path)?;
        let plan_value = self.plan.value_at_path(path)?;

        let req = PlanModifierRequest {
            path,
            config: &self.config,
            state: &self.state,
            plan: &self.plan,
            provider_meta: &self.provider_meta,
            config_value: &config_value,
            state_value: &state_value,
            plan_value: &plan_value,
        };
        let mut resp = PlanModifierResponse {
            plan_value: plan_value.clone(),
            requires_replace: false,
            private: self.private.clone(),
            diagnostics: Diagnostics::new(),
        };

        modifier.modify_plan(&req, &mut resp);
        Ok(resp)
    }

    /// Walk the whole schema, running every attached modifier.
    pub fn modify_schema_plan(&self) -> ModifySchemaPlanResponse {
        let req = ModifySchemaPlanRequest {
            config: self.config.clone(),
            state: self.state.clone(),
            plan: self.plan.clone(),
            provider_meta: self.provider_meta.clone(),
            private: Some(self.private.clone()),
        };
        let mut resp = ModifySchemaPlanResponse::new(&req);
        modify_schema_plan(&self.schema, &req, &mut resp);
        resp
    }
}

/// A shared call counter.
#[derive(Debug, Clone, Default)]
pub struct CallCounter(Arc<AtomicUsize>);

impl CallCounter {
    /// Create a counter at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one call.
    pub fn increment(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    /// Calls recorded so far.
    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

/// A plan modifier that records where it was called and changes nothing.
#[derive(Debug, Clone)]
pub struct RecordingModifier {
    description: String,
    calls: CallCounter,
    paths: Arc<Mutex<Vec<Path>>>,
}

impl RecordingModifier {
    /// Create a recorder with a description.
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            calls: CallCounter::new(),
            paths: Arc::default(),
        }
    }

    /// The counter shared with every clone of this recorder.
    pub fn calls(&self) -> CallCounter {
        self.calls.clone()
    }

    /// Paths seen so far, in call order.
    pub fn paths(&self) -> Vec<Path> {
        self.paths
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl PlanModifier for RecordingModifier {
    fn description(&self) -> String {
        self.description.clone()
    }

    fn modify_plan(&self, req: &PlanModifierRequest<'_>, _resp: &mut PlanModifierResponse) {
        self.calls.increment();
        self.paths
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(req.path.clone());
    }
}

/// Error type for test operations.
#[derive(Debug)]
pub enum TestError {
    /// The operation failed with diagnostics.
    Diagnostics(Diagnostics),
    /// The operation failed with a provider error.
    Provider(ProviderError),
}

impl std::fmt::Display for TestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TestError::Diagnostics(diags) => {
                writeln!(f, "Operation failed with {} diagnostic(s):", diags.len())?;
                for diag in diags {
                    write!(f, "  [{:?}] {}", diag.severity, diag.summary)?;
                    if let Some(detail) = &diag.detail {
                        write!(f, ": {}", detail)?;
                    }
                    if let Some(attr) = &diag.attribute {
                        write!(f, " (at {})", attr)?;
                    }
                    writeln!(f)?;
                }
                Ok(())
            },
            TestError::Provider(e) => write!(f, "Provider error: {}", e),
        }
    }
}

impl std::error::Error for TestError {}

impl From<ProviderError> for TestError {
    fn from(e: ProviderError) -> Self {
        TestError::Provider(e)
    }
}

impl TestError {
    /// Fail with the error diagnostics, if there are any.
    pub fn check(diagnostics: &Diagnostics) -> Result<(), TestError> {
        let errors: Diagnostics = diagnostics.errors().cloned().collect();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(TestError::Diagnostics(errors))
        }
    }
}

// =========================================================================
// Assertion Helpers
// =========================================================================

/// Assert that diagnostics contain no errors.
///
/// # Panics
///
/// Panics if there are any error diagnostics.
pub fn assert_no_errors(diagnostics: &[Diagnostic]) {
    let errors: Vec<_> = diagnostics.iter().filter(|d| d.is_error()).collect();

    assert!(
        errors.is_empty(),
        "Expected no errors, but got {} error(s): {:?}",
        errors.len(),
        errors.iter().map(|d| &d.summary).collect::<Vec<_>>()
    );
}

/// Assert that diagnostics contain at least one error.
///
/// # Panics
///
/// Panics if there are no error diagnostics.
pub fn assert_has_errors(diagnostics: &[Diagnostic]) {
    let has_errors = diagnostics.iter().any(Diagnostic::is_error);

    assert!(has_errors, "Expected at least one error, but got none");
}

/// Assert that diagnostics contain an error with the given summary substring.
///
/// # Panics
///
/// Panics if no error diagnostic contains the given substring.
pub fn assert_error_contains(diagnostics: &[Diagnostic], substring: &str) {
    let has_matching_error = diagnostics
        .iter()
        .any(|d| d.is_error() && d.summary.contains(substring));

    assert!(
        has_matching_error,
        "Expected an error containing '{}', but no matching error found. Errors: {:?}",
        substring,
        diagnostics
            .iter()
            .filter(|d| d.is_error())
            .map(|d| &d.summary)
            .collect::<Vec<_>>()
    );
}

/// Assert that a path is among the replacement paths.
///
/// # Panics
///
/// Panics if the path is missing.
pub fn assert_requires_replace(requires_replace: &Paths, path: &Path) {
    assert!(
        requires_replace.contains(path),
        "Expected '{}' to require replacement. Replacement paths: {:?}",
        path,
        requires_replace.iter().map(ToString::to_string).collect::<Vec<_>>()
    );
}

/// Assert that nothing requires replacement.
///
/// # Panics
///
/// Panics if any replacement path is present.
pub fn assert_no_requires_replace(requires_replace: &Paths) {
    assert!(
        requires_replace.is_empty(),
        "Expected no replacement, but got {} path(s): {:?}",
        requires_replace.len(),
        requires_replace.iter().map(ToString::to_string).collect::<Vec<_>>()
    );
}
