//! Parameter and return-value validation.
//!
//! The invoker calls a [`Validator`] before and after every operation. An
//! empty violation list means valid. [`SchemaValidator`] checks content bodies
//! and JSON replies against the JSON Schemas declared on the operation and
//! keeps compiled schemas cached by the SHA-256 digest of their text, so
//! operations that share a name across resources never share a validator.

use crate::resource::{Args, OperationDef, ParamType, Reply};
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// One failed constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    pub location: String,
    pub kind: String,
    pub message: String,
}

impl Violation {
    pub fn new(
        location: impl Into<String>,
        kind: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Violation {
            location: location.into(),
            kind: kind.into(),
            message: message.into(),
        }
    }
}

/// Validates operation arguments and return values.
pub trait Validator: Send + Sync {
    fn validate_parameters(
        &self,
        instance: &(dyn Any + Send + Sync),
        operation: &OperationDef,
        args: &Args,
    ) -> Vec<Violation>;

    fn validate_return_value(
        &self,
        instance: &(dyn Any + Send + Sync),
        operation: &OperationDef,
        value: &Reply,
    ) -> Vec<Violation>;
}

/// Accepts everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopValidator;

impl Validator for NoopValidator {
    fn validate_parameters(
        &self,
        _instance: &(dyn Any + Send + Sync),
        _operation: &OperationDef,
        _args: &Args,
    ) -> Vec<Violation> {
        Vec::new()
    }

    fn validate_return_value(
        &self,
        _instance: &(dyn Any + Send + Sync),
        _operation: &OperationDef,
        _value: &Reply,
    ) -> Vec<Violation> {
        Vec::new()
    }
}

/// JSON Schema validation of content bodies and JSON replies.
#[derive(Default)]
pub struct SchemaValidator {
    cache: RwLock<HashMap<Vec<u8>, Arc<jsonschema::Validator>>>,
}

impl SchemaValidator {
    pub fn new() -> Self {
        Self::default()
    }

    fn compiled(&self, schema: &Value) -> Result<Arc<jsonschema::Validator>, String> {
        let key = Sha256::digest(schema.to_string().as_bytes()).to_vec();
        if let Some(validator) = self.cache.read().get(&key) {
            return Ok(Arc::clone(validator));
        }
        let compiled = jsonschema::validator_for(schema).map_err(|e| e.to_string())?;
        let mut cache = self.cache.write();
        let validator = cache.entry(key).or_insert_with(|| {
            debug!("Compiled JSON schema validator");
            Arc::new(compiled)
        });
        Ok(Arc::clone(validator))
    }

    fn check(&self, location: &str, schema: &Value, instance: &Value) -> Vec<Violation> {
        match self.compiled(schema) {
            Ok(validator) => validator
                .iter_errors(instance)
                .map(|e| Violation::new(location, "schema", e.to_string()))
                .collect(),
            Err(message) => {
                warn!(location = %location, error = %message, "Invalid JSON schema");
                vec![Violation::new(location, "invalid_schema", message)]
            }
        }
    }

    #[must_use]
    pub fn cached_schemas(&self) -> usize {
        self.cache.read().len()
    }
}

impl Validator for SchemaValidator {
    fn validate_parameters(
        &self,
        _instance: &(dyn Any + Send + Sync),
        operation: &OperationDef,
        args: &Args,
    ) -> Vec<Violation> {
        let mut violations = Vec::new();
        for (index, param) in operation.params().iter().enumerate() {
            let ParamType::Body(body) = param else {
                continue;
            };
            let (Some(schema), Some(value)) = (&body.schema, args.get(index)) else {
                continue;
            };
            violations.extend(self.check(&body.name, schema, &value.to_json()));
        }
        violations
    }

    fn validate_return_value(
        &self,
        _instance: &(dyn Any + Send + Sync),
        operation: &OperationDef,
        value: &Reply,
    ) -> Vec<Violation> {
        match (operation.response_schema_ref(), value.as_json()) {
            (Some(schema), Some(json)) => self.check("response", schema, json),
            _ => Vec::new(),
        }
    }
}
