//! Structural verification of JSON values against message descriptors.
//!
//! Verification is pure: it never mutates the value and performs no I/O.
//! It stops at the first mismatch and reports it with a path such as
//! `location.lat`, `tags[2]` or `labels[eu-west]`.

use crate::error::VerificationError;
use crate::scalar::{coerce, coerce_map_key, kind_of};
use proto_types::{ProtoFieldDescriptor, ProtoMessageDescriptor, ProtoSchema, ProtoType};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// How strictly values are checked against the schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyPolicy {
    /// Reject object keys that name no field of the message type.
    ///
    /// When disabled, unknown keys are ignored by both verification and
    /// encoding.
    pub reject_unknown_fields: bool,
}

impl Default for VerifyPolicy {
    fn default() -> Self {
        Self {
            reject_unknown_fields: true,
        }
    }
}

type VerifyResult = std::result::Result<(), VerificationError>;

/// Checks values against the message types of one schema.
pub struct Verifier<'a> {
    schema: &'a ProtoSchema,
    policy: VerifyPolicy,
}

impl<'a> Verifier<'a> {
    pub fn new(schema: &'a ProtoSchema, policy: VerifyPolicy) -> Self {
        Self { schema, policy }
    }

    /// Verify that `value` is shape-compatible with `descriptor`.
    pub fn verify(&self, descriptor: &ProtoMessageDescriptor, value: &Value) -> VerifyResult {
        self.verify_message(descriptor, value, "")
    }

    fn verify_message(
        &self,
        descriptor: &ProtoMessageDescriptor,
        value: &Value,
        path: &str,
    ) -> VerifyResult {
        let object = match value {
            Value::Object(object) => object,
            other => {
                return Err(VerificationError::new(
                    path,
                    format!("object of {}", descriptor.name),
                    kind_of(other),
                ))
            }
        };

        let mut oneofs_seen: HashMap<&str, &str> = HashMap::new();

        for (key, field_value) in object {
            let field_path = join(path, key);
            let Some(field) = descriptor.get_field(key) else {
                if self.policy.reject_unknown_fields {
                    return Err(VerificationError::new(
                        field_path,
                        format!("a field of {}", descriptor.name),
                        "unknown field",
                    ));
                }
                continue;
            };

            // null means "not set" in the JSON mapping
            if field_value.is_null() {
                continue;
            }

            if let Some(oneof) = field.oneof.as_deref() {
                if let Some(previous) = oneofs_seen.insert(oneof, field.name.as_str()) {
                    return Err(VerificationError::new(
                        field_path,
                        format!("at most one member of oneof {oneof}"),
                        format!("both {previous} and {}", field.name),
                    ));
                }
            }

            self.verify_field(field, field_value, &field_path)?;
        }

        for field in descriptor.fields_in_order() {
            if field.required && !is_set(object, field) {
                return Err(VerificationError::new(
                    join(path, &field.name),
                    format!("required field {}", field.field_type),
                    "missing",
                ));
            }
        }

        Ok(())
    }

    fn verify_field(&self, field: &ProtoFieldDescriptor, value: &Value, path: &str) -> VerifyResult {
        if let ProtoType::Map { key, value: value_type } = &field.field_type {
            let Value::Object(entries) = value else {
                return Err(VerificationError::new(
                    path,
                    field.field_type.type_name(),
                    kind_of(value),
                ));
            };
            for (entry_key, entry_value) in entries {
                let entry_path = format!("{path}[{entry_key}]");
                coerce_map_key(key, entry_key)
                    .map_err(|m| VerificationError::new(&entry_path, m.expected, m.actual))?;
                self.verify_single(value_type, entry_value, &entry_path)?;
            }
            return Ok(());
        }

        if field.is_repeated() {
            let Value::Array(items) = value else {
                return Err(VerificationError::new(
                    path,
                    format!("repeated {}", field.field_type),
                    kind_of(value),
                ));
            };
            for (index, item) in items.iter().enumerate() {
                self.verify_single(&field.field_type, item, &format!("{path}[{index}]"))?;
            }
            return Ok(());
        }

        if value.is_array() {
            return Err(VerificationError::new(
                path,
                field.field_type.type_name(),
                "array",
            ));
        }
        self.verify_single(&field.field_type, value, path)
    }

    fn verify_single(&self, proto_type: &ProtoType, value: &Value, path: &str) -> VerifyResult {
        match proto_type {
            ProtoType::Message(type_name) => {
                let nested = self.schema.get_message(type_name).ok_or_else(|| {
                    VerificationError::new(path, proto_type.type_name(), "undeclared message type")
                })?;
                self.verify_message(nested, value, path)
            }
            scalar_type => coerce(self.schema, scalar_type, value)
                .map(|_| ())
                .map_err(|m| VerificationError::new(path, m.expected, m.actual)),
        }
    }
}

/// Verify `value` against `descriptor` with the default (strict) policy.
pub fn verify(
    schema: &ProtoSchema,
    descriptor: &ProtoMessageDescriptor,
    value: &Value,
) -> VerifyResult {
    Verifier::new(schema, VerifyPolicy::default()).verify(descriptor, value)
}

fn is_set(object: &Map<String, Value>, field: &ProtoFieldDescriptor) -> bool {
    object.get(&field.name).is_some_and(|v| !v.is_null())
}

fn join(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{path}.{key}")
    }
}
