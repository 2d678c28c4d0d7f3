//! JSON Schema validation for envelopes and decrypted payloads.
//!
//! Every value that crosses the envelope boundary is checked against a
//! compiled schema:
//! - Envelope: the five routing fields, all required
//! - Payload: `{type: string, data: any}`
//! - Typed data: one schema per known `type` (attestation, decryption-share, chat)
//!
//! Unknown payload types have no data schema and pass through as opaque JSON.

use std::fmt;

use jsonschema::error::ValidationErrorKind;
use jsonschema::Validator;
use serde_json::{json, Value};

use crate::domain::{MESSAGE_TYPE_ATTESTATION, MESSAGE_TYPE_CHAT, MESSAGE_TYPE_DECRYPTION_SHARE};

/// A single non-missing-field schema failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaViolation {
    /// Dotted path of the offending value (empty for the root)
    pub path: String,
    pub message: String,
}

impl SchemaViolation {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Envelope or payload failed schema validation.
///
/// All missing fields are reported, not just the first.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub struct SchemaError {
    /// Which schema rejected the value ("envelope", "payload", or a payload type)
    pub schema: String,
    pub missing_fields: Vec<String>,
    pub violations: Vec<SchemaViolation>,
}

impl SchemaError {
    pub fn missing(schema: impl Into<String>, fields: Vec<String>) -> Self {
        Self {
            schema: schema.into(),
            missing_fields: fields,
            violations: Vec::new(),
        }
    }

    pub fn violation(
        schema: impl Into<String>,
        path: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            schema: schema.into(),
            missing_fields: Vec::new(),
            violations: vec![SchemaViolation::new(path, message)],
        }
    }
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} schema validation failed", self.schema)?;
        if !self.missing_fields.is_empty() {
            write!(f, "; missing fields: {}", self.missing_fields.join(", "))?;
        }
        for violation in &self.violations {
            if violation.path.is_empty() {
                write!(f, "; {}", violation.message)?;
            } else {
                write!(f, "; {}: {}", violation.path, violation.message)?;
            }
        }
        Ok(())
    }
}

/// Render a JSON pointer ("/a/b") as a dotted path ("a.b")
fn dotted_path(pointer: &str) -> String {
    pointer.trim_start_matches('/').replace('/', ".")
}

fn join_path(parent: &str, child: &str) -> String {
    if parent.is_empty() {
        child.to_string()
    } else {
        format!("{}.{}", parent, child)
    }
}

/// A compiled schema with a name for error reporting
struct NamedValidator {
    name: String,
    validator: Validator,
}

impl NamedValidator {
    fn compile(name: &str, schema: &Value) -> Result<Self, SchemaError> {
        let validator = Validator::new(schema).map_err(|e| {
            SchemaError::violation(name, "", format!("failed to compile schema: {}", e))
        })?;
        Ok(Self {
            name: name.to_string(),
            validator,
        })
    }

    fn validate(&self, instance: &Value) -> Result<(), SchemaError> {
        let mut missing_fields = Vec::new();
        let mut violations = Vec::new();

        // Use iter_errors to collect all validation errors
        for error in self.validator.iter_errors(instance) {
            let path = dotted_path(&error.instance_path.to_string());
            match &error.kind {
                ValidationErrorKind::Required { property } => {
                    let name = property
                        .as_str()
                        .map(str::to_string)
                        .unwrap_or_else(|| property.to_string());
                    missing_fields.push(join_path(&path, &name));
                }
                _ => violations.push(SchemaViolation::new(path, error.to_string())),
            }
        }

        if missing_fields.is_empty() && violations.is_empty() {
            Ok(())
        } else {
            Err(SchemaError {
                schema: self.name.clone(),
                missing_fields,
                violations,
            })
        }
    }
}

fn envelope_schema() -> Value {
    json!({
        "type": "object",
        "required": ["toPublicKey", "fromPublicKey", "fromDisplayName", "encryptedContents", "timestamp"],
        "properties": {
            "toPublicKey": { "type": "string", "pattern": "^(0x)?[0-9a-fA-F]+$" },
            "fromPublicKey": { "type": "string", "pattern": "^(0x)?[0-9a-fA-F]+$" },
            "fromDisplayName": { "type": "string" },
            "encryptedContents": { "type": "string", "minLength": 1 },
            "timestamp": { "type": "string", "minLength": 1 }
        }
    })
}

fn payload_schema() -> Value {
    json!({
        "type": "object",
        "required": ["type", "data"],
        "properties": {
            "type": { "type": "string", "minLength": 1 },
            "data": {}
        }
    })
}

fn attestation_schema() -> Value {
    json!({
        "type": "object",
        "required": ["signerPublicKey", "counterMessage", "signature", "category"],
        "properties": {
            "signerPublicKey": { "type": "string", "pattern": "^[0-9a-fA-F]+$" },
            "counterMessage": {
                "type": "object",
                "required": ["prefix", "nonce", "randomness"],
                "properties": {
                    "prefix": { "type": "string", "pattern": "^([0-9a-fA-F]{2})*$" },
                    "nonce": { "type": "integer", "minimum": 0, "maximum": 4294967295u64 },
                    "randomness": { "type": "string", "pattern": "^([0-9a-fA-F]{2})*$" }
                }
            },
            "signature": { "type": "string", "pattern": "^([0-9a-fA-F]{2})+$" },
            "category": { "enum": ["person", "location"] }
        }
    })
}

fn decryption_share_schema() -> Value {
    json!({
        "type": "object",
        "required": ["messageRound3"],
        "properties": {
            "messageRound3": { "type": "string" }
        }
    })
}

fn chat_schema() -> Value {
    json!({
        "type": "object",
        "required": ["text"],
        "properties": {
            "text": { "type": "string" }
        }
    })
}

/// Compiled schemas for every value the envelope protocol trusts
pub struct PayloadSchemas {
    envelope: NamedValidator,
    payload: NamedValidator,
    typed: Vec<NamedValidator>,
}

impl PayloadSchemas {
    pub fn new() -> Result<Self, SchemaError> {
        Ok(Self {
            envelope: NamedValidator::compile("envelope", &envelope_schema())?,
            payload: NamedValidator::compile("payload", &payload_schema())?,
            typed: vec![
                NamedValidator::compile(MESSAGE_TYPE_ATTESTATION, &attestation_schema())?,
                NamedValidator::compile(MESSAGE_TYPE_DECRYPTION_SHARE, &decryption_share_schema())?,
                NamedValidator::compile(MESSAGE_TYPE_CHAT, &chat_schema())?,
            ],
        })
    }

    pub fn validate_envelope(&self, envelope: &Value) -> Result<(), SchemaError> {
        self.envelope.validate(envelope)
    }

    /// Validate the `{type, data}` wrapper
    pub fn validate_payload(&self, payload: &Value) -> Result<(), SchemaError> {
        self.payload.validate(payload)
    }

    /// Validate `data` against the schema registered for `message_type`.
    ///
    /// Types without a schema are accepted as opaque.
    pub fn validate_data(&self, message_type: &str, data: &Value) -> Result<(), SchemaError> {
        match self.typed.iter().find(|v| v.name == message_type) {
            Some(validator) => validator.validate(data),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for PayloadSchemas {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PayloadSchemas")
            .field(
                "typed",
                &self.typed.iter().map(|v| v.name.as_str()).collect::<Vec<_>>(),
            )
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schemas() -> PayloadSchemas {
        PayloadSchemas::new().unwrap()
    }

    #[test]
    fn test_envelope_reports_all_missing_fields() {
        let err = schemas()
            .validate_envelope(&json!({ "toPublicKey": "aa" }))
            .unwrap_err();

        assert_eq!(err.schema, "envelope");
        let mut missing = err.missing_fields.clone();
        missing.sort();
        assert_eq!(
            missing,
            vec!["encryptedContents", "fromDisplayName", "fromPublicKey", "timestamp"]
        );
        assert!(err.violations.is_empty());
    }

    #[test]
    fn test_payload_requires_type_and_data() {
        let err = schemas().validate_payload(&json!({})).unwrap_err();
        let mut missing = err.missing_fields.clone();
        missing.sort();
        assert_eq!(missing, vec!["data", "type"]);

        // null data is still present
        assert!(schemas()
            .validate_payload(&json!({ "type": "chat", "data": null }))
            .is_ok());
    }

    #[test]
    fn test_empty_type_is_violation() {
        let err = schemas()
            .validate_payload(&json!({ "type": "", "data": {} }))
            .unwrap_err();
        assert!(err.missing_fields.is_empty());
        assert_eq!(err.violations.len(), 1);
        assert_eq!(err.violations[0].path, "type");
    }

    #[test]
    fn test_decryption_share_schema() {
        let s = schemas();
        assert!(s
            .validate_data("decryption-share", &json!({ "messageRound3": "abc" }))
            .is_ok());

        let err = s.validate_data("decryption-share", &json!({})).unwrap_err();
        assert_eq!(err.missing_fields, vec!["messageRound3"]);

        let err = s
            .validate_data("decryption-share", &json!({ "messageRound3": 3 }))
            .unwrap_err();
        assert_eq!(err.violations[0].path, "messageRound3");
    }

    #[test]
    fn test_nested_missing_field_path() {
        let data = json!({
            "signerPublicKey": "04ab",
            "counterMessage": { "prefix": "19", "nonce": 1 },
            "signature": "3006",
            "category": "person"
        });
        let err = schemas().validate_data("attestation", &data).unwrap_err();
        assert_eq!(err.missing_fields, vec!["counterMessage.randomness"]);
    }

    #[test]
    fn test_unknown_type_passes() {
        let s = schemas();
        assert!(s.validate_data("psi-round2", &json!([1, 2, 3])).is_ok());
    }

    #[test]
    fn test_display_lists_missing_fields() {
        let err = SchemaError::missing("envelope", vec!["timestamp".to_string()]);
        assert_eq!(
            err.to_string(),
            "envelope schema validation failed; missing fields: timestamp"
        );
    }
}
