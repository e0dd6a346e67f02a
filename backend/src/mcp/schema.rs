//! Tool argument validation.
//!
//! Tools describe their arguments with plain JSON Schema documents. The
//! protocol layer compiles each document once into a [`Validator`] and runs
//! every `tools/call` argument object through it before the handler is
//! invoked. `$ref`s are not resolved; they accept any value.

use serde_json::{Map, Value};
use std::fmt;
use tracing::warn;

#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("Schema must be an object for MCP tool input/output")]
    NotAnObject,

    #[error("invalid schema: {0}")]
    Invalid(String),
}

/// A value rejected by a [`Validator`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{path}: {message}")]
pub struct ValidationError {
    /// JSON path of the offending value, rooted at `$`.
    pub path: String,
    pub message: String,
}

/// Compiled argument schema.
pub struct Validator {
    schema: Value,
    compiled: jsonschema::Validator,
}

impl fmt::Debug for Validator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Validator")
            .field("schema", &self.schema)
            .finish_non_exhaustive()
    }
}

impl Validator {
    /// Compile a tool input/output schema. The top level must be an object.
    pub fn object_from_schema(schema: &Value) -> Result<Self, SchemaError> {
        if !schema.is_object() {
            return Err(SchemaError::NotAnObject);
        }
        Self::from_schema(schema)
    }

    /// Compile any schema node.
    pub fn from_schema(schema: &Value) -> Result<Self, SchemaError> {
        let mut schema = schema.clone();
        if let Value::Object(map) = &mut schema {
            map.remove("$id");
        }
        strip_refs(&mut schema, "$");

        let compiled = jsonschema::options()
            .should_validate_formats(true)
            .build(&schema)
            .map_err(|e| SchemaError::Invalid(e.to_string()))?;

        Ok(Self { schema, compiled })
    }

    /// The document as compiled, after `$ref` replacement.
    pub fn schema(&self) -> &Value {
        &self.schema
    }

    /// Check `value`, returning it with defaults filled in.
    pub fn validate(&self, value: &Value) -> Result<Value, ValidationError> {
        let mut filled = value.clone();
        apply_defaults(&self.schema, &mut filled);

        if let Some(e) = self.compiled.iter_errors(&filled).next() {
            return Err(ValidationError {
                path: json_path(&e.instance_path.to_string()),
                message: e.to_string(),
            });
        }
        Ok(filled)
    }
}

/// Replace every `$ref` node with the always-true schema.
fn strip_refs(schema: &mut Value, location: &str) {
    match schema {
        Value::Object(map) => {
            if let Some(target) = map.get("$ref") {
                warn!("Unresolved $ref {} at {} accepts any value", target, location);
                *schema = Value::Bool(true);
                return;
            }
            for (key, child) in map.iter_mut() {
                strip_refs(child, &format!("{}.{}", location, key));
            }
        }
        Value::Array(items) => {
            for (index, child) in items.iter_mut().enumerate() {
                strip_refs(child, &format!("{}[{}]", location, index));
            }
        }
        _ => {}
    }
}

/// Fill absent object properties from their `default`, recursing into
/// nested objects, array items and `allOf` branches.
fn apply_defaults(schema: &Value, value: &mut Value) {
    let Value::Object(schema) = schema else {
        return;
    };

    if let Some(Value::Array(parts)) = schema.get("allOf") {
        for part in parts {
            apply_defaults(part, value);
        }
    }

    match value {
        Value::Object(object) => fill_properties(schema, object),
        Value::Array(items) => {
            if let Some(item_schema) = schema.get("items") {
                for item in items.iter_mut() {
                    apply_defaults(item_schema, item);
                }
            }
        }
        _ => {}
    }
}

fn fill_properties(schema: &Map<String, Value>, object: &mut Map<String, Value>) {
    let Some(Value::Object(properties)) = schema.get("properties") else {
        return;
    };
    for (name, property) in properties {
        match object.get_mut(name) {
            Some(present) => apply_defaults(property, present),
            None => {
                if let Some(default) = property.get("default") {
                    object.insert(name.clone(), default.clone());
                }
            }
        }
    }
}

/// `/user/tags/1` -> `$.user.tags[1]`
fn json_path(pointer: &str) -> String {
    let mut path = String::from("$");
    for segment in pointer.split('/').skip(1) {
        let segment = segment.replace("~1", "/").replace("~0", "~");
        if !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit()) {
            path.push_str(&format!("[{}]", segment));
        } else {
            path.push('.');
            path.push_str(&segment);
        }
    }
    path
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn validator(schema: Value) -> Validator {
        Validator::from_schema(&schema).unwrap()
    }

    #[test]
    fn top_level_must_be_object() {
        assert!(matches!(
            Validator::object_from_schema(&json!("string")),
            Err(SchemaError::NotAnObject)
        ));
        assert!(Validator::object_from_schema(&json!({"type": "object"})).is_ok());
    }

    #[test]
    fn defaults_are_applied_to_absent_properties() {
        let v = validator(json!({
            "type": "object",
            "properties": {
                "text": { "type": "string" },
                "steps": { "type": "integer", "default": 3 },
                "opts": {
                    "type": "object",
                    "properties": { "loud": { "type": "boolean", "default": false } }
                }
            },
            "required": ["text"]
        }));

        assert_eq!(
            v.validate(&json!({"text": "hi", "opts": {}})).unwrap(),
            json!({"text": "hi", "steps": 3, "opts": {"loud": false}})
        );
        assert_eq!(
            v.validate(&json!({"text": "hi", "steps": 5})).unwrap()["steps"],
            5
        );
    }

    #[test]
    fn required_and_type_errors_carry_paths() {
        let v = validator(json!({
            "type": "object",
            "properties": {
                "user": {
                    "type": "object",
                    "properties": { "age": { "type": "integer", "minimum": 0 } }
                }
            },
            "required": ["user"]
        }));

        let err = v.validate(&json!({})).unwrap_err();
        assert_eq!(err.path, "$");
        assert!(err.message.contains("user"));

        let err = v.validate(&json!({"user": {"age": -1}})).unwrap_err();
        assert_eq!(err.path, "$.user.age");

        let err = v.validate(&json!({"user": {"age": 1.5}})).unwrap_err();
        assert!(err.message.contains("integer"));
    }

    #[test]
    fn sibling_keywords_of_combinators_are_enforced() {
        let v = validator(json!({
            "type": "object",
            "properties": { "n": { "type": "number" } },
            "anyOf": [ { "required": ["n"] } ]
        }));

        assert!(v.validate(&json!({"n": 1})).is_ok());
        assert!(v.validate(&json!({})).is_err());
        let err = v.validate(&json!({"n": "not a number"})).unwrap_err();
        assert_eq!(err.path, "$.n");

        let tagged = validator(json!({
            "type": "string",
            "enum": ["a", "bb"],
            "maxLength": 1
        }));
        assert!(tagged.validate(&json!("a")).is_ok());
        assert!(tagged.validate(&json!("bb")).is_err());
    }

    #[test]
    fn refs_are_permissive() {
        let v = validator(json!({
            "$id": "Node",
            "type": "object",
            "properties": {
                "node": { "$ref": "#/definitions/Node" },
                "count": { "type": "integer" }
            }
        }));
        assert!(v.validate(&json!({"node": [1, "two", null]})).is_ok());
        assert!(v.validate(&json!({"count": "x"})).is_err());
        assert_eq!(v.schema()["properties"]["node"], json!(true));
    }

    #[test]
    fn annotations_survive_compilation() {
        let v = validator(json!({
            "type": "number",
            "multipleOf": 0.5,
            "title": "Half steps",
            "description": "A value in half steps",
            "examples": [1.5],
            "default": 1
        }));
        assert!(v.validate(&json!(2.5)).is_ok());
        assert!(v.validate(&json!(2.2)).is_err());
        assert_eq!(v.schema()["title"], "Half steps");
        assert_eq!(v.schema()["examples"], json!([1.5]));
    }

    #[test]
    fn all_of_branches_apply_together() {
        let v = validator(json!({
            "allOf": [
                {
                    "type": "object",
                    "properties": { "a": { "type": "string" } },
                    "required": ["a"]
                },
                {
                    "type": "object",
                    "properties": { "b": { "type": "number", "default": 1 } }
                }
            ]
        }));
        assert_eq!(
            v.validate(&json!({"a": "x"})).unwrap(),
            json!({"a": "x", "b": 1})
        );
        assert!(v.validate(&json!({"b": 2})).is_err());
    }

    #[test]
    fn strict_objects_reject_unknown_keys() {
        let v = validator(json!({
            "type": "object",
            "properties": { "a": { "type": "string" } },
            "additionalProperties": false
        }));
        assert!(v.validate(&json!({"a": "x"})).is_ok());
        let err = v.validate(&json!({"a": "x", "b": 1})).unwrap_err();
        assert!(err.message.contains("'b'"));
    }

    #[test]
    fn unique_items_and_bounds() {
        let v = validator(json!({
            "type": "array",
            "items": { "type": "integer" },
            "minItems": 1,
            "maxItems": 3,
            "uniqueItems": true
        }));
        assert!(v.validate(&json!([1, 2])).is_ok());
        assert!(v.validate(&json!([1, 1])).is_err());
        assert!(v.validate(&json!([])).is_err());
        assert!(v.validate(&json!([1, 2, 3, 4])).is_err());
        assert_eq!(v.validate(&json!([1, "x"])).unwrap_err().path, "$[1]");
    }

    #[test]
    fn string_formats_and_pattern() {
        let email = validator(json!({"type": "string", "format": "email"}));
        assert!(email.validate(&json!("a@example.com")).is_ok());
        assert!(email.validate(&json!("nope")).is_err());

        let when = validator(json!({"type": "string", "format": "date-time"}));
        assert!(when.validate(&json!("2024-05-01T10:00:00Z")).is_ok());
        assert!(when.validate(&json!("yesterday")).is_err());

        let code = validator(json!({"type": "string", "pattern": "^[A-Z]{3}$", "maxLength": 3}));
        assert!(code.validate(&json!("ABC")).is_ok());
        assert!(code.validate(&json!("abc")).is_err());
    }

    #[test]
    fn invalid_pattern_is_a_compile_error() {
        assert!(matches!(
            Validator::from_schema(&json!({"type": "string", "pattern": "("})),
            Err(SchemaError::Invalid(_))
        ));
    }

    #[test]
    fn enums_consts_and_unions() {
        let color = validator(json!({"enum": ["red", "green"]}));
        assert!(color.validate(&json!("red")).is_ok());
        assert!(color.validate(&json!("blue")).is_err());

        let fixed = validator(json!({"const": 7}));
        assert!(fixed.validate(&json!(7)).is_ok());
        assert!(fixed.validate(&json!(8)).is_err());

        let either = validator(json!({"anyOf": [{"type": "string"}, {"type": "number"}]}));
        assert!(either.validate(&json!(1)).is_ok());
        assert!(either.validate(&json!(true)).is_err());

        let nullable = validator(json!({"type": ["string", "null"]}));
        assert!(nullable.validate(&json!(null)).is_ok());
        assert!(nullable.validate(&json!(3)).is_err());
    }

    #[test]
    fn pointer_to_json_path() {
        assert_eq!(json_path(""), "$");
        assert_eq!(json_path("/user/tags/1"), "$.user.tags[1]");
        assert_eq!(json_path("/a~1b"), "$.a/b");
    }
}
