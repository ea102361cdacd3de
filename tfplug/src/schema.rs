//! Schema types and builders for tfplug
//!
//! Schemas describe the attributes of the provider configuration, of each
//! resource and of each data source. Nested structures are expressed as
//! object typed attributes rather than nested blocks.

use crate::defaults::DefaultValue;
use crate::plan_modifier::PlanModifier;
use crate::types::Dynamic;
use crate::validator::Validator;
use std::collections::HashMap;
use std::sync::Arc;

/// AttributeType defines the type system for Terraform attributes
/// This must match Terraform's type system exactly
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeType {
    String,
    Number, // Always f64
    Bool,
    List(Box<AttributeType>),               // Ordered, allows duplicates
    Set(Box<AttributeType>),                // Unordered, no duplicates
    Map(Box<AttributeType>),                // String keys only
    Object(HashMap<String, AttributeType>), // Fixed structure
}

impl AttributeType {
    pub fn list(element: AttributeType) -> Self {
        AttributeType::List(Box::new(element))
    }

    pub fn set(element: AttributeType) -> Self {
        AttributeType::Set(Box::new(element))
    }

    pub fn map(element: AttributeType) -> Self {
        AttributeType::Map(Box::new(element))
    }

    pub fn object<I, K>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, AttributeType)>,
        K: Into<String>,
    {
        AttributeType::Object(fields.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Terraform's JSON type syntax: `"string"`, `["list","string"]`,
    /// `["object",{"a":"number"}]`.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::{json, Value};
        match self {
            AttributeType::String => json!("string"),
            AttributeType::Number => json!("number"),
            AttributeType::Bool => json!("bool"),
            AttributeType::List(elem) => json!(["list", elem.to_json()]),
            AttributeType::Set(elem) => json!(["set", elem.to_json()]),
            AttributeType::Map(elem) => json!(["map", elem.to_json()]),
            AttributeType::Object(fields) => {
                let fields: serde_json::Map<String, Value> = fields
                    .iter()
                    .map(|(name, ty)| (name.clone(), ty.to_json()))
                    .collect();
                json!(["object", fields])
            }
        }
    }

    /// Encoded form carried in `Schema.Attribute.type`.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.to_json().to_string().into_bytes()
    }

    /// Whether `value` fits this type. Null and unknown fit every type.
    pub fn accepts(&self, value: &Dynamic) -> bool {
        match (self, value) {
            (_, Dynamic::Null) | (_, Dynamic::Unknown) => true,
            (AttributeType::String, Dynamic::String(_)) => true,
            (AttributeType::Number, Dynamic::Number(_)) => true,
            (AttributeType::Bool, Dynamic::Bool(_)) => true,
            (AttributeType::List(elem), Dynamic::List(items))
            | (AttributeType::Set(elem), Dynamic::List(items)) => {
                items.iter().all(|item| elem.accepts(item))
            }
            (AttributeType::Map(elem), Dynamic::Map(entries)) => {
                entries.values().all(|v| elem.accepts(v))
            }
            (AttributeType::Object(fields), Dynamic::Map(entries)) => {
                entries.iter().all(|(name, v)| match fields.get(name) {
                    Some(ty) => ty.accepts(v),
                    None => false,
                })
            }
            _ => false,
        }
    }

    /// Shape `value` to this type: object fields are filled with null when
    /// missing and dropped when undeclared, recursively.
    pub fn conform(&self, value: &Dynamic) -> Dynamic {
        match (self, value) {
            (AttributeType::Object(fields), Dynamic::Map(entries)) => Dynamic::Map(
                fields
                    .iter()
                    .map(|(name, ty)| {
                        let v = entries
                            .get(name)
                            .map(|v| ty.conform(v))
                            .unwrap_or(Dynamic::Null);
                        (name.clone(), v)
                    })
                    .collect(),
            ),
            (AttributeType::List(elem), Dynamic::List(items))
            | (AttributeType::Set(elem), Dynamic::List(items)) => {
                Dynamic::List(items.iter().map(|item| elem.conform(item)).collect())
            }
            (AttributeType::Map(elem), Dynamic::Map(entries)) => Dynamic::Map(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), elem.conform(v)))
                    .collect(),
            ),
            _ => value.clone(),
        }
    }
}

impl std::fmt::Display for AttributeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

/// Schema is returned by providers/resources/data sources
/// Version is used for state migration
#[derive(Debug, Clone)]
pub struct Schema {
    pub version: i64,
    pub block: Block,
}

impl Schema {
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.block.attributes.iter().find(|a| a.name == name)
    }

    /// The schema as one object type, used to shape whole values.
    pub fn object_type(&self) -> AttributeType {
        AttributeType::Object(
            self.block
                .attributes
                .iter()
                .map(|a| (a.name.clone(), a.r#type.clone()))
                .collect(),
        )
    }

    /// Shape a state value so every declared attribute is present and no
    /// undeclared attribute remains. Null stays null.
    pub fn conform(&self, value: &Dynamic) -> Dynamic {
        match value {
            Dynamic::Null => Dynamic::Null,
            Dynamic::Map(_) => self.object_type().conform(value),
            _ => self.object_type().conform(&Dynamic::Map(HashMap::new())),
        }
    }
}

/// Block represents the root configuration block
#[derive(Debug, Clone)]
pub struct Block {
    pub version: i64,
    pub attributes: Vec<Attribute>,
    pub description: String,
    pub description_kind: StringKind,
    pub deprecated: bool,
}

/// Attribute represents a single configuration attribute
#[derive(Clone)]
pub struct Attribute {
    pub name: String,
    pub r#type: AttributeType,
    pub description: String,
    pub required: bool,
    pub optional: bool,
    pub computed: bool,
    pub sensitive: bool,
    pub deprecated: bool,
    pub validators: Vec<Arc<dyn Validator>>,
    pub plan_modifiers: Vec<Arc<dyn PlanModifier>>,
    pub default: Option<Arc<dyn DefaultValue>>,
}

// Manual Debug implementation since validators/modifiers don't implement Debug
impl std::fmt::Debug for Attribute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Attribute")
            .field("name", &self.name)
            .field("type", &self.r#type)
            .field("required", &self.required)
            .field("optional", &self.optional)
            .field("computed", &self.computed)
            .field("sensitive", &self.sensitive)
            .field(
                "validators",
                &format!("{} validators", self.validators.len()),
            )
            .field(
                "plan_modifiers",
                &format!("{} plan modifiers", self.plan_modifiers.len()),
            )
            .field("default", &self.default.is_some())
            .finish()
    }
}

/// StringKind represents the format of string values
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StringKind {
    Plain,
    Markdown,
}

/// AttributeBuilder provides fluent API for building attributes
pub struct AttributeBuilder {
    attribute: Attribute,
}

impl AttributeBuilder {
    pub fn new(name: &str, type_: AttributeType) -> Self {
        Self {
            attribute: Attribute {
                name: name.to_string(),
                r#type: type_,
                description: String::new(),
                required: false,
                optional: false,
                computed: false,
                sensitive: false,
                deprecated: false,
                validators: Vec::new(),
                plan_modifiers: Vec::new(),
                default: None,
            },
        }
    }

    pub fn description(mut self, desc: &str) -> Self {
        self.attribute.description = desc.to_string();
        self
    }

    pub fn required(mut self) -> Self {
        self.attribute.required = true;
        self.attribute.optional = false;
        self
    }

    pub fn optional(mut self) -> Self {
        self.attribute.optional = true;
        self.attribute.required = false;
        self
    }

    pub fn computed(mut self) -> Self {
        self.attribute.computed = true;
        self
    }

    /// Mark as sensitive (hidden)
    pub fn sensitive(mut self) -> Self {
        self.attribute.sensitive = true;
        self
    }

    pub fn deprecated(mut self) -> Self {
        self.attribute.deprecated = true;
        self
    }

    pub fn validator(mut self, validator: impl Validator + 'static) -> Self {
        self.attribute.validators.push(Arc::new(validator));
        self
    }

    pub fn plan_modifier(mut self, modifier: impl PlanModifier + 'static) -> Self {
        self.attribute.plan_modifiers.push(Arc::new(modifier));
        self
    }

    /// Default applied at plan time when the attribute is null in config.
    /// Only meaningful for optional + computed attributes.
    pub fn default(mut self, default: impl DefaultValue + 'static) -> Self {
        self.attribute.default = Some(Arc::new(default));
        self
    }

    pub fn build(self) -> Attribute {
        self.attribute
    }
}

/// SchemaBuilder provides fluent API for building schemas
pub struct SchemaBuilder {
    schema: Schema,
}

impl SchemaBuilder {
    pub fn new() -> Self {
        Self {
            schema: Schema {
                version: 0,
                block: Block {
                    version: 0,
                    attributes: Vec::new(),
                    description: String::new(),
                    description_kind: StringKind::Plain,
                    deprecated: false,
                },
            },
        }
    }

    pub fn version(mut self, version: i64) -> Self {
        self.schema.version = version;
        self.schema.block.version = version;
        self
    }

    pub fn attribute(mut self, attr: Attribute) -> Self {
        self.schema.block.attributes.push(attr);
        self
    }

    pub fn description(mut self, desc: &str) -> Self {
        self.schema.block.description = desc.to_string();
        self
    }

    pub fn description_kind(mut self, kind: StringKind) -> Self {
        self.schema.block.description_kind = kind;
        self
    }

    pub fn deprecated(mut self) -> Self {
        self.schema.block.deprecated = true;
        self
    }

    pub fn build(self) -> Schema {
        self.schema
    }
}

impl Default for SchemaBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan_modifier::RequiresReplace;
    use crate::validator::StringLengthValidator;

    #[test]
    fn attribute_builder_creates_required_string() {
        let attr = AttributeBuilder::new("name", AttributeType::String)
            .description("The name of the resource")
            .required()
            .build();

        assert_eq!(attr.name, "name");
        assert!(matches!(attr.r#type, AttributeType::String));
        assert!(attr.required);
        assert!(!attr.optional);
        assert_eq!(attr.description, "The name of the resource");
    }

    #[test]
    fn cloned_attribute_keeps_validators_and_modifiers() {
        let attr = AttributeBuilder::new("cidr_block", AttributeType::String)
            .required()
            .validator(StringLengthValidator::between(9, 18))
            .plan_modifier(RequiresReplace)
            .build();

        let cloned = attr.clone();
        assert_eq!(cloned.validators.len(), 1);
        assert_eq!(cloned.plan_modifiers.len(), 1);
    }

    #[test]
    fn type_json_encoding() {
        assert_eq!(AttributeType::String.to_bytes(), b"\"string\"".to_vec());
        assert_eq!(
            AttributeType::list(AttributeType::String).to_json(),
            serde_json::json!(["list", "string"])
        );
        assert_eq!(
            AttributeType::map(AttributeType::Number).to_json(),
            serde_json::json!(["map", "number"])
        );

        let ty = AttributeType::object([
            ("ocpus", AttributeType::Number),
            ("memory_in_gbs", AttributeType::Number),
        ]);
        assert_eq!(
            ty.to_json(),
            serde_json::json!(["object", {"ocpus": "number", "memory_in_gbs": "number"}])
        );
        assert_eq!(
            AttributeType::set(ty.clone()).to_json(),
            serde_json::json!(["set", ["object", {"ocpus": "number", "memory_in_gbs": "number"}]])
        );
    }

    #[test]
    fn accepts_checks_nested_types() {
        let ty = AttributeType::list(AttributeType::object([("name", AttributeType::String)]));

        let good = Dynamic::List(vec![Dynamic::Map(HashMap::from([(
            "name".to_string(),
            Dynamic::from("AD-1"),
        )]))]);
        assert!(ty.accepts(&good));

        let wrong_field = Dynamic::List(vec![Dynamic::Map(HashMap::from([(
            "id".to_string(),
            Dynamic::from("x"),
        )]))]);
        assert!(!ty.accepts(&wrong_field));
        assert!(!AttributeType::Number.accepts(&Dynamic::from("1")));
        assert!(AttributeType::Number.accepts(&Dynamic::Unknown));
    }

    #[test]
    fn conform_fills_missing_and_drops_undeclared() {
        let schema = SchemaBuilder::new()
            .attribute(
                AttributeBuilder::new("id", AttributeType::String)
                    .computed()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new(
                    "shape_config",
                    AttributeType::object([
                        ("ocpus", AttributeType::Number),
                        ("memory_in_gbs", AttributeType::Number),
                    ]),
                )
                .optional()
                .build(),
            )
            .build();

        let value = Dynamic::Map(HashMap::from([
            ("id".to_string(), Dynamic::from("ocid1.instance.oc1..x")),
            ("stray".to_string(), Dynamic::Bool(true)),
            (
                "shape_config".to_string(),
                Dynamic::Map(HashMap::from([("ocpus".to_string(), Dynamic::Number(1.0))])),
            ),
        ]));

        let conformed = schema.conform(&value);
        let map = conformed.as_map().unwrap();
        assert_eq!(map.len(), 2);
        assert!(!map.contains_key("stray"));
        let shape = map["shape_config"].as_map().unwrap();
        assert_eq!(shape["ocpus"], Dynamic::Number(1.0));
        assert_eq!(shape["memory_in_gbs"], Dynamic::Null);

        assert_eq!(schema.conform(&Dynamic::Null), Dynamic::Null);
    }
}
