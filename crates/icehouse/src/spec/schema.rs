use serde::{Deserialize, Serialize};

/// A named column. Nested types carry their own field ids; ids are unique
/// within a table schema.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StructField {
    pub id: i32,
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc: Option<String>,
}

/// A field type: either a primitive (kept as its spec string form, e.g.
/// `"long"`, `"decimal(9,2)"`, `"fixed[16]"`) or a nested struct/list/map.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldType {
    Complex(Box<ComplexType>),
    Primitive(String),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ComplexType {
    Struct {
        fields: Vec<StructField>,
    },
    #[serde(rename_all = "kebab-case")]
    List {
        element_id: i32,
        element: FieldType,
        element_required: bool,
    },
    #[serde(rename_all = "kebab-case")]
    Map {
        key_id: i32,
        key: FieldType,
        value_id: i32,
        value: FieldType,
        value_required: bool,
    },
}

/// Discriminator of the schema object; always the string `"struct"`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaType {
    #[default]
    Struct,
}

/// An ordered list of named columns, identified by `schema_id` within the
/// table metadata.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Schema {
    #[serde(rename = "type", default)]
    pub schema_type: SchemaType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_id: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identifier_field_ids: Option<Vec<i32>>,
    pub fields: Vec<StructField>,
}

impl Schema {
    /// Highest field id in this schema, descending into struct fields.
    #[must_use]
    pub fn max_field_id(&self) -> i32 {
        max_field_id(&self.fields)
    }
}

fn max_field_id(fields: &[StructField]) -> i32 {
    let mut max = 0;
    for field in fields {
        max = max.max(field.id);
        if let FieldType::Complex(complex) = &field.field_type {
            if let ComplexType::Struct { fields } = complex.as_ref() {
                max = max.max(max_field_id(fields));
            }
        }
    }
    max
}
