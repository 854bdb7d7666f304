use serde::{Deserialize, Serialize};

// ============================================================================
// FieldSchema Types
// ============================================================================

/// The type of a field node.
///
/// Scalars carry a free-form type label (`text`, `number`, `true_false`, ...)
/// that the type-keyed hook stage matches against.
///
/// Serialized as a bare string: `"repeater"` or the scalar label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FieldType {
    Scalar(String),
    Repeater,
}

impl From<String> for FieldType {
    fn from(label: String) -> Self {
        if label == "repeater" {
            FieldType::Repeater
        } else {
            FieldType::Scalar(label)
        }
    }
}

impl From<FieldType> for String {
    fn from(t: FieldType) -> Self {
        match t {
            FieldType::Scalar(kind) => kind,
            FieldType::Repeater => "repeater".to_string(),
        }
    }
}

impl FieldType {
    /// Label used by the type hook stage.
    pub fn label(&self) -> &str {
        match self {
            FieldType::Scalar(kind) => kind,
            FieldType::Repeater => "repeater",
        }
    }
}

/// Describes one field. `key` is the stable identifier persisted under the
/// revision key; `name` is what paths are built from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSchema {
    pub name: String,
    pub key: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    /// Only meaningful for repeaters.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sub_fields: Vec<FieldSchema>,
}

impl FieldSchema {
    pub fn is_repeater(&self) -> bool {
        matches!(self.field_type, FieldType::Repeater)
    }

    /// Clone of this field renamed to a full path. Hooks and revision records
    /// see the resolved name, not the schema-local one.
    pub fn resolved(&self, full_name: String) -> FieldSchema {
        FieldSchema {
            name: full_name,
            ..self.clone()
        }
    }
}

// ============================================================================
// Schema Builder API (`f` module)
// ============================================================================

/// Field builder helpers. Usage: `f::text("title", "field_title")`,
/// `f::repeater("items", "field_items", vec![...])`.
pub mod f {
    use super::{FieldSchema, FieldType};

    pub fn scalar(kind: &str, name: &str, key: &str) -> FieldSchema {
        FieldSchema {
            name: name.to_string(),
            key: key.to_string(),
            field_type: FieldType::Scalar(kind.to_string()),
            sub_fields: Vec::new(),
        }
    }

    pub fn text(name: &str, key: &str) -> FieldSchema {
        scalar("text", name, key)
    }

    pub fn number(name: &str, key: &str) -> FieldSchema {
        scalar("number", name, key)
    }

    pub fn true_false(name: &str, key: &str) -> FieldSchema {
        scalar("true_false", name, key)
    }

    pub fn repeater(name: &str, key: &str, sub_fields: Vec<FieldSchema>) -> FieldSchema {
        FieldSchema {
            name: name.to_string(),
            key: key.to_string(),
            field_type: FieldType::Repeater,
            sub_fields,
        }
    }
}
