//! Meta table layout and destination resolution.

use serde::{Deserialize, Serialize};

use crate::error::{RepeaterError, Result};
use crate::object::{ObjectKind, ObjectRef};

// ============================================================================
// TableConfig
// ============================================================================

/// Which table backs each object kind. A kind mapped to `None` has no
/// destination and updates for it fail fast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableConfig {
    pub prefix: String,
    pub post: Option<String>,
    pub user: Option<String>,
    pub option: Option<String>,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            prefix: "wp_".to_string(),
            post: Some("postmeta".to_string()),
            user: Some("usermeta".to_string()),
            option: Some("options".to_string()),
        }
    }
}

impl TableConfig {
    /// Table layout for a kind, if one is configured.
    pub fn table_for(&self, kind: ObjectKind) -> Result<MetaTable> {
        let base = match kind {
            ObjectKind::Post => self.post.as_deref(),
            ObjectKind::User => self.user.as_deref(),
            ObjectKind::Option => self.option.as_deref(),
        }
        .ok_or(RepeaterError::UnknownDestination(kind))?;

        let name = format!("{}{}", self.prefix, base);
        if !is_sql_identifier(&name) {
            return Err(RepeaterError::Internal(format!(
                "table name \"{name}\" is not a plain SQL identifier"
            )));
        }
        Ok(MetaTable::for_kind(kind, name))
    }

    /// Resolve an object to the single destination it writes to.
    pub fn resolve(&self, object: &ObjectRef) -> Result<Destination> {
        Ok(Destination {
            object: object.clone(),
            table: self.table_for(object.kind())?,
        })
    }

    /// Every configured table, used to create the schema.
    pub fn tables(&self) -> Vec<MetaTable> {
        [ObjectKind::Post, ObjectKind::User, ObjectKind::Option]
            .into_iter()
            .filter_map(|kind| self.table_for(kind).ok())
            .collect()
    }
}

fn is_sql_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

// ============================================================================
// MetaTable
// ============================================================================

/// Column layout of one meta table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaTable {
    pub name: String,
    pub id_column: &'static str,
    /// `None` for the options table, whose rows are scoped by key alone.
    pub object_column: Option<&'static str>,
    pub key_column: &'static str,
    pub value_column: &'static str,
}

impl MetaTable {
    fn for_kind(kind: ObjectKind, name: String) -> Self {
        match kind {
            ObjectKind::Post => Self {
                name,
                id_column: "meta_id",
                object_column: Some("post_id"),
                key_column: "meta_key",
                value_column: "meta_value",
            },
            ObjectKind::User => Self {
                name,
                id_column: "umeta_id",
                object_column: Some("user_id"),
                key_column: "meta_key",
                value_column: "meta_value",
            },
            ObjectKind::Option => Self {
                name,
                id_column: "option_id",
                object_column: None,
                key_column: "option_name",
                value_column: "option_value",
            },
        }
    }
}

// ============================================================================
// Destination
// ============================================================================

/// An object bound to the table it lives in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    pub object: ObjectRef,
    pub table: MetaTable,
}

impl Destination {
    /// Key as stored in the table.
    pub fn storage_key(&self, meta_key: &str) -> String {
        self.object.storage_key(meta_key)
    }

    /// Record path for a stored key, or `None` if the key is outside this
    /// destination's bucket.
    pub fn meta_key(&self, stored: &str) -> Option<String> {
        self.object.meta_key(stored).map(|k| k.into_owned())
    }

    /// Value bound to the object column, if the table has one.
    pub fn object_value(&self) -> Option<u64> {
        self.table
            .object_column
            .and_then(|_| self.object.numeric_id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_maps_every_kind() {
        let config = TableConfig::default();
        assert_eq!(config.table_for(ObjectKind::Post).unwrap().name, "wp_postmeta");
        assert_eq!(config.table_for(ObjectKind::User).unwrap().name, "wp_usermeta");
        assert_eq!(config.table_for(ObjectKind::Option).unwrap().name, "wp_options");
        assert_eq!(config.tables().len(), 3);
    }

    #[test]
    fn unmapped_kind_is_unknown_destination() {
        let config = TableConfig {
            user: None,
            ..Default::default()
        };
        let err = config.resolve(&ObjectRef::User(7)).unwrap_err();
        assert!(matches!(err, RepeaterError::UnknownDestination(ObjectKind::User)));
    }

    #[test]
    fn user_table_uses_umeta_id() {
        let dest = TableConfig::default().resolve(&ObjectRef::User(7)).unwrap();
        assert_eq!(dest.table.id_column, "umeta_id");
        assert_eq!(dest.table.object_column, Some("user_id"));
        assert_eq!(dest.object_value(), Some(7));
    }

    #[test]
    fn option_destination_has_no_object_column() {
        let dest = TableConfig::default()
            .resolve(&ObjectRef::Option("site_theme".to_string()))
            .unwrap();
        assert_eq!(dest.object_value(), None);
        assert_eq!(dest.storage_key("items"), "site_theme_items");
    }

    #[test]
    fn config_deserializes_with_defaults() {
        let config: TableConfig = serde_json::from_str(r#"{"prefix": "blog_"}"#).unwrap();
        assert_eq!(config.table_for(ObjectKind::Post).unwrap().name, "blog_postmeta");
    }

    #[test]
    fn non_identifier_table_name_is_rejected() {
        let config = TableConfig {
            prefix: "wp; DROP".to_string(),
            ..Default::default()
        };
        assert!(config.table_for(ObjectKind::Post).is_err());
    }
}
