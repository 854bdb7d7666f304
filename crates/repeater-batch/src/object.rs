//! Object routing: which backing destination a write targets.
//!
//! Callers hand in an [`ObjectId`] in whatever shape their host uses. It is
//! parsed exactly once into an [`ObjectRef`]; everything past the boundary
//! matches on the variant instead of inspecting strings.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{RepeaterError, Result};

/// Reserved prefix marking a user object id (`"user_7"`).
pub const USER_PREFIX: &str = "user_";

/// Raw object identifier as supplied by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ObjectId {
    Numeric(u64),
    Named(String),
}

impl From<u64> for ObjectId {
    fn from(id: u64) -> Self {
        ObjectId::Numeric(id)
    }
}

impl From<&str> for ObjectId {
    fn from(id: &str) -> Self {
        ObjectId::Named(id.to_string())
    }
}

impl From<String> for ObjectId {
    fn from(id: String) -> Self {
        ObjectId::Named(id)
    }
}

/// The three kinds of backing destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectKind {
    Post,
    User,
    Option,
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ObjectKind::Post => "post",
            ObjectKind::User => "user",
            ObjectKind::Option => "option",
        })
    }
}

/// A resolved object reference. Exactly one destination per call.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ObjectRef {
    Post(u64),
    User(u64),
    Option(String),
}

impl ObjectRef {
    /// Parse a caller-supplied id.
    ///
    /// Numeric ids (and all-digit strings) are posts, `user_<n>` is a user,
    /// any other non-empty string names an option bucket. Id `0` and a
    /// non-numeric user suffix are rejected.
    pub fn parse(id: &ObjectId) -> Result<Self> {
        match id {
            ObjectId::Numeric(0) => Err(RepeaterError::InvalidObjectId("0".to_string())),
            ObjectId::Numeric(n) => Ok(ObjectRef::Post(*n)),
            ObjectId::Named(raw) => Self::parse_str(raw),
        }
    }

    fn parse_str(raw: &str) -> Result<Self> {
        let s = raw.trim();
        if s.is_empty() {
            return Err(RepeaterError::InvalidObjectId(raw.to_string()));
        }

        if s.bytes().all(|b| b.is_ascii_digit()) {
            return match s.parse::<u64>() {
                Ok(0) | Err(_) => Err(RepeaterError::InvalidObjectId(raw.to_string())),
                Ok(n) => Ok(ObjectRef::Post(n)),
            };
        }

        if let Some(rest) = s.strip_prefix(USER_PREFIX) {
            return match rest.parse::<u64>() {
                Ok(n) if n > 0 => Ok(ObjectRef::User(n)),
                _ => Err(RepeaterError::InvalidObjectId(raw.to_string())),
            };
        }

        Ok(ObjectRef::Option(s.to_string()))
    }

    pub fn kind(&self) -> ObjectKind {
        match self {
            ObjectRef::Post(_) => ObjectKind::Post,
            ObjectRef::User(_) => ObjectKind::User,
            ObjectRef::Option(_) => ObjectKind::Option,
        }
    }

    /// Numeric id for object-scoped tables; `None` for option buckets.
    pub fn numeric_id(&self) -> Option<u64> {
        match self {
            ObjectRef::Post(id) | ObjectRef::User(id) => Some(*id),
            ObjectRef::Option(_) => None,
        }
    }

    /// Map a record path to the key actually stored.
    ///
    /// Post and user rows are scoped by their object column, so the path is
    /// stored as-is. Option rows share one table, so the bucket is folded
    /// into the key: `items` → `site_theme_items`, `_items` → `_site_theme_items`.
    pub fn storage_key(&self, meta_key: &str) -> String {
        match self {
            ObjectRef::Post(_) | ObjectRef::User(_) => meta_key.to_string(),
            ObjectRef::Option(bucket) => match meta_key.strip_prefix('_') {
                Some(rest) => format!("_{bucket}_{rest}"),
                None => format!("{bucket}_{meta_key}"),
            },
        }
    }

    /// Inverse of [`storage_key`](Self::storage_key). Returns `None` when the
    /// stored key does not belong to this bucket.
    pub fn meta_key<'a>(&self, stored: &'a str) -> Option<std::borrow::Cow<'a, str>> {
        use std::borrow::Cow;
        match self {
            ObjectRef::Post(_) | ObjectRef::User(_) => Some(Cow::Borrowed(stored)),
            ObjectRef::Option(bucket) => {
                let prefix = format!("{bucket}_");
                if let Some(rest) = stored.strip_prefix('_') {
                    if let Some(path) = rest.strip_prefix(&prefix) {
                        return Some(Cow::Owned(format!("_{path}")));
                    }
                }
                stored.strip_prefix(&prefix).map(Cow::Borrowed)
            }
        }
    }
}

/// Formats back to the caller-facing id (`42`, `user_7`, `site_theme`), which
/// is also the form used in cache keys.
impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectRef::Post(id) => write!(f, "{id}"),
            ObjectRef::User(id) => write!(f, "{USER_PREFIX}{id}"),
            ObjectRef::Option(bucket) => f.write_str(bucket),
        }
    }
}

impl TryFrom<ObjectId> for ObjectRef {
    type Error = RepeaterError;

    fn try_from(id: ObjectId) -> Result<Self> {
        ObjectRef::parse(&id)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
