//! Synthetic key naming.
//!
//! A sub-field at row `i` of parent path `P` lives at `P_i_name`; its
//! revision record lives at `_P_i_name`. Keys depend on nothing else.

/// Reserved key of the template row that is never persisted.
pub const CLONE_INDEX: &str = "acfcloneindex";

/// Prefix marking a revision key.
pub const REVISION_PREFIX: char = '_';

/// Full path of a sub-field within a repeater row.
pub fn row_path(parent: &str, index: usize, name: &str) -> String {
    format!("{parent}_{index}_{name}")
}

/// Revision key paired with a value path.
pub fn revision_key(path: &str) -> String {
    format!("{REVISION_PREFIX}{path}")
}

/// Value path and revision key for a sub-field, in emission order.
pub fn key_pair(path: &str) -> [String; 2] {
    [path.to_string(), revision_key(path)]
}
