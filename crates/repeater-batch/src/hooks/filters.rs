//! Per-field value filters.
//!
//! Before a leaf value is recorded it passes through three stages, keyed by
//! the field's schema key, then its resolved name, then its type label. Each
//! stage runs every matching filter in registration order and feeds the
//! result to the next.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::object::ObjectRef;
use crate::schema::FieldSchema;

/// Closure type for a value filter.
pub type ValueFilterFn = dyn Fn(Value, &ObjectRef, &FieldSchema) -> Value + Send + Sync;

/// What a filter is registered against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookTarget {
    /// Schema key, e.g. `field_title`.
    Key(String),
    /// Resolved name, e.g. `items_0_title`.
    Name(String),
    /// Type label, e.g. `text`.
    Type(String),
}

impl HookTarget {
    fn stage(&self) -> usize {
        match self {
            HookTarget::Key(_) => 0,
            HookTarget::Name(_) => 1,
            HookTarget::Type(_) => 2,
        }
    }

    fn matches(&self, field: &FieldSchema) -> bool {
        match self {
            HookTarget::Key(k) => *k == field.key,
            HookTarget::Name(n) => *n == field.name,
            HookTarget::Type(t) => t == field.field_type.label(),
        }
    }
}

/// Ordered list of value filters, injected into the pipeline.
#[derive(Clone, Default)]
pub struct FieldHooks {
    filters: Vec<(HookTarget, Arc<ValueFilterFn>)>,
}

impl FieldHooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `filter` for `target` and return the updated list.
    pub fn on(
        mut self,
        target: HookTarget,
        filter: impl Fn(Value, &ObjectRef, &FieldSchema) -> Value + Send + Sync + 'static,
    ) -> Self {
        self.push(target, filter);
        self
    }

    pub fn push(
        &mut self,
        target: HookTarget,
        filter: impl Fn(Value, &ObjectRef, &FieldSchema) -> Value + Send + Sync + 'static,
    ) {
        self.filters.push((target, Arc::new(filter)));
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Run `value` through the key, name and type stages for `field`.
    /// `field.name` must already be the resolved path.
    pub fn apply(&self, value: Value, object: &ObjectRef, field: &FieldSchema) -> Value {
        let mut value = value;
        for stage in 0..3 {
            for (target, filter) in &self.filters {
                if target.stage() == stage && target.matches(field) {
                    value = filter(value, object, field);
                }
            }
        }
        value
    }
}

impl fmt::Debug for FieldHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldHooks")
            .field(
                "targets",
                &self.filters.iter().map(|(t, _)| t).collect::<Vec<_>>(),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::f;
    use serde_json::json;

    fn post() -> ObjectRef {
        ObjectRef::Post(1)
    }

    fn append(suffix: &'static str) -> impl Fn(Value, &ObjectRef, &FieldSchema) -> Value {
        move |v, _, _| json!(format!("{}{}", v.as_str().unwrap_or_default(), suffix))
    }

    #[test]
    fn stages_run_key_then_name_then_type() {
        // Registered out of order on purpose.
        let hooks = FieldHooks::new()
            .on(HookTarget::Type("text".into()), append("-type"))
            .on(HookTarget::Name("items_0_title".into()), append("-name"))
            .on(HookTarget::Key("field_title".into()), append("-key"));

        let field = f::text("title", "field_title").resolved("items_0_title".into());
        let out = hooks.apply(json!("v"), &post(), &field);
        assert_eq!(out, json!("v-key-name-type"));
    }

    #[test]
    fn non_matching_filters_are_skipped() {
        let hooks = FieldHooks::new().on(HookTarget::Key("other".into()), append("-x"));
        let field = f::text("title", "field_title");
        assert_eq!(hooks.apply(json!("v"), &post(), &field), json!("v"));
    }

    #[test]
    fn same_stage_filters_run_in_registration_order() {
        let hooks = FieldHooks::new()
            .on(HookTarget::Type("text".into()), append("1"))
            .on(HookTarget::Type("text".into()), append("2"));
        let field = f::text("title", "field_title");
        assert_eq!(hooks.apply(json!(""), &post(), &field), json!("12"));
    }
}
