//! Hooks module: injected extension points.
//!
//! Provides [`FieldHooks`] for transforming leaf values before they are
//! recorded, and the [`MetaObserver`] trait for vetoing or observing single
//! meta writes inside a batch.

pub mod filters;
pub mod observer;

pub use filters::{FieldHooks, HookTarget, ValueFilterFn};
pub use observer::{MetaObserver, NoopObserver};
