pub mod codec;
pub mod compare;

pub use codec::{deserialize_meta_value, serialize_meta_value};
pub use compare::values_equal;
