pub mod field;
pub mod path;

pub use field::{f, FieldSchema, FieldType};
