pub mod error;
pub mod types;

pub mod cache;
pub mod diff;
pub mod flatten;
pub mod hooks;
pub mod load;
pub mod object;
pub mod pipeline;
pub mod reader;
pub mod schema;
pub mod storage;
pub mod value;
pub mod writer;

pub use error::{RepeaterError, Result};
pub use object::{ObjectId, ObjectRef};
pub use pipeline::{RepeaterUpdater, RepeaterUpdaterBuilder, UpdatePlan};
pub use types::UpdateReport;
