pub mod memory;
#[cfg(feature = "sqlite")]
pub mod sqlite;
pub mod statement;
pub mod table;
pub mod traits;

pub use memory::{MemoryStore, StoreStats};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;
pub use table::{Destination, MetaTable, TableConfig};
pub use traits::MetaStore;
