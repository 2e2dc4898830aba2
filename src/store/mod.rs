pub mod cache;
pub mod memory_cache;
pub mod records;

pub use cache::SessionCache;
pub use memory_cache::InMemoryCache;
pub use records::{AuditRecord, DiscountType, Promotion, RecordStore, SqliteRecords};
