pub mod key;
pub mod lookup;
pub mod relation_cache;
pub mod transaction;

pub use key::RelationCacheKey;
pub use lookup::CachedLookup;
pub use relation_cache::{CacheStats, RelationCache};
pub use transaction::{in_transaction, Transaction};
