//! Local model cache with lazy TTL expiry and a JSON index.

pub mod index;
pub mod model_cache;

pub use index::{ModelIndex, ModelRecord};
pub use model_cache::{CacheStats, ModelCache};
