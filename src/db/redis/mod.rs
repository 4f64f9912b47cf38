pub mod cache;

pub use self::cache::{create_redis_client, Cache, CacheKey, CacheWriterHandle};
