//! Cache
//!
//! The external key/value store every token index entry lives in.

pub mod service;

pub use service::{
    create_in_memory_cache_service, create_mock_cache_service, CacheService,
    InMemoryCacheService, MockCacheService, SetRecord,
};

