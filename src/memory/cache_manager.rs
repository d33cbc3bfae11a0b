use std::collections::HashMap;
use std::sync::Arc;
use parking_lot::RwLock;
use crate::core::config::Config;

/// Governs how many slots caches may hold in total.
///
/// A cache that keeps replacing entries asks for more room; the manager
/// answers with a new size or refuses.
pub trait CacheManager: Send + Sync {
    /// New capacity for `cache`, `None` if the request is refused
    fn request_memory(&self, cache: &str, current: usize) -> Option<usize>;

    /// Register a cache's starting size
    fn register(&self, cache: &str, size: usize);
}

/// Budget-bounded manager growing caches by a fixed factor
pub struct DefaultCacheManager {
    budget: usize,              // Total slots across all caches
    growth_factor: f64,
    sizes: Arc<RwLock<HashMap<String, usize>>>,
}

impl DefaultCacheManager {
    pub fn new(config: &Config) -> Self {
        DefaultCacheManager {
            budget: config.cache_memory_budget,
            growth_factor: config.cache_growth_factor.max(1.0),
            sizes: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn allocated(&self) -> usize {
        self.sizes.read().values().sum()
    }

    pub fn size_of(&self, cache: &str) -> Option<usize> {
        self.sizes.read().get(cache).copied()
    }
}

impl CacheManager for DefaultCacheManager {
    fn request_memory(&self, cache: &str, current: usize) -> Option<usize> {
        let mut sizes = self.sizes.write();
        let others: usize = sizes.iter()
            .filter(|(name, _)| name.as_str() != cache)
            .map(|(_, size)| *size)
            .sum();
        let available = self.budget.saturating_sub(others);
        let wanted = ((current as f64 * self.growth_factor).ceil() as usize).max(current + 1);
        let granted = wanted.min(available);
        if granted <= current {
            tracing::debug!(cache, current, available, "cache growth refused");
            return None;
        }
        sizes.insert(cache.to_string(), granted);
        tracing::debug!(cache, from = current, to = granted, "cache growth granted");
        Some(granted)
    }

    fn register(&self, cache: &str, size: usize) {
        self.sizes.write().insert(cache.to_string(), size);
    }
}
