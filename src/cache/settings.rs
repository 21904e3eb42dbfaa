use super::step::CacheStep;
use serde::{Deserialize, Serialize};

/// Per-run cache policy
///
/// `clear_all_cache` and `clear_cache` act before any stage runs;
/// `no_cache` and `cache_until` decide, per stage, whether the cache is read
/// and written during the run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheSettings {
    /// Bypass the cache entirely
    #[serde(default)]
    pub no_cache: bool,
    /// Stages whose entries are deleted before the run
    #[serde(default)]
    pub clear_cache: Vec<CacheStep>,
    /// Cache only stages at or before this one
    #[serde(default)]
    pub cache_until: Option<CacheStep>,
    /// Wipe the whole cache before the run
    #[serde(default)]
    pub clear_all_cache: bool,
}

impl CacheSettings {
    /// Whether `step` reads and writes the cache under this policy
    pub fn should_cache_step(&self, step: CacheStep) -> bool {
        if self.no_cache {
            return false;
        }
        match self.cache_until {
            None => true,
            Some(ceiling) => step <= ceiling,
        }
    }

    /// Whether entries of `step` are invalidated for this run
    pub fn should_clear_cache(&self, step: CacheStep) -> bool {
        self.clear_all_cache || self.clear_cache.contains(&step)
    }
}
