use super::fingerprint::fingerprint;
use super::settings::CacheSettings;
use super::step::CacheStep;
use crate::db::{CacheRepository, Database};
use crate::errors::Error;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::sync::Mutex;
use tracing::{debug, info, warn};

/// Identity of a memoized stage invocation
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// Stage the invocation belongs to
    pub stage: CacheStep,
    /// Name of the memoized function
    pub function: String,
    /// Fingerprint of the call arguments
    pub fingerprint: String,
}

impl CacheKey {
    /// Builds the key of `function(args)` within `stage`
    pub fn new<A: Serialize + ?Sized>(
        stage: CacheStep,
        function: &str,
        args: &A,
    ) -> Result<Self, Error> {
        Ok(Self {
            stage,
            function: function.to_string(),
            fingerprint: fingerprint(args)?,
        })
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let short = self.fingerprint.get(..12).unwrap_or(&self.fingerprint);
        write!(f, "{}:{}:{}", self.stage, self.function, short)
    }
}

/// Persistent, stage-keyed memoization store
///
/// Entries live until explicitly deleted; nothing expires on time.
#[derive(Clone, Debug)]
pub struct StepCache {
    database: Database,
}

impl StepCache {
    /// Wraps an open database as a step cache
    pub fn new(database: Database) -> Self {
        Self { database }
    }

    /// Opens the cache file at `path`
    pub fn open(path: &str) -> Result<Self, Error> {
        Ok(Self::new(Database::new_cache(path)?))
    }

    /// Returns the cached value for `key`, or `None` on a miss
    pub fn get(&self, key: &CacheKey) -> Result<Option<Value>, Error> {
        let mut conn = self.database.get_conn()?;
        let raw = CacheRepository::new(&mut conn).get(
            key.stage.ordinal(),
            &key.function,
            &key.fingerprint,
        )?;
        Ok(raw.map(|raw| serde_json::from_str(&raw)).transpose()?)
    }

    /// Stores `value` under `key`, replacing any previous entry
    pub fn set(&self, key: &CacheKey, value: &Value) -> Result<(), Error> {
        let raw = serde_json::to_string(value)?;
        let mut conn = self.database.get_conn()?;
        CacheRepository::new(&mut conn).set(
            key.stage.ordinal(),
            &key.function,
            &key.fingerprint,
            &raw,
        )
    }

    /// Deletes the entry for `key`; returns whether one existed
    pub fn delete(&self, key: &CacheKey) -> Result<bool, Error> {
        let mut conn = self.database.get_conn()?;
        CacheRepository::new(&mut conn).delete(
            key.stage.ordinal(),
            &key.function,
            &key.fingerprint,
        )
    }

    /// Deletes every entry of `stage`
    pub fn clear_stage(&self, stage: CacheStep) -> Result<usize, Error> {
        let mut conn = self.database.get_conn()?;
        CacheRepository::new(&mut conn).delete_stage(stage.ordinal())
    }

    /// Deletes every entry
    pub fn clear_all(&self) -> Result<usize, Error> {
        let mut conn = self.database.get_conn()?;
        CacheRepository::new(&mut conn).clear()
    }

    /// Number of stored entries
    pub fn len(&self) -> Result<i64, Error> {
        let mut conn = self.database.get_conn()?;
        CacheRepository::new(&mut conn).count()
    }

    pub fn is_empty(&self) -> Result<bool, Error> {
        Ok(self.len()? == 0)
    }

    /// Starts one pipeline run under `settings`
    ///
    /// Applies `clear_all_cache` and `clear_cache` before returning, so no
    /// stage of the run can observe an entry the policy invalidates.
    pub fn begin_run(&self, settings: CacheSettings) -> Result<CacheRun, Error> {
        if settings.clear_all_cache {
            let removed = self.clear_all()?;
            info!("Cleared all cache ({} entries)", removed);
        } else {
            for stage in &settings.clear_cache {
                let removed = self.clear_stage(*stage)?;
                info!("Cleared cache for {} ({} entries)", stage, removed);
            }
        }

        Ok(CacheRun {
            cache: self.clone(),
            settings,
            cleared: Mutex::new(HashSet::new()),
        })
    }
}

/// Cache state scoped to a single pipeline run
#[derive(Debug)]
pub struct CacheRun {
    cache: StepCache,
    settings: CacheSettings,
    cleared: Mutex<HashSet<CacheKey>>,
}

impl CacheRun {
    /// Policy of this run
    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    /// Underlying cache
    pub fn cache(&self) -> &StepCache {
        &self.cache
    }

    /// Wraps the function named `function` as a memoized stage of this run
    ///
    /// Stages with irreversible side effects (sending mail, archiving a
    /// message) must not be wrapped: a hit skips the side effect.
    pub fn wrap_stage(&self, stage: CacheStep, function: &'static str) -> CachedStage<'_> {
        CachedStage {
            run: self,
            stage,
            function,
        }
    }

    /// Records `key` as invalidated in this run; true the first time only
    fn first_clear(&self, key: &CacheKey) -> bool {
        match self.cleared.lock() {
            Ok(mut cleared) => cleared.insert(key.clone()),
            Err(poisoned) => poisoned.into_inner().insert(key.clone()),
        }
    }
}

/// A function wrapped with the read-through/write-back cache of one stage
pub struct CachedStage<'a> {
    run: &'a CacheRun,
    stage: CacheStep,
    function: &'static str,
}

impl CachedStage<'_> {
    /// Calls the wrapped function, serving from the cache when allowed
    ///
    /// 1. If the policy invalidates this stage, the entry for these
    ///    arguments is deleted (once per run).
    /// 2. If the stage is cached, a hit is returned without calling `f`;
    ///    a miss calls `f` and stores its result.
    /// 3. Otherwise `f` is always called and the cache is left untouched.
    ///
    /// # Arguments
    /// * `args` - Call arguments; they form the cache key and are handed to `f`
    /// * `f` - The stage body
    ///
    /// # Errors
    /// Returns the error of `f`, or a cache storage error
    pub async fn call<A, T, F, Fut>(&self, args: A, f: F) -> Result<T, Error>
    where
        A: Serialize,
        T: Serialize + DeserializeOwned,
        F: FnOnce(A) -> Fut,
        Fut: Future<Output = Result<T, Error>>,
    {
        let settings = &self.run.settings;
        let use_cache = settings.should_cache_step(self.stage);
        let clear_cache = settings.should_clear_cache(self.stage);

        if !use_cache && !clear_cache {
            return f(args).await;
        }

        let key = CacheKey::new(self.stage, self.function, &args)?;
        let cache = &self.run.cache;

        if clear_cache && self.run.first_clear(&key) {
            cache.delete(&key)?;
        }

        if use_cache {
            if let Some(hit) = cache.get(&key)? {
                match serde_json::from_value::<T>(hit) {
                    Ok(value) => {
                        debug!("Cache hit for {}", key);
                        return Ok(value);
                    }
                    Err(e) => warn!("Ignoring unreadable cache entry {}: {}", key, e),
                }
            } else {
                debug!("Cache miss for {}", key);
            }
        }

        debug!("No cached result, running function for {}...", key);
        let result = f(args).await?;
        debug!("... Ran function for {}", key);

        if use_cache {
            cache.set(&key, &serde_json::to_value(&result)?)?;
        }
        Ok(result)
    }
}
