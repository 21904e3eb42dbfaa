//! Step cache: persistent memoization of pipeline stages
//!
//! - `CacheStep`: the ordered pipeline stages
//! - `CacheSettings`: the per-run cache policy
//! - `StepCache`: get/set/delete over the SQLite-backed store
//! - `CacheRun` / `CachedStage`: a policy-bound run and its wrapped stages

mod fingerprint;
mod settings;
mod step;
mod step_cache;

pub use fingerprint::fingerprint;
pub use settings::CacheSettings;
pub use step::CacheStep;
pub use step_cache::{CacheKey, CacheRun, CachedStage, StepCache};
