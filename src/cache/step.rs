use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Pipeline stages whose results may be memoized, in execution order
///
/// The derive order is the stage order used by `cache_until`.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
#[value(rename_all = "snake_case")]
pub enum CacheStep {
    GetMessages,
    RagContext,
    BasicResearch,
    FollowupResearch,
    Reply,
}

impl CacheStep {
    /// Every stage, in order
    pub const ALL: [CacheStep; 5] = [
        CacheStep::GetMessages,
        CacheStep::RagContext,
        CacheStep::BasicResearch,
        CacheStep::FollowupResearch,
        CacheStep::Reply,
    ];

    /// Persisted ordinal of the stage
    pub fn ordinal(&self) -> i32 {
        match self {
            CacheStep::GetMessages => 0,
            CacheStep::RagContext => 1,
            CacheStep::BasicResearch => 2,
            CacheStep::FollowupResearch => 3,
            CacheStep::Reply => 4,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CacheStep::GetMessages => "get_messages",
            CacheStep::RagContext => "rag_context",
            CacheStep::BasicResearch => "basic_research",
            CacheStep::FollowupResearch => "followup_research",
            CacheStep::Reply => "reply",
        }
    }
}

impl fmt::Display for CacheStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CacheStep {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        CacheStep::ALL
            .into_iter()
            .find(|step| step.as_str() == normalized)
            .ok_or_else(|| format!("unknown cache step '{}'", s))
    }
}
