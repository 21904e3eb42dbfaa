use super::task_state::TaskStatus;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Kind of work a task asks for; selects the handler that runs it
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TaskType {
    /// Research a company and store the findings
    CompanyResearch,
    /// Draft a reply to the recruiter message stored for a company
    GenerateReply,
    /// Any type no built-in handler knows about
    Other(String),
}

impl TaskType {
    /// Resolves a stored or user-supplied name
    ///
    /// Accepts both `company_research` and `company-research` spellings;
    /// unknown names are kept verbatim as `Other`
    pub fn from_name(name: &str) -> Self {
        match name.replace('-', "_").as_str() {
            "company_research" => TaskType::CompanyResearch,
            "generate_reply" => TaskType::GenerateReply,
            _ => TaskType::Other(name.to_string()),
        }
    }

    /// Storage representation of the task type
    pub fn as_str(&self) -> &str {
        match self {
            TaskType::CompanyResearch => "company_research",
            TaskType::GenerateReply => "generate_reply",
            TaskType::Other(name) => name,
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(TaskType::from_name(s))
    }
}

impl Serialize for TaskType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for TaskType {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(TaskType::from_name(&raw))
    }
}

/// A durable unit of pipeline work and its outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier assigned at creation
    pub id: String,
    /// Kind of work, selects the handler
    #[serde(rename = "type")]
    pub task_type: TaskType,
    /// Opaque handler arguments
    pub args: Value,
    /// Current lifecycle status
    pub status: TaskStatus,
    /// Handler result, set only once `Completed`
    pub result: Option<Value>,
    /// Failure description, set only once `Failed`
    pub error: Option<String>,
    /// RFC 3339 creation timestamp
    pub created_at: String,
    /// RFC 3339 timestamp of the last status transition
    pub updated_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_types_parse_with_either_separator() {
        assert_eq!(
            "company-research".parse::<TaskType>().unwrap(),
            TaskType::CompanyResearch
        );
        assert_eq!(
            "generate_reply".parse::<TaskType>().unwrap(),
            TaskType::GenerateReply
        );
    }

    #[test]
    fn unknown_types_round_trip_verbatim() {
        let parsed: TaskType = "bogus".parse().unwrap();
        assert_eq!(parsed, TaskType::Other("bogus".to_string()));
        assert_eq!(parsed.to_string(), "bogus");

        let json = serde_json::to_string(&parsed).unwrap();
        assert_eq!(json, "\"bogus\"");
    }
}
