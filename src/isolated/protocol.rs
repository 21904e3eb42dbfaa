use crate::errors::Error;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Request written by the parent to the child's stdin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IsolatedRequest {
    /// Name of the function to run in the child
    pub function: String,
    /// Explicit arguments; the child shares no other state with the parent
    #[serde(default)]
    pub args: Value,
}

/// Tagged outcome written by the child as the last line of its stdout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Envelope {
    /// The function returned a value
    Ok { value: Value },
    /// The function failed; `kind` names the failure type
    Error { kind: String, message: String },
}

impl Envelope {
    pub fn failure(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Envelope::Error {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// Converts the envelope into the parent-side result
    pub fn into_result(self) -> Result<Value, Error> {
        match self {
            Envelope::Ok { value } => Ok(value),
            Envelope::Error { kind, message } => Err(Error::StageFailed { kind, message }),
        }
    }

    /// Serializes the envelope as a single line
    pub fn to_line(&self) -> Result<String, Error> {
        Ok(serde_json::to_string(self)?)
    }

    /// Reads the envelope from the child's stdout
    ///
    /// Only the last non-empty line is considered, so stray output the
    /// function prints before the envelope is ignored.
    pub fn parse_output(stdout: &[u8]) -> Result<Envelope, Error> {
        let text = String::from_utf8_lossy(stdout);
        let line = text
            .lines()
            .map(str::trim)
            .rev()
            .find(|l| !l.is_empty())
            .ok_or_else(|| Error::ProtocolError("child produced no output".to_string()))?;

        serde_json::from_str(line)
            .map_err(|e| Error::ProtocolError(format!("malformed envelope '{}': {}", line, e)))
    }
}
