use crate::errors::Error;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One row of compensation data for a company
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SalaryRow {
    #[serde(default)]
    pub total_comp: Option<f64>,
    #[serde(default)]
    pub salary: Option<f64>,
    #[serde(default)]
    pub equity: Option<f64>,
    #[serde(default)]
    pub bonus: Option<f64>,
}

/// A person at the company who might refer the candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    pub name: String,
    #[serde(default)]
    pub title: String,
}

/// Research findings about one company
///
/// The named fields are the ones the pipeline fills in; anything else the
/// research collaborator reports is kept in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompanyProfile {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level_equiv: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_comp: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rsu: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bonus: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maybe_referrals: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// External systems the research pipeline depends on
///
/// Every call may be slow or hang; implementations bound them.
#[async_trait]
pub trait ResearchBackend: Send + Sync {
    /// Researches the company described by `content` (a name or a recruiter message)
    async fn research_company(&self, content: &str, model: &str) -> Result<CompanyProfile, Error>;

    /// Job levels at `company` equivalent to the candidate's level
    async fn extract_levels(&self, company: &str) -> Result<Vec<String>, Error>;

    /// Compensation rows reported for `company`
    async fn salary_data(&self, company: &str) -> Result<Vec<SalaryRow>, Error>;

    /// Contacts found at `company`, best first
    async fn linkedin_contacts(&self, company: &str) -> Result<Vec<Contact>, Error>;

    /// Drafts a reply to a recruiter `message`
    async fn generate_reply(&self, message: &str) -> Result<String, Error>;
}
