use super::backend::{CompanyProfile, Contact, ResearchBackend, SalaryRow};
use crate::config::{ExternalCommand, PipelineConfig};
use crate::errors::Error;
use crate::isolated::IsolatedExecutor;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info};

/// Backend running every collaborator as an external command inside an
/// isolated child process
///
/// `research` and `reply` must be configured. When `levels`, `salary` or
/// `linkedin` are missing the stage proceeds with no data.
pub struct IsolatedBackend {
    executor: IsolatedExecutor,
    commands: PipelineConfig,
    timeout: Duration,
}

impl IsolatedBackend {
    pub fn new(executor: IsolatedExecutor, commands: PipelineConfig, timeout: Duration) -> Self {
        Self {
            executor,
            commands,
            timeout,
        }
    }

    /// Runs `command` through the child's `external_command` function
    ///
    /// Timeouts are reported under the collaborator's name rather than the
    /// generic child function's.
    async fn call<T: DeserializeOwned>(
        &self,
        collaborator: &str,
        command: &ExternalCommand,
        input: Value,
    ) -> Result<T, Error> {
        debug!("Calling {} collaborator ({})", collaborator, command.program);
        let args = json!({
            "program": command.program,
            "args": command.args,
            "input": input,
        });

        let value = self
            .executor
            .run("external_command", &args, self.timeout)
            .await
            .map_err(|e| match e {
                Error::Timeout { elapsed, .. } => Error::Timeout {
                    function: collaborator.to_string(),
                    elapsed,
                },
                other => other,
            })?;

        serde_json::from_value(value).map_err(|e| Error::StageFailed {
            kind: "InvalidOutput".to_string(),
            message: format!("{} returned an unexpected shape: {}", collaborator, e),
        })
    }

    fn required<'a>(
        collaborator: &str,
        command: &'a Option<ExternalCommand>,
    ) -> Result<&'a ExternalCommand, Error> {
        command.as_ref().ok_or_else(|| {
            Error::ConfigError(format!(
                "no command configured for pipeline.{}",
                collaborator
            ))
        })
    }
}

#[async_trait]
impl ResearchBackend for IsolatedBackend {
    async fn research_company(&self, content: &str, model: &str) -> Result<CompanyProfile, Error> {
        let command = Self::required("research", &self.commands.research)?;
        self.call(
            "research",
            command,
            json!({"url_or_message": content, "model": model, "is_url": false}),
        )
        .await
    }

    async fn extract_levels(&self, company: &str) -> Result<Vec<String>, Error> {
        match &self.commands.levels {
            Some(command) => {
                let levels: Option<Vec<String>> = self
                    .call("levels", command, json!({"company_name": company}))
                    .await?;
                Ok(levels.unwrap_or_default())
            }
            None => {
                info!("No levels collaborator configured, skipping job levels");
                Ok(Vec::new())
            }
        }
    }

    async fn salary_data(&self, company: &str) -> Result<Vec<SalaryRow>, Error> {
        match &self.commands.salary {
            Some(command) => {
                let rows: Option<Vec<SalaryRow>> = self
                    .call("salary", command, json!({"company_name": company}))
                    .await?;
                Ok(rows.unwrap_or_default())
            }
            None => {
                info!("No salary collaborator configured, skipping salary data");
                Ok(Vec::new())
            }
        }
    }

    async fn linkedin_contacts(&self, company: &str) -> Result<Vec<Contact>, Error> {
        match &self.commands.linkedin {
            Some(command) => {
                let contacts: Option<Vec<Contact>> = self
                    .call("linkedin", command, json!({"company_name": company}))
                    .await?;
                Ok(contacts.unwrap_or_default())
            }
            None => {
                info!("No linkedin collaborator configured, skipping referrals");
                Ok(Vec::new())
            }
        }
    }

    async fn generate_reply(&self, message: &str) -> Result<String, Error> {
        let command = Self::required("reply", &self.commands.reply)?;
        self.call("reply", command, json!({"message": message})).await
    }
}
