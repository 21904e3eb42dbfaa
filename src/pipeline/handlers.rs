use super::research::Pipeline;
use crate::core::{HandlerRegistry, Task, TaskHandler, TaskType};
use crate::db::{Company, CompanyRepository, Database};
use crate::errors::Error;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

/// Arguments shared by the company task types
#[derive(Debug, Deserialize)]
struct CompanyArgs {
    company_name: String,
}

impl CompanyArgs {
    fn parse(task: &Task) -> Result<Self, Error> {
        serde_json::from_value(task.args.clone()).map_err(|e| {
            Error::HandlerFailed(format!("invalid arguments for {}: {}", task.task_type, e))
        })
    }
}

/// Researches a company and stores the findings
///
/// The recruiter message already stored for the company, if any, is what
/// gets researched; otherwise the bare name is. The previous record is
/// replaced.
pub struct CompanyResearchHandler {
    database: Database,
    pipeline: Arc<Pipeline>,
}

impl CompanyResearchHandler {
    pub fn new(database: Database, pipeline: Arc<Pipeline>) -> Self {
        Self { database, pipeline }
    }
}

#[async_trait]
impl TaskHandler for CompanyResearchHandler {
    async fn handle(&self, task: &Task) -> Result<Value, Error> {
        let args = CompanyArgs::parse(task)?;
        let company_name = args.company_name;

        let existing = {
            let mut conn = self.database.get_conn()?;
            CompanyRepository::new(&mut conn).get(&company_name)?
        };
        let initial_message = existing.as_ref().and_then(|c| c.initial_message.clone());
        let content = match &initial_message {
            Some(message) => {
                let preview: String = message.chars().take(400).collect();
                info!("Using existing initial message: {}", preview);
                message.clone()
            }
            None => company_name.clone(),
        };

        let run = self.pipeline.begin_run()?;
        let profile = self.pipeline.research_company(&run, &content).await?;
        let details = serde_json::to_value(&profile)?;

        let mut conn = self.database.get_conn()?;
        let mut repo = CompanyRepository::new(&mut conn);
        if existing.is_some() {
            info!("Company {} already exists, replacing it", company_name);
            repo.delete(&company_name)?;
        }
        info!("Creating company {}", company_name);
        repo.create(&Company::new(&company_name, details.clone(), initial_message))?;

        Ok(json!({"name": company_name, "details": details}))
    }
}

/// Drafts a reply to the recruiter message stored for a company
pub struct GenerateReplyHandler {
    database: Database,
    pipeline: Arc<Pipeline>,
}

impl GenerateReplyHandler {
    pub fn new(database: Database, pipeline: Arc<Pipeline>) -> Self {
        Self { database, pipeline }
    }
}

#[async_trait]
impl TaskHandler for GenerateReplyHandler {
    async fn handle(&self, task: &Task) -> Result<Value, Error> {
        let args = CompanyArgs::parse(task)?;

        let mut company = {
            let mut conn = self.database.get_conn()?;
            CompanyRepository::new(&mut conn)
                .get(&args.company_name)?
                .ok_or_else(|| Error::CompanyNotFound(args.company_name.clone()))?
        };
        let message = company.initial_message.clone().ok_or_else(|| {
            Error::HandlerFailed(format!(
                "company {} has no recruiter message to reply to",
                company.name
            ))
        })?;

        info!("Generating reply for {}", company.name);
        let run = self.pipeline.begin_run()?;
        company.reply_message = self.pipeline.generate_reply(&run, &message).await?;

        let mut conn = self.database.get_conn()?;
        CompanyRepository::new(&mut conn).update(&company)?;
        info!("Updated reply for {}", company.name);

        Ok(json!({"name": company.name, "reply_message": company.reply_message}))
    }
}

/// Registers the company research and reply handlers
pub fn register_handlers(
    registry: &mut HandlerRegistry,
    database: Database,
    pipeline: Arc<Pipeline>,
) -> Result<(), Error> {
    registry.register(
        TaskType::CompanyResearch,
        Arc::new(CompanyResearchHandler::new(database.clone(), pipeline.clone())),
    )?;
    registry.register(
        TaskType::GenerateReply,
        Arc::new(GenerateReplyHandler::new(database, pipeline)),
    )?;
    Ok(())
}
