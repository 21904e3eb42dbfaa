use super::task::{Task, TaskType};
use crate::errors::Error;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Pipeline entry point for one task type
///
/// The returned value becomes the task's `result`; an error becomes its
/// `error` message.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn handle(&self, task: &Task) -> Result<Value, Error>;
}

/// Registry of handlers (task type -> handler)
///
/// Built once at startup, then shared read-only with the processor.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn TaskHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Registers `handler` for `task_type`
    ///
    /// # Errors
    ///
    /// Returns `Error::DuplicateHandler` if the type already has a handler
    pub fn register(
        &mut self,
        task_type: TaskType,
        handler: Arc<dyn TaskHandler>,
    ) -> Result<(), Error> {
        let name = task_type.as_str().to_string();
        if self.handlers.contains_key(&name) {
            return Err(Error::DuplicateHandler(name));
        }
        self.handlers.insert(name, handler);
        Ok(())
    }

    pub fn get(&self, task_type: &TaskType) -> Option<&Arc<dyn TaskHandler>> {
        self.handlers.get(task_type.as_str())
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Runs the handler registered for the task's type
    ///
    /// # Errors
    ///
    /// Returns `Error::UnsupportedTaskType` when no handler is registered,
    /// otherwise the handler's own error
    pub async fn dispatch(&self, task: &Task) -> Result<Value, Error> {
        let handler = self
            .get(&task.task_type)
            .ok_or_else(|| Error::UnsupportedTaskType(task.task_type.to_string()))?;
        handler.handle(task).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::TaskStatus;
    use serde_json::json;

    struct EchoHandler;

    #[async_trait]
    impl TaskHandler for EchoHandler {
        async fn handle(&self, task: &Task) -> Result<Value, Error> {
            Ok(task.args.clone())
        }
    }

    fn task(task_type: TaskType) -> Task {
        let now = crate::db::timestamp();
        Task {
            id: "t-1".to_string(),
            task_type,
            args: json!({"company_name": "Acme"}),
            status: TaskStatus::Running,
            result: None,
            error: None,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn dispatches_to_registered_handler() {
        let mut registry = HandlerRegistry::new();
        registry
            .register(TaskType::CompanyResearch, Arc::new(EchoHandler))
            .unwrap();

        let value = registry
            .dispatch(&task(TaskType::CompanyResearch))
            .await
            .unwrap();
        assert_eq!(value, json!({"company_name": "Acme"}));
    }

    #[tokio::test]
    async fn unknown_type_is_unsupported() {
        let registry = HandlerRegistry::new();
        let err = registry
            .dispatch(&task(TaskType::Other("bogus".to_string())))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Unsupported task type: bogus");
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut registry = HandlerRegistry::new();
        registry
            .register(TaskType::GenerateReply, Arc::new(EchoHandler))
            .unwrap();
        assert!(matches!(
            registry.register(TaskType::GenerateReply, Arc::new(EchoHandler)),
            Err(Error::DuplicateHandler(_))
        ));
        assert_eq!(registry.len(), 1);
    }
}
