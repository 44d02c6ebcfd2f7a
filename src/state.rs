use std::sync::Arc;

use crate::clients::{JobRunner, TextCompleter, VcsProvider};
use crate::config::WorkflowConfig;
use crate::db::DbPool;
use crate::error::AppResult;
use crate::services::{EntitlementResolver, UsageStore};
use crate::workflows::WorkflowContext;

/// Shared handles for request handlers and spawned workflows
#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub webhook_secret: Option<String>,
    pub workflow: WorkflowConfig,
    pub vcs: Arc<dyn VcsProvider>,
    pub jobs: Arc<dyn JobRunner>,
    pub llm: Arc<dyn TextCompleter>,
    pub usage: Arc<dyn UsageStore>,
    pub entitlements: Arc<EntitlementResolver>,
}

impl AppState {
    /// Context for one delivery, authenticated as the event's installation
    pub async fn workflow_context(&self, installation_id: i64) -> AppResult<WorkflowContext> {
        Ok(WorkflowContext {
            vcs: self.vcs.for_installation(installation_id).await?,
            jobs: self.jobs.clone(),
            llm: self.llm.clone(),
            usage: self.usage.clone(),
            entitlements: self.entitlements.clone(),
            settings: self.workflow.clone(),
        })
    }
}
