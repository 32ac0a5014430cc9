// Built-in action handlers

use async_trait::async_trait;
use std::time::Duration;
use tracing::{info, warn};

use super::{ActionHandler, ActionResult, ExecutionContext, StepAction};
use crate::error::{AppError, AppResult};

/// Calls an external HTTP endpoint for `webhook_call` steps
#[derive(Debug, Clone)]
pub struct WebhookHandler {
    client: reqwest::Client,
}

impl WebhookHandler {
    pub fn new(timeout: Duration) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::InternalError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl ActionHandler for WebhookHandler {
    async fn execute(&self, action: &StepAction, context: &ExecutionContext) -> ActionResult {
        let StepAction::WebhookCall(config) = action else {
            return ActionResult::failure(&format!("Webhook handler cannot run '{}' actions", action.kind()));
        };

        let method = match reqwest::Method::from_bytes(config.method.to_uppercase().as_bytes()) {
            Ok(m) => m,
            Err(_) => return ActionResult::failure(&format!("Unsupported HTTP method: {}", config.method)),
        };

        // Default body describes the triggering entity
        let payload = config.payload.clone().unwrap_or_else(|| {
            serde_json::json!({
                "execution_id": context.execution_id,
                "workflow_id": context.workflow_id,
                "entity_type": context.entity_type,
                "entity_id": context.entity_id,
                "entity": context.snapshot,
            })
        });

        let mut request = self.client.request(method.clone(), &config.url);
        for (key, value) in &config.headers {
            request = request.header(key, value);
        }
        if method != reqwest::Method::GET {
            request = request.json(&payload);
        }

        let response = match request.send().await {
            Ok(r) => r,
            Err(e) => {
                warn!("Webhook {} failed: {}", config.url, e);
                return ActionResult::failure(&format!("Webhook request failed: {}", e));
            }
        };

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if !status.is_success() {
            return ActionResult::failure(&format!("Webhook returned status {}", status.as_u16()));
        }

        info!("Webhook {} returned {}", config.url, status.as_u16());
        ActionResult::success(Some(serde_json::json!({
            "url": config.url,
            "status_code": status.as_u16(),
            "response_body": body
        })))
    }
}

/// Records actions in the log without side effects. Registered as the
/// fallback for action kinds no integration handles.
#[derive(Debug, Clone, Default)]
pub struct LogOnlyHandler;

#[async_trait]
impl ActionHandler for LogOnlyHandler {
    async fn execute(&self, action: &StepAction, context: &ExecutionContext) -> ActionResult {
        info!(
            "Dry-run {} action for {} {} (execution {})",
            action.kind(),
            context.entity_type,
            context.entity_id,
            context.execution_id
        );

        ActionResult::success(Some(serde_json::json!({
            "dry_run": true,
            "action": action,
        })))
    }
}
