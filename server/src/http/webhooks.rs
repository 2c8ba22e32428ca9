//! Inbound provider callbacks. Sits outside the session cookie entirely —
//! providers authenticate with a signature over the raw body, not a cookie.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;

use crate::context::AppState;
use crate::error::AppError;
use crate::payment::ProviderStatus;

#[derive(Deserialize)]
struct WebhookBody {
    provider_txn_id: String,
    status: WebhookStatus,
}

#[derive(Deserialize)]
#[serde(rename_all = "UPPERCASE")]
enum WebhookStatus {
    Pending,
    Completed,
    Failed,
}

impl From<WebhookStatus> for ProviderStatus {
    fn from(s: WebhookStatus) -> Self {
        match s {
            WebhookStatus::Pending => ProviderStatus::Pending,
            WebhookStatus::Completed => ProviderStatus::Completed,
            WebhookStatus::Failed => ProviderStatus::Failed,
        }
    }
}

pub async fn handle_webhook(
    State(state): State<Arc<AppState>>,
    Path(_provider): Path<String>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Result<Json<serde_json::Value>, AppError> {
    let signature = headers
        .get("X-Webhook-Signature")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    let parsed: WebhookBody = serde_json::from_slice(&body)?;
    let raw_payload: serde_json::Value = serde_json::from_slice(&body)?;

    state
        .orchestrator
        .handle_webhook(&body, &signature, &parsed.provider_txn_id, parsed.status.into(), raw_payload)
        .await?;

    Ok(Json(serde_json::json!({"ok": true})))
}
