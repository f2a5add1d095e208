use axum::{
    body::Bytes,
    extract::{Path, State as AxumState},
    http::{HeaderMap, StatusCode},
};
use serde::Deserialize;
use tracing::{error, info, warn};

use crate::SharedState;
use crate::event::{ExecutionParams, PushEvent};
use crate::queue::HookTask;
use crate::signature::verify_signature;

/// Form carrier for the legacy webhook convention: the push notification
/// JSON arrives in a `payload` field of a form-encoded body.
#[derive(Debug, Deserialize)]
struct HookForm {
    payload: String,
}

pub async fn root() -> &'static str {
    "jekyll-hook"
}

/// Handles the webhook POST for `/hooks/jekyll/{branch}`.
///
/// Signature verification, extraction, and admission filtering run inline on
/// the request path; the response only acknowledges receipt (202) or rejects
/// a bad signature (403). Build and publish outcomes are reported
/// asynchronously through the notifier, never through this response.
pub async fn handle_hook(
    AxumState(state): AxumState<SharedState>,
    Path(branch): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    // Verify against the raw body, before any parsing.
    let signature = headers.get("X-Hub-Signature").and_then(|v| v.to_str().ok());
    if let Err(e) = verify_signature(&body, signature, state.config.configured_secret()) {
        warn!("rejecting request for '{}': {}", branch, e);
        return StatusCode::FORBIDDEN;
    }

    let form: HookForm = match serde_urlencoded::from_bytes(&body) {
        Ok(form) => form,
        Err(e) => {
            warn!("could not parse form body: {}", e);
            return StatusCode::ACCEPTED;
        }
    };
    let payload: serde_json::Value = match serde_json::from_str(&form.payload) {
        Ok(payload) => payload,
        Err(e) => {
            warn!("could not parse payload JSON: {}", e);
            return StatusCode::ACCEPTED;
        }
    };
    let event = match PushEvent::from_payload(payload) {
        Ok(event) => event,
        Err(e) => {
            warn!("dropping event: {}", e);
            return StatusCode::ACCEPTED;
        }
    };

    // Routine filtering, not failures: unauthorized accounts and pushes to
    // other branches are dropped without notification.
    if !state.config.is_authorized_account(&event.owner) {
        info!("'{}' is not an authorized account, skipping", event.owner);
        return StatusCode::ACCEPTED;
    }
    if !event.matches_branch(&branch) {
        info!(
            "ref '{}' does not name the '{}' branch, skipping",
            event.git_ref, branch
        );
        return StatusCode::ACCEPTED;
    }

    let params = ExecutionParams::derive(&event, &state.config);
    let task = HookTask::new(event, params);
    info!(
        "task {} - queued {}/{} on '{}'",
        task.id,
        task.event.owner,
        task.event.repo,
        task.event.branch()
    );

    match state.queue.enqueue(task) {
        Ok(()) => StatusCode::ACCEPTED,
        Err(e) => {
            error!("failed to enqueue task: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}
