use async_stream::stream;
use axum::Json;
use axum::body::Bytes;
use axum::extract::{Extension, Path, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

use deckport_api_types::{ExportAccepted, ExportJobView};

use crate::application::exports::{ExportError, parse_format};
use crate::infra::http::middleware::WorkspaceId;

use super::error::ApiError;
use super::state::ApiState;

const BODY_HINT: &str = "must be a JSON object";

pub async fn submit_export(
    State(state): State<ApiState>,
    Extension(WorkspaceId(workspace_id)): Extension<WorkspaceId>,
    Path(deck_id): Path<String>,
    body: Bytes,
) -> Result<Json<ExportAccepted>, ApiError> {
    let format = requested_format(&body)?;
    let Some(deck_id) = parse_id(&deck_id) else {
        // No deck has this id, but a bad format still takes precedence.
        parse_format(format.as_deref())?;
        return Err(ExportError::DeckNotFound.into());
    };

    let accepted = state
        .exports
        .submit_export(deck_id, workspace_id, format.as_deref())
        .await?;

    Ok(Json(accepted))
}

pub async fn get_export(
    State(state): State<ApiState>,
    Extension(WorkspaceId(workspace_id)): Extension<WorkspaceId>,
    Path(id): Path<String>,
) -> Result<Json<ExportJobView>, ApiError> {
    let id = parse_id(&id).ok_or(ExportError::JobNotFound)?;
    let view = state.exports.load_job(id, workspace_id).await?;
    Ok(Json(view))
}

/// Streams one `status` event per observed change and closes after a
/// terminal status.
pub async fn stream_export_events(
    State(state): State<ApiState>,
    Extension(WorkspaceId(workspace_id)): Extension<WorkspaceId>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let id = parse_id(&id).ok_or(ExportError::JobNotFound)?;
    let first = state.exports.load_job(id, workspace_id).await?;

    let exports = state.exports.clone();
    let poll_interval = state.status_poll_interval;

    let events = stream! {
        let mut last = first.status;
        yield status_event(&first);

        if !last.is_terminal() {
            let mut ticker = tokio::time::interval(poll_interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match exports.load_job(id, workspace_id).await {
                    Ok(view) if view.status != last => {
                        last = view.status;
                        yield status_event(&view);
                        if last.is_terminal() {
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(err) => {
                        warn!(
                            target = "infra::http::api::stream_export_events",
                            export_job_id = %id,
                            error = %err,
                            "status stream stopped"
                        );
                        yield Ok(Event::default().event("error").data("status unavailable"));
                        break;
                    }
                }
            }
        }
    };

    Ok(Sse::new(events)
        .keep_alive(KeepAlive::default())
        .into_response())
}

pub async fn download_export(
    State(state): State<ApiState>,
    Extension(WorkspaceId(workspace_id)): Extension<WorkspaceId>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let id = parse_id(&id).ok_or(ExportError::JobNotFound)?;
    let download = state.exports.load_artifact(id, workspace_id).await?;

    let disposition = format!("attachment; filename=\"{}\"", download.filename);
    Ok((
        [
            (CONTENT_TYPE, download.content_type.to_string()),
            (CONTENT_DISPOSITION, disposition),
        ],
        download.bytes,
    )
        .into_response())
}

fn status_event(view: &ExportJobView) -> Result<Event, axum::Error> {
    Event::default().event("status").json_data(view)
}

/// A path segment that is not a UUID cannot name a stored record.
fn parse_id(raw: &str) -> Option<Uuid> {
    Uuid::parse_str(raw).ok()
}

/// Pulls `format` out of the body without judging it; a non-string value
/// counts as missing so the service reports it like any bad format.
fn requested_format(body: &[u8]) -> Result<Option<String>, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }

    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(fields)) => Ok(fields
            .get("format")
            .and_then(Value::as_str)
            .map(str::to_string)),
        _ => Err(ApiError::validation("body", BODY_HINT)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_is_read_from_a_json_object() {
        assert_eq!(
            requested_format(br#"{"format":"pdf"}"#).unwrap().as_deref(),
            Some("pdf")
        );
        assert_eq!(requested_format(br#"{"format":7}"#).unwrap(), None);
        assert_eq!(requested_format(b"").unwrap(), None);
        assert!(requested_format(b"[1,2]").is_err());
        assert!(requested_format(b"{not json").is_err());
    }
}
