//! Remote side of the support flow: the requests behind ticket creation,
//! listing and chat replies, and readers for what the server sends back.

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, instrument};
use url::Url;

use crate::capabilities::{parse_envelope, ApiRequest, HttpError};
use crate::event::{AuthToken, ReclamationId};
use crate::support::{NewReclamation, Reclamation};
use crate::validation::{bounded, non_empty, ValidationError};
use crate::{AppResult, MAX_CHAT_MESSAGE_LENGTH};

pub const RECLAMATIONS_PATH: &str = "/client/support/reclamations";

#[derive(Deserialize)]
struct Created {
    #[serde(default)]
    reclamation: Option<Reclamation>,
}

#[derive(Deserialize)]
struct Listed {
    #[serde(default)]
    reclamations: Vec<Reclamation>,
}

#[instrument(skip(token, ticket), fields(category = %ticket.category))]
pub fn create_request(token: AuthToken, ticket: &NewReclamation) -> AppResult<ApiRequest> {
    Ok(ApiRequest::post(RECLAMATIONS_PATH, ticket)?.with_bearer(token))
}

pub fn list_request(token: AuthToken) -> AppResult<ApiRequest> {
    Ok(ApiRequest::get(RECLAMATIONS_PATH)?.with_bearer(token))
}

#[instrument(skip(token, text), fields(reclamation = %id))]
pub fn message_request(token: AuthToken, id: &ReclamationId, text: &str) -> AppResult<ApiRequest> {
    let text = non_empty(text).ok_or(ValidationError::MissingRequiredFields)?;
    bounded(&text, MAX_CHAT_MESSAGE_LENGTH)?;
    let path = message_path(id)?;
    Ok(ApiRequest::post(path, &json!({ "text": text }))?.with_bearer(token))
}

/// `{RECLAMATIONS_PATH}/{id}/messages`, with the id as one escaped segment.
fn message_path(id: &ReclamationId) -> Result<String, HttpError> {
    let raw = id.as_str();
    if raw.trim().is_empty() || raw == "." || raw == ".." {
        return Err(HttpError::InvalidRequest {
            reason: format!("unusable reclamation id {raw:?}"),
        });
    }

    // Only the path is kept; the host is a placeholder.
    let mut url = Url::parse("http://localhost").map_err(|e| HttpError::InvalidRequest {
        reason: e.to_string(),
    })?;
    url.set_path(RECLAMATIONS_PATH);
    url.path_segments_mut()
        .map_err(|()| HttpError::InvalidRequest {
            reason: "base URL cannot carry a path".to_string(),
        })?
        .push(raw)
        .push("messages");
    Ok(url.path().to_string())
}

/// The server may or may not echo the created ticket.
pub fn read_created(body: Value) -> AppResult<Option<Reclamation>> {
    let created: Created = parse_envelope(body)?;
    info!(echoed = created.reclamation.is_some(), "reclamation created");
    Ok(created.reclamation)
}

pub fn read_listed(body: Value) -> AppResult<Vec<Reclamation>> {
    let listed: Listed = parse_envelope(body)?;
    debug!(count = listed.reclamations.len(), "reclamations listed");
    Ok(listed.reclamations)
}

/// The updated ticket, when the server sends it back.
pub fn read_updated(body: Value) -> AppResult<Option<Reclamation>> {
    let updated: Created = parse_envelope(body)?;
    Ok(updated.reclamation)
}
