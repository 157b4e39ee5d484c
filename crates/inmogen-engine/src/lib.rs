use std::env;

use inmogen_contracts::attachments::{
    Attachment, AttachmentError, AttachmentManager, PreviewHandle,
};
use inmogen_contracts::content::{GeneratedListing, ListingForm, PropertyRecord};
use inmogen_contracts::credentials::CredentialStore;
use inmogen_contracts::events::{EventPayload, EventWriter};
use inmogen_contracts::history::ListingHistory;
use reqwest::blocking::multipart::{Form as MultipartForm, Part as MultipartPart};
use reqwest::blocking::{Client as HttpClient, Response as HttpResponse};
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};
use thiserror::Error;

pub const DEFAULT_API_BASE: &str = "http://127.0.0.1:8000/api/v1";

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no stored credential; log in first")]
    MissingCredential,
    #[error("session expired; authorization was denied")]
    AuthorizationDenied,
    #[error("a submission is already in flight")]
    SubmissionInFlight,
    #[error("service returned {status}: {detail}")]
    Service { status: u16, detail: String },
    #[error("{context} returned an unexpected payload: {detail}")]
    UnexpectedPayload {
        context: &'static str,
        detail: String,
    },
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl SessionError {
    /// The sole signal that forces a logout; every other failure is
    /// transient from the session's point of view.
    pub fn is_authorization_denied(&self) -> bool {
        matches!(self, SessionError::AuthorizationDenied)
    }
}

/// Seam to the remote collaborators: the generation endpoint and the
/// per-user listing history endpoint. Both require a bearer token.
pub trait ListingService {
    fn generate(
        &self,
        token: &str,
        fields: &ListingForm,
        attachments: &[Attachment],
    ) -> Result<PropertyRecord, SessionError>;

    fn list_listings(&self, token: &str) -> Result<Vec<PropertyRecord>, SessionError>;
}

/// Blocking HTTP implementation of [`ListingService`], plus the
/// unauthenticated login/register calls.
pub struct HttpListingService {
    api_base: String,
    http: HttpClient,
}

impl HttpListingService {
    pub fn new() -> Self {
        Self::with_base(default_api_base())
    }

    pub fn with_base(api_base: impl Into<String>) -> Self {
        Self {
            api_base: api_base.into().trim_end_matches('/').to_string(),
            http: HttpClient::new(),
        }
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    /// Exchanges email + password for a bearer token. The auth endpoint
    /// expects form-encoded `username`/`password`, not JSON.
    pub fn login(&self, email: &str, password: &str) -> Result<String, SessionError> {
        let endpoint = format!("{}/auth/login", self.api_base);
        let response = self
            .http
            .post(&endpoint)
            .form(&[("username", email), ("password", password)])
            .send()?;
        let payload = response_json_or_error("login", response)?;
        payload
            .get("access_token")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
            .ok_or_else(|| SessionError::UnexpectedPayload {
                context: "login",
                detail: "response missing access_token".to_string(),
            })
    }

    pub fn register(
        &self,
        email: &str,
        password: &str,
        full_name: &str,
    ) -> Result<(), SessionError> {
        let endpoint = format!("{}/auth/register", self.api_base);
        let response = self
            .http
            .post(&endpoint)
            .json(&json!({
                "email": email,
                "password": password,
                "full_name": full_name,
            }))
            .send()?;
        response_json_or_error("register", response).map(|_| ())
    }
}

impl Default for HttpListingService {
    fn default() -> Self {
        Self::new()
    }
}

impl ListingService for HttpListingService {
    fn generate(
        &self,
        token: &str,
        fields: &ListingForm,
        attachments: &[Attachment],
    ) -> Result<PropertyRecord, SessionError> {
        let endpoint = format!("{}/properties/generate", self.api_base);
        let mut form = MultipartForm::new()
            .text("address", fields.address.clone())
            .text("features", fields.features.clone())
            .text("vibe", fields.vibe.clone());
        for attachment in attachments {
            let part = MultipartPart::bytes(attachment.bytes.clone())
                .file_name(attachment.file_name.clone())
                .mime_str(mime_for_image_bytes(&attachment.bytes))?;
            form = form.part("images", part);
        }

        let response = self
            .http
            .post(&endpoint)
            .bearer_auth(token)
            .multipart(form)
            .send()?;
        let payload = response_json_or_error("generate", response)?;
        serde_json::from_value(payload).map_err(|err| SessionError::UnexpectedPayload {
            context: "generate",
            detail: err.to_string(),
        })
    }

    fn list_listings(&self, token: &str) -> Result<Vec<PropertyRecord>, SessionError> {
        let endpoint = format!("{}/properties/", self.api_base);
        let response = self.http.get(&endpoint).bearer_auth(token).send()?;
        let payload = response_json_or_error("history", response)?;
        serde_json::from_value(payload).map_err(|err| SessionError::UnexpectedPayload {
            context: "history",
            detail: err.to_string(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Unauthenticated,
    Idle,
    Submitting,
}

/// What the caller should do after the session entry check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryOutcome {
    RedirectToLogin,
    Ready,
}

/// Orchestrates one generation session: credential guard, submission,
/// response normalization, history and selection state.
pub struct SessionController<S: ListingService> {
    service: S,
    credentials: CredentialStore,
    attachments: AttachmentManager,
    history: ListingHistory,
    events: EventWriter,
    form: ListingForm,
    selected_id: Option<i64>,
    phase: SessionPhase,
}

impl<S: ListingService> SessionController<S> {
    pub fn new(service: S, credentials: CredentialStore, events: EventWriter) -> Self {
        Self {
            service,
            credentials,
            attachments: AttachmentManager::new(),
            history: ListingHistory::new(),
            events,
            form: ListingForm::default(),
            selected_id: None,
            phase: SessionPhase::Unauthenticated,
        }
    }

    /// Session entry check. Without a stored credential the caller must
    /// redirect to login. With one, the prior history is fetched; a fetch
    /// failure surfaces as an empty history unless it is the 401 signal,
    /// which expires the session instead.
    pub fn start(&mut self) -> Result<EntryOutcome, SessionError> {
        let Some(token) = self.credentials.get() else {
            self.phase = SessionPhase::Unauthenticated;
            return Ok(EntryOutcome::RedirectToLogin);
        };
        self.events.emit("session_started", EventPayload::new())?;

        match self.service.list_listings(&token) {
            Ok(records) => {
                let listings: Vec<GeneratedListing> =
                    records.into_iter().map(GeneratedListing::from).collect();
                self.events.emit(
                    "history_loaded",
                    map_object(json!({ "count": listings.len() })),
                )?;
                self.history.replace_all(listings);
            }
            Err(err) if err.is_authorization_denied() => {
                self.expire_session()?;
                return Ok(EntryOutcome::RedirectToLogin);
            }
            Err(err) => {
                self.history.replace_all(Vec::new());
                self.events.emit(
                    "history_fetch_failed",
                    map_object(json!({ "error": err.to_string() })),
                )?;
            }
        }
        self.phase = SessionPhase::Idle;
        Ok(EntryOutcome::Ready)
    }

    /// Submits the current form and attachments to the generation
    /// service. Single-flight per controller. On success the normalized
    /// record is prepended to history and becomes the selected record.
    pub fn submit(&mut self) -> Result<GeneratedListing, SessionError> {
        if self.phase == SessionPhase::Submitting {
            return Err(SessionError::SubmissionInFlight);
        }
        let Some(token) = self.credentials.get() else {
            return Err(SessionError::MissingCredential);
        };

        self.phase = SessionPhase::Submitting;
        self.events.emit(
            "generation_submitted",
            submission_payload(&self.form, self.attachments.attachments()),
        )?;

        match self.service.generate(&token, &self.form, self.attachments.attachments()) {
            Ok(record) => {
                let listing = GeneratedListing::from(record);
                self.events.emit(
                    "generation_completed",
                    map_object(json!({ "id": listing.id })),
                )?;
                self.selected_id = Some(listing.id);
                self.history.prepend(listing.clone());
                self.phase = SessionPhase::Idle;
                Ok(listing)
            }
            Err(err) if err.is_authorization_denied() => {
                self.expire_session()?;
                Err(SessionError::AuthorizationDenied)
            }
            Err(err) => {
                self.phase = SessionPhase::Idle;
                self.events.emit(
                    "generation_failed",
                    map_object(json!({ "error": err.to_string() })),
                )?;
                Err(err)
            }
        }
    }

    /// Selects a previously generated record and loads its fields back
    /// into the form. Attachments are cleared; editing a historical
    /// record starts with no new images. Unknown ids are a no-op.
    pub fn load_existing(&mut self, id: i64) -> Result<bool, SessionError> {
        let fields = match self.history.find_by_id(id) {
            Some(record) => ListingForm {
                address: record.address.clone(),
                features: record.features.clone(),
                vibe: record.vibe.clone(),
            },
            None => return Ok(false),
        };
        self.form = fields;
        self.selected_id = Some(id);
        self.attachments.clear();
        self.events
            .emit("listing_selected", map_object(json!({ "id": id })))?;
        Ok(true)
    }

    /// Back to a blank session: form, selection and attachments cleared,
    /// every preview handle released. Valid in any authenticated phase.
    pub fn reset(&mut self) -> Result<(), SessionError> {
        self.form.clear();
        self.selected_id = None;
        self.attachments.clear();
        self.events.emit("session_reset", EventPayload::new())?;
        Ok(())
    }

    pub fn logout(&mut self) -> Result<(), SessionError> {
        self.credentials.clear()?;
        self.attachments.clear();
        self.phase = SessionPhase::Unauthenticated;
        self.events.emit("logged_out", EventPayload::new())?;
        Ok(())
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn history(&self) -> &ListingHistory {
        &self.history
    }

    pub fn selected_id(&self) -> Option<i64> {
        self.selected_id
    }

    pub fn selected(&self) -> Option<&GeneratedListing> {
        self.selected_id.and_then(|id| self.history.find_by_id(id))
    }

    pub fn form(&self) -> &ListingForm {
        &self.form
    }

    pub fn form_mut(&mut self) -> &mut ListingForm {
        &mut self.form
    }

    pub fn attachments(&self) -> &[Attachment] {
        self.attachments.attachments()
    }

    pub fn attach<I>(&mut self, files: I) -> Vec<PreviewHandle>
    where
        I: IntoIterator<Item = (String, Vec<u8>)>,
    {
        self.attachments.add(files)
    }

    pub fn remove_attachment(&mut self, index: usize) -> Result<(), AttachmentError> {
        self.attachments.remove_at(index)
    }

    fn expire_session(&mut self) -> Result<(), SessionError> {
        self.credentials.clear()?;
        self.phase = SessionPhase::Unauthenticated;
        self.events.emit("session_expired", EventPayload::new())?;
        Ok(())
    }
}

fn default_api_base() -> String {
    env::var("INMOGEN_API_BASE")
        .ok()
        .map(|value| value.trim().trim_end_matches('/').to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| DEFAULT_API_BASE.to_string())
}

/// Sniffs the MIME type from the file bytes themselves; extensions are
/// not trusted. Unknown formats fall back to a generic binary type.
pub fn mime_for_image_bytes(bytes: &[u8]) -> &'static str {
    image::guess_format(bytes)
        .map(|format| format.to_mime_type())
        .unwrap_or("application/octet-stream")
}

fn response_json_or_error(
    context: &'static str,
    response: HttpResponse,
) -> Result<Value, SessionError> {
    let status = response.status();
    if status.as_u16() == 401 {
        return Err(SessionError::AuthorizationDenied);
    }
    if !status.is_success() {
        let body = response.text().unwrap_or_default();
        return Err(SessionError::Service {
            status: status.as_u16(),
            detail: format!("{context}: {}", truncate_text(&body, 512)),
        });
    }
    response.json().map_err(SessionError::from)
}

fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}

fn map_object(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}

// Event payloads carry digests and sizes, never attachment bytes.
fn submission_payload(fields: &ListingForm, attachments: &[Attachment]) -> EventPayload {
    let images: Vec<Value> = attachments
        .iter()
        .map(|attachment| {
            json!({
                "file_name": attachment.file_name,
                "bytes": attachment.bytes.len(),
                "sha256": hex::encode(Sha256::digest(&attachment.bytes)),
            })
        })
        .collect();
    map_object(json!({
        "address": fields.address,
        "vibe": fields.vibe,
        "images": images,
    }))
}
