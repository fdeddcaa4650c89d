//! Support tickets ("réclamations"): topic picker, ticket form, ticket list and chat.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::event::ReclamationId;
use crate::validation::{bounded, non_empty, ValidationError};
use crate::{AppError, ErrorKind, MAX_CHAT_MESSAGE_LENGTH, MAX_TICKET_FIELD_LENGTH};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SupportError {
    #[error("a request is already in flight")]
    Busy,

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("cannot {action} from the {view} view")]
    InvalidView {
        view: &'static str,
        action: &'static str,
    },

    #[error("unknown reclamation {0}")]
    UnknownReclamation(ReclamationId),

    #[error("nothing to send")]
    NothingToSend,
}

impl From<SupportError> for AppError {
    fn from(e: SupportError) -> Self {
        match e {
            SupportError::Validation(v) => v.into(),
            SupportError::Transition(t) => t.into(),
            other => AppError::new(ErrorKind::InvalidState, "Action impossible pour le moment")
                .with_internal(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("reclamation is {0:?} and accepts no further messages")]
    Terminal(ReclamationStatus),

    #[error("cannot move a reclamation from {from:?} to {to:?}")]
    Regression {
        from: ReclamationStatus,
        to: ReclamationStatus,
    },
}

impl From<TransitionError> for AppError {
    fn from(e: TransitionError) -> Self {
        AppError::new(ErrorKind::InvalidState, "Cette réclamation est clôturée")
            .with_internal(e.to_string())
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SupportTopic {
    /// Order complaint; the only topic that does not need a subject.
    #[serde(rename = "Réclamation", alias = "Réclamations")]
    Reclamation,
    Question,
    #[serde(rename = "Autres")]
    Other,
}

impl SupportTopic {
    pub const ALL: [SupportTopic; 3] = [
        SupportTopic::Reclamation,
        SupportTopic::Question,
        SupportTopic::Other,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            Self::Reclamation => "Réclamation",
            Self::Question => "Question",
            Self::Other => "Autres",
        }
    }

    pub const fn requires_subject(self) -> bool {
        !matches!(self, Self::Reclamation)
    }

    pub const fn accepts_order_id(self) -> bool {
        matches!(self, Self::Reclamation)
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum ReclamationStatus {
    #[default]
    Open,
    #[serde(alias = "In Progress", alias = "in_progress")]
    InProgress,
    Resolved,
    Closed,
    #[serde(other)]
    Unknown,
}

impl ReclamationStatus {
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Resolved | Self::Closed)
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Open | Self::Unknown => "Ouverte",
            Self::InProgress => "En cours",
            Self::Resolved => "Résolue",
            Self::Closed => "Fermée",
        }
    }

    /// Terminal statuses never reopen; everything else may move freely.
    pub fn transition(self, to: ReclamationStatus) -> Result<ReclamationStatus, TransitionError> {
        if self.is_terminal() && !to.is_terminal() {
            return Err(TransitionError::Regression { from: self, to });
        }
        Ok(to)
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    #[serde(alias = "client")]
    User,
    #[serde(alias = "admin")]
    Support,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub sender: Sender,
    pub text: String,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Reclamation {
    #[serde(alias = "_id")]
    pub id: ReclamationId,
    pub category: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub status: ReclamationStatus,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
}

impl Reclamation {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn append(&mut self, message: ChatMessage) -> Result<(), TransitionError> {
        if self.is_terminal() {
            return Err(TransitionError::Terminal(self.status));
        }
        self.messages.push(message);
        Ok(())
    }

    /// Takes the server's copy, refusing one that would reopen a closed ticket.
    pub fn replace_with(&mut self, newer: Reclamation) -> Result<(), TransitionError> {
        self.status.transition(newer.status)?;
        *self = newer;
        Ok(())
    }
}

/// Body of `POST /client/support/reclamations`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NewReclamation {
    pub category: String,
    pub subject: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default)]
pub struct TicketForm {
    pub subject: String,
    pub message: String,
    pub order_id: String,
}

impl TicketForm {
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn validate(&self, topic: SupportTopic) -> Result<NewReclamation, ValidationError> {
        let message = non_empty(&self.message).ok_or(ValidationError::MissingRequiredFields)?;
        let subject = match non_empty(&self.subject) {
            Some(subject) => subject,
            None if topic.requires_subject() => {
                return Err(ValidationError::MissingRequiredFields)
            }
            None => String::new(),
        };
        bounded(&message, MAX_TICKET_FIELD_LENGTH)?;
        bounded(&subject, MAX_TICKET_FIELD_LENGTH)?;

        Ok(NewReclamation {
            category: topic.label().to_string(),
            subject,
            message,
            order_id: non_empty(&self.order_id).filter(|_| topic.accepts_order_id()),
        })
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default)]
#[serde(tag = "view", rename_all = "snake_case")]
pub enum SupportView {
    #[default]
    Main,
    Topics,
    Form {
        topic: SupportTopic,
    },
    Reclamations,
    Chat {
        reclamation_id: ReclamationId,
    },
}

impl SupportView {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Main => "main",
            Self::Topics => "topics",
            Self::Form { .. } => "form",
            Self::Reclamations => "reclamations",
            Self::Chat { .. } => "chat",
        }
    }
}

/// State of the support overlay.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default)]
pub struct SupportNavigator {
    view: SupportView,
    form: TicketForm,
    submitting: bool,
    reclamations: Vec<Reclamation>,
    loading: bool,
    draft: String,
    sending: bool,
}

impl SupportNavigator {
    pub fn view(&self) -> &SupportView {
        &self.view
    }

    pub fn form(&self) -> &TicketForm {
        &self.form
    }

    pub fn form_mut(&mut self) -> &mut TicketForm {
        &mut self.form
    }

    pub fn is_submitting(&self) -> bool {
        self.submitting
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn is_sending(&self) -> bool {
        self.sending
    }

    pub fn reclamations(&self) -> &[Reclamation] {
        &self.reclamations
    }

    pub fn draft(&self) -> &str {
        &self.draft
    }

    pub fn set_draft(&mut self, value: String) {
        self.draft = value;
    }

    fn invalid(&self, action: &'static str) -> SupportError {
        SupportError::InvalidView {
            view: self.view.name(),
            action,
        }
    }

    pub fn open_topics(&mut self) -> Result<(), SupportError> {
        if self.view != SupportView::Main {
            return Err(self.invalid("open topics"));
        }
        self.view = SupportView::Topics;
        Ok(())
    }

    /// Enters the form with every field cleared.
    pub fn select_topic(&mut self, topic: SupportTopic) -> Result<(), SupportError> {
        if self.view != SupportView::Topics {
            return Err(self.invalid("select a topic"));
        }
        self.form.clear();
        self.view = SupportView::Form { topic };
        Ok(())
    }

    pub fn topic(&self) -> Option<SupportTopic> {
        match self.view {
            SupportView::Form { topic } => Some(topic),
            _ => None,
        }
    }

    /// Validates the form and raises `submitting`. The returned ticket is what
    /// must be sent; nothing is sent when this fails.
    pub fn begin_submit(&mut self) -> Result<NewReclamation, SupportError> {
        let topic = self.topic().ok_or_else(|| self.invalid("submit"))?;
        if self.submitting {
            return Err(SupportError::Busy);
        }
        let ticket = self.form.validate(topic)?;
        self.submitting = true;
        Ok(ticket)
    }

    /// Moves to the list. Returns `true` when the server did not echo the new
    /// ticket and the list has to be fetched.
    pub fn submit_succeeded(&mut self, created: Option<Reclamation>) -> bool {
        self.submitting = false;
        self.form.clear();
        self.view = SupportView::Reclamations;
        match created {
            Some(reclamation) => {
                self.reclamations.retain(|r| r.id != reclamation.id);
                self.reclamations.insert(0, reclamation);
                false
            }
            None => {
                self.loading = true;
                true
            }
        }
    }

    /// Fields stay as typed so the user can correct and resubmit.
    pub fn submit_failed(&mut self) {
        self.submitting = false;
    }

    pub fn open_reclamations(&mut self) -> Result<(), SupportError> {
        if !matches!(self.view, SupportView::Main | SupportView::Reclamations) {
            return Err(self.invalid("open reclamations"));
        }
        self.view = SupportView::Reclamations;
        self.loading = true;
        Ok(())
    }

    pub fn reclamations_loaded(&mut self, reclamations: Vec<Reclamation>) {
        self.loading = false;
        self.reclamations = reclamations;
    }

    pub fn reclamations_failed(&mut self) {
        self.loading = false;
    }

    pub fn open_chat(&mut self, id: &ReclamationId) -> Result<(), SupportError> {
        if self.view != SupportView::Reclamations {
            return Err(self.invalid("open a chat"));
        }
        if !self.reclamations.iter().any(|r| &r.id == id) {
            return Err(SupportError::UnknownReclamation(id.clone()));
        }
        self.draft.clear();
        self.view = SupportView::Chat {
            reclamation_id: id.clone(),
        };
        Ok(())
    }

    pub fn selected(&self) -> Option<&Reclamation> {
        match &self.view {
            SupportView::Chat { reclamation_id } => {
                self.reclamations.iter().find(|r| &r.id == reclamation_id)
            }
            _ => None,
        }
    }

    /// Hidden for resolved and closed tickets.
    pub fn composer_visible(&self) -> bool {
        self.selected().is_some_and(|r| !r.is_terminal())
    }

    pub fn can_send(&self) -> bool {
        self.composer_visible() && !self.sending && !self.draft.trim().is_empty()
    }

    /// Empty drafts and terminal tickets send nothing; an overlong draft is a
    /// validation error the user has to see.
    pub fn begin_send(&mut self) -> Result<(ReclamationId, String), SupportError> {
        let id = self
            .selected()
            .map(|r| r.id.clone())
            .ok_or_else(|| self.invalid("send a message"))?;
        if self.sending {
            return Err(SupportError::Busy);
        }
        if !self.can_send() {
            return Err(SupportError::NothingToSend);
        }
        let text = self.draft.trim().to_string();
        bounded(&text, MAX_CHAT_MESSAGE_LENGTH)?;
        self.sending = true;
        Ok((id, text))
    }

    /// Applies the reply to the ticket the message was sent to, whichever chat
    /// is open now: the server copy when there is one, else `text` appended.
    pub fn send_succeeded(
        &mut self,
        id: &ReclamationId,
        text: String,
        updated: Option<Reclamation>,
    ) -> Result<(), SupportError> {
        self.sending = false;
        if self.selected().is_some_and(|r| &r.id == id) {
            self.draft.clear();
        }
        let target = self
            .reclamations
            .iter_mut()
            .find(|r| &r.id == id)
            .ok_or_else(|| SupportError::UnknownReclamation(id.clone()))?;
        match updated {
            Some(newer) if &newer.id == id => Ok(target.replace_with(newer)?),
            Some(other) => Err(SupportError::UnknownReclamation(other.id)),
            None => Ok(target.append(ChatMessage {
                sender: Sender::User,
                text,
                created_at: Utc::now(),
            })?),
        }
    }

    pub fn send_failed(&mut self) {
        self.sending = false;
    }

    /// Pops exactly one level. Returns `false` from `main`, where the
    /// overlay itself closes.
    pub fn back(&mut self) -> bool {
        self.view = match &self.view {
            SupportView::Main => return false,
            SupportView::Topics | SupportView::Reclamations => SupportView::Main,
            SupportView::Form { .. } => SupportView::Topics,
            SupportView::Chat { .. } => {
                self.draft.clear();
                SupportView::Reclamations
            }
        };
        true
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
