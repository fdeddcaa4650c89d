// lib.rs - SALA courier client shared core

#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::too_many_lines)]

pub mod app;
pub mod capabilities;
pub mod config;
pub mod event;
pub mod forms;
pub mod host;
pub mod model;
pub mod navigation;
pub mod notifications;
pub mod reclamations;
pub mod session;
pub mod support;
pub mod theme;
pub mod validation;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

pub use app::{App, ViewModel, ViewState};
pub use capabilities::{Capabilities, Effect};
pub use crux_core::{render::Render, App as CruxApp};
pub use event::Event;
pub use model::Model;

pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
pub const SPLASH_DURATION_MS: u64 = 2500;
pub const OTP_CODE_LENGTH: usize = 6;
pub const OTP_RESEND_SECONDS: u32 = 59;
pub const ONBOARDING_SLIDE_COUNT: usize = 3;
pub const SALA_SERVICE_COUNT: usize = 5;
pub const SALA_SERVICE_RADIUS: f64 = 120.0;
pub const MAX_CHAT_MESSAGE_LENGTH: usize = 2000;
pub const MAX_TICKET_FIELD_LENGTH: usize = 4000;

pub const DEFAULT_API_ERROR_MESSAGE: &str = "Something went wrong";
pub const TIMEOUT_MESSAGE: &str = "Le serveur met trop de temps à répondre (Timeout)";
pub const UNREACHABLE_MESSAGE: &str =
    "Impossible de joindre le serveur. Vérifiez votre connexion internet.";
pub const SUPPORT_TICKET_SENT_MESSAGE: &str =
    "Votre demande a été envoyée avec succès. Notre équipe vous répondra dans les plus brefs délais.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorSeverity {
    Transient,
    Permanent,
    Fatal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    Network,
    Timeout,
    Rejected,
    Validation,
    Authorization,
    Storage,
    Serialization,
    InvalidState,
    Internal,
}

impl ErrorKind {
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Network => "NETWORK_ERROR",
            Self::Timeout => "TIMEOUT",
            Self::Rejected => "REJECTED",
            Self::Validation => "VALIDATION_ERROR",
            Self::Authorization => "UNAUTHORIZED",
            Self::Storage => "STORAGE_ERROR",
            Self::Serialization => "SERIALIZATION_ERROR",
            Self::InvalidState => "INVALID_STATE",
            Self::Internal => "INTERNAL_ERROR",
        }
    }

    #[must_use]
    pub const fn default_severity(self) -> ErrorSeverity {
        match self {
            Self::Network | Self::Timeout | Self::Storage => ErrorSeverity::Transient,
            Self::Serialization | Self::InvalidState | Self::Internal => ErrorSeverity::Fatal,
            Self::Rejected | Self::Validation | Self::Authorization => ErrorSeverity::Permanent,
        }
    }

    /// Whether the user may sensibly try the same action again.
    ///
    /// Nothing in the client retries on its own; this only drives the
    /// "try again" affordance in the alert.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::Network | Self::Timeout | Self::Storage)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppError {
    pub kind: ErrorKind,
    pub severity: ErrorSeverity,
    pub message: String,
    pub status: Option<u16>,
    pub data: Option<serde_json::Value>,
    pub internal_message: Option<String>,
    pub context: HashMap<String, String>,
}

impl AppError {
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity: kind.default_severity(),
            message: message.into(),
            status: None,
            data: None,
            internal_message: None,
            context: HashMap::new(),
        }
    }

    #[must_use]
    pub fn timeout() -> Self {
        Self::new(ErrorKind::Timeout, TIMEOUT_MESSAGE)
    }

    #[must_use]
    pub fn unreachable(internal: impl Into<String>) -> Self {
        Self::new(ErrorKind::Network, UNREACHABLE_MESSAGE).with_internal(internal)
    }

    #[must_use]
    pub fn unauthorized() -> Self {
        Self::new(
            ErrorKind::Authorization,
            "Votre session a expiré. Veuillez vous reconnecter.",
        )
    }

    /// An application-level rejection: the server answered and said no.
    #[must_use]
    pub fn rejected(message: impl Into<String>, status: u16) -> Self {
        Self::new(ErrorKind::Rejected, message).with_status(status)
    }

    #[must_use]
    pub fn with_internal(mut self, internal: impl Into<String>) -> Self {
        self.internal_message = Some(internal.into());
        self
    }

    #[must_use]
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    #[must_use]
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub const fn code(&self) -> &'static str {
        self.kind.code()
    }

    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        self.kind.is_retryable() && !matches!(self.severity, ErrorSeverity::Fatal)
    }

    #[must_use]
    pub fn user_facing_message(&self) -> String {
        match self.kind {
            ErrorKind::Network => UNREACHABLE_MESSAGE.into(),
            ErrorKind::Timeout => TIMEOUT_MESSAGE.into(),
            // Server messages and form errors are shown verbatim.
            ErrorKind::Rejected | ErrorKind::Validation | ErrorKind::Authorization => {
                self.message.clone()
            }
            ErrorKind::Storage => {
                "Impossible d'enregistrer les données sur l'appareil. Veuillez réessayer.".into()
            }
            ErrorKind::Serialization => {
                "Réponse inattendue du serveur. Contactez le support si le problème persiste."
                    .into()
            }
            ErrorKind::InvalidState | ErrorKind::Internal => {
                "Une erreur inattendue est survenue. Veuillez réessayer.".into()
            }
        }
    }

    /// Builds the `{message, status, data}` rejection for a non-2xx answer.
    #[must_use]
    pub fn from_http_status(status: u16, body: Option<&[u8]>) -> Self {
        let data = body.and_then(|b| serde_json::from_slice::<serde_json::Value>(b).ok());
        let message = data
            .as_ref()
            .and_then(|v| serde_json::from_value::<ApiErrorResponse>(v.clone()).ok())
            .and_then(|e| e.message)
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_API_ERROR_MESSAGE.to_string());

        let error = Self::rejected(message, status).with_context("http_status", status.to_string());
        match data {
            Some(data) => error.with_data(data),
            None => error,
        }
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code(), self.message)?;
        if let Some(status) = self.status {
            write!(f, " (status {status})")?;
        }
        if let Some(internal) = &self.internal_message {
            write!(f, " (internal: {internal})")?;
        }
        Ok(())
    }
}

impl std::error::Error for AppError {}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ApiErrorResponse {
    #[serde(default)]
    message: Option<String>,
}

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToastMessage {
    pub message: String,
    pub kind: ToastKind,
    pub created_at_ms: u64,
    pub duration_ms: u64,
}

impl ToastMessage {
    #[must_use]
    pub fn new(message: impl Into<String>, kind: ToastKind) -> Self {
        Self {
            message: message.into(),
            kind,
            created_at_ms: current_time_ms(),
            duration_ms: kind.default_duration_ms(),
        }
    }

    #[must_use]
    pub fn is_expired(&self, now_ms: u64) -> bool {
        now_ms.saturating_sub(self.created_at_ms) > self.duration_ms
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ToastKind {
    #[default]
    Info,
    Success,
    Warning,
    Error,
}

impl ToastKind {
    #[must_use]
    pub const fn default_duration_ms(self) -> u64 {
        match self {
            Self::Info => 3000,
            Self::Success => 2000,
            Self::Warning => 4000,
            Self::Error => 5000,
        }
    }
}

#[must_use]
pub fn current_time_ms() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0)
}

/// Keeps the last two digits of a phone number for log lines.
#[must_use]
pub fn mask_phone(phone: &str) -> String {
    let digits: Vec<char> = phone.chars().filter(char::is_ascii_digit).collect();
    if digits.len() <= 2 {
        return "**".to_string();
    }
    let tail: String = digits[digits.len() - 2..].iter().collect();
    format!("{}{tail}", "*".repeat(digits.len() - 2))
}
