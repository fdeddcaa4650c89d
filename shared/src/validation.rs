//! Client-side validation applied before any network call.
//!
//! Phone validation is a strategy object so regions other than Morocco can be
//! plugged in without touching the session controller or the core.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::{AppError, ErrorKind, OTP_CODE_LENGTH};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Veuillez entrer un numéro de téléphone valide")]
    InvalidPhone,
    #[error("Veuillez entrer le code à {expected} chiffres")]
    InvalidOtpCode { expected: usize },
    #[error("Veuillez entrer votre nom")]
    MissingName,
    #[error("Veuillez entrer votre ville")]
    MissingCity,
    #[error("Veuillez remplir tous les champs obligatoires.")]
    MissingRequiredFields,
    #[error("Le texte dépasse {max} caractères")]
    TooLong { max: usize },
    #[error("invalid phone pattern: {0}")]
    InvalidPattern(String),
}

impl From<ValidationError> for AppError {
    fn from(e: ValidationError) -> Self {
        let kind = match e {
            ValidationError::InvalidPattern(_) => ErrorKind::Internal,
            _ => ErrorKind::Validation,
        };
        AppError::new(kind, e.to_string())
    }
}

/// A phone number that passed a [`PhoneValidator`], in national format.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PhoneNumber(String);

impl PhoneNumber {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for PhoneNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub trait PhoneValidator: Send + Sync {
    /// Validates `raw` and returns the normalized number the API expects.
    fn normalize(&self, raw: &str) -> Result<PhoneNumber, ValidationError>;

    fn is_valid(&self, raw: &str) -> bool {
        self.normalize(raw).is_ok()
    }
}

fn strip_separators(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace() && !matches!(c, '-' | '.' | '(' | ')'))
        .collect()
}

/// Moroccan mobile numbers: `06…`/`07…`/`05…` with ten digits, or the same
/// number behind `+212` / `00212`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MoroccanPhoneValidator;

impl MoroccanPhoneValidator {
    const COUNTRY_PREFIXES: [&'static str; 2] = ["+212", "00212"];
    const SUBSCRIBER_LEN: usize = 9;
}

impl PhoneValidator for MoroccanPhoneValidator {
    fn normalize(&self, raw: &str) -> Result<PhoneNumber, ValidationError> {
        let compact = strip_separators(raw);

        let subscriber = Self::COUNTRY_PREFIXES
            .iter()
            .find_map(|prefix| compact.strip_prefix(prefix))
            .or_else(|| compact.strip_prefix('0'))
            .ok_or(ValidationError::InvalidPhone)?;

        if subscriber.len() != Self::SUBSCRIBER_LEN
            || !subscriber.chars().all(|c| c.is_ascii_digit())
            || !matches!(subscriber.as_bytes()[0], b'5'..=b'7')
        {
            return Err(ValidationError::InvalidPhone);
        }

        Ok(PhoneNumber(format!("0{subscriber}")))
    }
}

/// Regex-driven strategy for deployments configured with their own pattern.
/// The number is passed through with separators removed.
#[derive(Debug, Clone)]
pub struct PatternPhoneValidator {
    pattern: Regex,
}

impl PatternPhoneValidator {
    pub fn new(pattern: &str) -> Result<Self, ValidationError> {
        let anchored = format!("^(?:{pattern})$");
        let pattern =
            Regex::new(&anchored).map_err(|e| ValidationError::InvalidPattern(e.to_string()))?;
        Ok(Self { pattern })
    }
}

impl PhoneValidator for PatternPhoneValidator {
    fn normalize(&self, raw: &str) -> Result<PhoneNumber, ValidationError> {
        let compact = strip_separators(raw);
        if self.pattern.is_match(&compact) {
            Ok(PhoneNumber(compact))
        } else {
            Err(ValidationError::InvalidPhone)
        }
    }
}

pub fn validate_otp_code(code: &str) -> Result<String, ValidationError> {
    let code = code.trim();
    if code.len() == OTP_CODE_LENGTH && code.chars().all(|c| c.is_ascii_digit()) {
        Ok(code.to_string())
    } else {
        Err(ValidationError::InvalidOtpCode {
            expected: OTP_CODE_LENGTH,
        })
    }
}

pub fn require_name(name: &str) -> Result<String, ValidationError> {
    non_empty(name).ok_or(ValidationError::MissingName)
}

pub fn require_city(city: &str) -> Result<String, ValidationError> {
    non_empty(city).ok_or(ValidationError::MissingCity)
}

pub fn bounded(text: &str, max: usize) -> Result<&str, ValidationError> {
    if text.chars().count() > max {
        Err(ValidationError::TooLong { max })
    } else {
        Ok(text)
    }
}

/// Trimmed copy of `value`, or `None` when nothing but whitespace remains.
pub fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
