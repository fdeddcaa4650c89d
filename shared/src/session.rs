//! Session/auth controller: OTP login and registration, profile updates,
//! phone change and logout.
//!
//! The controller lives in the model. It builds the [`ApiRequest`]s and
//! [`KvOperation`]s the app sends out through its capabilities and folds their
//! replies back into the signed-in state. It never retries and never caches a
//! failed attempt. Every remote failure comes back as an [`AppError`] carrying
//! the server's `{message, status, data}`.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use crate::capabilities::{parse_envelope, ApiRequest, KvOperation, KvOutput, StoreKey};
use crate::event::{AuthToken, UserId};
use crate::mask_phone;
use crate::navigation::AuthMode;
use crate::validation::{
    require_city, require_name, validate_otp_code, MoroccanPhoneValidator, PhoneNumber,
    PhoneValidator,
};
use crate::{AppError, AppResult, ErrorKind, DEFAULT_API_ERROR_MESSAGE};

pub mod endpoints {
    pub const LOGIN: &str = "/client/auth/login";
    pub const REGISTER: &str = "/client/auth/register";
    pub const VERIFY: &str = "/client/auth/verify";
    pub const PROFILE: &str = "/client/auth/profile";
    pub const PHONE_CHANGE_REQUEST: &str = "/client/auth/phone-change/request";
    pub const PHONE_CHANGE_VERIFY: &str = "/client/auth/phone-change/verify";
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(default, alias = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<UserId>,
    pub phone_number: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
}

impl User {
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or(&self.phone_number)
    }

    /// A freshly registered account has neither name nor city yet.
    pub fn needs_profile(&self) -> bool {
        self.name.as_deref().map_or(true, |n| n.trim().is_empty())
            || self.city.as_deref().map_or(true, |c| c.trim().is_empty())
    }
}

/// The persisted pair. No token means signed out.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct Session {
    pub token: Option<AuthToken>,
    pub user: Option<User>,
}

impl Session {
    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }
}

/// A token issued by a verification, with the account it belongs to.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Grant {
    pub token: AuthToken,
    pub user: Option<User>,
}

#[derive(Deserialize)]
struct Ack {
    #[serde(default)]
    #[allow(dead_code)]
    message: Option<String>,
}

#[derive(Deserialize)]
struct TokenGrant {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    user: Option<User>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Deserialize)]
struct UserEnvelope {
    #[serde(default)]
    user: Option<User>,
}

#[derive(Clone)]
pub struct SessionController {
    token: Option<AuthToken>,
    user: Option<User>,
    remembered_identity: Option<String>,
    validator: Arc<dyn PhoneValidator>,
}

impl Default for SessionController {
    fn default() -> Self {
        Self {
            token: None,
            user: None,
            remembered_identity: None,
            validator: Arc::new(MoroccanPhoneValidator),
        }
    }
}

impl fmt::Debug for SessionController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionController")
            .field("token", &self.token)
            .field("user", &self.user)
            .field(
                "remembered_identity",
                &self.remembered_identity.as_deref().map(mask_phone),
            )
            .finish_non_exhaustive()
    }
}

impl SessionController {
    #[must_use]
    pub fn with_validator(mut self, validator: Arc<dyn PhoneValidator>) -> Self {
        self.validator = validator;
        self
    }

    pub fn set_validator(&mut self, validator: Arc<dyn PhoneValidator>) {
        self.validator = validator;
    }

    pub fn validator(&self) -> &dyn PhoneValidator {
        self.validator.as_ref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    pub fn token(&self) -> Option<&AuthToken> {
        self.token.as_ref()
    }

    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    pub fn remembered_identity(&self) -> Option<&str> {
        self.remembered_identity.as_deref()
    }

    pub fn session(&self) -> Session {
        Session {
            token: self.token.clone(),
            user: self.user.clone(),
        }
    }

    /// The stored bearer token, or an authorization error when signed out.
    pub fn bearer(&self) -> AppResult<AuthToken> {
        self.token.clone().ok_or_else(AppError::unauthorized)
    }

    fn normalize(&self, raw: &str) -> AppResult<PhoneNumber> {
        Ok(self.validator.normalize(raw)?)
    }

    // --- Requests ---

    /// Asks the server to text an OTP. No local state changes.
    #[instrument(skip(self, phone), fields(phone = %mask_phone(phone)))]
    pub fn otp_request(&self, phone: &str, mode: AuthMode) -> AppResult<(PhoneNumber, ApiRequest)> {
        let phone = self.normalize(phone)?;
        let path = match mode {
            AuthMode::Login => endpoints::LOGIN,
            AuthMode::Register => endpoints::REGISTER,
        };
        let request = ApiRequest::post(path, &json!({ "phoneNumber": phone.as_str() }))?;
        Ok((phone, request))
    }

    #[instrument(skip(self, phone, code), fields(phone = %mask_phone(phone)))]
    pub fn verify_request(&self, phone: &str, code: &str) -> AppResult<ApiRequest> {
        let phone = self.normalize(phone)?;
        let code = validate_otp_code(code)?;
        Ok(ApiRequest::post(
            endpoints::VERIFY,
            &json!({ "phoneNumber": phone.as_str(), "code": code }),
        )?)
    }

    #[instrument(skip(self, name, city))]
    pub fn profile_request(&self, name: &str, city: &str) -> AppResult<ApiRequest> {
        let token = self.bearer()?;
        let name = require_name(name)?;
        let city = require_city(city)?;
        Ok(ApiRequest::put(endpoints::PROFILE, &json!({ "name": name, "city": city }))?
            .with_bearer(token))
    }

    #[instrument(skip(self, new_phone), fields(phone = %mask_phone(new_phone)))]
    pub fn phone_change_request(&self, new_phone: &str) -> AppResult<(PhoneNumber, ApiRequest)> {
        let new_phone = self.normalize(new_phone)?;
        let token = self.bearer()?;
        let request = ApiRequest::post(
            endpoints::PHONE_CHANGE_REQUEST,
            &json!({ "newPhoneNumber": new_phone.as_str() }),
        )?
        .with_bearer(token);
        Ok((new_phone, request))
    }

    #[instrument(skip(self, new_phone, code), fields(phone = %mask_phone(new_phone)))]
    pub fn phone_change_verify_request(&self, new_phone: &str, code: &str) -> AppResult<ApiRequest> {
        let new_phone = self.normalize(new_phone)?;
        let code = validate_otp_code(code)?;
        let token = self.bearer()?;
        Ok(ApiRequest::post(
            endpoints::PHONE_CHANGE_VERIFY,
            &json!({ "newPhoneNumber": new_phone.as_str(), "code": code }),
        )?
        .with_bearer(token))
    }

    // --- Replies ---

    pub fn read_ack(body: Value) -> AppResult<()> {
        parse_envelope::<Ack>(body)?;
        Ok(())
    }

    /// A verification reply without a token is a rejection, whatever its status.
    pub fn read_grant(body: Value) -> AppResult<Grant> {
        let grant: TokenGrant = parse_envelope(body)?;
        let Some(token) = grant.token.filter(|t| !t.trim().is_empty()) else {
            let message = grant
                .message
                .unwrap_or_else(|| DEFAULT_API_ERROR_MESSAGE.to_string());
            return Err(AppError::rejected(message, 200).with_internal("no token in grant"));
        };
        if grant.user.is_none() {
            warn!("grant carried no user");
        }
        Ok(Grant {
            token: AuthToken::new(token),
            user: grant.user,
        })
    }

    pub fn read_user(body: Value) -> AppResult<Option<User>> {
        let envelope: UserEnvelope = parse_envelope(body)?;
        Ok(envelope.user)
    }

    // --- Device store ---

    pub fn restore_read() -> KvOperation {
        KvOperation::Read {
            keys: StoreKey::ALL.to_vec(),
        }
    }

    /// Token and user in one write, so a reader never sees half a session.
    pub fn grant_write(grant: &Grant) -> AppResult<KvOperation> {
        let mut entries = vec![(StoreKey::AuthToken, grant.token.expose().to_string())];
        if let Some(user) = &grant.user {
            entries.push((StoreKey::CachedUser, encode_user(user)?));
        }
        Ok(KvOperation::Write { entries })
    }

    pub fn user_write(user: &User) -> AppResult<KvOperation> {
        Ok(KvOperation::Write {
            entries: vec![(StoreKey::CachedUser, encode_user(user)?)],
        })
    }

    /// Clears token and user. Running it twice is harmless.
    pub fn clear_delete() -> KvOperation {
        KvOperation::Delete {
            keys: vec![StoreKey::AuthToken, StoreKey::CachedUser],
        }
    }

    /// Stores the plain number used to prefill the login form.
    pub fn remember_write(phone: &str) -> KvOperation {
        KvOperation::Write {
            entries: vec![(StoreKey::RememberedIdentity, phone.trim().to_string())],
        }
    }

    pub fn forget_delete() -> KvOperation {
        KvOperation::Delete {
            keys: vec![StoreKey::RememberedIdentity],
        }
    }

    // --- State ---

    /// Loads what a previous run left on the device. A blank token reads as
    /// signed out and a cached user that no longer parses reads as absent.
    pub fn restore(&mut self, stored: &KvOutput) {
        self.token = stored
            .get(StoreKey::AuthToken)
            .map(AuthToken::new)
            .filter(|t| !t.is_blank());
        self.user = stored
            .get(StoreKey::CachedUser)
            .and_then(|raw| match serde_json::from_str(raw) {
                Ok(user) => Some(user),
                Err(e) => {
                    warn!(error = %e, "cached user is corrupt, ignoring it");
                    None
                }
            });
        self.remembered_identity = stored
            .get(StoreKey::RememberedIdentity)
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string);
        debug!(authenticated = self.is_authenticated(), "session restored");
    }

    /// Only called once the grant is on disk.
    pub fn sign_in(&mut self, grant: Grant) {
        self.token = Some(grant.token);
        if grant.user.is_some() {
            self.user = grant.user;
        }
    }

    pub fn replace_user(&mut self, user: User) {
        self.user = Some(user);
    }

    pub fn sign_out(&mut self) {
        self.token = None;
        self.user = None;
    }

    pub fn remember(&mut self, phone: Option<String>) {
        self.remembered_identity = phone;
    }
}

fn encode_user(user: &User) -> AppResult<String> {
    serde_json::to_string(user).map_err(|e| {
        AppError::new(ErrorKind::Serialization, "Impossible d'enregistrer le profil")
            .with_internal(e.to_string())
    })
}
