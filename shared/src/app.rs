//! The Crux app: event handling and view building.
//!
//! Requests to the API go out through the `http` capability and come back as
//! [`Event::HttpCompleted`]; device reads and writes go through `kv` and come
//! back as [`Event::StoreCompleted`]. Each reply carries the call that caused
//! it, so it can be routed back to the control that issued it.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::capabilities::{ApiRequest, Capabilities, KvOperation};
use crate::config::ExternalLink;
use crate::event::{
    ApiCall, ApiReply, ClientSettings, Event, GrantPurpose, NotificationId, ReclamationId,
    StoreCall, StoreReply,
};
use crate::forms::{
    filter_cities, EditProfileForm, LoginForm, OtpForm, PhoneChangeForm, ProfileSetupForm,
};
use crate::model::{Language, Model};
use crate::navigation::{
    sala_service_layout, AuthMode, MainTab, PhoneChangeStep, ProfileView, RootAction, RootScreen,
    ServiceOption, SubRoute, TabNavigator,
};
use crate::notifications::NotificationKind;
use crate::reclamations;
use crate::session::{SessionController, User};
use crate::support::{ReclamationStatus, Sender, SupportError, SupportTopic, SupportView};
use crate::theme::{ThemeMode, ThemeTokens};
use crate::validation::{MoroccanPhoneValidator, PatternPhoneValidator, ValidationError};
use crate::{
    AppError, AppResult, ErrorSeverity, ToastKind, ToastMessage, SUPPORT_TICKET_SENT_MESSAGE,
};

// --- View model ---

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct AlertView {
    pub title: String,
    pub message: String,
    pub is_transient: bool,
    pub is_retryable: bool,
    pub error_code: String,
}

impl From<&AppError> for AlertView {
    fn from(e: &AppError) -> Self {
        Self {
            title: "Erreur".into(),
            message: e.user_facing_message(),
            is_transient: e.severity == ErrorSeverity::Transient,
            is_retryable: e.is_retryable(),
            error_code: e.code().to_string(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ToastView {
    pub message: String,
    pub kind: ToastKind,
    pub duration_ms: u64,
}

impl From<&ToastMessage> for ToastView {
    fn from(t: &ToastMessage) -> Self {
        Self {
            message: t.message.clone(),
            kind: t.kind,
            duration_ms: t.duration_ms,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TabItem {
    pub tab: MainTab,
    pub label: String,
    pub is_active: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct LinkItem {
    pub link: ExternalLink,
    pub label: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct LanguageItem {
    pub language: Language,
    pub label: String,
    pub native_name: String,
    pub is_selected: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct NotificationItem {
    pub id: NotificationId,
    pub kind: NotificationKind,
    pub icon: String,
    pub title: String,
    pub body: String,
    pub created_at: String,
    pub is_read: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ServiceOptionView {
    pub id: u8,
    pub title: String,
    pub icon: String,
    pub x: f64,
    pub y: f64,
}

impl From<ServiceOption> for ServiceOptionView {
    fn from(o: ServiceOption) -> Self {
        Self {
            id: o.id,
            title: o.title.to_string(),
            icon: o.icon.to_string(),
            x: o.x,
            y: o.y,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ReclamationItem {
    pub id: ReclamationId,
    pub category: String,
    pub subject: String,
    pub status: ReclamationStatus,
    pub status_label: String,
    pub created_at: String,
    pub last_message: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ChatMessageView {
    pub from_me: bool,
    pub text: String,
    pub created_at: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SupportScreen {
    Main {
        links: Vec<LinkItem>,
    },
    Topics {
        topics: Vec<SupportTopic>,
    },
    Form {
        topic: SupportTopic,
        topic_label: String,
        subject: String,
        message: String,
        order_id: String,
        subject_required: bool,
        shows_order_id: bool,
        submitting: bool,
    },
    Reclamations {
        items: Vec<ReclamationItem>,
        loading: bool,
    },
    Chat {
        reclamation: ReclamationItem,
        messages: Vec<ChatMessageView>,
        draft: String,
        composer_visible: bool,
        can_send: bool,
        sending: bool,
    },
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProfileScreen {
    Menu {
        display_name: String,
        phone_number: Option<String>,
        city: Option<String>,
        language: Language,
        unread_notifications: usize,
        links: Vec<LinkItem>,
    },
    PersonalInfo {
        name: Option<String>,
        phone_number: Option<String>,
        city: Option<String>,
    },
    EditProfile {
        name: String,
        city: String,
        cities: Vec<String>,
        saving: bool,
    },
    ChangePhoneRequest {
        new_phone: String,
        submitting: bool,
    },
    ChangePhoneVerify {
        new_phone: String,
        code: String,
        submitting: bool,
    },
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TabContent {
    Accueil { greeting: String },
    Historique,
    Profil { screen: ProfileScreen },
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Overlay {
    SalaServices {
        options: Vec<ServiceOptionView>,
    },
    Notifications {
        items: Vec<NotificationItem>,
        unread_count: usize,
    },
    Language {
        options: Vec<LanguageItem>,
    },
    Support {
        screen: SupportScreen,
    },
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ViewState {
    Splash,
    Welcome {
        slide_index: usize,
        slide_count: usize,
        title: String,
        description: String,
        is_first: bool,
        is_last: bool,
    },
    Login {
        mode: AuthMode,
        identity: String,
        remember_me: bool,
        can_submit: bool,
        submitting: bool,
    },
    Otp {
        identity: String,
        cells: Vec<String>,
        focused: usize,
        seconds_left: u32,
        can_resend: bool,
        verifying: bool,
        resending: bool,
    },
    ProfileSetup {
        name: String,
        city: Option<String>,
        city_query: String,
        cities: Vec<String>,
        submitting: bool,
    },
    Main {
        tabs: Vec<TabItem>,
        active_tab: MainTab,
        content: TabContent,
        overlay: Option<Overlay>,
    },
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ViewModel {
    pub state: ViewState,
    pub theme: ThemeTokens,
    pub theme_mode: ThemeMode,
    pub language: Language,
    pub is_rtl: bool,
    pub alert: Option<AlertView>,
    pub toast: Option<ToastView>,
    pub is_authenticated: bool,
}

// --- App ---

#[derive(Default)]
pub struct App;

impl App {
    fn send(call: ApiCall, request: ApiRequest, caps: &Capabilities) {
        debug!(call = call.name(), request_id = request.request_id(), "api request");
        caps.http.send(request, move |result| {
            Event::HttpCompleted(Box::new(ApiReply { call, result }))
        });
    }

    fn store(call: StoreCall, operation: KvOperation, caps: &Capabilities) {
        debug!(call = call.name(), op = operation.name(), "store request");
        caps.kv.perform(operation, move |result| {
            Event::StoreCompleted(Box::new(StoreReply { call, result }))
        });
    }

    fn configure(settings: ClientSettings, model: &mut Model) {
        model.links = settings.links;
        match settings.phone_pattern.as_deref().map(PatternPhoneValidator::new) {
            Some(Ok(validator)) => model.session.set_validator(Arc::new(validator)),
            Some(Err(e)) => warn!(error = %e, "phone pattern rejected, keeping the default"),
            None => model.session.set_validator(Arc::new(MoroccanPhoneValidator)),
        }
    }

    fn leave_splash(model: &mut Model, has_token: bool) {
        match model.root.apply(RootAction::SessionChecked { has_token }) {
            Ok(screen) => info!(screen = screen.name(), "splash finished"),
            Err(e) => warn!(error = %e, "splash already left"),
        }
    }

    fn back(model: &mut Model) {
        match model.root.screen() {
            RootScreen::Splash => {}
            RootScreen::Welcome => model.onboarding.previous(),
            RootScreen::Login | RootScreen::Otp | RootScreen::ProfileSetup => {
                if model.root.apply(RootAction::Back).is_ok() {
                    model.login.submitting = false;
                    model.otp = OtpForm::default();
                }
            }
            RootScreen::Main => match model.tabs.sub_route() {
                Some(SubRoute::Support) => {
                    if !model.support.back() {
                        model.tabs.close();
                    }
                }
                Some(_) => {
                    model.tabs.close();
                }
                None => {
                    if model.tabs.active_tab() == MainTab::Profil {
                        model.profile.back();
                    }
                }
            },
        }
    }

    fn request_otp(phone: &str, model: &Model, caps: &Capabilities) -> AppResult<()> {
        let mode = model.root.auth_mode();
        let (phone, request) = model.session.otp_request(phone, mode)?;
        Self::send(
            ApiCall::RequestOtp {
                phone: phone.into_string(),
                mode,
            },
            request,
            caps,
        );
        Ok(())
    }

    fn verify_otp(model: &mut Model, caps: &Capabilities) {
        if !model.otp.can_verify() {
            return;
        }
        let Some(phone) = model.root.identity().map(str::to_string) else {
            return;
        };
        let request = model
            .otp
            .code()
            .map_err(AppError::from)
            .and_then(|code| model.session.verify_request(&phone, &code));
        match request {
            Ok(request) => {
                model.otp.verifying = true;
                Self::send(ApiCall::VerifyOtp { phone }, request, caps);
            }
            Err(e) => model.set_alert(e),
        }
    }

    fn update_profile(name: &str, city: &str, model: &Model, caps: &Capabilities) -> AppResult<()> {
        let request = model.session.profile_request(name, city)?;
        Self::send(ApiCall::UpdateProfile, request, caps);
        Ok(())
    }

    fn list_reclamations(model: &mut Model, caps: &Capabilities) {
        match model.session.bearer().and_then(reclamations::list_request) {
            Ok(request) => Self::send(ApiCall::ListReclamations, request, caps),
            Err(e) => {
                model.support.reclamations_failed();
                model.set_alert(e);
            }
        }
    }

    fn in_profile(model: &Model) -> bool {
        model.root.screen() == RootScreen::Main
            && model.tabs.active_tab() == MainTab::Profil
            && model.tabs.sub_route().is_none()
    }

    fn in_support(model: &Model) -> bool {
        model.root.screen() == RootScreen::Main && model.tabs.sub_route() == Some(SubRoute::Support)
    }

    fn support_rejected(model: &mut Model, error: SupportError) {
        match error {
            SupportError::Busy => debug!("support request already in flight"),
            SupportError::Validation(v) => model.set_alert(v.into()),
            other => debug!(error = %other, "support action ignored"),
        }
    }

    fn otp_sent(phone: String, model: &mut Model, caps: &Capabilities) {
        match model.root.screen() {
            RootScreen::Login => {
                model.login.submitting = false;
                if model.login.remember_me {
                    model.session.remember(Some(phone.clone()));
                    Self::store(
                        StoreCall::RememberIdentity,
                        SessionController::remember_write(&phone),
                        caps,
                    );
                } else if model.session.remembered_identity().is_some() {
                    model.session.remember(None);
                    Self::store(StoreCall::ForgetIdentity, SessionController::forget_delete(), caps);
                }
                model.otp = OtpForm::default();
                if let Err(e) = model.root.apply(RootAction::IdentitySubmitted(phone)) {
                    warn!(error = %e, "otp sent outside the login screen");
                }
            }
            RootScreen::Otp => {
                model.otp.resending = false;
                model.otp.restart_countdown();
                model.otp.clear_digits();
                model.show_toast(ToastMessage::new("Un nouveau code a été envoyé", ToastKind::Info));
            }
            other => debug!(screen = other.name(), "stale otp response dropped"),
        }
    }

    fn profile_updated(user: Option<User>, model: &mut Model, caps: &Capabilities) {
        if let Some(user) = user {
            match SessionController::user_write(&user) {
                Ok(operation) => Self::store(StoreCall::SaveUser { user: user.clone() }, operation, caps),
                Err(e) => warn!(error = %e, "updated user not cached"),
            }
            model.session.replace_user(user);
        }

        if model.root.screen() == RootScreen::ProfileSetup {
            model.setup.submitting = false;
            if let Err(e) = model.root.apply(RootAction::ProfileCompleted) {
                warn!(error = %e, "profile completed outside setup");
            }
        } else {
            model.edit_profile.saving = false;
            if model.profile.profile_saved().is_ok() {
                model.show_toast(ToastMessage::new("Profil mis à jour", ToastKind::Success));
            }
        }
    }

    fn grant_received(result: AppResult<Value>, purpose: GrantPurpose, caps: &Capabilities) -> AppResult<()> {
        let grant = result.and_then(SessionController::read_grant)?;
        let operation = SessionController::grant_write(&grant)?;
        Self::store(StoreCall::SaveGrant { grant, purpose }, operation, caps);
        Ok(())
    }

    fn http_completed(reply: ApiReply, model: &mut Model, caps: &Capabilities) {
        let ApiReply { call, result } = reply;
        let result = result.map_err(AppError::from);
        if let Err(e) = &result {
            debug!(call = call.name(), code = e.code(), "api call failed");
        }

        match call {
            // OTP issuance (first request or resend)
            ApiCall::RequestOtp { phone, .. } => match result.and_then(SessionController::read_ack) {
                Ok(()) => Self::otp_sent(phone, model, caps),
                Err(e) => {
                    model.login.submitting = false;
                    model.otp.resending = false;
                    model.set_alert(e);
                }
            },

            // OTP verification: the grant is stored before the session changes
            ApiCall::VerifyOtp { .. } => {
                if let Err(e) = Self::grant_received(result, GrantPurpose::SignIn, caps) {
                    model.otp.verifying = false;
                    model.otp.clear_digits();
                    model.set_alert(e);
                }
            }

            // Profile updates (setup screen or edit screen)
            ApiCall::UpdateProfile => match result.and_then(SessionController::read_user) {
                Ok(user) => Self::profile_updated(user, model, caps),
                Err(e) => {
                    model.setup.submitting = false;
                    model.edit_profile.saving = false;
                    model.set_alert(e);
                }
            },

            // Phone change
            ApiCall::RequestPhoneChange { new_phone } => {
                model.phone_change.submitting = false;
                match result.and_then(SessionController::read_ack) {
                    Ok(()) => {
                        model.phone_change.code.clear();
                        if let Err(e) = model.profile.phone_code_sent(new_phone) {
                            debug!(error = %e, "phone change code arrived after leaving the screen");
                        }
                    }
                    Err(e) => model.set_alert(e),
                }
            }
            ApiCall::VerifyPhoneChange { .. } => {
                if let Err(e) = Self::grant_received(result, GrantPurpose::PhoneChange, caps) {
                    model.phone_change.submitting = false;
                    model.set_alert(e);
                }
            }

            // Support
            ApiCall::CreateReclamation => {
                if !Self::in_support(model) {
                    debug!("ticket reply arrived after leaving support, dropped");
                    return;
                }
                match result.and_then(reclamations::read_created) {
                    Ok(reclamation) => {
                        if model.support.submit_succeeded(reclamation) {
                            Self::list_reclamations(model, caps);
                        }
                        model.show_toast(ToastMessage::new(
                            SUPPORT_TICKET_SENT_MESSAGE,
                            ToastKind::Success,
                        ));
                    }
                    Err(e) => {
                        model.support.submit_failed();
                        model.set_alert(e);
                    }
                }
            }
            ApiCall::ListReclamations => match result.and_then(reclamations::read_listed) {
                Ok(items) => model.support.reclamations_loaded(items),
                Err(e) => {
                    model.support.reclamations_failed();
                    model.set_alert(e);
                }
            },
            ApiCall::SendReclamationMessage { id, text } => {
                match result.and_then(reclamations::read_updated) {
                    Ok(reclamation) => {
                        if let Err(e) = model.support.send_succeeded(&id, text, reclamation) {
                            warn!(error = %e, reclamation = %id, "reply not applied");
                        }
                    }
                    Err(e) => {
                        model.support.send_failed();
                        model.set_alert(e);
                    }
                }
            }
        }
    }

    fn store_completed(reply: StoreReply, model: &mut Model) {
        let StoreReply { call, result } = reply;

        match (call, result) {
            // Session restore
            (StoreCall::RestoreSession, Ok(stored)) => {
                model.session.restore(&stored);
                model.theme.mode = ThemeMode::stored(&stored);
                model.login = LoginForm::prefilled(model.session.remembered_identity());
                if let Some(has_token) = model.splash.session_checked(model.session.is_authenticated()) {
                    Self::leave_splash(model, has_token);
                }
            }
            (StoreCall::RestoreSession, Err(e)) => {
                warn!(error = %e, "session restore failed, starting signed out");
                if let Some(has_token) = model.splash.session_checked(false) {
                    Self::leave_splash(model, has_token);
                }
            }

            // Sign-in
            (
                StoreCall::SaveGrant {
                    grant,
                    purpose: GrantPurpose::SignIn,
                },
                Ok(_),
            ) => {
                model.otp.verifying = false;
                model.session.sign_in(grant);
                info!("otp verified, session stored");
                match model.root.apply(RootAction::OtpVerified) {
                    Ok(RootScreen::ProfileSetup) => {
                        model.setup = ProfileSetupForm::default();
                        if let Some(name) = model.user().and_then(|u| u.name.clone()) {
                            model.setup.name = name;
                        }
                    }
                    Ok(_) => model.tabs = TabNavigator::default(),
                    Err(e) => warn!(error = %e, "sign-in completed outside the otp screen"),
                }
            }
            (
                StoreCall::SaveGrant {
                    purpose: GrantPurpose::SignIn,
                    ..
                },
                Err(e),
            ) => {
                model.otp.verifying = false;
                model.otp.clear_digits();
                model.set_alert(e.into());
            }

            // Phone change: the rotated token replaces the old one
            (
                StoreCall::SaveGrant {
                    grant,
                    purpose: GrantPurpose::PhoneChange,
                },
                Ok(_),
            ) => {
                model.session.sign_in(grant);
                model.phone_change = PhoneChangeForm::default();
                info!("phone number changed");
                if model.profile.phone_changed().is_ok() {
                    model.show_toast(ToastMessage::new(
                        "Numéro de téléphone mis à jour",
                        ToastKind::Success,
                    ));
                }
            }
            (
                StoreCall::SaveGrant {
                    purpose: GrantPurpose::PhoneChange,
                    ..
                },
                Err(e),
            ) => {
                model.phone_change.submitting = false;
                model.set_alert(e.into());
            }

            // Logout
            (StoreCall::ClearSession, Ok(_)) => {
                model.logging_out = false;
                model.clear_session();
                if let Err(e) = model.root.apply(RootAction::LoggedOut) {
                    warn!(error = %e, "logout completed outside main");
                }
                info!("signed out");
            }
            (StoreCall::ClearSession, Err(e)) => {
                model.logging_out = false;
                model.set_alert(e.into());
            }

            // Background writes: nobody waits on them.
            (call, Err(e)) => {
                warn!(call = call.name(), error = %e, "background store write failed");
            }
            (call, Ok(_)) => debug!(call = call.name(), "store write done"),
        }
    }
}

impl crux_core::App for App {
    type Event = Event;
    type Model = Model;
    type ViewModel = ViewModel;
    type Capabilities = Capabilities;

    fn update(&self, event: Event, model: &mut Model, caps: &Capabilities) {
        model.update_timestamp();

        let event_name = event.name();
        if event.is_user_initiated() && !event.is_text_input() {
            debug!(event = event_name, screen = model.root.screen().name(), "user action");
        }

        match event {
            Event::Noop => return,

            Event::ClientConfigured(settings) => Self::configure(*settings, model),

            Event::AppStarted => {
                Self::store(StoreCall::RestoreSession, SessionController::restore_read(), caps);
            }

            Event::SplashTimerElapsed => {
                if let Some(has_token) = model.splash.timer_elapsed() {
                    Self::leave_splash(model, has_token);
                }
            }

            Event::PlatformSchemeChanged { scheme } => {
                model.theme.platform = scheme;
            }

            Event::ThemeModeSelected { mode } => {
                model.theme.mode = mode;
                Self::store(StoreCall::PersistThemeMode { mode }, mode.persist(), caps);
            }

            Event::BackPressed => Self::back(model),

            Event::SkipRequested => {
                if let Err(e) = model.root.apply(RootAction::Skip) {
                    debug!(error = %e, "skip ignored");
                }
            }

            Event::AlertDismissed => model.alert = None,
            Event::ToastDismissed => model.toast = None,

            // Welcome
            Event::OnboardingNext => model.onboarding.next(),
            Event::OnboardingPrevious => model.onboarding.previous(),
            Event::OnboardingSkipped => model.onboarding.skip(),

            Event::AuthModeChosen { mode } => {
                if model.root.apply(RootAction::AuthModeChosen(mode)).is_ok() {
                    model.login = LoginForm::prefilled(model.session.remembered_identity());
                }
            }

            // Login
            Event::IdentityChanged { value } => model.login.identity = value,
            Event::RememberMeToggled => model.login.remember_me = !model.login.remember_me,

            Event::LoginSubmitted => {
                if model.root.screen() != RootScreen::Login || !model.login.can_submit() {
                    return;
                }
                let identity = model.login.identity.clone();
                match Self::request_otp(&identity, model, caps) {
                    Ok(()) => model.login.submitting = true,
                    Err(e) => model.set_alert(e),
                }
            }

            // OTP
            Event::OtpDigitEntered { index, value } => {
                if model.root.screen() != RootScreen::Otp {
                    return;
                }
                if model.otp.enter(index, &value) {
                    Self::verify_otp(model, caps);
                }
            }

            Event::OtpSubmitted => {
                if model.otp.is_complete() {
                    Self::verify_otp(model, caps);
                } else {
                    model.set_alert(
                        ValidationError::InvalidOtpCode {
                            expected: crate::OTP_CODE_LENGTH,
                        }
                        .into(),
                    );
                }
            }

            Event::OtpTick => {
                if model.root.screen() != RootScreen::Otp || !model.otp.tick() {
                    return;
                }
            }

            Event::OtpResendRequested => {
                let Some(phone) = model.root.identity().map(str::to_string) else {
                    return;
                };
                if model.root.screen() != RootScreen::Otp || !model.otp.can_resend() {
                    return;
                }
                match Self::request_otp(&phone, model, caps) {
                    Ok(()) => model.otp.resending = true,
                    Err(e) => model.set_alert(e),
                }
            }

            // Profile setup
            Event::SetupNameChanged { value } => model.setup.name = value,
            Event::SetupCityQueryChanged { query } => model.setup.city_query = query,
            Event::SetupCitySelected { city } => model.setup.select_city(&city),

            Event::ProfileSetupSubmitted => {
                if model.root.screen() != RootScreen::ProfileSetup || model.setup.submitting {
                    return;
                }
                let sent = model
                    .setup
                    .validate()
                    .map_err(AppError::from)
                    .and_then(|(name, city)| Self::update_profile(&name, &city, model, caps));
                match sent {
                    Ok(()) => model.setup.submitting = true,
                    Err(e) => model.set_alert(e),
                }
            }

            // Tabs
            Event::TabSelected { tab } => {
                model.tabs.select_tab(tab);
                model.support.reset();
                model.profile.reset();
            }

            Event::SubRouteOpened { route } => match model.tabs.open(route) {
                Ok(()) => {
                    if route == SubRoute::Support {
                        model.support.reset();
                    }
                }
                Err(e) => debug!(error = %e, "sub-route ignored"),
            },

            Event::SubRouteClosed => {
                model.tabs.close();
                model.support.reset();
            }

            // Profile
            Event::PersonalInfoOpened => {
                if Self::in_profile(model) {
                    if let Err(e) = model.profile.open_personal_info() {
                        debug!(error = %e, "personal info not reachable from here");
                    }
                }
            }

            Event::EditProfileOpened => {
                if Self::in_profile(model) && model.profile.open_edit_profile().is_ok() {
                    let user = model.user();
                    model.edit_profile = EditProfileForm::prefilled(
                        user.and_then(|u| u.name.as_deref()),
                        user.and_then(|u| u.city.as_deref()),
                    );
                }
            }

            Event::EditNameChanged { value } => model.edit_profile.name = value,
            Event::EditCityChanged { value } => model.edit_profile.city = value,

            Event::EditProfileSaved => {
                if model.profile.view() != &ProfileView::EditProfile || model.edit_profile.saving {
                    return;
                }
                let sent = model
                    .edit_profile
                    .validate()
                    .map_err(AppError::from)
                    .and_then(|(name, city)| Self::update_profile(&name, &city, model, caps));
                match sent {
                    Ok(()) => model.edit_profile.saving = true,
                    Err(e) => model.set_alert(e),
                }
            }

            Event::PhoneChangeOpened => {
                if Self::in_profile(model) && model.profile.open_phone_change().is_ok() {
                    model.phone_change = PhoneChangeForm::default();
                }
            }

            Event::NewPhoneChanged { value } => model.phone_change.new_phone = value,
            Event::PhoneChangeCodeChanged { value } => model.phone_change.code = value,

            Event::PhoneChangeRequested => {
                if model.profile.view() != &ProfileView::ChangePhone(PhoneChangeStep::Request)
                    || model.phone_change.submitting
                {
                    return;
                }
                let raw = model.phone_change.new_phone.trim().to_string();
                let request = if raw.is_empty() {
                    Err(ValidationError::InvalidPhone.into())
                } else {
                    model.session.phone_change_request(&raw)
                };
                match request {
                    Ok((new_phone, request)) => {
                        model.phone_change.submitting = true;
                        Self::send(
                            ApiCall::RequestPhoneChange {
                                new_phone: new_phone.into_string(),
                            },
                            request,
                            caps,
                        );
                    }
                    Err(e) => model.set_alert(e),
                }
            }

            Event::PhoneChangeVerified => {
                let ProfileView::ChangePhone(PhoneChangeStep::Verify { new_phone }) =
                    model.profile.view()
                else {
                    return;
                };
                if model.phone_change.submitting {
                    return;
                }
                let new_phone = new_phone.clone();
                match model
                    .session
                    .phone_change_verify_request(&new_phone, model.phone_change.code.trim())
                {
                    Ok(request) => {
                        model.phone_change.submitting = true;
                        Self::send(ApiCall::VerifyPhoneChange { new_phone }, request, caps);
                    }
                    Err(e) => model.set_alert(e),
                }
            }

            Event::LogoutRequested => {
                if model.root.screen() != RootScreen::Main || model.logging_out {
                    return;
                }
                model.logging_out = true;
                Self::store(StoreCall::ClearSession, SessionController::clear_delete(), caps);
            }

            Event::LanguageSelected { language } => model.language = language,

            Event::LinkOpened { link } => {
                let url = model.links.url(link).clone();
                debug!(%url, "opening external link");
                caps.browser.open(url, move |result| Event::LinkCompleted {
                    link,
                    error: result.err().map(Box::new),
                });
            }

            Event::LinkCompleted { link, error } => {
                let Some(error) = error else {
                    return;
                };
                warn!(?link, error = %error, "link could not be opened");
                model.show_toast(ToastMessage::new(error.user_facing_message(), ToastKind::Error));
            }

            // Notifications
            Event::NotificationReceived(notification) => {
                model.notifications.push(*notification);
            }
            Event::NotificationOpened { id } => {
                model.notifications.mark_read(&id);
            }
            Event::NotificationsMarkedRead => model.notifications.mark_all_read(),

            // Support
            Event::SupportContactOpened => {
                if Self::in_support(model) {
                    if let Err(e) = model.support.open_topics() {
                        Self::support_rejected(model, e);
                    }
                }
            }

            Event::SupportTopicSelected { topic } => {
                if let Err(e) = model.support.select_topic(topic) {
                    Self::support_rejected(model, e);
                }
            }

            Event::TicketSubjectChanged { value } => model.support.form_mut().subject = value,
            Event::TicketMessageChanged { value } => model.support.form_mut().message = value,
            Event::TicketOrderIdChanged { value } => model.support.form_mut().order_id = value,

            Event::TicketSubmitted => match model.support.begin_submit() {
                Ok(ticket) => {
                    let request = model
                        .session
                        .bearer()
                        .and_then(|token| reclamations::create_request(token, &ticket));
                    match request {
                        Ok(request) => Self::send(ApiCall::CreateReclamation, request, caps),
                        Err(e) => {
                            model.support.submit_failed();
                            model.set_alert(e);
                        }
                    }
                }
                Err(e) => Self::support_rejected(model, e),
            },

            Event::ReclamationsOpened | Event::ReclamationsRefreshRequested => {
                if !Self::in_support(model) {
                    return;
                }
                match model.support.open_reclamations() {
                    Ok(()) => Self::list_reclamations(model, caps),
                    Err(e) => Self::support_rejected(model, e),
                }
            }

            Event::ReclamationOpened { id } => {
                if let Err(e) = model.support.open_chat(&id) {
                    Self::support_rejected(model, e);
                }
            }

            Event::ChatDraftChanged { value } => {
                if matches!(model.support.view(), SupportView::Chat { .. }) {
                    model.support.set_draft(value);
                }
            }

            Event::ChatMessageSent => match model.support.begin_send() {
                Ok((id, text)) => {
                    let request = model
                        .session
                        .bearer()
                        .and_then(|token| reclamations::message_request(token, &id, &text));
                    match request {
                        Ok(request) => {
                            Self::send(ApiCall::SendReclamationMessage { id, text }, request, caps);
                        }
                        Err(e) => {
                            model.support.send_failed();
                            model.set_alert(e);
                        }
                    }
                }
                Err(e) => Self::support_rejected(model, e),
            },

            Event::HttpCompleted(reply) => Self::http_completed(*reply, model, caps),
            Event::StoreCompleted(reply) => Self::store_completed(*reply, model),
        }

        caps.render.render();
    }

    fn view(&self, model: &Model) -> ViewModel {
        let state = match model.root.screen() {
            RootScreen::Splash => ViewState::Splash,

            RootScreen::Welcome => {
                let slide = model.onboarding.slide();
                ViewState::Welcome {
                    slide_index: model.onboarding.index(),
                    slide_count: crate::ONBOARDING_SLIDE_COUNT,
                    title: slide.title.to_string(),
                    description: slide.description.to_string(),
                    is_first: model.onboarding.is_first(),
                    is_last: model.onboarding.is_last(),
                }
            }

            RootScreen::Login => ViewState::Login {
                mode: model.root.auth_mode(),
                identity: model.login.identity.clone(),
                remember_me: model.login.remember_me,
                can_submit: model.login.can_submit(),
                submitting: model.login.submitting,
            },

            RootScreen::Otp => ViewState::Otp {
                identity: model.root.identity().unwrap_or_default().to_string(),
                cells: model.otp.cells(),
                focused: model.otp.focused(),
                seconds_left: model.otp.seconds_left(),
                can_resend: model.otp.can_resend(),
                verifying: model.otp.verifying,
                resending: model.otp.resending,
            },

            RootScreen::ProfileSetup => ViewState::ProfileSetup {
                name: model.setup.name.clone(),
                city: model.setup.city.clone(),
                city_query: model.setup.city_query.clone(),
                cities: owned(filter_cities(&model.setup.city_query)),
                submitting: model.setup.submitting,
            },

            RootScreen::Main => ViewState::Main {
                tabs: MainTab::ALL
                    .iter()
                    .map(|&tab| TabItem {
                        tab,
                        label: tab.label().to_string(),
                        is_active: tab == model.tabs.active_tab(),
                    })
                    .collect(),
                active_tab: model.tabs.active_tab(),
                content: tab_content(model),
                overlay: model.tabs.sub_route().map(|route| overlay(route, model)),
            },
        };

        ViewModel {
            state,
            theme: model.theme.tokens(),
            theme_mode: model.theme.mode,
            language: model.language,
            is_rtl: model.language.is_rtl(),
            alert: model.alert.as_ref().map(AlertView::from),
            toast: model
                .toast
                .as_ref()
                .filter(|t| !t.is_expired(model.view_timestamp_ms))
                .map(ToastView::from),
            is_authenticated: model.session.is_authenticated(),
        }
    }
}

// --- View helpers ---

fn owned(items: Vec<&'static str>) -> Vec<String> {
    items.into_iter().map(str::to_string).collect()
}

fn links(items: &[ExternalLink]) -> Vec<LinkItem> {
    items
        .iter()
        .map(|&link| LinkItem {
            link,
            label: link.label().to_string(),
        })
        .collect()
}

fn tab_content(model: &Model) -> TabContent {
    match model.tabs.active_tab() {
        MainTab::Accueil => TabContent::Accueil {
            greeting: match model.user() {
                Some(user) => format!("Bonjour, {}", user.display_name()),
                None => "Bonjour".to_string(),
            },
        },
        MainTab::Historique => TabContent::Historique,
        MainTab::Profil => TabContent::Profil {
            screen: profile_screen(model),
        },
    }
}

fn profile_screen(model: &Model) -> ProfileScreen {
    let user = model.user();
    match model.profile.view() {
        ProfileView::Menu => ProfileScreen::Menu {
            display_name: user.map_or_else(|| "Livreur".to_string(), |u| u.display_name().to_string()),
            phone_number: user.map(|u| u.phone_number.clone()),
            city: user.and_then(|u| u.city.clone()),
            language: model.language,
            unread_notifications: model.notifications.unread_count(),
            links: links(&[ExternalLink::Rules, ExternalLink::Terms, ExternalLink::Privacy]),
        },
        ProfileView::PersonalInfo => ProfileScreen::PersonalInfo {
            name: user.and_then(|u| u.name.clone()),
            phone_number: user.map(|u| u.phone_number.clone()),
            city: user.and_then(|u| u.city.clone()),
        },
        ProfileView::EditProfile => ProfileScreen::EditProfile {
            name: model.edit_profile.name.clone(),
            city: model.edit_profile.city.clone(),
            cities: owned(filter_cities(&model.edit_profile.city)),
            saving: model.edit_profile.saving,
        },
        ProfileView::ChangePhone(PhoneChangeStep::Request) => ProfileScreen::ChangePhoneRequest {
            new_phone: model.phone_change.new_phone.clone(),
            submitting: model.phone_change.submitting,
        },
        ProfileView::ChangePhone(PhoneChangeStep::Verify { new_phone }) => {
            ProfileScreen::ChangePhoneVerify {
                new_phone: new_phone.clone(),
                code: model.phone_change.code.clone(),
                submitting: model.phone_change.submitting,
            }
        }
    }
}

fn overlay(route: SubRoute, model: &Model) -> Overlay {
    match route {
        SubRoute::SalaServices => Overlay::SalaServices {
            options: sala_service_layout().into_iter().map(Into::into).collect(),
        },
        SubRoute::Notifications => Overlay::Notifications {
            items: model
                .notifications
                .items()
                .iter()
                .map(|n| NotificationItem {
                    id: n.id.clone(),
                    kind: n.kind,
                    icon: n.kind.icon().to_string(),
                    title: n.title.clone(),
                    body: n.body.clone(),
                    created_at: n.created_at.to_rfc3339(),
                    is_read: n.is_read,
                })
                .collect(),
            unread_count: model.notifications.unread_count(),
        },
        SubRoute::Language => Overlay::Language {
            options: Language::ALL
                .iter()
                .map(|&language| LanguageItem {
                    language,
                    label: language.label().to_string(),
                    native_name: language.native_name().to_string(),
                    is_selected: language == model.language,
                })
                .collect(),
        },
        SubRoute::Support => Overlay::Support {
            screen: support_screen(model),
        },
    }
}

fn reclamation_item(r: &crate::support::Reclamation) -> ReclamationItem {
    ReclamationItem {
        id: r.id.clone(),
        category: r.category.clone(),
        subject: r.subject.clone(),
        status: r.status,
        status_label: r.status.label().to_string(),
        created_at: r.created_at.to_rfc3339(),
        last_message: r.messages.last().map(|m| m.text.clone()),
    }
}

fn support_screen(model: &Model) -> SupportScreen {
    let support = &model.support;
    match support.view() {
        SupportView::Main => SupportScreen::Main {
            links: links(&ExternalLink::ALL),
        },
        SupportView::Topics => SupportScreen::Topics {
            topics: SupportTopic::ALL.to_vec(),
        },
        SupportView::Form { topic } => SupportScreen::Form {
            topic: *topic,
            topic_label: topic.label().to_string(),
            subject: support.form().subject.clone(),
            message: support.form().message.clone(),
            order_id: support.form().order_id.clone(),
            subject_required: topic.requires_subject(),
            shows_order_id: topic.accepts_order_id(),
            submitting: support.is_submitting(),
        },
        SupportView::Reclamations => SupportScreen::Reclamations {
            items: support.reclamations().iter().map(reclamation_item).collect(),
            loading: support.is_loading(),
        },
        SupportView::Chat { .. } => match support.selected() {
            Some(reclamation) => SupportScreen::Chat {
                reclamation: reclamation_item(reclamation),
                messages: reclamation
                    .messages
                    .iter()
                    .map(|m| ChatMessageView {
                        from_me: m.sender == Sender::User,
                        text: m.text.clone(),
                        created_at: m.created_at.to_rfc3339(),
                    })
                    .collect(),
                draft: support.draft().to_string(),
                composer_visible: support.composer_visible(),
                can_send: support.can_send(),
                sending: support.is_sending(),
            },
            // The list was reloaded without the open ticket.
            None => SupportScreen::Reclamations {
                items: support.reclamations().iter().map(reclamation_item).collect(),
                loading: support.is_loading(),
            },
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::{Effect, StoreKey};
    use crux_core::testing::AppTester;

    fn started() -> (AppTester<App, Effect>, Model) {
        let app = AppTester::<App, Effect>::default();
        let mut model = Model::default();
        app.update(Event::AppStarted, &mut model);
        (app, model)
    }

    #[test]
    fn test_app_started_reads_the_whole_store() {
        let app = AppTester::<App, Effect>::default();
        let mut model = Model::default();
        let update = app.update(Event::AppStarted, &mut model);

        let requested = update.effects.iter().any(|e| match e {
            Effect::KeyValue(req) => req.operation.keys() == StoreKey::ALL.to_vec(),
            _ => false,
        });
        assert!(requested);
        assert!(matches!(app.view(&model).state, ViewState::Splash));
    }

    #[test]
    fn test_alert_is_shown_and_dismissed() {
        let (app, mut model) = started();
        model.set_alert(AppError::timeout());
        let alert = app.view(&model).alert.unwrap();
        assert_eq!(alert.message, crate::TIMEOUT_MESSAGE);
        assert!(alert.is_retryable);

        app.update(Event::AlertDismissed, &mut model);
        assert!(app.view(&model).alert.is_none());
    }

    #[test]
    fn test_theme_mode_is_persisted_and_view_follows_platform() {
        let (app, mut model) = started();
        app.update(
            Event::PlatformSchemeChanged {
                scheme: Some(crate::theme::ColorScheme::Dark),
            },
            &mut model,
        );
        assert_eq!(app.view(&model).theme.colors, crate::theme::Palette::DARK);

        let update = app.update(Event::ThemeModeSelected { mode: ThemeMode::Light }, &mut model);
        assert_eq!(app.view(&model).theme.colors, crate::theme::Palette::LIGHT);
        assert!(update.effects.iter().any(|e| matches!(
            e,
            Effect::KeyValue(req) if req.operation == ThemeMode::Light.persist()
        )));
    }

    #[test]
    fn test_configured_links_are_opened() {
        let (app, mut model) = started();
        let mut settings = crate::config::Config::default().client_settings();
        settings.links.faq = url::Url::parse("https://help.example.com/faq").unwrap();
        app.update(Event::ClientConfigured(Box::new(settings)), &mut model);

        let update = app.update(Event::LinkOpened { link: ExternalLink::Faq }, &mut model);
        let opened: Vec<_> = update
            .effects
            .iter()
            .filter_map(|e| match e {
                Effect::Browser(req) => Some(req.operation.url.as_str().to_string()),
                _ => None,
            })
            .collect();
        assert_eq!(opened, vec!["https://help.example.com/faq".to_string()]);
    }

    #[test]
    fn test_bad_phone_pattern_keeps_default_validator() {
        let (app, mut model) = started();
        let mut settings = crate::config::Config::default().client_settings();
        settings.phone_pattern = Some("([".into());
        app.update(Event::ClientConfigured(Box::new(settings)), &mut model);
        assert!(model.session.validator().is_valid("0612345678"));
    }

    #[test]
    fn test_view_state_is_tagged() {
        let (app, model) = started();
        let json = serde_json::to_value(app.view(&model)).unwrap();
        assert_eq!(json["state"]["type"], "splash");
        assert_eq!(json["theme"]["colors"]["primary"], "#7FC6A4");
    }
}
