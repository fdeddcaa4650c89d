use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fmt;

use crate::capabilities::{HttpError, KvResult};
use crate::config::{ExternalLink, Links};
use crate::model::Language;
use crate::navigation::{AuthMode, MainTab, SubRoute};
use crate::notifications::Notification;
use crate::session::{Grant, User};
use crate::support::SupportTopic;
use crate::theme::{ColorScheme, ThemeMode};
use crate::AppError;

// --- Bearer token: redacted Debug, zeroized on drop by `secrecy` ---

pub struct AuthToken(SecretString);

impl AuthToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(SecretString::new(token.into()))
    }

    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }

    pub fn is_blank(&self) -> bool {
        self.expose().trim().is_empty()
    }
}

impl Clone for AuthToken {
    fn clone(&self) -> Self {
        Self::new(self.expose().to_owned())
    }
}

impl PartialEq for AuthToken {
    fn eq(&self, other: &Self) -> bool {
        self.expose() == other.expose()
    }
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AuthToken([REDACTED])")
    }
}

// Crosses the bridge as a plain string: the shell needs it for the
// `Authorization` header and the device store.
impl Serialize for AuthToken {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.expose())
    }
}

impl<'de> Deserialize<'de> for AuthToken {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self::new)
    }
}

// --- Typed IDs ---

macro_rules! typed_id {
    ($name:ident) => {
        #[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(s: impl Into<String>) -> Self {
                Self(s.into())
            }
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

typed_id!(UserId);
typed_id!(ReclamationId);
typed_id!(NotificationId);

// --- Capability replies, paired with what was asked ---

/// An API call in flight, kept so its reply can be routed back to the
/// control that issued it.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ApiCall {
    RequestOtp { phone: String, mode: AuthMode },
    VerifyOtp { phone: String },
    UpdateProfile,
    RequestPhoneChange { new_phone: String },
    VerifyPhoneChange { new_phone: String },
    CreateReclamation,
    ListReclamations,
    SendReclamationMessage { id: ReclamationId, text: String },
}

impl ApiCall {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::RequestOtp { .. } => "request_otp",
            Self::VerifyOtp { .. } => "verify_otp",
            Self::UpdateProfile => "update_profile",
            Self::RequestPhoneChange { .. } => "request_phone_change",
            Self::VerifyPhoneChange { .. } => "verify_phone_change",
            Self::CreateReclamation => "create_reclamation",
            Self::ListReclamations => "list_reclamations",
            Self::SendReclamationMessage { .. } => "send_reclamation_message",
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ApiReply {
    pub call: ApiCall,
    pub result: Result<Value, HttpError>,
}

/// Why a grant is being written.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GrantPurpose {
    SignIn,
    PhoneChange,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreCall {
    RestoreSession,
    SaveGrant { grant: Grant, purpose: GrantPurpose },
    SaveUser { user: User },
    ClearSession,
    RememberIdentity,
    ForgetIdentity,
    PersistThemeMode { mode: ThemeMode },
}

impl StoreCall {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::RestoreSession => "restore_session",
            Self::SaveGrant { .. } => "save_grant",
            Self::SaveUser { .. } => "save_user",
            Self::ClearSession => "clear_session",
            Self::RememberIdentity => "remember_identity",
            Self::ForgetIdentity => "forget_identity",
            Self::PersistThemeMode { .. } => "persist_theme_mode",
        }
    }

    /// Writes nobody waits on; a failure is only logged.
    pub const fn is_background(&self) -> bool {
        matches!(
            self,
            Self::SaveUser { .. }
                | Self::RememberIdentity
                | Self::ForgetIdentity
                | Self::PersistThemeMode { .. }
        )
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct StoreReply {
    pub call: StoreCall,
    pub result: KvResult,
}

/// Settings the shell reads from its environment at start-up.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ClientSettings {
    pub phone_pattern: Option<String>,
    pub links: Links,
}

// --- Event enum: large variants boxed ---

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
pub enum Event {
    #[default]
    Noop,

    // Lifecycle
    ClientConfigured(Box<ClientSettings>),
    AppStarted,
    SplashTimerElapsed,
    PlatformSchemeChanged {
        scheme: Option<ColorScheme>,
    },
    ThemeModeSelected {
        mode: ThemeMode,
    },
    BackPressed,
    SkipRequested,
    AlertDismissed,
    ToastDismissed,

    // Welcome & onboarding
    OnboardingNext,
    OnboardingPrevious,
    OnboardingSkipped,
    AuthModeChosen {
        mode: AuthMode,
    },

    // Login
    IdentityChanged {
        value: String,
    },
    RememberMeToggled,
    LoginSubmitted,

    // OTP
    OtpDigitEntered {
        index: usize,
        value: String,
    },
    OtpSubmitted,
    OtpTick,
    OtpResendRequested,

    // Profile setup
    SetupNameChanged {
        value: String,
    },
    SetupCityQueryChanged {
        query: String,
    },
    SetupCitySelected {
        city: String,
    },
    ProfileSetupSubmitted,

    // Main tabs
    TabSelected {
        tab: MainTab,
    },
    SubRouteOpened {
        route: SubRoute,
    },
    SubRouteClosed,

    // Profile
    PersonalInfoOpened,
    EditProfileOpened,
    EditNameChanged {
        value: String,
    },
    EditCityChanged {
        value: String,
    },
    EditProfileSaved,
    PhoneChangeOpened,
    NewPhoneChanged {
        value: String,
    },
    PhoneChangeRequested,
    PhoneChangeCodeChanged {
        value: String,
    },
    PhoneChangeVerified,
    LogoutRequested,
    LanguageSelected {
        language: Language,
    },
    LinkOpened {
        link: ExternalLink,
    },

    // Notifications
    NotificationReceived(Box<Notification>),
    NotificationOpened {
        id: NotificationId,
    },
    NotificationsMarkedRead,

    // Support
    SupportContactOpened,
    SupportTopicSelected {
        topic: SupportTopic,
    },
    TicketSubjectChanged {
        value: String,
    },
    TicketMessageChanged {
        value: String,
    },
    TicketOrderIdChanged {
        value: String,
    },
    TicketSubmitted,
    ReclamationsOpened,
    ReclamationsRefreshRequested,
    ReclamationOpened {
        id: ReclamationId,
    },
    ChatDraftChanged {
        value: String,
    },
    ChatMessageSent,

    // Capability responses (boxed to keep enum size small)
    HttpCompleted(Box<ApiReply>),
    StoreCompleted(Box<StoreReply>),
    LinkCompleted {
        link: ExternalLink,
        error: Option<Box<AppError>>,
    },
}

impl Event {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Noop => "noop",
            Self::ClientConfigured(_) => "client_configured",
            Self::AppStarted => "app_started",
            Self::SplashTimerElapsed => "splash_timer_elapsed",
            Self::PlatformSchemeChanged { .. } => "platform_scheme_changed",
            Self::ThemeModeSelected { .. } => "theme_mode_selected",
            Self::BackPressed => "back_pressed",
            Self::SkipRequested => "skip_requested",
            Self::AlertDismissed => "alert_dismissed",
            Self::ToastDismissed => "toast_dismissed",
            Self::OnboardingNext => "onboarding_next",
            Self::OnboardingPrevious => "onboarding_previous",
            Self::OnboardingSkipped => "onboarding_skipped",
            Self::AuthModeChosen { .. } => "auth_mode_chosen",
            Self::IdentityChanged { .. } => "identity_changed",
            Self::RememberMeToggled => "remember_me_toggled",
            Self::LoginSubmitted => "login_submitted",
            Self::OtpDigitEntered { .. } => "otp_digit_entered",
            Self::OtpSubmitted => "otp_submitted",
            Self::OtpTick => "otp_tick",
            Self::OtpResendRequested => "otp_resend_requested",
            Self::SetupNameChanged { .. } => "setup_name_changed",
            Self::SetupCityQueryChanged { .. } => "setup_city_query_changed",
            Self::SetupCitySelected { .. } => "setup_city_selected",
            Self::ProfileSetupSubmitted => "profile_setup_submitted",
            Self::TabSelected { .. } => "tab_selected",
            Self::SubRouteOpened { .. } => "sub_route_opened",
            Self::SubRouteClosed => "sub_route_closed",
            Self::PersonalInfoOpened => "personal_info_opened",
            Self::EditProfileOpened => "edit_profile_opened",
            Self::EditNameChanged { .. } => "edit_name_changed",
            Self::EditCityChanged { .. } => "edit_city_changed",
            Self::EditProfileSaved => "edit_profile_saved",
            Self::PhoneChangeOpened => "phone_change_opened",
            Self::NewPhoneChanged { .. } => "new_phone_changed",
            Self::PhoneChangeRequested => "phone_change_requested",
            Self::PhoneChangeCodeChanged { .. } => "phone_change_code_changed",
            Self::PhoneChangeVerified => "phone_change_verified",
            Self::LogoutRequested => "logout_requested",
            Self::LanguageSelected { .. } => "language_selected",
            Self::LinkOpened { .. } => "link_opened",
            Self::NotificationReceived(_) => "notification_received",
            Self::NotificationOpened { .. } => "notification_opened",
            Self::NotificationsMarkedRead => "notifications_marked_read",
            Self::SupportContactOpened => "support_contact_opened",
            Self::SupportTopicSelected { .. } => "support_topic_selected",
            Self::TicketSubjectChanged { .. } => "ticket_subject_changed",
            Self::TicketMessageChanged { .. } => "ticket_message_changed",
            Self::TicketOrderIdChanged { .. } => "ticket_order_id_changed",
            Self::TicketSubmitted => "ticket_submitted",
            Self::ReclamationsOpened => "reclamations_opened",
            Self::ReclamationsRefreshRequested => "reclamations_refresh_requested",
            Self::ReclamationOpened { .. } => "reclamation_opened",
            Self::ChatDraftChanged { .. } => "chat_draft_changed",
            Self::ChatMessageSent => "chat_message_sent",
            Self::HttpCompleted(_) => "http_completed",
            Self::StoreCompleted(_) => "store_completed",
            Self::LinkCompleted { .. } => "link_completed",
        }
    }

    /// Events the shell dispatches on behalf of the platform rather than a tap.
    #[must_use]
    pub const fn is_user_initiated(&self) -> bool {
        !matches!(
            self,
            Self::Noop
                | Self::ClientConfigured(_)
                | Self::AppStarted
                | Self::SplashTimerElapsed
                | Self::PlatformSchemeChanged { .. }
                | Self::OtpTick
                | Self::NotificationReceived(_)
                | Self::HttpCompleted(_)
                | Self::StoreCompleted(_)
                | Self::LinkCompleted { .. }
        )
    }

    /// Keystroke-level events are not worth a log line each.
    #[must_use]
    pub const fn is_text_input(&self) -> bool {
        matches!(
            self,
            Self::IdentityChanged { .. }
                | Self::OtpDigitEntered { .. }
                | Self::SetupNameChanged { .. }
                | Self::SetupCityQueryChanged { .. }
                | Self::EditNameChanged { .. }
                | Self::EditCityChanged { .. }
                | Self::NewPhoneChanged { .. }
                | Self::PhoneChangeCodeChanged { .. }
                | Self::TicketSubjectChanged { .. }
                | Self::TicketMessageChanged { .. }
                | Self::TicketOrderIdChanged { .. }
                | Self::ChatDraftChanged { .. }
        )
    }
}
