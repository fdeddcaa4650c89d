use serde::{Deserialize, Serialize};

use crate::config::Links;
use crate::forms::{EditProfileForm, LoginForm, OtpForm, PhoneChangeForm, ProfileSetupForm};
use crate::navigation::{OnboardingCarousel, ProfileNavigator, RootNavigator, SplashGate, TabNavigator};
use crate::notifications::NotificationFeed;
use crate::session::{SessionController, User};
use crate::support::SupportNavigator;
use crate::theme::ThemePreference;
use crate::{current_time_ms, AppError, ToastMessage};

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    Fr,
    Ar,
    En,
}

impl Language {
    pub const ALL: [Language; 3] = [Language::Fr, Language::Ar, Language::En];

    pub const fn code(self) -> &'static str {
        match self {
            Self::Fr => "fr",
            Self::Ar => "ar",
            Self::En => "en",
        }
    }

    /// Name of the language in French, as the picker lists it.
    pub const fn label(self) -> &'static str {
        match self {
            Self::Fr => "Français",
            Self::Ar => "Arabe",
            Self::En => "Anglais",
        }
    }

    pub const fn native_name(self) -> &'static str {
        match self {
            Self::Fr => "Français",
            Self::Ar => "العربية",
            Self::En => "English",
        }
    }

    pub const fn is_rtl(self) -> bool {
        matches!(self, Self::Ar)
    }
}

/// Everything the core knows. Each controller owns its own field; the only
/// shared state is the session.
#[derive(Default, Debug, Clone)]
pub struct Model {
    pub root: RootNavigator,
    pub splash: SplashGate,
    pub onboarding: OnboardingCarousel,
    pub login: LoginForm,
    pub otp: OtpForm,
    pub setup: ProfileSetupForm,

    pub tabs: TabNavigator,
    pub profile: ProfileNavigator,
    pub edit_profile: EditProfileForm,
    pub phone_change: PhoneChangeForm,
    pub support: SupportNavigator,
    pub notifications: NotificationFeed,

    pub session: SessionController,
    pub logging_out: bool,
    pub links: Links,

    pub theme: ThemePreference,
    pub language: Language,

    pub alert: Option<AppError>,
    pub toast: Option<ToastMessage>,
    pub view_timestamp_ms: u64,
}

impl Model {
    pub fn update_timestamp(&mut self) {
        self.view_timestamp_ms = current_time_ms();
    }

    pub fn set_alert(&mut self, error: AppError) {
        self.alert = Some(error);
    }

    pub fn show_toast(&mut self, toast: ToastMessage) {
        self.toast = Some(toast);
    }

    pub fn user(&self) -> Option<&User> {
        self.session.user()
    }

    /// Drops everything tied to the signed-in account. Theme, language and
    /// the remembered identity survive.
    pub fn clear_session(&mut self) {
        self.session.sign_out();
        self.tabs = TabNavigator::default();
        self.profile.reset();
        self.edit_profile = EditProfileForm::default();
        self.phone_change = PhoneChangeForm::default();
        self.support.reset();
        self.notifications.clear();
        self.otp = OtpForm::default();
        self.setup = ProfileSetupForm::default();
        self.login = LoginForm::prefilled(self.session.remembered_identity());
    }
}
