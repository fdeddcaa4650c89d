//! Root, tab and profile navigators.
//!
//! Each navigator owns exactly one current view from a closed enum. Edges that
//! do not exist return [`NavigationError::InvalidTransition`] and leave the
//! state untouched.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{AppError, ErrorKind, ONBOARDING_SLIDE_COUNT, SALA_SERVICE_COUNT, SALA_SERVICE_RADIUS};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NavigationError {
    #[error("cannot {action} from {from}")]
    InvalidTransition {
        from: &'static str,
        action: &'static str,
    },

    #[error("{route:?} does not belong to the {tab:?} tab")]
    SubRouteNotOwned { route: SubRoute, tab: MainTab },
}

impl From<NavigationError> for AppError {
    fn from(e: NavigationError) -> Self {
        AppError::new(ErrorKind::InvalidState, "Action impossible depuis cet écran")
            .with_internal(e.to_string())
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuthMode {
    #[default]
    Login,
    Register,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum RootScreen {
    #[default]
    Splash,
    Welcome,
    Login,
    Otp,
    ProfileSetup,
    Main,
}

impl RootScreen {
    pub const ALL: [RootScreen; 6] = [
        RootScreen::Splash,
        RootScreen::Welcome,
        RootScreen::Login,
        RootScreen::Otp,
        RootScreen::ProfileSetup,
        RootScreen::Main,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            Self::Splash => "splash",
            Self::Welcome => "welcome",
            Self::Login => "login",
            Self::Otp => "otp",
            Self::ProfileSetup => "profile_setup",
            Self::Main => "main",
        }
    }
}

/// Every input the root navigator understands.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub enum RootAction {
    SessionChecked { has_token: bool },
    AuthModeChosen(AuthMode),
    IdentitySubmitted(String),
    OtpVerified,
    ProfileCompleted,
    Back,
    Skip,
    LoggedOut,
}

impl RootAction {
    const fn name(&self) -> &'static str {
        match self {
            Self::SessionChecked { .. } => "finish splash",
            Self::AuthModeChosen(_) => "choose auth mode",
            Self::IdentitySubmitted(_) => "submit identity",
            Self::OtpVerified => "verify otp",
            Self::ProfileCompleted => "complete profile",
            Self::Back => "go back",
            Self::Skip => "skip",
            Self::LoggedOut => "log out",
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default)]
pub struct RootNavigator {
    screen: RootScreen,
    identity: Option<String>,
    auth_mode: AuthMode,
}

impl RootNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn screen(&self) -> RootScreen {
        self.screen
    }

    pub fn identity(&self) -> Option<&str> {
        self.identity.as_deref()
    }

    pub fn auth_mode(&self) -> AuthMode {
        self.auth_mode
    }

    /// Applies one edge of the root graph. Splash is left once and never
    /// re-entered, so back and skip do not exist there.
    pub fn apply(&mut self, action: RootAction) -> Result<RootScreen, NavigationError> {
        use RootScreen as S;

        let invalid = NavigationError::InvalidTransition {
            from: self.screen.name(),
            action: action.name(),
        };

        let next = match (self.screen, action) {
            (S::Splash, RootAction::SessionChecked { has_token }) => {
                if has_token {
                    S::Main
                } else {
                    S::Welcome
                }
            }
            (S::Welcome, RootAction::AuthModeChosen(mode)) => {
                self.auth_mode = mode;
                S::Login
            }
            (S::Login, RootAction::IdentitySubmitted(identity)) => {
                self.identity = Some(identity);
                S::Otp
            }
            (S::Otp, RootAction::OtpVerified) => match self.auth_mode {
                AuthMode::Register => S::ProfileSetup,
                AuthMode::Login => S::Main,
            },
            (S::ProfileSetup, RootAction::ProfileCompleted) => S::Main,
            (S::Main, RootAction::LoggedOut) => {
                self.identity = None;
                S::Welcome
            }
            (S::Splash, RootAction::Back | RootAction::Skip) => return Err(invalid),
            (_, RootAction::Back) => S::Welcome,
            (_, RootAction::Skip) => S::Main,
            _ => return Err(invalid),
        };

        self.screen = next;
        Ok(next)
    }
}

/// The splash leaves once both the shell's timer and the session check are done.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct SplashGate {
    timer_elapsed: bool,
    has_token: Option<bool>,
    released: bool,
}

impl SplashGate {
    /// Returns `Some(has_token)` the first time both halves are complete.
    pub fn timer_elapsed(&mut self) -> Option<bool> {
        self.timer_elapsed = true;
        self.release()
    }

    pub fn session_checked(&mut self, has_token: bool) -> Option<bool> {
        self.has_token = Some(has_token);
        self.release()
    }

    fn release(&mut self) -> Option<bool> {
        if self.released || !self.timer_elapsed {
            return None;
        }
        let has_token = self.has_token?;
        self.released = true;
        Some(has_token)
    }
}

#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct OnboardingSlide {
    pub title: &'static str,
    pub description: &'static str,
}

pub const ONBOARDING_SLIDES: [OnboardingSlide; ONBOARDING_SLIDE_COUNT] = [
    OnboardingSlide {
        title: "Bienvenue sur SALA",
        description: "Votre partenaire de confiance pour des livraisons sécurisées et faciles",
    },
    OnboardingSlide {
        title: "Rapide & Sécurisé",
        description: "Profitez de paiements fluides avec une sécurité de premier ordre",
    },
    OnboardingSlide {
        title: "Commencer",
        description: "Rejoignez des milliers de livreurs qui utilisent SALA chaque jour",
    },
];

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct OnboardingCarousel {
    index: usize,
}

impl OnboardingCarousel {
    const LAST: usize = ONBOARDING_SLIDE_COUNT - 1;

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn slide(&self) -> OnboardingSlide {
        ONBOARDING_SLIDES[self.index.min(Self::LAST)]
    }

    pub fn is_first(&self) -> bool {
        self.index == 0
    }

    pub fn is_last(&self) -> bool {
        self.index >= Self::LAST
    }

    pub fn next(&mut self) {
        self.index = (self.index + 1).min(Self::LAST);
    }

    pub fn previous(&mut self) {
        self.index = self.index.saturating_sub(1);
    }

    pub fn skip(&mut self) {
        self.index = Self::LAST;
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum MainTab {
    #[default]
    Accueil,
    Historique,
    Profil,
}

impl MainTab {
    pub const ALL: [MainTab; 3] = [MainTab::Accueil, MainTab::Historique, MainTab::Profil];

    pub const fn label(self) -> &'static str {
        match self {
            Self::Accueil => "Accueil",
            Self::Historique => "Historique",
            Self::Profil => "Profil",
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SubRoute {
    SalaServices,
    Notifications,
    Language,
    Support,
}

impl SubRoute {
    pub const ALL: [SubRoute; 4] = [
        SubRoute::SalaServices,
        SubRoute::Notifications,
        SubRoute::Language,
        SubRoute::Support,
    ];

    pub const fn owner(self) -> MainTab {
        match self {
            Self::SalaServices => MainTab::Accueil,
            Self::Notifications | Self::Language | Self::Support => MainTab::Profil,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct TabNavigator {
    active_tab: MainTab,
    sub_route: Option<SubRoute>,
}

impl TabNavigator {
    pub fn active_tab(&self) -> MainTab {
        self.active_tab
    }

    pub fn sub_route(&self) -> Option<SubRoute> {
        self.sub_route
    }

    /// Always clears the overlay, even when `tab` is already active.
    pub fn select_tab(&mut self, tab: MainTab) {
        self.active_tab = tab;
        self.sub_route = None;
    }

    pub fn open(&mut self, route: SubRoute) -> Result<(), NavigationError> {
        if route.owner() != self.active_tab {
            return Err(NavigationError::SubRouteNotOwned {
                route,
                tab: self.active_tab,
            });
        }
        self.sub_route = Some(route);
        Ok(())
    }

    /// Returns whether an overlay was open.
    pub fn close(&mut self) -> bool {
        self.sub_route.take().is_some()
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum PhoneChangeStep {
    Request,
    Verify { new_phone: String },
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default)]
pub enum ProfileView {
    #[default]
    Menu,
    PersonalInfo,
    EditProfile,
    ChangePhone(PhoneChangeStep),
}

impl ProfileView {
    const fn name(&self) -> &'static str {
        match self {
            Self::Menu => "profile menu",
            Self::PersonalInfo => "personal info",
            Self::EditProfile => "edit profile",
            Self::ChangePhone(PhoneChangeStep::Request) => "phone change request",
            Self::ChangePhone(PhoneChangeStep::Verify { .. }) => "phone change verification",
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default)]
pub struct ProfileNavigator {
    view: ProfileView,
}

impl ProfileNavigator {
    pub fn view(&self) -> &ProfileView {
        &self.view
    }

    fn step(
        &mut self,
        action: &'static str,
        allowed: impl FnOnce(&ProfileView) -> bool,
        next: ProfileView,
    ) -> Result<(), NavigationError> {
        if !allowed(&self.view) {
            return Err(NavigationError::InvalidTransition {
                from: self.view.name(),
                action,
            });
        }
        self.view = next;
        Ok(())
    }

    pub fn open_personal_info(&mut self) -> Result<(), NavigationError> {
        self.step(
            "open personal info",
            |v| matches!(v, ProfileView::Menu),
            ProfileView::PersonalInfo,
        )
    }

    pub fn open_edit_profile(&mut self) -> Result<(), NavigationError> {
        self.step(
            "edit profile",
            |v| matches!(v, ProfileView::PersonalInfo),
            ProfileView::EditProfile,
        )
    }

    pub fn open_phone_change(&mut self) -> Result<(), NavigationError> {
        self.step(
            "change phone",
            |v| matches!(v, ProfileView::PersonalInfo),
            ProfileView::ChangePhone(PhoneChangeStep::Request),
        )
    }

    pub fn phone_code_sent(&mut self, new_phone: String) -> Result<(), NavigationError> {
        self.step(
            "verify new phone",
            |v| matches!(v, ProfileView::ChangePhone(PhoneChangeStep::Request)),
            ProfileView::ChangePhone(PhoneChangeStep::Verify { new_phone }),
        )
    }

    pub fn profile_saved(&mut self) -> Result<(), NavigationError> {
        self.step(
            "save profile",
            |v| matches!(v, ProfileView::EditProfile),
            ProfileView::PersonalInfo,
        )
    }

    pub fn phone_changed(&mut self) -> Result<(), NavigationError> {
        self.step(
            "confirm phone change",
            |v| matches!(v, ProfileView::ChangePhone(PhoneChangeStep::Verify { .. })),
            ProfileView::PersonalInfo,
        )
    }

    /// Pops one level. Returns `false` at the menu, where the tab owns back.
    pub fn back(&mut self) -> bool {
        self.view = match &self.view {
            ProfileView::Menu => return false,
            ProfileView::PersonalInfo => ProfileView::Menu,
            ProfileView::EditProfile | ProfileView::ChangePhone(PhoneChangeStep::Request) => {
                ProfileView::PersonalInfo
            }
            ProfileView::ChangePhone(PhoneChangeStep::Verify { .. }) => {
                ProfileView::ChangePhone(PhoneChangeStep::Request)
            }
        };
        true
    }

    pub fn reset(&mut self) {
        self.view = ProfileView::Menu;
    }
}

#[derive(Serialize, Clone, Copy, Debug, PartialEq)]
pub struct ServiceOption {
    pub id: u8,
    pub title: &'static str,
    pub icon: &'static str,
    /// Offset from the center of the circle, in points.
    pub x: f64,
    pub y: f64,
}

const SERVICE_OPTIONS: [(&str, &str); SALA_SERVICE_COUNT] = [
    ("Option 1", "star-outline"),
    ("Option 2", "heart-outline"),
    ("Option 3", "bell-outline"),
    ("Option 4", "cog-outline"),
    ("Option 5", "shield-outline"),
];

/// Places the service buttons on a circle, first one at the top.
pub fn sala_service_layout() -> Vec<ServiceOption> {
    let step = 360.0 / SALA_SERVICE_COUNT as f64;
    SERVICE_OPTIONS
        .iter()
        .zip(1u8..)
        .enumerate()
        .map(|(i, (&(title, icon), id))| {
            let angle = (-90.0 + i as f64 * step).to_radians();
            ServiceOption {
                id,
                title,
                icon,
                x: SALA_SERVICE_RADIUS * angle.cos(),
                y: SALA_SERVICE_RADIUS * angle.sin(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    mod root_tests {
        use super::*;

        #[test]
        fn test_register_flow_goes_through_profile_setup() {
            let mut nav = RootNavigator::new();
            nav.apply(RootAction::SessionChecked { has_token: false }).unwrap();
            nav.apply(RootAction::AuthModeChosen(AuthMode::Register)).unwrap();
            nav.apply(RootAction::IdentitySubmitted("0612345678".into())).unwrap();
            assert_eq!(nav.identity(), Some("0612345678"));
            assert_eq!(nav.apply(RootAction::OtpVerified), Ok(RootScreen::ProfileSetup));
            assert_eq!(nav.apply(RootAction::ProfileCompleted), Ok(RootScreen::Main));
        }

        #[test]
        fn test_splash_with_token_goes_to_main() {
            let mut nav = RootNavigator::new();
            assert_eq!(
                nav.apply(RootAction::SessionChecked { has_token: true }),
                Ok(RootScreen::Main)
            );
        }

        #[test]
        fn test_invalid_edges_leave_state_alone() {
            let mut nav = RootNavigator::new();
            assert!(nav.apply(RootAction::Back).is_err());
            assert!(nav.apply(RootAction::OtpVerified).is_err());
            assert_eq!(nav.screen(), RootScreen::Splash);

            nav.apply(RootAction::SessionChecked { has_token: false }).unwrap();
            assert!(nav.apply(RootAction::LoggedOut).is_err());
            assert!(nav
                .apply(RootAction::SessionChecked { has_token: true })
                .is_err());
            assert_eq!(nav.screen(), RootScreen::Welcome);
        }

        #[test]
        fn test_logout_returns_to_welcome() {
            let mut nav = RootNavigator::new();
            nav.apply(RootAction::SessionChecked { has_token: true }).unwrap();
            assert_eq!(nav.apply(RootAction::LoggedOut), Ok(RootScreen::Welcome));
        }

        #[test]
        fn test_splash_gate_waits_for_both() {
            let mut gate = SplashGate::default();
            assert_eq!(gate.session_checked(true), None);
            assert_eq!(gate.timer_elapsed(), Some(true));
            assert_eq!(gate.timer_elapsed(), None);

            let mut gate = SplashGate::default();
            assert_eq!(gate.timer_elapsed(), None);
            assert_eq!(gate.session_checked(false), Some(false));
        }
    }

    mod carousel_tests {
        use super::*;

        #[test]
        fn test_carousel_clamps() {
            let mut c = OnboardingCarousel::default();
            c.previous();
            assert!(c.is_first());
            c.next();
            c.next();
            c.next();
            assert!(c.is_last());
            assert_eq!(c.index(), ONBOARDING_SLIDE_COUNT - 1);

            let mut c = OnboardingCarousel::default();
            c.skip();
            assert_eq!(c.slide().title, "Commencer");
        }
    }

    mod tab_tests {
        use super::*;

        #[test]
        fn test_select_tab_clears_sub_route() {
            let mut tabs = TabNavigator::default();
            tabs.open(SubRoute::SalaServices).unwrap();
            tabs.select_tab(MainTab::Accueil);
            assert_eq!(tabs.sub_route(), None);
        }

        #[test]
        fn test_foreign_sub_route_is_rejected() {
            let mut tabs = TabNavigator::default();
            let before = tabs;
            assert!(tabs.open(SubRoute::Support).is_err());
            assert_eq!(tabs, before);

            tabs.select_tab(MainTab::Profil);
            tabs.open(SubRoute::Language).unwrap();
            assert!(tabs.close());
            assert!(!tabs.close());
        }
    }

    mod profile_tests {
        use super::*;

        #[test]
        fn test_phone_change_back_pops_one_level() {
            let mut nav = ProfileNavigator::default();
            nav.open_personal_info().unwrap();
            nav.open_phone_change().unwrap();
            nav.phone_code_sent("0700000000".into()).unwrap();

            assert!(nav.back());
            assert_eq!(nav.view(), &ProfileView::ChangePhone(PhoneChangeStep::Request));
            assert!(nav.back());
            assert_eq!(nav.view(), &ProfileView::PersonalInfo);
            assert!(nav.back());
            assert_eq!(nav.view(), &ProfileView::Menu);
            assert!(!nav.back());
        }

        #[test]
        fn test_edit_profile_requires_personal_info() {
            let mut nav = ProfileNavigator::default();
            assert!(nav.open_edit_profile().is_err());
            nav.open_personal_info().unwrap();
            nav.open_edit_profile().unwrap();
            nav.profile_saved().unwrap();
            assert_eq!(nav.view(), &ProfileView::PersonalInfo);
        }
    }

    #[test]
    fn test_service_layout_starts_at_top() {
        let layout = sala_service_layout();
        assert_eq!(layout.len(), SALA_SERVICE_COUNT);
        assert!(layout[0].x.abs() < 1e-9);
        assert!((layout[0].y + SALA_SERVICE_RADIUS).abs() < 1e-9);
        for option in &layout {
            let r = option.x.hypot(option.y);
            assert!((r - SALA_SERVICE_RADIUS).abs() < 1e-9);
        }
    }
}
