mod common;

use common::{fresh_user, named_user, Shell};
use sala_shared::app::{TabContent, ViewState};
use sala_shared::capabilities::{HttpError, HttpMethod, KvOperation, StoreKey};
use sala_shared::navigation::{AuthMode, MainTab, RootScreen};
use sala_shared::Event;
use serde_json::json;

fn enter_code(shell: &mut Shell, code: &str) {
    for (index, digit) in code.chars().enumerate() {
        shell.dispatch(Event::OtpDigitEntered {
            index,
            value: digit.to_string(),
        });
    }
}

fn at_otp(mode: AuthMode, phone: &str) -> Shell {
    let mut shell = Shell::at_welcome();
    shell.dispatch(Event::AuthModeChosen { mode });
    shell.dispatch(Event::IdentityChanged { value: phone.into() });
    shell.dispatch(Event::LoginSubmitted);
    shell.respond(200, json!({ "success": true, "message": "Code envoyé" }));
    assert_eq!(shell.model.root.screen(), RootScreen::Otp);
    shell
}

#[test]
fn test_splash_waits_for_both_timer_and_restore() {
    let mut shell = Shell::default();
    shell.dispatch(Event::AppStarted);
    assert_eq!(shell.kv_log.len(), 1, "one read at start-up");
    assert_eq!(shell.model.root.screen(), RootScreen::Splash, "timer still running");

    shell.dispatch(Event::SplashTimerElapsed);
    assert_eq!(shell.model.root.screen(), RootScreen::Welcome);
}

#[test]
fn test_registration_runs_through_profile_setup() {
    let mut shell = Shell::at_welcome();

    shell.dispatch(Event::AuthModeChosen { mode: AuthMode::Register });
    assert_eq!(shell.model.root.screen(), RootScreen::Login);

    shell.dispatch(Event::IdentityChanged { value: "06 12 34 56 78".into() });
    shell.dispatch(Event::LoginSubmitted);
    let request = shell.next_request();
    assert_eq!(request.method(), HttpMethod::Post);
    assert_eq!(request.path(), "/client/auth/register");
    assert_eq!(request.body(), Some(&json!({ "phoneNumber": "0612345678" })));
    assert!(request.bearer().is_none());
    assert!(shell.model.login.submitting);

    // A second tap while the request is in flight sends nothing.
    shell.dispatch(Event::LoginSubmitted);
    assert_eq!(shell.pending().len(), 1);

    shell.respond(200, json!({ "success": true }));
    assert_eq!(shell.model.root.screen(), RootScreen::Otp);
    assert_eq!(shell.model.root.identity(), Some("0612345678"));

    enter_code(&mut shell, "123456");
    assert_eq!(
        shell.next_request().body(),
        Some(&json!({ "phoneNumber": "0612345678", "code": "123456" }))
    );
    shell.respond(
        200,
        json!({ "success": true, "token": "jwt-1", "user": fresh_user("0612345678") }),
    );
    assert_eq!(shell.model.root.screen(), RootScreen::ProfileSetup);
    assert!(shell.model.session.is_authenticated());
    assert_eq!(shell.store.get(&StoreKey::AuthToken).map(String::as_str), Some("jwt-1"));
    assert!(shell.store.contains_key(&StoreKey::CachedUser));

    shell.dispatch(Event::SetupNameChanged { value: "Yassine".into() });
    shell.dispatch(Event::SetupCityQueryChanged { query: "casa".into() });
    match shell.app.view(&shell.model).state {
        ViewState::ProfileSetup { cities, .. } => assert_eq!(cities, vec!["Casablanca".to_string()]),
        other => panic!("unexpected view {other:?}"),
    }
    shell.dispatch(Event::SetupCitySelected { city: "Casablanca".into() });

    shell.dispatch(Event::ProfileSetupSubmitted);
    let save = shell.next_request();
    assert_eq!(save.method(), HttpMethod::Put);
    assert_eq!(save.path(), "/client/auth/profile");
    assert_eq!(save.bearer().map(|t| t.expose()), Some("jwt-1"));
    assert_eq!(save.body(), Some(&json!({ "name": "Yassine", "city": "Casablanca" })));

    let saved = named_user("0612345678", "Yassine", "Casablanca");
    shell.respond(200, json!({ "success": true, "user": saved }));

    assert_eq!(shell.model.root.screen(), RootScreen::Main);
    assert!(shell.store[&StoreKey::CachedUser].contains("Yassine"));
    match shell.app.view(&shell.model).state {
        ViewState::Main { active_tab, content, .. } => {
            assert_eq!(active_tab, MainTab::Accueil);
            assert_eq!(
                content,
                TabContent::Accueil {
                    greeting: "Bonjour, Yassine".into()
                }
            );
        }
        other => panic!("unexpected view {other:?}"),
    }
}

#[test]
fn test_invalid_phone_is_refused_before_any_request() {
    let mut shell = Shell::at_welcome();
    shell.dispatch(Event::AuthModeChosen { mode: AuthMode::Login });
    shell.dispatch(Event::IdentityChanged { value: "12345".into() });
    shell.dispatch(Event::LoginSubmitted);

    assert!(shell.pending().is_empty());
    assert!(!shell.model.login.submitting);
    assert!(shell.app.view(&shell.model).alert.is_some());
}

#[test]
fn test_login_goes_straight_to_main_and_remembers_identity() {
    let mut shell = Shell::at_welcome();
    shell.dispatch(Event::AuthModeChosen { mode: AuthMode::Login });
    shell.dispatch(Event::IdentityChanged { value: "0700000000".into() });
    shell.dispatch(Event::RememberMeToggled);
    shell.dispatch(Event::LoginSubmitted);
    assert_eq!(shell.next_request().path(), "/client/auth/login");

    shell.respond(200, json!({ "success": true }));
    assert_eq!(
        shell.store.get(&StoreKey::RememberedIdentity).map(String::as_str),
        Some("0700000000")
    );

    enter_code(&mut shell, "654321");
    shell.respond(
        200,
        json!({ "success": true, "token": "jwt-2", "user": named_user("0700000000", "Salma", "Rabat") }),
    );
    assert_eq!(shell.model.root.screen(), RootScreen::Main);
}

#[test]
fn test_grant_without_token_is_a_rejection() {
    let mut shell = at_otp(AuthMode::Login, "0612345678");
    enter_code(&mut shell, "123456");
    shell.respond(200, json!({ "success": true, "message": "Compte suspendu" }));

    assert_eq!(shell.model.root.screen(), RootScreen::Otp);
    assert!(!shell.model.session.is_authenticated());
    assert!(!shell.store.contains_key(&StoreKey::AuthToken));
    let alert = shell.app.view(&shell.model).alert.unwrap();
    assert_eq!(alert.message, "Compte suspendu");
}

#[test]
fn test_failed_grant_write_keeps_user_signed_out() {
    let mut shell = at_otp(AuthMode::Login, "0612345678");
    shell.store_fails = true;
    enter_code(&mut shell, "123456");
    shell.respond(200, json!({ "success": true, "token": "jwt", "user": fresh_user("0612345678") }));

    assert_eq!(shell.model.root.screen(), RootScreen::Otp);
    assert!(!shell.model.session.is_authenticated());
    let view = shell.app.view(&shell.model);
    assert!(view.alert.is_some());
    match view.state {
        ViewState::Otp { verifying, cells, .. } => {
            assert!(!verifying);
            assert!(cells.iter().all(String::is_empty));
        }
        other => panic!("unexpected view {other:?}"),
    }
}

#[test]
fn test_stored_session_skips_welcome() {
    let mut shell = Shell::with_store(&[
        (StoreKey::AuthToken, "tok"),
        (StoreKey::CachedUser, r#"{"phoneNumber":"0612345678","name":"Yassine"}"#),
        (StoreKey::ThemeMode, "dark"),
    ]);
    shell.dispatch(Event::AppStarted);
    shell.dispatch(Event::SplashTimerElapsed);

    assert_eq!(shell.model.root.screen(), RootScreen::Main);
    let view = shell.app.view(&shell.model);
    assert!(view.is_authenticated);
    assert_eq!(view.theme_mode, sala_shared::theme::ThemeMode::Dark);
}

#[test]
fn test_corrupt_cached_user_still_restores_the_token() {
    let mut shell = Shell::with_store(&[(StoreKey::AuthToken, "tok"), (StoreKey::CachedUser, "{not json")]);
    shell.dispatch(Event::AppStarted);
    assert!(shell.model.session.is_authenticated());
    assert!(shell.model.user().is_none());
}

#[test]
fn test_failed_restore_lands_on_welcome() {
    let mut shell = Shell::default();
    shell.store_fails = true;
    shell.dispatch(Event::AppStarted);
    shell.dispatch(Event::SplashTimerElapsed);
    assert_eq!(shell.model.root.screen(), RootScreen::Welcome);
}

#[test]
fn test_wrong_code_clears_cells_and_alerts() {
    let mut shell = at_otp(AuthMode::Login, "0612345678");
    enter_code(&mut shell, "000000");
    shell.respond(400, json!({ "message": "Code invalide" }));

    assert_eq!(shell.model.root.screen(), RootScreen::Otp);
    let view = shell.app.view(&shell.model);
    assert_eq!(view.alert.map(|a| a.message), Some("Code invalide".to_string()));
    match view.state {
        ViewState::Otp { cells, verifying, .. } => {
            assert!(cells.iter().all(String::is_empty));
            assert!(!verifying);
        }
        other => panic!("unexpected view {other:?}"),
    }
}

#[test]
fn test_timeout_shows_the_timeout_message() {
    let mut shell = Shell::at_welcome();
    shell.dispatch(Event::AuthModeChosen { mode: AuthMode::Login });
    shell.dispatch(Event::IdentityChanged { value: "0612345678".into() });
    shell.dispatch(Event::LoginSubmitted);
    shell.fail(HttpError::Timeout {
        timeout_ms: 10_000,
        request_id: "r".into(),
    });

    assert!(!shell.model.login.submitting);
    let alert = shell.app.view(&shell.model).alert.unwrap();
    assert_eq!(alert.message, sala_shared::TIMEOUT_MESSAGE);
}

#[test]
fn test_resend_waits_for_the_countdown() {
    let mut shell = at_otp(AuthMode::Login, "0612345678");

    shell.dispatch(Event::OtpResendRequested);
    assert!(shell.pending().is_empty());

    while shell.model.otp.seconds_left() > 0 {
        shell.dispatch(Event::OtpTick);
    }
    let renders = shell.renders;
    shell.dispatch(Event::OtpTick);
    assert_eq!(shell.renders, renders, "a stalled countdown does not render");

    shell.dispatch(Event::OtpResendRequested);
    assert_eq!(shell.next_request().path(), "/client/auth/login");

    shell.respond(200, json!({ "success": true }));
    assert_eq!(shell.model.otp.seconds_left(), sala_shared::OTP_RESEND_SECONDS);
    assert!(shell.app.view(&shell.model).toast.is_some());
}

#[test]
fn test_back_from_login_returns_to_welcome() {
    let mut shell = Shell::at_welcome();
    shell.dispatch(Event::AuthModeChosen { mode: AuthMode::Register });
    shell.dispatch(Event::BackPressed);
    assert_eq!(shell.model.root.screen(), RootScreen::Welcome);
}

#[test]
fn test_logout_returns_to_welcome_with_remembered_identity() {
    let user = serde_json::to_string(&fresh_user("0612345678")).unwrap();
    let mut shell = Shell::with_store(&[
        (StoreKey::AuthToken, "tok"),
        (StoreKey::CachedUser, &user),
        (StoreKey::RememberedIdentity, "0612345678"),
    ]);
    shell.dispatch(Event::AppStarted);
    shell.dispatch(Event::SplashTimerElapsed);
    shell.dispatch(Event::TabSelected { tab: MainTab::Profil });

    shell.dispatch(Event::LogoutRequested);
    assert_eq!(
        shell.kv_log.last(),
        Some(&KvOperation::Delete {
            keys: vec![StoreKey::AuthToken, StoreKey::CachedUser]
        })
    );
    assert_eq!(shell.model.root.screen(), RootScreen::Welcome);
    assert!(!shell.model.session.is_authenticated());
    assert!(shell.model.user().is_none());
    assert!(!shell.store.contains_key(&StoreKey::AuthToken));
    assert!(shell.store.contains_key(&StoreKey::RememberedIdentity));

    shell.dispatch(Event::AuthModeChosen { mode: AuthMode::Login });
    match shell.app.view(&shell.model).state {
        ViewState::Login {
            identity,
            remember_me,
            ..
        } => {
            assert_eq!(identity, "0612345678");
            assert!(remember_me);
        }
        other => panic!("unexpected view {other:?}"),
    }
}

#[test]
fn test_failed_logout_keeps_the_session() {
    let mut shell = Shell::signed_in(&fresh_user("0612345678"));
    shell.store_fails = true;
    shell.dispatch(Event::LogoutRequested);

    assert_eq!(shell.model.root.screen(), RootScreen::Main);
    assert!(shell.model.session.is_authenticated());
    assert!(!shell.model.logging_out);
    assert!(shell.app.view(&shell.model).alert.is_some());
}
