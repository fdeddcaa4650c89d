use serde_json::{json, Value};
use std::sync::Arc;

use sala_shared::capabilities::{
    parse_envelope, HttpError, HttpMethod, KvOperation, KvOutput, MemoryStore, SessionStore,
    StoreKey,
};
use sala_shared::event::AuthToken;
use sala_shared::navigation::AuthMode;
use sala_shared::session::{endpoints, Grant, SessionController, User};
use sala_shared::validation::PatternPhoneValidator;
use sala_shared::{AppError, ErrorKind};

fn grant_body(token: &str) -> Value {
    json!({
        "success": true,
        "token": token,
        "user": { "_id": "u1", "phoneNumber": "0612345678", "name": "Yassine", "city": "Fès" }
    })
}

fn signed_in(token: &str) -> SessionController {
    let mut session = SessionController::default();
    session.sign_in(SessionController::read_grant(grant_body(token)).unwrap());
    session
}

fn stored(entries: &[(StoreKey, &str)]) -> KvOutput {
    KvOutput {
        values: entries.iter().map(|(k, v)| (*k, (*v).to_string())).collect(),
    }
}

#[test]
fn test_otp_request_posts_normalized_number() {
    let session = SessionController::default();

    let (phone, request) = session.otp_request("+212 6 12 34 56 78", AuthMode::Register).unwrap();
    assert_eq!(phone.as_str(), "0612345678");
    assert_eq!(request.method(), HttpMethod::Post);
    assert_eq!(request.path(), endpoints::REGISTER);
    assert_eq!(request.body(), Some(&json!({ "phoneNumber": "0612345678" })));
    assert!(request.bearer().is_none());

    let (_, request) = session.otp_request("0612345678", AuthMode::Login).unwrap();
    assert_eq!(request.path(), endpoints::LOGIN);
}

#[test]
fn test_invalid_phone_builds_no_request() {
    let session = SessionController::default();

    let err = session.otp_request("12345", AuthMode::Login).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Validation);
}

#[test]
fn test_custom_pattern_replaces_the_default_rule() {
    let session = SessionController::default()
        .with_validator(Arc::new(PatternPhoneValidator::new(r"\+33[0-9]{9}").unwrap()));

    assert!(session.otp_request("0612345678", AuthMode::Login).is_err());
    let (phone, _) = session.otp_request("+33 612345678", AuthMode::Login).unwrap();
    assert_eq!(phone.as_str(), "+33612345678");
}

#[test]
fn test_malformed_code_builds_no_request() {
    let session = SessionController::default();

    assert!(session.verify_request("0612345678", "12a4").is_err());
    let request = session.verify_request("06 12 34 56 78", "123456").unwrap();
    assert_eq!(request.path(), endpoints::VERIFY);
    assert_eq!(
        request.body(),
        Some(&json!({ "phoneNumber": "0612345678", "code": "123456" }))
    );
}

#[test]
fn test_grant_carries_token_and_user() {
    let grant = SessionController::read_grant(grant_body("jwt-1")).unwrap();
    assert_eq!(grant.token, AuthToken::new("jwt-1"));
    assert_eq!(grant.user.as_ref().and_then(|u| u.name.as_deref()), Some("Yassine"));

    let mut session = SessionController::default();
    session.sign_in(grant);
    assert!(session.is_authenticated());
    assert!(session.session().is_authenticated());
    assert_eq!(session.bearer().unwrap(), AuthToken::new("jwt-1"));
}

#[test]
fn test_grant_without_token_is_rejected() {
    let err = SessionController::read_grant(json!({ "success": true, "message": "Code expiré" }))
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Rejected);
    assert_eq!(err.message, "Code expiré");

    let err = SessionController::read_grant(json!({ "success": true, "token": "  " })).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Rejected);
}

#[test]
fn test_rejected_verification_surfaces_server_message() {
    let err = AppError::from(HttpError::Status {
        status: 400,
        message: "Code invalide".into(),
        data: json!({ "success": false, "message": "Code invalide" }),
        request_id: "r-1".into(),
    });
    assert_eq!(err.status, Some(400));
    assert_eq!(err.user_facing_message(), "Code invalide");
    assert_eq!(err.data.as_ref().and_then(|d| d.get("success")), Some(&json!(false)));
}

#[test]
fn test_envelope_with_success_false_is_an_error() {
    let err = parse_envelope::<Value>(json!({ "success": false, "message": "Numéro bloqué" }))
        .unwrap_err();
    assert_eq!(err.user_facing_message(), "Numéro bloqué");
    assert!(SessionController::read_ack(json!({ "success": true })).is_ok());
}

#[test]
fn test_profile_request_needs_a_session() {
    let err = SessionController::default()
        .profile_request("Yassine", "Fès")
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Authorization);

    let request = signed_in("jwt-1").profile_request(" Yassine B. ", "Tanger").unwrap();
    assert_eq!(request.method(), HttpMethod::Put);
    assert_eq!(request.path(), endpoints::PROFILE);
    assert_eq!(request.body(), Some(&json!({ "name": "Yassine B.", "city": "Tanger" })));
    assert_eq!(request.bearer().map(|t| t.expose()), Some("jwt-1"));
}

#[test]
fn test_profile_reply_replaces_cached_user() {
    let mut session = signed_in("jwt-1");
    let user = SessionController::read_user(json!({
        "success": true,
        "user": { "phoneNumber": "0612345678", "name": "Yassine B.", "city": "Tanger" }
    }))
    .unwrap()
    .unwrap();

    session.replace_user(user.clone());
    assert_eq!(session.user(), Some(&user));
    assert_eq!(
        SessionController::user_write(&user).unwrap(),
        KvOperation::Write {
            entries: vec![(StoreKey::CachedUser, serde_json::to_string(&user).unwrap())],
        }
    );
}

#[test]
fn test_phone_change_uses_the_old_token_then_rotates_it() {
    let mut session = signed_in("jwt-old");

    let (new_phone, request) = session.phone_change_request("07 00 00 00 00").unwrap();
    assert_eq!(new_phone.as_str(), "0700000000");
    assert_eq!(request.path(), endpoints::PHONE_CHANGE_REQUEST);
    assert_eq!(request.body(), Some(&json!({ "newPhoneNumber": "0700000000" })));

    let request = session
        .phone_change_verify_request(new_phone.as_str(), "654321")
        .unwrap();
    assert_eq!(request.path(), endpoints::PHONE_CHANGE_VERIFY);
    assert_eq!(request.bearer().map(|t| t.expose()), Some("jwt-old"));

    let grant = SessionController::read_grant(json!({
        "success": true,
        "token": "jwt-new",
        "user": { "phoneNumber": "0700000000", "name": "Yassine", "city": "Fès" }
    }))
    .unwrap();
    session.sign_in(grant);
    assert_eq!(session.token(), Some(&AuthToken::new("jwt-new")));
    assert_eq!(session.user().map(|u| u.phone_number.as_str()), Some("0700000000"));
}

#[test]
fn test_grant_without_user_keeps_the_cached_one() {
    let mut session = signed_in("jwt-1");
    session.sign_in(Grant {
        token: AuthToken::new("jwt-2"),
        user: None,
    });
    assert_eq!(session.user().and_then(|u| u.name.as_deref()), Some("Yassine"));
}

#[test]
fn test_sign_out_keeps_remembered_identity() {
    let mut session = signed_in("jwt-1");
    session.remember(Some("0612345678".into()));

    session.sign_out();
    session.sign_out();

    assert!(session.token().is_none());
    assert!(session.user().is_none());
    assert_eq!(session.remembered_identity(), Some("0612345678"));
    assert_eq!(session.bearer().unwrap_err().kind, ErrorKind::Authorization);
    assert_eq!(
        SessionController::clear_delete(),
        KvOperation::Delete {
            keys: vec![StoreKey::AuthToken, StoreKey::CachedUser],
        }
    );
}

#[test]
fn test_restore_reads_what_was_stored() {
    let user = User {
        id: None,
        phone_number: "0612345678".into(),
        name: Some("Yassine".into()),
        city: None,
    };
    let raw_user = serde_json::to_string(&user).unwrap();
    let mut session = SessionController::default();

    session.restore(&stored(&[
        (StoreKey::AuthToken, "jwt-1"),
        (StoreKey::CachedUser, &raw_user),
        (StoreKey::RememberedIdentity, " 0612345678 "),
    ]));

    assert_eq!(session.token(), Some(&AuthToken::new("jwt-1")));
    assert_eq!(session.user(), Some(&user));
    assert_eq!(session.remembered_identity(), Some("0612345678"));
}

#[test]
fn test_corrupt_cached_user_reads_as_absent() {
    let mut session = SessionController::default();
    session.restore(&stored(&[
        (StoreKey::AuthToken, "jwt-1"),
        (StoreKey::CachedUser, "{not json"),
        (StoreKey::RememberedIdentity, "   "),
    ]));

    assert!(session.is_authenticated());
    assert!(session.user().is_none());
    assert!(session.remembered_identity().is_none());
}

#[test]
fn test_blank_token_reads_as_signed_out() {
    let mut session = SessionController::default();
    session.restore(&stored(&[(StoreKey::AuthToken, "  ")]));
    assert!(!session.is_authenticated());
}

#[tokio::test]
async fn test_stored_grant_survives_a_restart() {
    let store = MemoryStore::new();
    let grant = SessionController::read_grant(grant_body("jwt-1")).unwrap();

    store
        .execute(SessionController::grant_write(&grant).unwrap())
        .await
        .unwrap();
    store
        .execute(SessionController::remember_write("0612345678"))
        .await
        .unwrap();

    let output = store.execute(SessionController::restore_read()).await.unwrap();
    let mut restarted = SessionController::default();
    restarted.restore(&output);
    assert_eq!(restarted.token(), Some(&grant.token));
    assert_eq!(restarted.user(), grant.user.as_ref());
    assert_eq!(restarted.remembered_identity(), Some("0612345678"));

    store.execute(SessionController::clear_delete()).await.unwrap();
    let output = store.execute(SessionController::restore_read()).await.unwrap();
    assert_eq!(output.get(StoreKey::AuthToken), None);
    assert_eq!(output.get(StoreKey::RememberedIdentity), Some("0612345678"));

    store.execute(SessionController::forget_delete()).await.unwrap();
    let output = store.execute(SessionController::restore_read()).await.unwrap();
    assert!(output.values.is_empty());
}
