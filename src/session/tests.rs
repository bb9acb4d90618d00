//! Session layer tests

use super::*;
use chrono::Utc;
use serde_json::json;
use std::time::Duration;

#[test]
fn test_attributes_round_trip() {
    let session = Session::new();
    session.set_attr("account_ids", &vec!["a", "b"]).unwrap();

    let ids: Option<Vec<String>> = session.attr("account_ids").unwrap();
    assert_eq!(ids, Some(vec!["a".to_string(), "b".to_string()]));

    assert_eq!(session.attr::<String>("missing").unwrap(), None);

    session.set_attr_value("nullable", Value::Null).unwrap();
    assert_eq!(session.attr::<String>("nullable").unwrap(), None);

    assert_eq!(session.remove_attr("account_ids").unwrap(), Some(json!(["a", "b"])));
}

#[test]
fn test_attr_type_mismatch_is_an_error() {
    let session = Session::new();
    session.set_attr("n", &"not a number").unwrap();
    assert!(matches!(
        session.attr::<u32>("n"),
        Err(Error::Serialization(_))
    ));
}

#[test]
fn test_declared_allow_list() {
    let session = Session::new();
    session.declare(["token", "account_id"]).unwrap();
    session.declare(["token"]).unwrap();

    assert_eq!(session.declared().unwrap(), vec!["account_id", "token"]);
    assert!(session.is_declared("token").unwrap());
    assert!(!session.is_declared("password").unwrap());
}

#[test]
fn test_reserved_names_cannot_be_declared() {
    let session = Session::new();
    for reserved in [BrowserState::COOKIES, BrowserState::URL, BrowserState::SAVED_AT] {
        assert!(matches!(
            session.declare(["token", reserved]),
            Err(Error::Configuration(_))
        ));
    }
    assert!(session.declared().unwrap().is_empty());
}

#[test]
fn test_session_cookies() {
    let session = Session::new();
    session
        .with_cookies(|jar| jar.insert(Cookie::new("sid", "abc", "bank.example")))
        .unwrap()
        .unwrap();

    assert_eq!(
        session.cookie_header("https://bank.example/").unwrap().as_deref(),
        Some("sid=abc")
    );

    session.clear_cookies().unwrap();
    assert!(session.cookies().unwrap().is_empty());
}

#[test]
fn test_browser_state_accessors() {
    let mut state = BrowserState::new();
    state.insert(BrowserState::COOKIES, json!("e30="));
    state.insert(BrowserState::URL, json!("https://bank.example/accounts"));
    state.insert(BrowserState::SAVED_AT, json!(Utc::now().to_rfc3339()));
    state.insert("token", json!("t0k"));

    assert_eq!(state.cookies(), Some("e30="));
    assert_eq!(state.url(), Some("https://bank.example/accounts"));
    assert!(state.saved_at().is_some());

    let restored = BrowserState::from_json(&state.to_json().unwrap()).unwrap();
    assert_eq!(restored, state);
    assert_eq!(restored.get("token"), Some(&json!("t0k")));
}

#[test]
fn test_browser_state_is_a_plain_json_object() {
    let state = BrowserState::from_json(r#"{"cookies":"x","url":null,"custom":3}"#).unwrap();
    assert_eq!(state.url(), None);
    let keys: Vec<&str> = state.keys().collect();
    assert_eq!(keys.len(), 3);

    assert!(BrowserState::from_json("[1,2]").is_err());
}

#[test]
fn test_freshness_policies() {
    let mut state = BrowserState::new();
    assert!(AlwaysFresh.is_fresh(&state));
    // no saved_at
    assert!(!MaxAge(Duration::from_secs(60)).is_fresh(&state));

    let two_hours_ago = Utc::now() - chrono::Duration::hours(2);
    state.insert(BrowserState::SAVED_AT, json!(two_hours_ago.to_rfc3339()));
    assert!(!MaxAge(Duration::from_secs(3600)).is_fresh(&state));
    assert!(MaxAge(Duration::from_secs(3 * 3600)).is_fresh(&state));

    let has_url = |s: &BrowserState| s.url().is_some();
    assert!(!has_url.is_fresh(&state));
}
