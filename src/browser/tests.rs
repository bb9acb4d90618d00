//! Browser tests

use super::*;
use crate::http::{MockHttpClient, MockReply};
use crate::page::{JsonPage, PageContext, RawPage};
use crate::session::{AlwaysFresh, BrowserState, MaxAge};
use async_trait::async_trait;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

const BASE: &str = "https://bank.example/";

fn url(path: &str) -> String {
    format!("https://bank.example{}", path)
}

#[derive(Debug)]
struct LoginPage {
    ctx: PageContext,
}

#[async_trait]
impl Page for LoginPage {
    fn context(&self) -> &PageContext {
        &self.ctx
    }

    fn on_leave(&self) {
        let _ = self.ctx.session.set_attr("left_login", &true);
    }
}

#[derive(Debug)]
struct AccountsPage {
    ctx: PageContext,
}

impl Page for AccountsPage {
    fn context(&self) -> &PageContext {
        &self.ctx
    }

    fn logged(&self) -> bool {
        true
    }
}

#[derive(Debug)]
struct HistoryPage {
    ctx: PageContext,
}

impl Page for HistoryPage {
    fn context(&self) -> &PageContext {
        &self.ctx
    }

    fn logged(&self) -> bool {
        true
    }
}

/// Lands on the accounts list as soon as it is loaded
#[derive(Debug)]
struct JumpPage {
    ctx: PageContext,
}

#[async_trait]
impl Page for JumpPage {
    fn context(&self) -> &PageContext {
        &self.ctx
    }

    async fn on_load(&self, browser: &Browser) -> Result<()> {
        browser.go("accounts", &[]).await.map(|_| ())
    }
}

fn registry() -> Registry {
    Registry::new()
        .register(
            "login",
            UrlPattern::new(["/login"]).unwrap().with_page(|ctx| Ok(LoginPage { ctx })),
        )
        .register(
            "accounts",
            UrlPattern::new(["/accounts$"]).unwrap().with_page(|ctx| Ok(AccountsPage { ctx })),
        )
        .register(
            "history",
            UrlPattern::new([r"/accounts/(?P<id>\d+)/history"])
                .unwrap()
                .with_page(|ctx| Ok(HistoryPage { ctx })),
        )
        .register(
            "jump",
            UrlPattern::new(["/jump"]).unwrap().with_page(|ctx| Ok(JumpPage { ctx })),
        )
        .register(
            "feed",
            UrlPattern::new([r"/feed\?page=(?P<page>\d+)"]).unwrap().with_page(JsonPage::new),
        )
        .register("wait", UrlPattern::new(["/wait"]).unwrap().with_page(|ctx| Ok(RawPage::new(ctx))))
        .register("raw", UrlPattern::new(["/raw"]).unwrap())
}

fn browser_with(config: BrowserConfig) -> (MockHttpClient, Browser) {
    let mock = MockHttpClient::new();
    let browser = Browser::new(config, Arc::new(mock.clone()), &registry()).unwrap();
    (mock, browser)
}

fn setup() -> (MockHttpClient, Browser) {
    browser_with(BrowserConfig::with_base_url(BASE))
}

// Navigation

#[tokio::test]
async fn test_open_leaves_current_page_alone() {
    let (mock, browser) = setup();
    mock.on(&url("/accounts"), MockReply::ok("accounts"));

    let loaded = browser.open("/accounts").await.unwrap();
    assert_eq!(loaded.page_name.as_deref(), Some("accounts"));
    assert!(loaded.page_as::<AccountsPage>().is_some());
    assert!(loaded.page_as::<LoginPage>().is_none());
    assert!(browser.page().unwrap().is_none());
}

#[tokio::test]
async fn test_location_sets_current_and_runs_hooks() {
    let (mock, browser) = setup();
    mock.on(&url("/login"), MockReply::ok("login"));
    mock.on(&url("/accounts"), MockReply::ok("accounts"));

    browser.location("/login").await.unwrap();
    assert_eq!(browser.page_name().unwrap().as_deref(), Some("login"));
    assert_eq!(browser.session().attr::<bool>("left_login").unwrap(), None);

    browser.location("/accounts").await.unwrap();
    assert_eq!(browser.page_name().unwrap().as_deref(), Some("accounts"));
    assert_eq!(browser.url().unwrap(), Some(url("/accounts")));
    assert!(browser.page_as::<AccountsPage>().unwrap().is_some());
    assert_eq!(browser.session().attr::<bool>("left_login").unwrap(), Some(true));
}

#[tokio::test]
async fn test_on_load_may_navigate_again() {
    let (mock, browser) = setup();
    mock.on(&url("/jump"), MockReply::ok("jump"));
    mock.on(&url("/accounts"), MockReply::ok("accounts"));

    let loaded = browser.location("/jump").await.unwrap();
    assert_eq!(loaded.page_name.as_deref(), Some("accounts"));
    assert_eq!(browser.url().unwrap(), Some(url("/accounts")));
    assert_eq!(mock.requested_urls(), vec![url("/jump"), url("/accounts")]);
}

#[tokio::test]
async fn test_unmatched_response_has_no_page() {
    let (mock, browser) = setup();
    mock.on(&url("/about"), MockReply::ok("about us"));

    let loaded = browser.location("/about").await.unwrap();
    assert!(loaded.page.is_none());
    assert!(loaded.page_name.is_none());
    assert_eq!(loaded.response.text(), "about us");
}

#[tokio::test]
async fn test_pattern_without_page_type_yields_no_page() {
    let (mock, browser) = setup();
    mock.on(&url("/raw"), MockReply::ok("raw"));

    let loaded = browser.open("/raw").await.unwrap();
    assert!(loaded.page.is_none());
}

#[tokio::test]
async fn test_head_responses_are_not_dispatched() {
    let (mock, browser) = setup();
    mock.on(&url("/accounts"), MockReply::ok(""));

    let loaded = browser.open(Request::head("/accounts")).await.unwrap();
    assert!(loaded.page.is_none());
    assert_eq!(mock.requests()[0].method, Method::HEAD);
}

#[tokio::test]
async fn test_go_home() {
    let (mock, browser) = setup();
    mock.on(BASE, MockReply::ok("welcome"));

    let loaded = browser.go_home().await.unwrap();
    assert_eq!(loaded.response.url, BASE);
}

#[tokio::test]
async fn test_user_agent_and_query() {
    let (mock, browser) = setup();
    mock.on(&url("/search?q=rent+due&page=2"), MockReply::ok("results"));

    browser
        .open(Request::new("/search").query("q", "rent due").query("page", "2"))
        .await
        .unwrap();

    let requests = mock.requests();
    let sent = &requests[0];
    assert_eq!(sent.url, url("/search?q=rent+due&page=2"));
    assert_eq!(
        sent.headers.get(USER_AGENT).unwrap(),
        browser.config().user_agent.as_str()
    );
}

// Redirects and refresh

#[tokio::test]
async fn test_see_other_turns_post_into_get_and_keeps_cookies() {
    let (mock, browser) = setup();
    mock.once(
        &url("/login"),
        MockReply::redirect(303, "/accounts").header("set-cookie", "sid=abc; Path=/"),
    );
    mock.on(&url("/accounts"), MockReply::ok("accounts"));

    let loaded = browser
        .location(Request::new("/login").form([("user", "alice"), ("pass", "secret")]))
        .await
        .unwrap();
    assert_eq!(loaded.page_name.as_deref(), Some("accounts"));

    let sent = mock.requests();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].method, Method::POST);
    assert!(sent[0].body.is_some());
    assert_eq!(sent[1].method, Method::GET);
    assert!(sent[1].body.is_none());
    assert!(sent[1].headers.get(CONTENT_TYPE).is_none());
    assert_eq!(sent[1].headers.get(COOKIE).unwrap(), "sid=abc");
}

#[tokio::test]
async fn test_temporary_redirect_keeps_method_and_body() {
    let (mock, browser) = setup();
    mock.once(&url("/transfer"), MockReply::redirect(307, "/transfer/confirm"));
    mock.on(&url("/transfer/confirm"), MockReply::ok("done"));

    browser
        .open(Request::new("/transfer").form([("amount", "10")]))
        .await
        .unwrap();

    let sent = mock.requests();
    assert_eq!(sent[1].method, Method::POST);
    assert_eq!(sent[1].body.as_deref(), Some(&b"amount=10"[..]));
}

#[tokio::test]
async fn test_redirects_can_be_disabled() {
    let (mock, browser) = setup();
    mock.on(&url("/old"), MockReply::redirect(302, "/accounts"));

    let loaded = browser.open(Request::new("/old").no_redirects()).await.unwrap();
    assert_eq!(loaded.response.status.as_u16(), 302);
    assert_eq!(mock.requested_urls(), vec![url("/old")]);
}

#[tokio::test]
async fn test_redirect_loop_is_bounded() {
    let config = BrowserConfig {
        max_redirects: 2,
        ..BrowserConfig::with_base_url(BASE)
    };
    let (mock, browser) = browser_with(config);
    mock.on(&url("/loop"), MockReply::redirect(302, "/loop"));

    let result = browser.open("/loop").await;
    assert!(matches!(result, Err(Error::Transport(_))));
    assert_eq!(mock.request_count(&url("/loop")), 3);
}

#[tokio::test]
async fn test_refresh_within_limit_is_followed() {
    let (mock, browser) = setup();
    mock.on(&url("/wait"), MockReply::ok("").header("refresh", "0; url=/accounts"));
    mock.on(&url("/accounts"), MockReply::ok("accounts"));

    let loaded = browser.location("/wait").await.unwrap();
    assert_eq!(loaded.page_name.as_deref(), Some("accounts"));
    assert_eq!(mock.requests()[1].method, Method::GET);
}

#[tokio::test]
async fn test_refresh_beyond_limit_is_ignored() {
    let (mock, browser) = setup();
    mock.on(&url("/wait"), MockReply::ok("").header("refresh", "5; url=/accounts"));

    let loaded = browser.location("/wait").await.unwrap();
    assert_eq!(loaded.page_name.as_deref(), Some("wait"));
    assert_eq!(mock.requested_urls(), vec![url("/wait")]);
}

#[tokio::test]
async fn test_refresh_limit_is_inclusive() {
    let config = BrowserConfig {
        refresh_max: 5.0,
        ..BrowserConfig::with_base_url(BASE)
    };
    let (mock, browser) = browser_with(config);
    mock.on(&url("/wait"), MockReply::ok("").header("refresh", "5; URL='/accounts'"));
    mock.on(&url("/accounts"), MockReply::ok("accounts"));

    let loaded = browser.location("/wait").await.unwrap();
    assert_eq!(loaded.page_name.as_deref(), Some("accounts"));
}

#[tokio::test]
async fn test_malformed_refresh_is_ignored() {
    let (mock, browser) = setup();
    mock.on(&url("/wait"), MockReply::ok("").header("refresh", "soon please"));

    let loaded = browser.location("/wait").await.unwrap();
    assert_eq!(loaded.page_name.as_deref(), Some("wait"));
    assert_eq!(mock.requested_urls().len(), 1);
}

// Errors

#[tokio::test]
async fn test_status_errors() {
    let (mock, browser) = setup();
    mock.on(&url("/missing"), MockReply::status(404));
    mock.on(&url("/forbidden"), MockReply::status(403));
    mock.on(&url("/broken"), MockReply::status(503));

    match browser.open("/missing").await {
        Err(Error::NotFound(what)) => assert_eq!(what, url("/missing")),
        other => panic!("expected not found, got {:?}", other),
    }
    match browser.open("/forbidden").await {
        Err(Error::ClientRequest { status, message }) => {
            assert_eq!(status, 403);
            assert_eq!(message, "Forbidden");
        }
        other => panic!("expected a client error, got {:?}", other),
    }
    assert!(matches!(
        browser.open("/broken").await,
        Err(Error::Server { status: 503, .. })
    ));
}

#[tokio::test]
async fn test_failed_navigation_keeps_previous_page() {
    let (mock, browser) = setup();
    mock.on(&url("/accounts"), MockReply::ok("accounts"));
    mock.fail_once(&url("/login"), "connection reset");

    browser.location("/accounts").await.unwrap();
    let result = browser.location("/login").await;
    assert!(matches!(result, Err(Error::Transport(_))));
    assert_eq!(browser.page_name().unwrap().as_deref(), Some("accounts"));
}

#[tokio::test]
async fn test_disallowed_urls_are_not_requested() {
    let config = BrowserConfig {
        allowed_prefixes: vec![BASE.to_string()],
        ..BrowserConfig::with_base_url(BASE)
    };
    let (mock, browser) = browser_with(config);
    mock.on(&url("/out"), MockReply::redirect(302, "https://evil.example/"));

    assert!(browser.url_allowed(&url("/accounts")));
    assert!(!browser.url_allowed("https://evil.example/"));

    let result = browser.open("https://evil.example/").await;
    assert!(matches!(result, Err(Error::UrlNotAllowed(_))));
    assert!(mock.requests().is_empty());

    let result = browser.open("/out").await;
    assert!(matches!(result, Err(Error::UrlNotAllowed(_))));
    assert_eq!(mock.requested_urls(), vec![url("/out")]);
}

#[tokio::test]
async fn test_restrict_to_base() {
    let config = BrowserConfig {
        restrict_to_base: true,
        ..BrowserConfig::with_base_url(BASE)
    };
    let (_, browser) = browser_with(config);
    assert!(browser.url_allowed(&url("/accounts")));
    assert!(!browser.url_allowed("https://other.example/"));

    let (_, open) = setup();
    assert!(open.url_allowed("https://other.example/"));
}

#[derive(Debug)]
struct SlowClient;

#[async_trait]
impl HttpClient for SlowClient {
    async fn execute(&self, _request: PreparedRequest) -> Result<Response> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Err(Error::internal("unreachable"))
    }
}

#[tokio::test]
async fn test_exchange_timeout() {
    let config = BrowserConfig {
        timeout_ms: 20,
        ..BrowserConfig::with_base_url(BASE)
    };
    let browser = Browser::new(config, Arc::new(SlowClient), &registry()).unwrap();

    let result = browser.open("/accounts").await;
    assert!(matches!(result, Err(Error::Timeout(_))));
}

// URLs and referrers

#[test]
fn test_get_referrer() {
    let login = url("/login");
    assert_eq!(Browser::get_referrer(None, &login), None);
    assert_eq!(
        Browser::get_referrer(Some(login.as_str()), &url("/accounts")),
        Some(login.clone())
    );
    assert_eq!(Browser::get_referrer(Some(login.as_str()), "http://bank.example/"), None);
    assert_eq!(Browser::get_referrer(Some(login.as_str()), &login), None);
    assert_eq!(
        Browser::get_referrer(Some("http://bank.example/"), &login),
        Some("http://bank.example/".to_string())
    );
}

#[tokio::test]
async fn test_referrer_header() {
    let (mock, browser) = setup();
    mock.on(&url("/login"), MockReply::ok("login"));
    mock.on(&url("/accounts"), MockReply::ok("accounts"));

    browser.location("/login").await.unwrap();
    browser.open("/accounts").await.unwrap();
    browser
        .open(Request::new("/accounts").referrer(Referrer::Disabled))
        .await
        .unwrap();

    let sent = mock.requests();
    assert!(sent[0].headers.get(REFERER).is_none());
    assert_eq!(sent[1].headers.get(REFERER).unwrap(), url("/login").as_str());
    assert!(sent[2].headers.get(REFERER).is_none());
}

#[tokio::test]
async fn test_absurl() {
    let (mock, browser) = setup();
    mock.on(&url("/accounts/7/history"), MockReply::ok("history"));

    assert_eq!(browser.absurl("/login", true).unwrap(), url("/login"));
    assert_eq!(browser.absurl("details", false).unwrap(), url("/details"));

    browser.location("/accounts/7/history").await.unwrap();
    assert_eq!(browser.absurl("details", false).unwrap(), url("/accounts/7/details"));
    assert_eq!(browser.absurl("details", true).unwrap(), url("/details"));
    assert_eq!(
        browser.absurl("https://other.example/x", false).unwrap(),
        "https://other.example/x"
    );

    let bare = Browser::new(
        BrowserConfig::default(),
        Arc::new(MockHttpClient::new()),
        &Registry::new(),
    )
    .unwrap();
    assert!(matches!(
        bare.absurl("/login", true),
        Err(Error::UrlNotResolvable(_))
    ));
}

// Named navigation

#[tokio::test]
async fn test_is_here_and_stay_or_go() {
    let (mock, browser) = setup();
    mock.on(&url("/accounts/42/history"), MockReply::ok("42"));
    mock.on(&url("/accounts/43/history"), MockReply::ok("43"));

    let loaded = browser.go("history", &[("id", "42")]).await.unwrap();
    assert_eq!(loaded.page.unwrap().params().get("id").unwrap(), "42");

    assert!(browser.is_here("history", &[]).unwrap());
    assert!(browser.is_here("history", &[("id", "42")]).unwrap());
    assert!(!browser.is_here("history", &[("id", "43")]).unwrap());
    assert!(!browser.is_here("accounts", &[]).unwrap());

    browser.stay_or_go("history", &[("id", "42")]).await.unwrap();
    assert_eq!(mock.requests().len(), 1);

    let loaded = browser.stay_or_go("history", &[("id", "43")]).await.unwrap();
    assert_eq!(loaded.response.text(), "43");
    assert_eq!(mock.requests().len(), 2);
}

#[tokio::test]
async fn test_is_here_requires_page_type() {
    let (_, browser) = setup();
    assert!(matches!(
        browser.is_here("raw", &[]),
        Err(Error::Configuration(_))
    ));
    assert!(matches!(
        browser.go("nowhere", &[]).await,
        Err(Error::Configuration(_))
    ));
}

#[tokio::test]
async fn test_url_for_and_open_named() {
    let (mock, browser) = setup();
    mock.on(&url("/accounts/5/history"), MockReply::ok("5"));

    assert_eq!(
        browser.url_for("history", &[("id", "5")]).unwrap(),
        url("/accounts/5/history")
    );
    assert!(matches!(
        browser.url_for("history", &[]),
        Err(Error::UrlNotResolvable(_))
    ));

    let loaded = browser.open_named("history", &[("id", "5")]).await.unwrap();
    assert!(loaded.page_as::<HistoryPage>().is_some());
    assert!(browser.page().unwrap().is_none());
}

// Worker pool and JSON

#[tokio::test]
async fn test_open_async() {
    let config = BrowserConfig {
        max_workers: 2,
        ..BrowserConfig::with_base_url(BASE)
    };
    let (mock, browser) = browser_with(config);
    for id in 1..=5 {
        mock.on(&url(&format!("/accounts/{}/history", id)), MockReply::ok(id.to_string()));
    }

    let handles: Vec<_> = (1..=5)
        .map(|id| browser.open_async(format!("/accounts/{}/history", id)))
        .collect();

    let mut bodies = Vec::new();
    for handle in handles {
        let loaded = handle.await.unwrap().unwrap();
        assert!(loaded.page_as::<HistoryPage>().is_some());
        bodies.push(loaded.response.text());
    }
    assert_eq!(bodies, vec!["1", "2", "3", "4", "5"]);
    assert!(browser.page().unwrap().is_none());
}

#[tokio::test]
async fn test_request_json() {
    let (mock, browser) = setup();
    mock.on(&url("/api/balance"), MockReply::json(&json!({"balance": 1250})));

    let reply: serde_json::Value = browser
        .request_json(Request::new("/api/balance").json(json!({"account": "42"})))
        .await
        .unwrap();
    assert_eq!(reply["balance"], 1250);

    let requests = mock.requests();
    let sent = &requests[0];
    assert_eq!(sent.method, Method::POST);
    assert_eq!(sent.headers.get(CONTENT_TYPE).unwrap(), "application/json");
}

// State persistence

#[tokio::test]
async fn test_dump_and_load_state() {
    let (mock, browser) = setup();
    mock.on(
        &url("/login"),
        MockReply::ok("login").header("set-cookie", "sid=abc; Path=/"),
    );
    mock.on(&url("/accounts"), MockReply::ok("accounts"));

    browser.declare_state(["token"]).unwrap();
    browser.session().set_attr("token", "t-123").unwrap();
    browser.session().set_attr("scratch", &1).unwrap();
    browser.location("/login").await.unwrap();
    browser.location("/accounts").await.unwrap();

    let state = browser.dump_state().unwrap();
    assert_eq!(state.url(), Some(url("/accounts").as_str()));
    assert!(state.saved_at().is_some());
    assert!(state.get("scratch").is_none());
    let json = state.to_json().unwrap();

    let restored = Browser::new(
        BrowserConfig::with_base_url(BASE),
        Arc::new(mock.clone()),
        &registry(),
    )
    .unwrap();
    restored.declare_state(["token"]).unwrap();
    mock.clear_requests();

    let state = BrowserState::from_json(&json).unwrap();
    let loaded = restored.load_state(&state, &AlwaysFresh).await.unwrap();

    assert_eq!(loaded.unwrap().page_name.as_deref(), Some("accounts"));
    assert_eq!(
        restored.session().attr::<String>("token").unwrap().as_deref(),
        Some("t-123")
    );
    assert!(restored.session().cookies().unwrap().get("sid").is_some());
    assert_eq!(mock.requests()[0].headers.get(COOKIE).unwrap(), "sid=abc");
}

#[tokio::test]
async fn test_unset_declared_attribute_is_dumped_as_null() {
    let (_, browser) = setup();
    browser.declare_state(["token"]).unwrap();

    let state = browser.dump_state().unwrap();
    assert_eq!(state.get("token"), Some(&serde_json::Value::Null));
    assert!(state.url().is_none());

    browser.session().set_attr("token", "old").unwrap();
    browser.load_state(&state, &AlwaysFresh).await.unwrap();
    assert_eq!(browser.session().attr::<String>("token").unwrap(), None);
}

#[tokio::test]
async fn test_stale_state_clears_the_page() {
    let (mock, browser) = setup();
    mock.on(&url("/accounts"), MockReply::ok("accounts"));
    browser.location("/accounts").await.unwrap();
    let state = browser.dump_state().unwrap();
    mock.clear_requests();

    let stale = |_: &BrowserState| false;
    let loaded = browser.load_state(&state, &stale).await.unwrap();
    assert!(loaded.is_none());
    assert!(browser.page().unwrap().is_none());
    assert!(mock.requests().is_empty());

    let mut old = state.clone();
    old.insert(BrowserState::SAVED_AT, json!("2001-01-01T00:00:00Z"));
    let loaded = browser
        .load_state(&old, &MaxAge(Duration::from_secs(3600)))
        .await
        .unwrap();
    assert!(loaded.is_none());

    let loaded = browser
        .load_state(&state, &MaxAge(Duration::from_secs(3600)))
        .await
        .unwrap();
    assert!(loaded.is_some());
}

#[tokio::test]
async fn test_bad_cookie_snapshot_leaves_empty_jar() {
    let (mock, browser) = setup();
    mock.on(&url("/login"), MockReply::ok("").header("set-cookie", "sid=abc"));
    browser.location("/login").await.unwrap();
    assert!(!browser.session().cookies().unwrap().is_empty());

    let mut state = BrowserState::new();
    state.insert(BrowserState::COOKIES, json!("%%% not a snapshot %%%"));

    let loaded = browser.load_state(&state, &AlwaysFresh).await.unwrap();
    assert!(loaded.is_none());
    assert!(browser.session().cookies().unwrap().is_empty());
}

// Login gate

#[derive(Debug)]
struct Bank {
    browser: Browser,
    logins: AtomicUsize,
    password: &'static str,
}

#[async_trait]
impl LoginBrowser for Bank {
    fn browser(&self) -> &Browser {
        &self.browser
    }

    async fn do_login(&self) -> Result<()> {
        self.logins.fetch_add(1, Ordering::SeqCst);
        if self.password != "secret" {
            return Err(Error::incorrect_credentials("wrong password"));
        }
        self.browser.location("/accounts").await.map(|_| ())
    }
}

fn bank(password: &'static str) -> (MockHttpClient, Bank) {
    let (mock, browser) = setup();
    mock.on(&url("/login"), MockReply::ok("login"));
    mock.on(&url("/accounts"), MockReply::ok("accounts"));
    (
        mock,
        Bank {
            browser,
            logins: AtomicUsize::new(0),
            password,
        },
    )
}

#[tokio::test]
async fn test_need_login_logs_in_once() {
    let (_, bank) = bank("secret");

    let value = need_login(&bank, || async { Ok(7) }).await.unwrap();
    assert_eq!(value, 7);
    assert_eq!(bank.logins.load(Ordering::SeqCst), 1);

    need_login(&bank, || async { Ok(()) }).await.unwrap();
    assert_eq!(bank.logins.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_need_login_on_anonymous_page() {
    let (_, bank) = bank("secret");
    bank.browser.location("/login").await.unwrap();

    need_login(&bank, || async { Ok(()) }).await.unwrap();
    assert_eq!(bank.logins.load(Ordering::SeqCst), 1);
    assert_eq!(bank.browser.page_name().unwrap().as_deref(), Some("accounts"));
}

#[tokio::test]
async fn test_need_login_propagates_bad_credentials() {
    let (_, bank) = bank("guess");
    let ran = AtomicUsize::new(0);

    let result = need_login(&bank, || async {
        ran.fetch_add(1, Ordering::SeqCst);
        Ok(())
    })
    .await;

    assert!(matches!(result, Err(Error::IncorrectCredentials(_))));
    assert_eq!(ran.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_logout_clears_cookies() {
    let (mock, bank) = bank("secret");
    mock.on(&url("/accounts"), MockReply::ok("").header("set-cookie", "sid=abc"));
    bank.do_login().await.unwrap();
    assert!(!bank.browser.session().cookies().unwrap().is_empty());

    bank.do_logout().await.unwrap();
    assert!(bank.browser.session().cookies().unwrap().is_empty());
}

#[test]
fn test_credentials_debug_hides_password() {
    let credentials = Credentials::new("alice", "hunter2");
    let printed = format!("{:?}", credentials);
    assert!(printed.contains("alice"));
    assert!(!printed.contains("hunter2"));
    assert_eq!(credentials.password(), "hunter2");
}

// Pagination

fn feed_routine(browser: &Browser) -> Result<Vec<Step<String>>> {
    let page = browser
        .page_as::<JsonPage>()?
        .ok_or_else(|| Error::internal("Not on a feed page"))?;

    let mut steps: Vec<Step<String>> = page
        .doc()["items"]
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(|item| item.as_str())
        .map(|item| Step::Yielded(item.to_string()))
        .collect();
    if let Some(next) = page.get("/next").and_then(|n| n.as_str()) {
        steps.push(Step::redirect(next));
    }
    Ok(steps)
}

fn feed(mock: &MockHttpClient) {
    mock.on(
        &url("/feed?page=1"),
        MockReply::json(&json!({"items": ["a", "b"], "next": "/feed?page=2"})),
    );
    mock.on(
        &url("/feed?page=2"),
        MockReply::json(&json!({"items": ["c", "d", "e"]})),
    );
}

#[tokio::test]
async fn test_pagination_follows_redirect_steps() {
    let (mock, browser) = setup();
    feed(&mock);

    browser.location("/feed?page=1").await.unwrap();
    let items = browser.pagination(feed_routine).collect_items().await.unwrap();

    assert_eq!(items, vec!["a", "b", "c", "d", "e"]);
    assert_eq!(
        mock.requested_urls(),
        vec![url("/feed?page=1"), url("/feed?page=2")]
    );
    assert_eq!(browser.url().unwrap(), Some(url("/feed?page=2")));
}

#[tokio::test]
async fn test_pagination_stops_at_done() {
    let (mock, browser) = setup();
    feed(&mock);
    browser.location("/feed?page=1").await.unwrap();

    let mut pagination = browser.pagination(|_: &Browser| {
        Ok(vec![
            Step::Yielded(1),
            Step::Done,
            Step::Yielded(2),
            Step::redirect("/feed?page=2"),
        ])
    });

    assert_eq!(pagination.next_item().await.unwrap().unwrap(), 1);
    assert!(pagination.next_item().await.is_none());
    assert!(pagination.next_item().await.is_none());
    assert_eq!(mock.requests().len(), 1);
}

#[tokio::test]
async fn test_pagination_error_ends_sequence() {
    let (mock, browser) = setup();
    mock.on(
        &url("/feed?page=1"),
        MockReply::json(&json!({"items": ["a"], "next": "/feed?page=9"})),
    );
    browser.location("/feed?page=1").await.unwrap();

    let mut pagination = browser.pagination(feed_routine);
    assert_eq!(pagination.next_item().await.unwrap().unwrap(), "a");
    assert!(matches!(
        pagination.next_item().await,
        Some(Err(Error::NotFound(_)))
    ));
    assert!(pagination.next_item().await.is_none());
}

#[tokio::test]
async fn test_pagination_as_stream() {
    use futures::StreamExt;

    let (mock, browser) = setup();
    feed(&mock);
    browser.location("/feed?page=1").await.unwrap();

    let items: Vec<String> = browser
        .pagination(feed_routine)
        .into_stream()
        .filter_map(|item| async move { item.ok() })
        .collect()
        .await;
    assert_eq!(items.len(), 5);
}
