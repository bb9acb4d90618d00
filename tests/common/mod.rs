//! Common test utilities
//!
//! A small bank module written against the public API, the way a site
//! module would use the engine.

#![allow(dead_code)]

use async_trait::async_trait;
use pagewalk::browser::Credentials;
use pagewalk::http::{HttpClient, MockHttpClient, MockReply, Request};
use pagewalk::page::{Page, PageContext};
use pagewalk::{Browser, BrowserConfig, Error, LoginBrowser, Pagination, Registry, Result, Step, UrlPattern};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const BANK: &str = "https://bank.example/";

pub fn bank_url(path: &str) -> String {
    format!("https://bank.example{}", path)
}

/// Login form
#[derive(Debug)]
pub struct LoginPage {
    ctx: PageContext,
}

impl Page for LoginPage {
    fn context(&self) -> &PageContext {
        &self.ctx
    }

    fn is_here(&self) -> bool {
        self.ctx.response.text().contains("<form")
    }
}

/// Landing page of an authenticated session
#[derive(Debug)]
pub struct DashboardPage {
    ctx: PageContext,
}

impl Page for DashboardPage {
    fn context(&self) -> &PageContext {
        &self.ctx
    }

    fn logged(&self) -> bool {
        true
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub label: String,
    pub amount: i64,
}

impl Transaction {
    pub fn new(label: &str, amount: i64) -> Self {
        Self {
            label: label.to_string(),
            amount,
        }
    }
}

#[derive(Debug, Deserialize)]
struct Listing {
    transactions: Vec<Transaction>,
    next: Option<String>,
}

/// One page of an account history
#[derive(Debug)]
pub struct TransactionsPage {
    ctx: PageContext,
    listing: Listing,
}

impl TransactionsPage {
    pub fn new(ctx: PageContext) -> Result<Self> {
        let listing = ctx.response.json()?;
        Ok(Self { ctx, listing })
    }

    pub fn steps(&self) -> Vec<Step<Transaction>> {
        let mut steps: Vec<Step<Transaction>> = self
            .listing
            .transactions
            .iter()
            .cloned()
            .map(Step::Yielded)
            .collect();
        if let Some(next) = &self.listing.next {
            steps.push(Step::redirect(next.as_str()));
        }
        steps
    }
}

impl Page for TransactionsPage {
    fn context(&self) -> &PageContext {
        &self.ctx
    }

    fn logged(&self) -> bool {
        true
    }
}

pub fn registry() -> Result<Registry> {
    Ok(Registry::new()
        .register(
            "login",
            UrlPattern::new(["/login"])?.with_page(|ctx| Ok(LoginPage { ctx })),
        )
        .register(
            "dashboard",
            UrlPattern::new(["/dashboard"])?.with_page(|ctx| Ok(DashboardPage { ctx })),
        )
        .register(
            "transactions",
            UrlPattern::new([r"/accounts/(?P<id>\d+)/transactions(\?page=(?P<page>\d+))?"])?
                .with_page(TransactionsPage::new),
        ))
}

/// Site module for the test bank
#[derive(Debug, Clone)]
pub struct BankModule {
    pub browser: Browser,
    credentials: Credentials,
}

impl BankModule {
    pub fn new(base_url: &str, client: Arc<dyn HttpClient>, credentials: Credentials) -> Result<Self> {
        let browser = Browser::new(BrowserConfig::with_base_url(base_url), client, &registry()?)?;
        browser.declare_state(["last_account"])?;
        Ok(Self {
            browser,
            credentials,
        })
    }

    pub fn with_reqwest(base_url: &str, credentials: Credentials) -> Result<Self> {
        let browser = Browser::with_reqwest(BrowserConfig::with_base_url(base_url), &registry()?)?;
        browser.declare_state(["last_account"])?;
        Ok(Self {
            browser,
            credentials,
        })
    }

    /// Walk the history of `account`, page after page
    pub async fn transactions(&self, account: &str) -> Result<Pagination<Transaction>> {
        self.browser.go("transactions", &[("id", account)]).await?;
        self.browser.session().set_attr("last_account", account)?;

        Ok(self.browser.pagination(|browser: &Browser| {
            let page = browser
                .page_as::<TransactionsPage>()?
                .ok_or_else(|| Error::logged_out("Not on the transactions page"))?;
            Ok(page.steps())
        }))
    }
}

#[async_trait]
impl LoginBrowser for BankModule {
    fn browser(&self) -> &Browser {
        &self.browser
    }

    async fn do_login(&self) -> Result<()> {
        self.browser.go("login", &[]).await?;

        let url = self.browser.url_for("login", &[])?;
        let form = Request::new(url).form([
            ("username", self.credentials.username.as_str()),
            ("password", self.credentials.password()),
        ]);
        let loaded = self.browser.location(form).await?;

        match loaded.page {
            Some(page) if page.logged() => Ok(()),
            _ => Err(Error::incorrect_credentials(format!(
                "Login refused for {}",
                self.credentials.username
            ))),
        }
    }
}

/// JSON body of one history page
pub fn listing(transactions: &[Transaction], next: Option<&str>) -> MockReply {
    MockReply::json(&serde_json::json!({
        "transactions": transactions,
        "next": next,
    }))
}

/// A bank module over a scripted client
pub fn mock_bank() -> (MockHttpClient, BankModule) {
    let mock = MockHttpClient::new();
    let bank = BankModule::new(
        BANK,
        Arc::new(mock.clone()),
        Credentials::new("alice", "secret"),
    )
    .expect("bank module");
    (mock, bank)
}
