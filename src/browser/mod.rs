//! # Browser
//!
//! The page-aware browser: resolves URLs, performs exchanges through the
//! injected [`HttpClient`], keeps cookies, follows redirects and refresh
//! headers, and dispatches every response to the first matching registry
//! entry.
//!
//! ## Module structure
//! - `persistence`: `dump_state` / `load_state`
//! - `login`: the [`LoginBrowser`] trait and the [`need_login`] gate
//! - `pagination`: [`Step`] signals and the [`Pagination`] driver
//!
//! ## Navigation
//! - [`Browser::open`] performs a request and dispatches it, leaving the
//!   current page alone
//! - [`Browser::location`] does the same and makes the result current,
//!   running `on_leave` / `on_load` hooks
//! - [`Browser::go`], [`Browser::stay_or_go`] and [`Browser::is_here`] work
//!   with registry entries by name
//!
//! ## Example
//! ```rust,no_run
//! use pagewalk::browser::Browser;
//! use pagewalk::config::BrowserConfig;
//! use pagewalk::page::RawPage;
//! use pagewalk::routing::{Registry, UrlPattern};
//!
//! # async fn example() -> pagewalk::Result<()> {
//! let registry = Registry::new().register(
//!     "home",
//!     UrlPattern::new(["/"])?.with_page(|ctx| Ok(RawPage::new(ctx))),
//! );
//! let browser = Browser::with_reqwest(
//!     BrowserConfig::with_base_url("https://www.example.org/"),
//!     &registry,
//! )?;
//! let loaded = browser.go("home", &[]).await?;
//! println!("{}", loaded.response.status);
//! # Ok(())
//! # }
//! ```

pub mod persistence;
pub mod login;
pub mod pagination;

#[cfg(test)]
pub mod tests;

pub use login::{need_login, Credentials, LoginBrowser};
pub use pagination::{Pagination, Step};

use regex::Regex;
use reqwest::header::{
    HeaderValue, CONTENT_LENGTH, CONTENT_TYPE, COOKIE, REFERER, USER_AGENT,
};
use reqwest::Method;
use serde::de::DeserializeOwned;
use std::fmt;
use std::sync::{Arc, RwLock};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::BrowserConfig;
use crate::http::{HttpClient, PreparedRequest, Referrer, Request, ReqwestClient, Response};
use crate::page::Page;
use crate::routing::{append_query, is_absolute, Params, Registry, UrlPattern};
use crate::session::Session;
use crate::{Error, Result};

const REFRESH_PATTERN: &str = r#"(?i)^(?P<sleep>[\d\.]+)(; url=["']?(?P<url>.*?)["']?)?$"#;

/// Result of a navigation: the final response and the page it resolved to
#[derive(Debug, Clone)]
pub struct Loaded {
    pub response: Arc<Response>,
    /// Registry entry name of the page
    pub page_name: Option<String>,
    pub page: Option<Arc<dyn Page>>,
}

impl Loaded {
    /// The page downcast to `P`, if it is one
    pub fn page_as<P: Page>(&self) -> Option<Arc<P>> {
        self.page.clone().and_then(|p| p.downcast_arc::<P>().ok())
    }
}

struct BrowserInner {
    id: String,
    config: BrowserConfig,
    client: Arc<dyn HttpClient>,
    registry: Registry,
    session: Arc<Session>,
    current: RwLock<Option<Loaded>>,
    workers: Arc<Semaphore>,
    refresh_re: Regex,
}

/// Page-aware browser
///
/// Cloning is cheap and every clone drives the same session.
#[derive(Clone)]
pub struct Browser {
    inner: Arc<BrowserInner>,
}

fn lock_error<E: fmt::Display>(e: E) -> Error {
    Error::internal(format!("Lock error: {}", e))
}

fn join_url(base: &str, uri: &str) -> Result<String> {
    url::Url::parse(base)
        .and_then(|b| b.join(uri))
        .map(|u| u.to_string())
        .map_err(|e| Error::url_not_resolvable(format!("Cannot resolve {} against {}: {}", uri, base, e)))
}

impl Browser {
    /// Create a browser over `client`, binding its own copy of `registry` to
    /// the configured base URL
    pub fn new(config: BrowserConfig, client: Arc<dyn HttpClient>, registry: &Registry) -> Result<Self> {
        let registry = registry.bind(config.base_url.as_deref())?;
        let workers = Arc::new(Semaphore::new(config.max_workers.max(1)));
        let id = uuid::Uuid::new_v4().to_string();
        debug!("Browser {} created with {} URL patterns", id, registry.len());

        Ok(Self {
            inner: Arc::new(BrowserInner {
                id,
                config,
                client,
                registry,
                session: Arc::new(Session::new()),
                current: RwLock::new(None),
                workers,
                refresh_re: Regex::new(REFRESH_PATTERN)?,
            }),
        })
    }

    /// Create a browser over a [`ReqwestClient`] built from `config`
    pub fn with_reqwest(config: BrowserConfig, registry: &Registry) -> Result<Self> {
        let client = ReqwestClient::new(&config)?;
        Self::new(config, Arc::new(client), registry)
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn config(&self) -> &BrowserConfig {
        &self.inner.config
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.inner.session
    }

    /// This browser's bound registry
    pub fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    /// Declare attributes that `dump_state` saves and `load_state` restores
    pub fn declare_state<I, S>(&self, names: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inner.session.declare(names)
    }

    /// Last navigation made with [`location`](Self::location)
    pub fn current(&self) -> Result<Option<Loaded>> {
        Ok(self.inner.current.read().map_err(lock_error)?.clone())
    }

    /// URL of the current response
    pub fn url(&self) -> Result<Option<String>> {
        Ok(self.current()?.map(|l| l.response.url.clone()))
    }

    pub fn response(&self) -> Result<Option<Arc<Response>>> {
        Ok(self.current()?.map(|l| l.response))
    }

    pub fn page(&self) -> Result<Option<Arc<dyn Page>>> {
        Ok(self.current()?.and_then(|l| l.page))
    }

    /// Registry entry name of the current page
    pub fn page_name(&self) -> Result<Option<String>> {
        Ok(self.current()?.and_then(|l| l.page_name))
    }

    /// The current page downcast to `P`
    pub fn page_as<P: Page>(&self) -> Result<Option<Arc<P>>> {
        Ok(self.current()?.and_then(|l| l.page_as::<P>()))
    }

    fn set_current(&self, loaded: Option<Loaded>) -> Result<()> {
        *self.inner.current.write().map_err(lock_error)? = loaded;
        Ok(())
    }

    /// Forget the current response and page
    pub fn clear_page(&self) -> Result<()> {
        self.set_current(None)
    }

    /// Resolve `uri` against the base URL (`base` true) or against the
    /// current URL, falling back to the base URL
    pub fn absurl(&self, uri: &str, base: bool) -> Result<String> {
        let against = if base {
            self.config().base_url.clone()
        } else {
            self.url()?.or_else(|| self.config().base_url.clone())
        };

        match against {
            Some(against) => join_url(&against, uri),
            None if is_absolute(uri) => url::Url::parse(uri)
                .map(|u| u.to_string())
                .map_err(|e| Error::url_not_resolvable(format!("Invalid URL {}: {}", uri, e))),
            None => Err(Error::url_not_resolvable(format!("No base URL to resolve {}", uri))),
        }
    }

    /// Whether `url` may be visited under the configured restrictions
    pub fn url_allowed(&self, url: &str) -> bool {
        let config = self.config();
        if !config.allowed_prefixes.is_empty() {
            return config.allowed_prefixes.iter().any(|p| url.starts_with(p.as_str()));
        }
        match (&config.base_url, config.restrict_to_base) {
            (Some(base), true) => url.starts_with(base.as_str()),
            _ => true,
        }
    }

    /// Referrer to send when moving from `old` to `new`
    ///
    /// None without a previous URL, from https to anything else, and when
    /// reloading the same URL.
    pub fn get_referrer(old: Option<&str>, new: &str) -> Option<String> {
        let old = old?;
        let scheme = |u: &str| url::Url::parse(u).map(|u| u.scheme().to_string()).ok();
        if scheme(old).as_deref() == Some("https") && scheme(new).as_deref() != Some("https") {
            return None;
        }
        if old == new {
            return None;
        }
        Some(old.to_string())
    }

    /// Map 4xx and 5xx statuses to errors
    pub fn raise_for_status(response: &Response) -> Result<()> {
        let status = response.status.as_u16();
        match status {
            404 => Err(Error::not_found(response.url.clone())),
            400..=499 => Err(Error::ClientRequest {
                status,
                message: response.reason().to_string(),
            }),
            500..=599 => Err(Error::Server {
                status,
                message: response.reason().to_string(),
            }),
            _ => Ok(()),
        }
    }

    /// Perform `request` and dispatch the response, without changing the
    /// current page
    pub async fn open<R: Into<Request>>(&self, request: R) -> Result<Loaded> {
        let response = self.fetch(request.into()).await?;
        let dispatched = self.inner.registry.dispatch(&response, &self.inner.session)?;
        let (page_name, page) = match dispatched {
            Some((name, page)) => (Some(name), Some(page)),
            None => (None, None),
        };
        Ok(Loaded {
            response,
            page_name,
            page,
        })
    }

    /// Like [`open`](Self::open), then make the result the current page
    ///
    /// The previous page gets `on_leave`, the new one `on_load`. Returns the
    /// current navigation afterwards, which differs from this request's when
    /// `on_load` navigated again.
    pub async fn location<R: Into<Request>>(&self, request: R) -> Result<Loaded> {
        if let Some(page) = self.page()? {
            page.on_leave();
        }

        let loaded = self.open(request).await?;
        self.set_current(Some(loaded.clone()))?;

        if let Some(page) = &loaded.page {
            page.on_load(self).await?;
        }

        Ok(self.current()?.unwrap_or(loaded))
    }

    /// Submit `request` to the worker pool; dispatch happens on the worker
    ///
    /// At most `max_workers` requests run at once. The current page is not
    /// changed.
    pub fn open_async<R: Into<Request>>(&self, request: R) -> JoinHandle<Result<Loaded>> {
        let browser = self.clone();
        let request = request.into();
        let workers = self.inner.workers.clone();
        tokio::spawn(async move {
            let _permit = workers
                .acquire_owned()
                .await
                .map_err(|e| Error::internal(format!("Worker pool closed: {}", e)))?;
            browser.open(request).await
        })
    }

    /// Go to the base URL, or `/` of the current site
    pub async fn go_home(&self) -> Result<Loaded> {
        let home = match &self.config().base_url {
            Some(base) => base.clone(),
            None => self.absurl("/", false)?,
        };
        self.location(home).await
    }

    /// Send `request` as a JSON API call and decode the JSON reply
    pub async fn request_json<T, R>(&self, request: R) -> Result<T>
    where
        T: DeserializeOwned,
        R: Into<Request>,
    {
        let mut request = request.into();
        request
            .headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        self.fetch(request).await?.json()
    }

    fn pattern(&self, name: &str) -> Result<&UrlPattern> {
        self.inner.registry.require(name)
    }

    /// Build the URL of registry entry `name`
    pub fn url_for(&self, name: &str, params: &[(&str, &str)]) -> Result<String> {
        self.pattern(name)?.build(params)
    }

    /// Navigate to registry entry `name`
    pub async fn go(&self, name: &str, params: &[(&str, &str)]) -> Result<Loaded> {
        let url = self.url_for(name, params)?;
        self.location(url).await
    }

    /// Open registry entry `name` without changing the current page
    pub async fn open_named(&self, name: &str, params: &[(&str, &str)]) -> Result<Loaded> {
        let url = self.url_for(name, params)?;
        self.open(url).await
    }

    /// Whether the current page comes from registry entry `name`
    ///
    /// When `params` are given they must also equal the parameters the
    /// current page was matched with.
    pub fn is_here(&self, name: &str, params: &[(&str, &str)]) -> Result<bool> {
        let pattern = self.pattern(name)?;
        if pattern.page_type().is_none() {
            return Err(Error::configuration(format!(
                "URL pattern {} has no page type",
                name
            )));
        }

        let current = match self.current()? {
            Some(current) if current.page_name.as_deref() == Some(name) => current,
            _ => return Ok(false),
        };
        let page = match &current.page {
            Some(page) => page,
            None => return Ok(false),
        };
        if params.is_empty() {
            return Ok(true);
        }

        let expected = pattern.match_url(&pattern.build(params)?);
        let actual: Params = page
            .params()
            .iter()
            .map(|(k, v)| {
                let decoded = urlencoding::decode(v).map(|d| d.into_owned()).unwrap_or_else(|_| v.clone());
                (k.clone(), decoded)
            })
            .collect();
        Ok(expected == Some(actual))
    }

    /// Stay on the current page if it is registry entry `name` with these
    /// parameters, otherwise navigate there
    pub async fn stay_or_go(&self, name: &str, params: &[(&str, &str)]) -> Result<Loaded> {
        if self.is_here(name, params)? {
            if let Some(current) = self.current()? {
                return Ok(current);
            }
        }
        self.go(name, params).await
    }

    async fn fetch(&self, request: Request) -> Result<Arc<Response>> {
        let url = self.absurl(&request.url, false)?;
        let query: Vec<(&str, &str)> = request
            .query
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        let url = append_query(&url, &query)?;
        if !self.url_allowed(&url) {
            return Err(Error::UrlNotAllowed(url));
        }

        let mut headers = request.headers.clone();
        if !headers.contains_key(USER_AGENT) {
            let agent = HeaderValue::from_str(&self.config().user_agent)
                .map_err(|e| Error::configuration(format!("Invalid user agent: {}", e)))?;
            headers.insert(USER_AGENT, agent);
        }

        let body = match &request.body {
            Some(body) => {
                let (bytes, content_type) = body.encode()?;
                if let Some(content_type) = content_type {
                    if !headers.contains_key(CONTENT_TYPE) {
                        let value = HeaderValue::from_str(&content_type)
                            .map_err(|e| Error::internal(format!("Invalid content type: {}", e)))?;
                        headers.insert(CONTENT_TYPE, value);
                    }
                }
                Some(bytes)
            }
            None => None,
        };

        let referrer = match &request.referrer {
            Referrer::Auto => Self::get_referrer(self.url()?.as_deref(), &url),
            Referrer::Disabled => None,
            Referrer::Explicit(referrer) => Some(referrer.clone()),
        };
        if let Some(referrer) = referrer {
            if !headers.contains_key(REFERER) {
                if let Ok(value) = HeaderValue::from_str(&referrer) {
                    headers.insert(REFERER, value);
                }
            }
        }

        let mut prepared = PreparedRequest {
            method: request.resolved_method(),
            url,
            headers,
            body,
            timeout: request.timeout.unwrap_or_else(|| self.config().timeout()),
        };

        let max_redirects = self.config().max_redirects;
        let mut hops = 0usize;
        let response = loop {
            let response = self.exchange(prepared.clone()).await?;
            if !request.allow_redirects {
                break response;
            }

            let next = match self.redirect_target(&prepared, &response)? {
                Some(next) => next,
                None => match self.refresh_target(&response) {
                    Some(target) => Self::refresh_request(&prepared, target),
                    None => break response,
                },
            };

            hops += 1;
            if hops > max_redirects {
                return Err(Error::transport(format!(
                    "Exceeded {} redirects from {}",
                    max_redirects, response.url
                )));
            }
            debug!("{} -> {}", response.url, next.url);
            prepared = next;
        };

        Self::raise_for_status(&response)?;
        Ok(Arc::new(response))
    }

    /// One exchange with cookies attached and stored
    async fn exchange(&self, mut request: PreparedRequest) -> Result<Response> {
        request.headers.remove(COOKIE);
        if let Some(cookies) = self.inner.session.cookie_header(&request.url)? {
            if let Ok(value) = HeaderValue::from_str(&cookies) {
                request.headers.insert(COOKIE, value);
            }
        }

        let timeout = request.timeout;
        let url = request.url.clone();
        let response = tokio::time::timeout(timeout, self.inner.client.execute(request))
            .await
            .map_err(|_| Error::timeout(format!("{} did not answer within {:?}", url, timeout)))??;

        self.inner
            .session
            .store_cookies(&response.url, &response.headers)?;
        Ok(response)
    }

    fn redirect_target(
        &self,
        request: &PreparedRequest,
        response: &Response,
    ) -> Result<Option<PreparedRequest>> {
        let status = response.status.as_u16();
        if !matches!(status, 301 | 302 | 303 | 307 | 308) {
            return Ok(None);
        }
        let location = match response.header("location") {
            Some(location) => location,
            None => return Ok(None),
        };

        let mut next = request.clone();
        next.url = join_url(&response.url, location)?;
        if !self.url_allowed(&next.url) {
            return Err(Error::UrlNotAllowed(next.url));
        }

        let to_get = match status {
            302 | 303 => request.method != Method::HEAD,
            301 => request.method == Method::POST,
            _ => false,
        };
        if to_get {
            next.method = Method::GET;
            next.body = None;
            next.headers.remove(CONTENT_TYPE);
            next.headers.remove(CONTENT_LENGTH);
        }
        Ok(Some(next))
    }

    /// Target of a `Refresh` header worth following
    fn refresh_target(&self, response: &Response) -> Option<String> {
        let header = response.header("refresh")?;
        let caps = match self.inner.refresh_re.captures(header.trim()) {
            Some(caps) => caps,
            None => {
                warn!("Unable to handle refresh \"{}\"", header);
                return None;
            }
        };
        let sleep: f64 = match caps["sleep"].parse() {
            Ok(sleep) => sleep,
            Err(_) => {
                warn!("Unable to handle refresh \"{}\"", header);
                return None;
            }
        };

        let target = caps
            .name("url")
            .map(|m| m.as_str())
            .filter(|u| !u.is_empty())
            .unwrap_or(&response.url);
        let target = join_url(&response.url, target).ok()?;

        let refresh_max = self.config().refresh_max;
        if sleep <= refresh_max {
            debug!("Refresh to {}", target);
            Some(target)
        } else {
            debug!(
                "Do not refresh to {} because {} > refresh_max ({})",
                target, sleep, refresh_max
            );
            None
        }
    }

    fn refresh_request(previous: &PreparedRequest, target: String) -> PreparedRequest {
        let mut headers = previous.headers.clone();
        headers.remove(CONTENT_TYPE);
        headers.remove(CONTENT_LENGTH);
        PreparedRequest {
            method: Method::GET,
            url: target,
            headers,
            body: None,
            timeout: previous.timeout,
        }
    }
}

impl fmt::Debug for Browser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Browser")
            .field("id", &self.inner.id)
            .field("base_url", &self.inner.config.base_url)
            .field("client", &self.inner.client)
            .field("patterns", &self.inner.registry.len())
            .finish()
    }
}
