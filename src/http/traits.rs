//! HTTP layer traits
//!
//! The engine never speaks a wire protocol itself: a single HTTP exchange is
//! delegated to an injected [`HttpClient`]. Everything a browser layers on top
//! (redirects, cookies, referrers, refresh headers) lives in `crate::browser`.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;

use crate::Error;

/// Request body
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    /// `application/x-www-form-urlencoded` pairs
    Form(Vec<(String, String)>),
    /// JSON document
    Json(serde_json::Value),
    /// Raw bytes with an optional content type
    Raw {
        bytes: Bytes,
        content_type: Option<String>,
    },
}

impl Body {
    /// Encode the body, returning the bytes and the content type to send
    pub fn encode(&self) -> Result<(Bytes, Option<String>), Error> {
        match self {
            Body::Form(pairs) => {
                let encoded = url::form_urlencoded::Serializer::new(String::new())
                    .extend_pairs(pairs.iter())
                    .finish();
                Ok((
                    Bytes::from(encoded),
                    Some("application/x-www-form-urlencoded".to_string()),
                ))
            }
            Body::Json(value) => Ok((
                Bytes::from(serde_json::to_vec(value)?),
                Some("application/json".to_string()),
            )),
            Body::Raw { bytes, content_type } => Ok((bytes.clone(), content_type.clone())),
        }
    }
}

/// Referrer policy for one request
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Referrer {
    /// Guess from the current URL
    #[default]
    Auto,
    /// Never send a referrer
    Disabled,
    /// Force this referrer
    Explicit(String),
}

/// A request as issued by module code
#[derive(Debug, Clone)]
pub struct Request {
    /// Explicit method; guessed from the body when absent
    pub method: Option<Method>,
    /// Absolute or base-relative URL
    pub url: String,
    /// Extra headers
    pub headers: HeaderMap,
    /// Query string parameters appended to the URL
    pub query: Vec<(String, String)>,
    /// Request body
    pub body: Option<Body>,
    /// Referrer policy
    pub referrer: Referrer,
    /// Follow redirects and refresh headers
    pub allow_redirects: bool,
    /// Per-request timeout, overriding the browser default
    pub timeout: Option<Duration>,
}

impl Request {
    /// Create a request for `url`
    pub fn new<S: Into<String>>(url: S) -> Self {
        Self {
            method: None,
            url: url.into(),
            headers: HeaderMap::new(),
            query: Vec::new(),
            body: None,
            referrer: Referrer::Auto,
            allow_redirects: true,
            timeout: None,
        }
    }

    /// Create a GET request
    pub fn get<S: Into<String>>(url: S) -> Self {
        Self::new(url).method(Method::GET)
    }

    /// Create a HEAD request
    pub fn head<S: Into<String>>(url: S) -> Self {
        Self::new(url).method(Method::HEAD)
    }

    /// Set the method
    pub fn method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    /// Add a header
    pub fn header(mut self, name: &str, value: &str) -> Result<Self, Error> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| Error::internal(format!("Invalid header name {}: {}", name, e)))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| Error::internal(format!("Invalid header value: {}", e)))?;
        self.headers.insert(name, value);
        Ok(self)
    }

    /// Append a query string parameter
    pub fn query<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Set a form body
    pub fn form<I, K, V>(mut self, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.body = Some(Body::Form(
            pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        ));
        self
    }

    /// Set a JSON body
    pub fn json(mut self, value: serde_json::Value) -> Self {
        self.body = Some(Body::Json(value));
        self
    }

    /// Set a raw body
    pub fn raw<B: Into<Bytes>>(mut self, bytes: B, content_type: Option<&str>) -> Self {
        self.body = Some(Body::Raw {
            bytes: bytes.into(),
            content_type: content_type.map(str::to_string),
        });
        self
    }

    /// Set the referrer policy
    pub fn referrer(mut self, referrer: Referrer) -> Self {
        self.referrer = referrer;
        self
    }

    /// Do not follow redirects or refresh headers
    pub fn no_redirects(mut self) -> Self {
        self.allow_redirects = false;
        self
    }

    /// Override the browser timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// The method that will be sent: explicit, else POST with a body, else GET
    pub fn resolved_method(&self) -> Method {
        match (&self.method, &self.body) {
            (Some(method), _) => method.clone(),
            (None, Some(_)) => Method::POST,
            (None, None) => Method::GET,
        }
    }
}

impl From<&str> for Request {
    fn from(url: &str) -> Self {
        Request::new(url)
    }
}

impl From<String> for Request {
    fn from(url: String) -> Self {
        Request::new(url)
    }
}

impl From<&String> for Request {
    fn from(url: &String) -> Self {
        Request::new(url.clone())
    }
}

/// A fully resolved request handed to the [`HttpClient`]
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    pub method: Method,
    /// Absolute URL, query string included
    pub url: String,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
    pub timeout: Duration,
}

/// One HTTP response
#[derive(Debug, Clone)]
pub struct Response {
    /// URL the response was served from
    pub url: String,
    /// Method of the request that produced it
    pub method: Method,
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Response {
    /// Body decoded as UTF-8, invalid sequences replaced
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Body decoded as JSON
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, Error> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// First value of a header, if it is valid text
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Canonical reason phrase of the status code
    pub fn reason(&self) -> &'static str {
        self.status.canonical_reason().unwrap_or("Unknown")
    }
}

/// HTTP client trait
///
/// Performs exactly one exchange: no redirect following, no cookie jar.
#[async_trait]
pub trait HttpClient: Send + Sync + std::fmt::Debug {
    /// Send a prepared request and return the raw response
    async fn execute(&self, request: PreparedRequest) -> Result<Response, crate::Error>;
}
