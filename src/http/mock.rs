//! Mock HTTP implementation for testing
//!
//! Replies are scripted per absolute URL. Each URL has a queue of one-shot
//! outcomes and an optional persistent reply used once the queue is empty.
//! Unknown URLs answer 404.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::StatusCode;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use super::traits::{HttpClient, PreparedRequest, Response};
use crate::Error;

/// A scripted response
#[derive(Debug, Clone)]
pub struct MockReply {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl MockReply {
    /// 200 with a text body
    pub fn ok<B: Into<Bytes>>(body: B) -> Self {
        Self {
            status: 200,
            headers: vec![("content-type".into(), "text/html; charset=utf-8".into())],
            body: body.into(),
        }
    }

    /// 200 with a JSON body
    pub fn json(value: &serde_json::Value) -> Self {
        Self {
            status: 200,
            headers: vec![("content-type".into(), "application/json".into())],
            body: Bytes::from(value.to_string()),
        }
    }

    /// Empty body with the given status
    pub fn status(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    /// Redirect to `location`
    pub fn redirect(status: u16, location: &str) -> Self {
        Self::status(status).header("location", location)
    }

    /// Add a header
    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }
}

#[derive(Debug, Clone)]
enum MockOutcome {
    Reply(MockReply),
    Fail(String),
}

#[derive(Debug, Default)]
struct MockRoute {
    queue: VecDeque<MockOutcome>,
    fallback: Option<MockReply>,
}

/// Mock HTTP client
#[derive(Debug, Clone, Default)]
pub struct MockHttpClient {
    routes: Arc<Mutex<HashMap<String, MockRoute>>>,
    requests: Arc<Mutex<Vec<PreparedRequest>>>,
}

impl MockHttpClient {
    /// Create a new mock client with no routes
    pub fn new() -> Self {
        Self::default()
    }

    fn routes(&self) -> MutexGuard<'_, HashMap<String, MockRoute>> {
        self.routes.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn log(&self) -> MutexGuard<'_, Vec<PreparedRequest>> {
        self.requests.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Answer `url` with `reply` whenever no one-shot outcome is queued
    pub fn on(&self, url: &str, reply: MockReply) -> &Self {
        self.routes().entry(url.to_string()).or_default().fallback = Some(reply);
        self
    }

    /// Answer the next request to `url` with `reply`
    pub fn once(&self, url: &str, reply: MockReply) -> &Self {
        self.routes()
            .entry(url.to_string())
            .or_default()
            .queue
            .push_back(MockOutcome::Reply(reply));
        self
    }

    /// Fail the next request to `url` with a transport error
    pub fn fail_once(&self, url: &str, message: &str) -> &Self {
        self.routes()
            .entry(url.to_string())
            .or_default()
            .queue
            .push_back(MockOutcome::Fail(message.to_string()));
        self
    }

    /// All requests received so far, oldest first
    pub fn requests(&self) -> Vec<PreparedRequest> {
        self.log().clone()
    }

    /// URLs of all requests received so far, oldest first
    pub fn requested_urls(&self) -> Vec<String> {
        self.log().iter().map(|r| r.url.clone()).collect()
    }

    /// Number of requests received for `url`
    pub fn request_count(&self, url: &str) -> usize {
        self.log().iter().filter(|r| r.url == url).count()
    }

    /// Forget the request log
    pub fn clear_requests(&self) {
        self.log().clear();
    }

    fn next_outcome(&self, url: &str) -> Option<MockOutcome> {
        let mut routes = self.routes();
        let route = routes.get_mut(url)?;
        route
            .queue
            .pop_front()
            .or_else(|| route.fallback.clone().map(MockOutcome::Reply))
    }
}

#[async_trait]
impl HttpClient for MockHttpClient {
    async fn execute(&self, request: PreparedRequest) -> Result<Response, Error> {
        self.log().push(request.clone());

        let reply = match self.next_outcome(&request.url) {
            Some(MockOutcome::Reply(reply)) => reply,
            Some(MockOutcome::Fail(message)) => return Err(Error::transport(message)),
            None => MockReply::status(404),
        };

        let status = StatusCode::from_u16(reply.status)
            .map_err(|e| Error::internal(format!("Invalid mock status: {}", e)))?;

        let mut headers = HeaderMap::new();
        for (name, value) in &reply.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| Error::internal(format!("Invalid mock header: {}", e)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| Error::internal(format!("Invalid mock header: {}", e)))?;
            headers.append(name, value);
        }

        Ok(Response {
            url: request.url,
            method: request.method,
            status,
            headers,
            body: reply.body,
        })
    }
}
