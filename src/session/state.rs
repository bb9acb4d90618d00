//! Persisted browser state and freshness policies

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

use crate::Result;

/// Opaque key/value snapshot of a browser session
///
/// Always carries `cookies` (an encoded [`CookieJar`](super::CookieJar)
/// snapshot) and `saved_at`; `url` is present when a page was loaded. Every
/// other key is a module-declared persistent attribute.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BrowserState(Map<String, Value>);

impl BrowserState {
    pub const COOKIES: &'static str = "cookies";
    pub const URL: &'static str = "url";
    pub const SAVED_AT: &'static str = "saved_at";
    /// Keys written by the engine itself, unavailable to declared attributes
    pub const RESERVED: [&'static str; 3] = [Self::COOKIES, Self::URL, Self::SAVED_AT];

    pub fn new() -> Self {
        Self::default()
    }

    /// Encoded cookie jar
    pub fn cookies(&self) -> Option<&str> {
        self.0.get(Self::COOKIES).and_then(Value::as_str)
    }

    /// URL of the page that was current at dump time
    pub fn url(&self) -> Option<&str> {
        self.0.get(Self::URL).and_then(Value::as_str)
    }

    pub fn saved_at(&self) -> Option<DateTime<Utc>> {
        self.0
            .get(Self::SAVED_AT)
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn insert<K: Into<String>>(&mut self, key: K, value: Value) {
        self.0.insert(key.into(), value);
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.0)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(Self(serde_json::from_str(json)?))
    }
}

impl From<Map<String, Value>> for BrowserState {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Decides whether a saved state is recent enough to re-open its page
pub trait Freshness: Send + Sync {
    fn is_fresh(&self, state: &BrowserState) -> bool;
}

/// Every snapshot is fresh
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysFresh;

impl Freshness for AlwaysFresh {
    fn is_fresh(&self, _state: &BrowserState) -> bool {
        true
    }
}

/// Fresh when saved at most this long ago; snapshots without a valid
/// `saved_at` are stale
#[derive(Debug, Clone, Copy)]
pub struct MaxAge(pub Duration);

impl Freshness for MaxAge {
    fn is_fresh(&self, state: &BrowserState) -> bool {
        let Some(saved_at) = state.saved_at() else {
            return false;
        };
        match (Utc::now() - saved_at).to_std() {
            Ok(age) => age <= self.0,
            // saved in the future: clock skew, treat as just saved
            Err(_) => true,
        }
    }
}

impl<F> Freshness for F
where
    F: Fn(&BrowserState) -> bool + Send + Sync,
{
    fn is_fresh(&self, state: &BrowserState) -> bool {
        self(state)
    }
}
