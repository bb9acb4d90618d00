//! Cookie jar with a versioned, portable snapshot format
//!
//! Parsing and matching are done by [`cookie_store::CookieStore`]; this
//! module only maps its cookies to and from the snapshot records.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use cookie_store::{CookieDomain, CookieExpiration, CookieStore, RawCookie};
use reqwest::header::{HeaderMap, SET_COOKIE};
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::{Error, Result};

const SNAPSHOT_VERSION: u32 = 1;

/// One stored cookie, as carried by a snapshot
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Cookie {
    /// Lowercase host or domain, without a leading dot
    pub domain: String,
    pub path: String,
    pub name: String,
    pub value: String,
    /// Unix timestamp in seconds; `None` for session cookies
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<i64>,
    #[serde(default)]
    pub secure: bool,
    /// Sent to `domain` only, not to its subdomains
    #[serde(default)]
    pub host_only: bool,
}

impl Cookie {
    /// A session cookie for `domain` and its subdomains, on path `/`
    pub fn new<N, V, D>(name: N, value: V, domain: D) -> Self
    where
        N: Into<String>,
        V: Into<String>,
        D: Into<String>,
    {
        Self {
            domain: domain.into().trim_start_matches('.').to_ascii_lowercase(),
            path: "/".to_string(),
            name: name.into(),
            value: value.into(),
            expires: None,
            secure: false,
            host_only: false,
        }
    }

    pub fn is_expired(&self, now: i64) -> bool {
        matches!(self.expires, Some(ts) if ts <= now)
    }

    fn from_stored(cookie: &cookie_store::Cookie<'static>) -> Option<Self> {
        let (domain, host_only) = match &cookie.domain {
            CookieDomain::HostOnly(host) => (host.clone(), true),
            CookieDomain::Suffix(suffix) => (suffix.clone(), false),
            CookieDomain::NotPresent | CookieDomain::Empty => return None,
        };
        let expires = match &cookie.expires {
            CookieExpiration::AtUtc(at) => Some(at.unix_timestamp()),
            CookieExpiration::SessionEnd => None,
        };
        Some(Self {
            domain,
            path: String::from(&cookie.path),
            name: cookie.name().to_string(),
            value: cookie.value().to_string(),
            expires,
            secure: cookie.secure().unwrap_or(false),
            host_only,
        })
    }

    /// The `Set-Cookie` line and request URL that recreate this cookie
    fn to_set_cookie(&self) -> Result<(String, Url)> {
        let scheme = if self.secure { "https" } else { "http" };
        let url = Url::parse(&format!("{}://{}{}", scheme, self.domain, self.path))
            .map_err(|e| Error::internal(format!("Invalid cookie origin {}: {}", self.domain, e)))?;

        let mut line = format!("{}={}; Path={}", self.name, self.value, self.path);
        if !self.host_only {
            line.push_str("; Domain=");
            line.push_str(&self.domain);
        }
        if self.secure {
            line.push_str("; Secure");
        }
        if let Some(at) = self.expires.and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0)) {
            line.push_str(&at.format("; Expires=%a, %d %b %Y %H:%M:%S GMT").to_string());
        }
        Ok((line, url))
    }
}

#[derive(Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    cookies: Vec<Cookie>,
}

/// Cookie jar
#[derive(Debug, Clone, Default)]
pub struct CookieJar {
    store: CookieStore,
}

impl PartialEq for CookieJar {
    fn eq(&self, other: &Self) -> bool {
        self.cookies() == other.cookies()
    }
}

impl CookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.store.iter_unexpired().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Live cookies, sorted by domain, path and name
    pub fn cookies(&self) -> Vec<Cookie> {
        let mut cookies: Vec<Cookie> = self
            .store
            .iter_unexpired()
            .filter_map(Cookie::from_stored)
            .collect();
        cookies.sort();
        cookies
    }

    pub fn iter(&self) -> impl Iterator<Item = Cookie> {
        self.cookies().into_iter()
    }

    /// First live cookie with this name
    pub fn get(&self, name: &str) -> Option<Cookie> {
        self.iter().find(|c| c.name == name)
    }

    /// Store a cookie, replacing one with the same name, domain and path
    pub fn insert(&mut self, cookie: Cookie) -> Result<()> {
        let (line, url) = cookie.to_set_cookie()?;
        let raw = RawCookie::parse(line)
            .map_err(|e| Error::internal(format!("Invalid cookie {}: {}", cookie.name, e)))?;
        self.store
            .insert_raw(&raw, &url)
            .map_err(|e| Error::internal(format!("Cookie {} rejected: {}", cookie.name, e)))?;
        Ok(())
    }

    /// Remove every cookie with this name
    pub fn remove(&mut self, name: &str) {
        for cookie in self.iter().filter(|c| c.name == name) {
            self.store.remove(&cookie.domain, &cookie.path, &cookie.name);
        }
    }

    pub fn clear(&mut self) {
        self.store = CookieStore::default();
    }

    /// Store the `Set-Cookie` headers of a response served from `url`
    pub fn store_response(&mut self, url: &str, headers: &HeaderMap) {
        let Ok(url) = Url::parse(url) else { return };

        let raw_cookies = headers.get_all(SET_COOKIE).iter().filter_map(|value| {
            let header = value.to_str().ok()?;
            match RawCookie::parse(header) {
                Ok(raw) => Some(raw.into_owned()),
                Err(e) => {
                    debug!("Ignoring cookie from {}: {} ({})", url, header, e);
                    None
                }
            }
        });
        self.store.store_response_cookies(raw_cookies, &url);
    }

    /// Value of the `Cookie` header to send to `url`, if any cookie applies
    pub fn header_for(&self, url: &str) -> Option<String> {
        let url = Url::parse(url).ok()?;
        let pairs: Vec<String> = self
            .store
            .get_request_values(&url)
            .map(|(name, value)| format!("{}={}", name, value))
            .collect();
        if pairs.is_empty() {
            None
        } else {
            Some(pairs.join("; "))
        }
    }

    /// Drop expired cookies
    pub fn purge_expired(&mut self) {
        let expired: Vec<(String, String, String)> = self
            .store
            .iter_any()
            .filter(|c| c.is_expired())
            .filter_map(Cookie::from_stored)
            .map(|c| (c.domain, c.path, c.name))
            .collect();
        for (domain, path, name) in expired {
            self.store.remove(&domain, &path, &name);
        }
    }

    /// Encode the live cookies as base64 of
    /// `{"version":1,"cookies":[...]}`
    pub fn to_snapshot(&self) -> Result<String> {
        let snapshot = Snapshot {
            version: SNAPSHOT_VERSION,
            cookies: self.cookies(),
        };
        Ok(STANDARD.encode(serde_json::to_vec(&snapshot)?))
    }

    /// Decode a snapshot made by [`to_snapshot`](Self::to_snapshot)
    ///
    /// Records that no longer make a valid cookie are skipped.
    pub fn from_snapshot(encoded: &str) -> Result<Self> {
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|e| Error::internal(format!("Invalid cookie snapshot: {}", e)))?;
        let snapshot: Snapshot = serde_json::from_slice(&bytes)?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(Error::internal(format!(
                "Unsupported cookie snapshot version {}",
                snapshot.version
            )));
        }

        let now = Utc::now().timestamp();
        let mut jar = Self::new();
        for cookie in snapshot.cookies.into_iter().filter(|c| !c.is_expired(now)) {
            if let Err(e) = jar.insert(cookie) {
                debug!("Skipping snapshot cookie: {}", e);
            }
        }
        Ok(jar)
    }
}
