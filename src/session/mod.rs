//! # Session layer
//!
//! Mutable per-browser state: the cookie jar and the module-declared
//! persistent attributes, plus the snapshot format used to carry both across
//! process runs.
//!
//! ## Module structure
//! - `cookies`: [`CookieJar`] and its versioned snapshot encoding
//! - `state`: [`BrowserState`] and the [`Freshness`] policies
//!
//! Dumping and restoring a whole browser (which also re-opens the current
//! page) lives in `crate::browser::persistence`.
//!
//! ## Example
//! ```rust
//! use pagewalk::session::Session;
//!
//! let session = Session::new();
//! session.declare(["account_id"]).unwrap();
//! session.set_attr("account_id", &"FR76-0001").unwrap();
//! assert_eq!(session.attr::<String>("account_id").unwrap().as_deref(), Some("FR76-0001"));
//! ```

pub mod cookies;
pub mod state;

#[cfg(test)]
pub mod tests;

pub use cookies::{Cookie, CookieJar};
pub use state::{AlwaysFresh, BrowserState, Freshness, MaxAge};

use reqwest::header::HeaderMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::RwLock;

use crate::{Error, Result};

/// Cookie jar and persistent attributes of one browser
#[derive(Debug, Default)]
pub struct Session {
    cookies: RwLock<CookieJar>,
    attributes: RwLock<BTreeMap<String, Value>>,
    declared: RwLock<BTreeSet<String>>,
}

fn lock_error<E: std::fmt::Display>(e: E) -> Error {
    Error::internal(format!("Lock error: {}", e))
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// A copy of the cookie jar
    pub fn cookies(&self) -> Result<CookieJar> {
        Ok(self.cookies.read().map_err(lock_error)?.clone())
    }

    /// Run `f` with the cookie jar locked for writing
    pub fn with_cookies<R>(&self, f: impl FnOnce(&mut CookieJar) -> R) -> Result<R> {
        let mut jar = self.cookies.write().map_err(lock_error)?;
        Ok(f(&mut jar))
    }

    pub fn replace_cookies(&self, jar: CookieJar) -> Result<()> {
        *self.cookies.write().map_err(lock_error)? = jar;
        Ok(())
    }

    pub fn clear_cookies(&self) -> Result<()> {
        self.with_cookies(CookieJar::clear)
    }

    /// `Cookie` header value for a request to `url`
    pub fn cookie_header(&self, url: &str) -> Result<Option<String>> {
        Ok(self.cookies.read().map_err(lock_error)?.header_for(url))
    }

    /// Store the `Set-Cookie` headers of a response from `url`
    pub fn store_cookies(&self, url: &str, headers: &HeaderMap) -> Result<()> {
        self.with_cookies(|jar| jar.store_response(url, headers))
    }

    /// Add names to the persistent attribute allow-list
    ///
    /// Fails without declaring anything if one of the names is a
    /// [`BrowserState::RESERVED`] key.
    pub fn declare<I, S>(&self, names: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        if let Some(name) = names.iter().find(|n| BrowserState::RESERVED.contains(&n.as_str())) {
            return Err(Error::configuration(format!(
                "Attribute name '{}' is reserved for the browser state",
                name
            )));
        }

        let mut declared = self.declared.write().map_err(lock_error)?;
        declared.extend(names);
        Ok(())
    }

    /// Persistent attribute names, sorted
    pub fn declared(&self) -> Result<Vec<String>> {
        Ok(self.declared.read().map_err(lock_error)?.iter().cloned().collect())
    }

    pub fn is_declared(&self, name: &str) -> Result<bool> {
        Ok(self.declared.read().map_err(lock_error)?.contains(name))
    }

    pub fn set_attr<T: Serialize + ?Sized>(&self, name: &str, value: &T) -> Result<()> {
        self.set_attr_value(name, serde_json::to_value(value)?)
    }

    pub fn set_attr_value(&self, name: &str, value: Value) -> Result<()> {
        self.attributes
            .write()
            .map_err(lock_error)?
            .insert(name.to_string(), value);
        Ok(())
    }

    /// Typed attribute value; `None` when unset or null
    pub fn attr<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>> {
        match self.attr_value(name)? {
            None | Some(Value::Null) => Ok(None),
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
        }
    }

    pub fn attr_value(&self, name: &str) -> Result<Option<Value>> {
        Ok(self.attributes.read().map_err(lock_error)?.get(name).cloned())
    }

    pub fn remove_attr(&self, name: &str) -> Result<Option<Value>> {
        Ok(self.attributes.write().map_err(lock_error)?.remove(name))
    }
}
