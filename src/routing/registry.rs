//! Ordered registry of named URL patterns

use std::sync::Arc;
use tracing::debug;

use super::pattern::UrlPattern;
use crate::http::Response;
use crate::page::Page;
use crate::session::Session;
use crate::{Error, Result};

/// A named registry entry
#[derive(Debug, Clone)]
pub struct RegistryEntry {
    pub name: String,
    pub pattern: UrlPattern,
}

/// Ordered collection of URL patterns
///
/// A module declares one registry; every browser binds its own copy to its
/// base URL, so bindings never leak between browser instances.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    entries: Vec<RegistryEntry>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry. Registering an existing name replaces that entry in
    /// place, keeping its position.
    pub fn register<S: Into<String>>(mut self, name: S, pattern: UrlPattern) -> Self {
        let name = name.into();
        match self.entries.iter_mut().find(|e| e.name == name) {
            Some(entry) => entry.pattern = pattern,
            None => self.entries.push(RegistryEntry { name, pattern }),
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&UrlPattern> {
        self.entries.iter().find(|e| e.name == name).map(|e| &e.pattern)
    }

    /// Like [`get`](Self::get), failing for unknown names
    pub fn require(&self, name: &str) -> Result<&UrlPattern> {
        self.get(name)
            .ok_or_else(|| Error::configuration(format!("Unknown URL pattern: {}", name)))
    }

    /// Entries in registration order
    pub fn iter(&self) -> impl Iterator<Item = &RegistryEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// A copy with every pattern bound to `base`
    pub fn bind(&self, base: Option<&str>) -> Result<Registry> {
        let entries = self
            .entries
            .iter()
            .map(|e| {
                Ok(RegistryEntry {
                    name: e.name.clone(),
                    pattern: e.pattern.bind_base(base)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Registry { entries })
    }

    /// Find the first entry that yields a page for `response`
    pub fn dispatch(
        &self,
        response: &Arc<Response>,
        session: &Arc<Session>,
    ) -> Result<Option<(String, Arc<dyn Page>)>> {
        for entry in &self.entries {
            if let Some(page) = entry.pattern.handle(&entry.name, response, session)? {
                debug!(
                    "Handle {} with {}",
                    response.url,
                    entry.pattern.page_type().unwrap_or("page")
                );
                return Ok(Some((entry.name.clone(), page)));
            }
        }
        debug!("No page for {}", response.url);
        Ok(None)
    }
}
