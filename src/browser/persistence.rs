//! Dumping and restoring browser state across process runs

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, error, info};

use super::{Browser, Loaded};
use crate::session::{BrowserState, CookieJar, Freshness};
use crate::Result;

impl Browser {
    /// Snapshot cookies, declared attributes and the current page URL
    pub fn dump_state(&self) -> Result<BrowserState> {
        let session = self.session();
        let mut state = BrowserState::new();

        state.insert(
            BrowserState::COOKIES,
            Value::String(session.cookies()?.to_snapshot()?),
        );
        for name in session.declared()? {
            let value = session.attr_value(&name)?.unwrap_or(Value::Null);
            state.insert(name, value);
        }
        if let Some(page) = self.page()? {
            state.insert(BrowserState::URL, Value::String(page.url().to_string()));
        }
        state.insert(BrowserState::SAVED_AT, Value::String(Utc::now().to_rfc3339()));

        info!("Stored cookies into storage");
        Ok(state)
    }

    /// Restore a snapshot made by [`dump_state`](Self::dump_state)
    ///
    /// An undecodable cookie snapshot is logged and replaced by an empty jar.
    /// Only declared attributes are restored. When `freshness` accepts the
    /// snapshot and it has a URL, that URL is re-opened to rebuild the current
    /// page; otherwise the current page is cleared.
    pub async fn load_state(
        &self,
        state: &BrowserState,
        freshness: &dyn Freshness,
    ) -> Result<Option<Loaded>> {
        let session = self.session();

        if let Some(encoded) = state.cookies() {
            match CookieJar::from_snapshot(encoded) {
                Ok(jar) => {
                    session.replace_cookies(jar)?;
                    info!("Reloaded cookies from storage");
                }
                Err(e) => {
                    error!("Unable to reload cookies from storage: {}", e);
                    session.replace_cookies(CookieJar::new())?;
                }
            }
        }

        for name in session.declared()? {
            if let Some(value) = state.get(&name) {
                session.set_attr_value(&name, value.clone())?;
            }
        }

        match state.url() {
            Some(url) if freshness.is_fresh(state) => {
                debug!("Restoring page {}", url);
                self.location(url).await.map(Some)
            }
            _ => {
                self.clear_page()?;
                Ok(None)
            }
        }
    }
}
