//! # Pages
//!
//! A page wraps one HTTP response that a registry entry accepted. Module code
//! defines its own page types; the engine only needs the [`Page`] trait to
//! run hooks, check identity and ask whether the session is authenticated.
//!
//! Pages are stored as `Arc<dyn Page>` and recovered with
//! `downcast_arc::<MyPage>()` (or [`Browser::page_as`](crate::browser::Browser::page_as)).

use async_trait::async_trait;
use downcast_rs::{impl_downcast, DowncastSync};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use crate::browser::Browser;
use crate::http::Response;
use crate::routing::Params;
use crate::session::Session;
use crate::Result;

/// Everything a page is built from
#[derive(Debug, Clone)]
pub struct PageContext {
    /// Registry entry that matched
    pub name: String,
    /// Resolved URL of the response
    pub url: String,
    /// Named parameters captured by the pattern
    pub params: Params,
    pub response: Arc<Response>,
    /// Session of the browser that loaded the page
    pub session: Arc<Session>,
}

impl PageContext {
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }
}

/// A typed view over one response
#[async_trait]
pub trait Page: DowncastSync + fmt::Debug {
    fn context(&self) -> &PageContext;

    fn url(&self) -> &str {
        &self.context().url
    }

    fn params(&self) -> &Params {
        &self.context().params
    }

    fn response(&self) -> &Response {
        &self.context().response
    }

    /// Whether this page proves the session is authenticated
    fn logged(&self) -> bool {
        false
    }

    /// Whether the response really is this kind of page
    fn is_here(&self) -> bool {
        true
    }

    /// Called once the page became the browser's current page
    async fn on_load(&self, _browser: &Browser) -> Result<()> {
        Ok(())
    }

    /// Called when another navigation replaces this page
    fn on_leave(&self) {}
}
impl_downcast!(sync Page);

/// Type-erased page constructor
pub type PageFactory = Arc<dyn Fn(PageContext) -> Result<Arc<dyn Page>> + Send + Sync>;

/// Extra identity check run on a constructed page
pub type PagePredicate = Arc<dyn Fn(&dyn Page) -> bool + Send + Sync>;

/// A page type bound to a URL pattern
#[derive(Clone)]
pub struct PageBinding {
    type_name: &'static str,
    factory: PageFactory,
}

impl PageBinding {
    pub fn new<P, F>(factory: F) -> Self
    where
        P: Page,
        F: Fn(PageContext) -> Result<P> + Send + Sync + 'static,
    {
        let type_name = std::any::type_name::<P>();
        let type_name = type_name.rsplit("::").next().unwrap_or(type_name);
        Self {
            type_name,
            factory: Arc::new(move |ctx| Ok(Arc::new(factory(ctx)?) as Arc<dyn Page>)),
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn construct(&self, ctx: PageContext) -> Result<Arc<dyn Page>> {
        (self.factory)(ctx)
    }
}

impl fmt::Debug for PageBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageBinding")
            .field("type_name", &self.type_name)
            .finish()
    }
}

/// Page exposing the decoded body text
#[derive(Debug)]
pub struct RawPage {
    ctx: PageContext,
    text: String,
}

impl RawPage {
    pub fn new(ctx: PageContext) -> Self {
        let text = ctx.response.text();
        Self { ctx, text }
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

impl Page for RawPage {
    fn context(&self) -> &PageContext {
        &self.ctx
    }
}

/// Page exposing the body as a JSON document
#[derive(Debug)]
pub struct JsonPage {
    ctx: PageContext,
    doc: Value,
}

impl JsonPage {
    /// Fails with a serialization error when the body is not JSON
    pub fn new(ctx: PageContext) -> Result<Self> {
        let doc = ctx.response.json()?;
        Ok(Self { ctx, doc })
    }

    pub fn doc(&self) -> &Value {
        &self.doc
    }

    /// Look up a value by JSON pointer, e.g. `/accounts/0/id`
    pub fn get(&self, pointer: &str) -> Option<&Value> {
        self.doc.pointer(pointer)
    }
}

impl Page for JsonPage {
    fn context(&self) -> &PageContext {
        &self.ctx
    }
}
