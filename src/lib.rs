//! Pagewalk: a page-aware browsing engine for scraping modules
//!
//! This library maps URLs to typed pages, keeps session state across
//! navigations and process runs, gates operations behind a login, drives
//! paginated listings and retries flaky sequences without duplicating items.

pub mod error;
pub mod config;
pub mod logging;

pub mod http;
pub mod routing;
pub mod page;
pub mod session;
pub mod browser;
pub mod retry;

// Re-exports
pub use error::{Error, ErrorKind, Result};
pub use browser::{need_login, Browser, Loaded, LoginBrowser, Pagination, Step};
pub use config::BrowserConfig;
pub use page::{Page, PageContext};
pub use retry::{retry, retry_stream, ResumableIterator, RetryPolicy};
pub use routing::{Registry, UrlPattern};

/// Pagewalk library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
