//! # HTTP layer
//!
//! The seam between the engine and the network.
//!
//! ## Module structure
//! - `traits`: the [`HttpClient`] trait and the request/response value types
//! - `client`: [`ReqwestClient`], the production implementation
//! - `mock`: [`MockHttpClient`], a scripted implementation for tests
//!
//! ## Example
//! ```rust,no_run
//! use pagewalk::http::{HttpClient, MockHttpClient, MockReply};
//!
//! let client = MockHttpClient::new();
//! client.on("https://example.org/", MockReply::ok("<html></html>"));
//! ```

pub mod traits;
pub mod client;
pub mod mock;


pub use traits::{Body, HttpClient, PreparedRequest, Referrer, Request, Response};

pub use client::ReqwestClient;

// Re-export mock for module tests
pub use mock::{MockHttpClient, MockReply};
