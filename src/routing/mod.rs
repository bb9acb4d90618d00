//! # Routing
//!
//! URL patterns, their registry, and dispatch of responses to page types.
//!
//! ## Module structure
//! - `template`: reduction of a URL regex to concrete buildable templates
//! - `pattern`: [`UrlPattern`], matching, building and page handling
//! - `registry`: [`Registry`], the ordered named collection used for dispatch
//!
//! ## Example
//! ```rust
//! use pagewalk::routing::UrlPattern;
//!
//! let accounts = UrlPattern::new(["/login", r"/accounts/(?P<id>\d+)"]).unwrap();
//! assert_eq!(accounts.build(&[("id", "42")]).unwrap(), "/accounts/42");
//! assert_eq!(accounts.build(&[]).unwrap(), "/login");
//! ```

pub mod template;
pub mod pattern;
pub mod registry;


pub use pattern::{Params, UrlPattern};
pub use registry::{Registry, RegistryEntry};
pub use template::{normalize, Piece, Template};

pub(crate) use pattern::{append_query, is_absolute};
