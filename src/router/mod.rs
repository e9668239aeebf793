//! # Router Module
//!
//! Path matching for the message bus. Route patterns look like URL routes:
//!
//! - literal segments: `settings/theme`
//! - named parameters: `user/:id`
//! - optional parameters: `user/:id/:tab?`
//!
//! ## Architecture
//!
//! The router uses a two-phase approach:
//!
//! 1. **Compilation**: when a listener or handler is registered, its pattern is
//!    compiled once into a [`PathMatcher`]. Literal patterns become a plain
//!    string comparison; parameterized ones become an anchored regex with one
//!    capture group per parameter.
//!
//! 2. **Matching**: for each inbound envelope the registries test the path
//!    against every compiled matcher. Matching is independent per pattern, so a
//!    path may match zero, one or many patterns at once.
//!
//! ## Example
//!
//! ```rust
//! use brrtbus::router::PathMatcher;
//!
//! let matcher = PathMatcher::compile("a/:id1/:id2").unwrap();
//! let params = matcher.match_path("a/x/7").unwrap();
//! assert_eq!(params["id1"], "x");
//! assert_eq!(params["id2"], "7");
//! ```

mod matcher;

pub use matcher::{join, normalize, strip_scope, PathMatcher, SEPARATOR};
