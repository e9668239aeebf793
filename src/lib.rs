//! # brrtbus
//!
//! **brrtbus** is a path-addressed messaging layer for a hub and its spokes,
//! built on the `may` coroutine runtime. It sits on top of a raw two-way
//! transport and adds:
//!
//! - **Routed publish/subscribe**: listeners subscribe to route patterns such
//!   as `user/:id/:tab?`, and every matching pattern fires with the extracted
//!   parameters.
//! - **Request/response**: `invoke` sends a handler-bound request and waits for
//!   the correlated answer, with a deadline and a per-peer retry budget.
//! - **Prefixed views**: `prefix("settings")` gives a scoped view of the same
//!   dispatcher; nesting concatenates.
//!
//! ## Architecture
//!
//! - **[`router`]** - route pattern compilation and matching
//! - **[`registry`]** - listener and handler tables keyed by pattern
//! - **[`correlator`]** - pending `invoke` calls awaiting responses
//! - **[`dispatcher`]** - the endpoint façade and its prefixed views
//! - **[`transport`]** - the transport contract and the in-process [`LocalBus`](transport::LocalBus)
//! - **[`envelope`]**, **[`ids`]**, **[`error`]** - the wire-level types
//! - **[`runtime_config`]**, **[`logging`]** - environment-driven settings
//!
//! ## Example
//!
//! ```rust
//! use brrtbus::transport::LocalBus;
//! use brrtbus::{listener, Dispatcher, Endpoint};
//! use serde_json::json;
//!
//! let bus = LocalBus::new();
//! let hub = Dispatcher::hub(bus.hub_link());
//! let spoke = Dispatcher::spoke(bus.connect_spoke());
//!
//! spoke
//!     .on("theme/:name", listener(|headers, _args| {
//!         println!("theme changed to {:?}", headers.param("name"));
//!     }))
//!     .unwrap();
//! hub.send("theme/dark", []).unwrap();
//!
//! hub.handle("echo", |_, args| Ok(args.first().cloned().unwrap_or_default()))
//!     .unwrap();
//! assert_eq!(spoke.invoke("echo", [json!("hi")]).unwrap(), json!("hi"));
//! ```

pub mod correlator;
pub mod dispatcher;
pub mod envelope;
pub mod error;
pub mod ids;
pub mod logging;
pub mod registry;
pub mod router;
pub mod runtime_config;
pub mod transport;

pub use dispatcher::{Dispatcher, DispatcherConfig, Endpoint, PrefixedView, Role};
pub use envelope::{ArgVec, Envelope, Headers, Params};
pub use error::{IpcError, RemoteError, RemoteErrorKind, TransportError};
pub use ids::{PeerId, RequestId};
pub use registry::{listener, Handler, Listener};
