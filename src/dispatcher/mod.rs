//! # Dispatcher Module
//!
//! The dispatcher is one endpoint of a hub/spoke channel. It combines the
//! listener and handler registries, the response correlator and a
//! [`Transport`](crate::transport::Transport) binding.
//!
//! ## Inbound
//!
//! Each envelope delivered by the transport is routed as follows:
//!
//! 1. A response (`resId` set) settles the matching pending `invoke` and goes
//!    nowhere else.
//! 2. Every listener pattern matching the path fires, in registration order,
//!    with `headers.params` set from that pattern.
//! 3. A handler-bound request (`handler: true`) goes to the first matching
//!    handler, which runs in its own coroutine. Its return value, error or
//!    panic becomes exactly one response sent back to the requesting peer. If
//!    no handler matches, a "No handler found" response is sent instead.
//!
//! ## Outbound
//!
//! The [`Role`] picks the targets. A spoke talks to the hub; a hub talks to
//! every peer its transport currently lists. `invoke` on a hub resolves with
//! the first successful answer and fails only once every asked peer has
//! answered with an error.
//!
//! ## Example
//!
//! ```rust
//! use brrtbus::transport::LocalBus;
//! use brrtbus::{Dispatcher, Endpoint};
//! use serde_json::json;
//!
//! let bus = LocalBus::new();
//! let hub = Dispatcher::hub(bus.hub_link());
//! let spoke = Dispatcher::spoke(bus.connect_spoke());
//!
//! hub.handle("greet/:name", |headers, _| {
//!     Ok(json!(format!("hello {}", headers.param("name").unwrap_or("?"))))
//! })
//! .unwrap();
//!
//! assert_eq!(spoke.invoke("greet/ada", []).unwrap(), json!("hello ada"));
//! ```

mod config;
mod core;
mod endpoint;
mod prefixed;

pub use config::{DispatcherConfig, Role};
pub use core::Dispatcher;
pub use endpoint::Endpoint;
pub use prefixed::PrefixedView;
