//! Route-aware registries.
//!
//! Both registries wrap a [`ChannelMap`] (exact key → ordered entries) and pair
//! each key with the [`PathMatcher`](crate::router::PathMatcher) compiled from
//! it:
//!
//! - [`ListenerRegistry`]: many listeners per pattern, duplicates allowed,
//!   every matching pattern fires.
//! - [`HandlerRegistry`]: one handler per pattern, duplicates rejected, first
//!   matching pattern answers.

mod channels;
mod handlers;
mod listeners;

pub use channels::ChannelMap;
pub use handlers::{Handler, HandlerMatch, HandlerRegistry, HandlerSlot};
pub use listeners::{listener, Listener, ListenerMatch, ListenerRegistry, ListenerSlot};
