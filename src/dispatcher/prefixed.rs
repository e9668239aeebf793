use super::core::Dispatcher;
use super::endpoint::Endpoint;

/// A dispatcher seen through a path prefix.
///
/// The effective prefix is fixed at construction. Views always hold the root
/// dispatcher, so a view of a view forwards in one hop.
///
/// ```rust
/// use brrtbus::transport::LocalBus;
/// use brrtbus::{Dispatcher, Endpoint};
///
/// let bus = LocalBus::new();
/// let hub = Dispatcher::hub(bus.hub_link());
/// let inner = hub.prefix("B").prefix("/E/");
/// inner.handle("F", |_, _| Ok(serde_json::Value::Null)).unwrap();
///
/// assert_eq!(inner.effective_prefix(), "B/E");
/// assert_eq!(hub.handler_names(), vec!["B/E/F".to_string()]);
/// assert_eq!(inner.handler_names(), vec!["F".to_string()]);
/// ```
#[derive(Clone, Debug)]
pub struct PrefixedView {
    root: Dispatcher,
    prefix: String,
}

impl PrefixedView {
    pub(crate) fn new(root: Dispatcher, prefix: String) -> Self {
        Self { root, prefix }
    }

    #[must_use]
    pub fn effective_prefix(&self) -> &str {
        &self.prefix
    }
}

impl Endpoint for PrefixedView {
    fn dispatcher(&self) -> &Dispatcher {
        &self.root
    }

    fn scope(&self) -> &str {
        &self.prefix
    }
}
