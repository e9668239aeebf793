use super::core::Dispatcher;
use super::prefixed::PrefixedView;
use crate::envelope::{ArgVec, Envelope, Headers};
use crate::error::IpcError;
use crate::ids::PeerId;
use crate::registry::{Handler, Listener};
use crate::router::{join, normalize, strip_scope};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;

/// Operations shared by a [`Dispatcher`] and every [`PrefixedView`] of it.
///
/// Implementors supply the root dispatcher and a scope. Every path argument
/// is joined under the scope before it reaches the dispatcher, and every name
/// returned by enumeration has the scope stripped (names outside the scope are
/// left out). A dispatcher is its own root with an empty scope.
pub trait Endpoint {
    /// The root dispatcher all operations end up on.
    fn dispatcher(&self) -> &Dispatcher;

    /// Normalized scope, `""` for the root.
    fn scope(&self) -> &str;

    /// `path` as the root dispatcher sees it.
    fn full_path(&self, path: &str) -> String {
        join(self.scope(), path)
    }

    /// Register `listener` for every published path matching `path`.
    ///
    /// # Errors
    ///
    /// [`IpcError::InvalidPattern`] if `path` does not compile.
    fn on(&self, path: &str, listener: Listener) -> Result<&Self, IpcError>
    where
        Self: Sized,
    {
        self.dispatcher()
            .add_listener_at(&self.full_path(path), listener, false)?;
        Ok(self)
    }

    /// Alias of [`on`](Endpoint::on).
    fn add_listener(&self, path: &str, listener: Listener) -> Result<&Self, IpcError>
    where
        Self: Sized,
    {
        self.on(path, listener)
    }

    /// Register `listener` to fire on the first matching publish only.
    fn once(&self, path: &str, listener: Listener) -> Result<&Self, IpcError>
    where
        Self: Sized,
    {
        self.dispatcher()
            .add_listener_at(&self.full_path(path), listener, true)?;
        Ok(self)
    }

    /// Remove the first registration of `listener` under `path`.
    fn off(&self, path: &str, listener: &Listener) -> &Self
    where
        Self: Sized,
    {
        self.dispatcher()
            .remove_listener_at(&self.full_path(path), listener);
        self
    }

    /// Alias of [`off`](Endpoint::off).
    fn remove_listener(&self, path: &str, listener: &Listener) -> &Self
    where
        Self: Sized,
    {
        self.off(path, listener)
    }

    /// Remove every listener under `path`, or every listener visible here.
    fn remove_all_listeners(&self, path: Option<&str>) -> &Self
    where
        Self: Sized,
    {
        let dispatcher = self.dispatcher();
        match path {
            Some(path) => dispatcher.clear_listeners(Some(&self.full_path(path))),
            None if self.scope().is_empty() => dispatcher.clear_listeners(None),
            None => {
                for name in self.event_names() {
                    dispatcher.clear_listeners(Some(&self.full_path(&name)));
                }
            }
        }
        self
    }

    /// Register the handler answering `invoke` calls for paths matching
    /// `path`.
    ///
    /// # Errors
    ///
    /// [`IpcError::DuplicateHandler`] if a handler is already registered under
    /// exactly this pattern (it stays in place), or
    /// [`IpcError::InvalidPattern`].
    fn handle<F>(&self, path: &str, handler: F) -> Result<&Self, IpcError>
    where
        Self: Sized,
        F: Fn(&Headers, &[Value]) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        let handler: Handler = Arc::new(handler);
        self.dispatcher()
            .add_handler_at(&self.full_path(path), handler, false)?;
        Ok(self)
    }

    /// Register a handler that answers one request, then unregisters itself.
    ///
    /// It is removed before it runs, so racing requests cannot both reach it.
    fn handle_once<F>(&self, path: &str, handler: F) -> Result<&Self, IpcError>
    where
        Self: Sized,
        F: Fn(&Headers, &[Value]) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        let handler: Handler = Arc::new(handler);
        self.dispatcher()
            .add_handler_at(&self.full_path(path), handler, true)?;
        Ok(self)
    }

    /// Remove the handler under `path`, or every handler visible here.
    fn remove_handler(&self, path: Option<&str>) -> &Self
    where
        Self: Sized,
    {
        let dispatcher = self.dispatcher();
        match path {
            Some(path) => dispatcher.clear_handlers(Some(&self.full_path(path))),
            None if self.scope().is_empty() => dispatcher.clear_handlers(None),
            None => {
                for name in self.handler_names() {
                    dispatcher.clear_handlers(Some(&self.full_path(&name)));
                }
            }
        }
        self
    }

    /// Remove every listener and handler visible here.
    fn remove_all(&self) -> &Self
    where
        Self: Sized,
    {
        self.remove_all_listeners(None).remove_handler(None)
    }

    /// Listener patterns visible here, in registration order.
    fn event_names(&self) -> Vec<String> {
        self.dispatcher()
            .listener_patterns()
            .iter()
            .filter_map(|name| strip_scope(self.scope(), name).map(str::to_string))
            .collect()
    }

    /// Handler patterns visible here, in registration order.
    fn handler_names(&self) -> Vec<String> {
        self.dispatcher()
            .handler_patterns()
            .iter()
            .filter_map(|name| strip_scope(self.scope(), name).map(str::to_string))
            .collect()
    }

    /// Number of listeners registered under exactly `path`.
    fn listener_count(&self, path: &str) -> usize {
        self.dispatcher().listener_count_at(&self.full_path(path))
    }

    /// Fire-and-forget publish to every target peer.
    ///
    /// # Errors
    ///
    /// On a spoke, the transport failure if the hub could not be reached.
    fn send(&self, path: &str, args: impl IntoIterator<Item = Value>) -> Result<&Self, IpcError>
    where
        Self: Sized,
    {
        let envelope = Envelope::new(self.full_path(path), Headers::publish(), args.into_iter().collect());
        self.dispatcher().publish(None, envelope)?;
        Ok(self)
    }

    /// Publish to one peer only.
    fn send_to(
        &self,
        peer: PeerId,
        path: &str,
        args: impl IntoIterator<Item = Value>,
    ) -> Result<&Self, IpcError>
    where
        Self: Sized,
    {
        let envelope = Envelope::new(self.full_path(path), Headers::publish(), args.into_iter().collect());
        self.dispatcher().publish(Some(peer), envelope)?;
        Ok(self)
    }

    /// Publish with free-form header pairs next to the reserved ones.
    fn send_with_headers(
        &self,
        path: &str,
        extra: Map<String, Value>,
        args: impl IntoIterator<Item = Value>,
    ) -> Result<&Self, IpcError>
    where
        Self: Sized,
    {
        let headers = Headers {
            extra,
            ..Headers::publish()
        };
        let envelope = Envelope::new(self.full_path(path), headers, args.into_iter().collect());
        self.dispatcher().publish(None, envelope)?;
        Ok(self)
    }

    /// Call the remote handler for `path` and wait for its result, up to the
    /// configured deadline.
    ///
    /// # Errors
    ///
    /// - [`IpcError::NoHandlerFound`] when no peer has a matching handler
    /// - [`IpcError::HandlerFailure`] when every asked peer failed
    /// - [`IpcError::ResponseTimeout`] when the deadline elapses first
    fn invoke(&self, path: &str, args: impl IntoIterator<Item = Value>) -> Result<Value, IpcError> {
        let timeout = self.dispatcher().config().invoke_timeout;
        self.invoke_with_timeout(path, args, timeout)
    }

    /// [`invoke`](Endpoint::invoke) with an explicit deadline.
    fn invoke_with_timeout(
        &self,
        path: &str,
        args: impl IntoIterator<Item = Value>,
        timeout: Duration,
    ) -> Result<Value, IpcError> {
        let args: ArgVec = args.into_iter().collect();
        self.dispatcher()
            .request(&self.full_path(path), args, timeout)
    }

    /// A view of the same root dispatcher scoped under `prefix`.
    ///
    /// Nesting concatenates: `d.prefix("a").prefix("b")` is scoped at `a/b`
    /// and still talks to `d` directly.
    fn prefix(&self, prefix: &str) -> PrefixedView {
        PrefixedView::new(
            self.dispatcher().clone(),
            join(self.scope(), normalize(prefix)),
        )
    }
}

impl Endpoint for Dispatcher {
    fn dispatcher(&self) -> &Dispatcher {
        self
    }

    fn scope(&self) -> &str {
        ""
    }
}
