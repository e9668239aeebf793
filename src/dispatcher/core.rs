use super::config::{DispatcherConfig, Role};
use crate::correlator::ResponseCorrelator;
use crate::envelope::{ArgVec, Envelope, Headers};
use crate::error::{IpcError, RemoteError, TransportError};
use crate::ids::{PeerId, RequestId};
use crate::registry::{
    Handler, HandlerMatch, HandlerRegistry, Listener, ListenerMatch, ListenerRegistry,
};
use crate::runtime_config::spawn_coroutine;
use crate::transport::{InboundSink, Transport};
use may::sync::mpsc;
use serde_json::Value;
use smallvec::smallvec;
use std::any::Any;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

struct Inner {
    config: DispatcherConfig,
    transport: Arc<dyn Transport>,
    listeners: RwLock<ListenerRegistry>,
    handlers: RwLock<HandlerRegistry>,
    correlator: ResponseCorrelator,
    inbound_tx: mpsc::Sender<(PeerId, Envelope)>,
}

/// Endpoint of a hub/spoke channel.
///
/// Cheap to clone: clones share registries, pending requests and transport.
/// The public operations live on [`Endpoint`](super::Endpoint).
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("config", &self.inner.config)
            .field("pending_requests", &self.inner.correlator.len())
            .finish_non_exhaustive()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}

impl Dispatcher {
    /// Bind a dispatcher to `transport` and start receiving from it.
    ///
    /// The inbound sink and the dispatch coroutine hold only weak references:
    /// once every handle to this dispatcher is dropped, inbound envelopes are
    /// discarded and the dispatch coroutine exits.
    pub fn new<T>(transport: T, config: DispatcherConfig) -> Self
    where
        T: Transport + 'static,
    {
        let (inbound_tx, inbound_rx) = mpsc::channel();
        let inner = Arc::new(Inner {
            config,
            transport: Arc::new(transport),
            listeners: RwLock::new(ListenerRegistry::new()),
            handlers: RwLock::new(HandlerRegistry::new()),
            correlator: ResponseCorrelator::new(),
            inbound_tx,
        });

        Self::start_dispatch_loop(Arc::downgrade(&inner), inbound_rx, &config);

        let weak = Arc::downgrade(&inner);
        let sink: InboundSink = Arc::new(move |from: PeerId, envelope: Envelope| {
            match weak.upgrade() {
                Some(inner) => Dispatcher { inner }.on_envelope(from, envelope),
                None => debug!(
                    from = %from,
                    path = %envelope.path,
                    "Dispatcher dropped; envelope discarded"
                ),
            }
        });
        inner.transport.subscribe(sink);

        info!(
            role = %config.role,
            invoke_timeout_ms = config.invoke_timeout.as_millis() as u64,
            stack_size = config.stack_size,
            "Dispatcher started"
        );
        Self { inner }
    }

    /// Drain queued inbound envelopes one at a time, in arrival order.
    ///
    /// If the coroutine cannot be spawned the receiver is dropped with it and
    /// [`on_envelope`](Self::on_envelope) falls back to dispatching inline.
    fn start_dispatch_loop(
        weak: Weak<Inner>,
        inbound_rx: mpsc::Receiver<(PeerId, Envelope)>,
        config: &DispatcherConfig,
    ) {
        let role = config.role;
        let _ = spawn_coroutine(
            &format!("brrtbus-dispatch-{role}"),
            config.stack_size,
            move || {
                debug!(role = %role, "Dispatch loop started");
                while let Ok((from, envelope)) = inbound_rx.recv() {
                    let Some(inner) = weak.upgrade() else {
                        break;
                    };
                    Dispatcher { inner }.deliver(from, envelope);
                }
                debug!(role = %role, "Dispatch loop stopped");
            },
        );
    }

    /// Hub-role dispatcher with settings from the environment.
    pub fn hub<T: Transport + 'static>(transport: T) -> Self {
        Self::new(transport, DispatcherConfig::hub())
    }

    /// Spoke-role dispatcher with settings from the environment.
    pub fn spoke<T: Transport + 'static>(transport: T) -> Self {
        Self::new(transport, DispatcherConfig::spoke())
    }

    #[must_use]
    pub fn config(&self) -> &DispatcherConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn role(&self) -> Role {
        self.inner.config.role
    }

    /// Number of `invoke` calls still waiting for an outcome.
    #[must_use]
    pub fn pending_requests(&self) -> usize {
        self.inner.correlator.len()
    }

    /// Peers an outbound envelope goes to, snapshotted now.
    #[must_use]
    pub fn targets(&self) -> Vec<PeerId> {
        match self.inner.config.role {
            Role::Spoke => vec![PeerId::HUB],
            Role::Hub => self.inner.transport.peers(),
        }
    }

    fn listeners(&self) -> RwLockReadGuard<'_, ListenerRegistry> {
        self.inner
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn listeners_mut(&self) -> RwLockWriteGuard<'_, ListenerRegistry> {
        self.inner
            .listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn handlers(&self) -> RwLockReadGuard<'_, HandlerRegistry> {
        self.inner
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn handlers_mut(&self) -> RwLockWriteGuard<'_, HandlerRegistry> {
        self.inner
            .handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    // Registry access by full (already prefixed) pattern.

    pub(crate) fn add_listener_at(
        &self,
        pattern: &str,
        listener: Listener,
        once: bool,
    ) -> Result<(), IpcError> {
        let mut listeners = self.listeners_mut();
        if once {
            listeners.add_once(pattern, listener)?;
        } else {
            listeners.add(pattern, listener)?;
        }
        debug!(pattern = %pattern, once = once, "Listener registered");
        Ok(())
    }

    pub(crate) fn remove_listener_at(&self, pattern: &str, listener: &Listener) -> bool {
        self.listeners_mut().remove(pattern, listener)
    }

    pub(crate) fn clear_listeners(&self, pattern: Option<&str>) {
        self.listeners_mut().remove_all(pattern);
    }

    pub(crate) fn listener_patterns(&self) -> Vec<String> {
        self.listeners().names()
    }

    pub(crate) fn listener_count_at(&self, pattern: &str) -> usize {
        self.listeners().listener_count(pattern)
    }

    pub(crate) fn add_handler_at(
        &self,
        pattern: &str,
        handler: Handler,
        once: bool,
    ) -> Result<(), IpcError> {
        let mut handlers = self.handlers_mut();
        let added = if once {
            handlers.add_once(pattern, handler)
        } else {
            handlers.add(pattern, handler)
        };
        match added {
            Ok(_) => {
                debug!(pattern = %pattern, once = once, "Handler registered");
                Ok(())
            }
            Err(e) => {
                warn!(pattern = %pattern, error = %e, "Handler registration rejected");
                Err(e)
            }
        }
    }

    pub(crate) fn clear_handlers(&self, pattern: Option<&str>) {
        self.handlers_mut().remove(pattern);
    }

    pub(crate) fn handler_patterns(&self) -> Vec<String> {
        self.handlers().names()
    }

    // Outbound.

    /// Publish `envelope` to `to`, or to every target when `to` is `None`.
    ///
    /// A spoke reports its single emit failure. A hub logs per-peer failures
    /// and keeps going, since one peer must not block delivery to the rest.
    pub(crate) fn publish(&self, to: Option<PeerId>, envelope: Envelope) -> Result<(), IpcError> {
        let broadcast = to.is_none() && self.role() == Role::Hub;
        let targets = match to {
            Some(peer) => vec![peer],
            None => self.targets(),
        };
        debug!(
            path = %envelope.path,
            req_id = %envelope.headers.req_id,
            peers = targets.len(),
            "Publishing"
        );

        if !broadcast {
            for peer in targets {
                self.inner.transport.emit(peer, envelope.clone())?;
            }
            return Ok(());
        }

        for peer in targets {
            if let Err(e) = self.inner.transport.emit(peer, envelope.clone()) {
                warn!(peer = %peer, path = %envelope.path, error = %e, "Broadcast to peer failed");
            }
        }
        Ok(())
    }

    /// Send a handler-bound request for `path` and wait for its outcome.
    pub(crate) fn request(
        &self,
        path: &str,
        args: ArgVec,
        timeout: Duration,
    ) -> Result<Value, IpcError> {
        let targets = self.targets();
        let headers = Headers::request();
        let req_id = headers.req_id;
        let started = Instant::now();
        let reply = self
            .inner
            .correlator
            .register(req_id, path, targets.len(), timeout);

        if targets.is_empty() {
            debug!(req_id = %req_id, path = %path, "No peers to ask");
            self.inner.correlator.fail(
                req_id,
                IpcError::NoHandlerFound {
                    path: path.to_string(),
                },
            );
            return self.inner.correlator.wait(reply);
        }

        info!(req_id = %req_id, path = %path, peers = targets.len(), "Invoking");
        let envelope = Envelope::new(path, headers, args);
        let mut last_failure: Option<TransportError> = None;
        let mut failures = 0usize;
        for peer in &targets {
            if let Err(e) = self.inner.transport.emit(*peer, envelope.clone()) {
                warn!(req_id = %req_id, peer = %peer, path = %path, error = %e, "Request emit failed");
                failures += 1;
                last_failure = Some(e);
            }
        }

        if let Some(e) = last_failure {
            if failures == targets.len() {
                self.inner.correlator.fail(req_id, IpcError::Transport(e));
            } else {
                // Unreachable peers will never answer; spend their share of
                // the budget now.
                for _ in 0..failures {
                    self.inner.correlator.settle(
                        req_id,
                        Some(RemoteError::no_handler(path)),
                        Value::Null,
                    );
                }
            }
        }

        let outcome = self.inner.correlator.wait(reply);
        debug!(
            req_id = %req_id,
            path = %path,
            ok = outcome.is_ok(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Invoke settled"
        );
        outcome
    }

    /// Answer request `res_id`, which arrived from `to` for `path`.
    ///
    /// # Errors
    ///
    /// Returns the transport's failure if the response could not be emitted.
    pub fn respond(
        &self,
        to: PeerId,
        res_id: RequestId,
        path: &str,
        result: Result<Value, RemoteError>,
    ) -> Result<(), IpcError> {
        let (error, args): (_, ArgVec) = match result {
            Ok(value) => (None, smallvec![value]),
            Err(error) => (Some(error), ArgVec::new()),
        };
        let envelope = Envelope::new(path, Headers::response(res_id, error), args);
        debug!(
            peer = %to,
            res_id = %res_id,
            path = %path,
            error = envelope.headers.error.is_some(),
            "Responding"
        );
        self.inner.transport.emit(to, envelope)?;
        Ok(())
    }

    // Inbound.

    /// Route one inbound envelope from `from`.
    ///
    /// Responses settle pending `invoke` calls right here and go nowhere else,
    /// so a listener blocked in `invoke` still gets its answer. Anything else
    /// is queued for the dispatch coroutine.
    pub fn on_envelope(&self, from: PeerId, envelope: Envelope) {
        if let Some(res_id) = envelope.headers.res_id {
            let Envelope {
                path,
                mut headers,
                args,
            } = envelope;
            let value = args.into_iter().next().unwrap_or(Value::Null);
            if !self
                .inner
                .correlator
                .settle(res_id, headers.error.take(), value)
            {
                debug!(from = %from, res_id = %res_id, path = %path, "Response for unknown request dropped");
            }
            return;
        }

        if let Err(std::sync::mpsc::SendError((from, envelope))) =
            self.inner.inbound_tx.send((from, envelope))
        {
            self.deliver(from, envelope);
        }
    }

    /// Fire every matching listener, then, for handler-bound requests, the
    /// first matching handler.
    fn deliver(&self, from: PeerId, envelope: Envelope) {
        let Envelope {
            path,
            mut headers,
            args,
        } = envelope;

        debug!(from = %from, req_id = %headers.req_id, path = %path, "Inbound envelope");
        self.fire_listeners(&path, &mut headers, &args);

        if headers.is_handler_bound() {
            self.dispatch_request(from, path, headers, args);
        }
    }

    fn fire_listeners(&self, path: &str, headers: &mut Headers, args: &[Value]) {
        // Snapshot, then release the lock: listeners may register or remove.
        let matches = self.listeners().matching(path);

        for ListenerMatch {
            pattern,
            params,
            slots,
        } in matches
        {
            headers.params = params;
            for slot in slots {
                if !slot.claim() {
                    continue;
                }
                if slot.is_once() {
                    self.listeners_mut().remove_slot(&pattern, slot.id());
                }
                let listener = slot.listener();
                if let Err(panic) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                    listener(&mut *headers, args)
                })) {
                    error!(
                        pattern = %pattern,
                        path = %path,
                        panic_message = %panic_message(panic.as_ref()),
                        "Listener panicked"
                    );
                }
            }
        }
    }

    fn dispatch_request(&self, from: PeerId, path: String, mut headers: Headers, args: ArgVec) {
        let req_id = headers.req_id;
        let found = self.handlers().find(&path);

        let Some(HandlerMatch {
            pattern,
            params,
            slot,
        }) = found
        else {
            debug!(from = %from, req_id = %req_id, path = %path, "No handler found");
            if let Err(e) = self.respond(from, req_id, &path, Err(RemoteError::no_handler(&path))) {
                warn!(req_id = %req_id, path = %path, error = %e, "Failed to send no-handler response");
            }
            return;
        };

        if slot.is_once() {
            self.handlers_mut().remove_slot(&pattern, slot.id());
        }
        headers.params = params;

        let this = self.clone();
        let handler = Arc::clone(slot.handler());
        let handler_path = path.clone();
        let spawned = spawn_coroutine(
            &format!("brrtbus-handler-{req_id}"),
            self.inner.config.stack_size,
            move || {
                let started = Instant::now();
                let outcome = match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                    handler(&headers, args.as_slice())
                })) {
                    Ok(Ok(value)) => Ok(value),
                    Ok(Err(e)) => {
                        warn!(req_id = %req_id, pattern = %pattern, error = %e, "Handler failed");
                        Err(RemoteError::handler_failure(format!("{e:#}")))
                    }
                    Err(panic) => {
                        let message = panic_message(panic.as_ref());
                        error!(
                            req_id = %req_id,
                            pattern = %pattern,
                            panic_message = %message,
                            "Handler panicked"
                        );
                        Err(RemoteError::handler_failure(message))
                    }
                };
                debug!(
                    req_id = %req_id,
                    pattern = %pattern,
                    execution_time_ms = started.elapsed().as_millis() as u64,
                    "Handler execution complete"
                );
                if let Err(e) = this.respond(from, req_id, &handler_path, outcome) {
                    warn!(req_id = %req_id, path = %handler_path, error = %e, "Failed to send response");
                }
            },
        );

        if spawned.is_err() {
            let failure = RemoteError::handler_failure("failed to spawn handler coroutine");
            if let Err(e) = self.respond(from, req_id, &path, Err(failure)) {
                warn!(req_id = %req_id, path = %path, error = %e, "Failed to send response");
            }
        }
    }
}
