//! The unit exchanged over the transport.
//!
//! An [`Envelope`] is a path, a set of [`Headers`] and an ordered list of
//! argument values. Envelopes are built once per `send`, `invoke` or response
//! and handed to the transport by value.

use crate::error::RemoteError;
use crate::ids::RequestId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use smallvec::SmallVec;
use std::collections::HashMap;

/// Maximum number of arguments stored inline before heap allocation.
pub const MAX_INLINE_ARGS: usize = 4;

/// Argument list of an envelope (stack-allocated for ≤4 args).
pub type ArgVec = SmallVec<[Value; MAX_INLINE_ARGS]>;

/// Named parameters extracted by the receiver when a pattern matches.
pub type Params = HashMap<String, String>;

/// Envelope headers.
///
/// `req_id` is fresh for every outbound envelope. `handler` is set only on
/// requests that expect a handled response, `res_id` and `error` only on
/// responses. `params` is filled in by the receiver at match time. Any other
/// key/value pairs supplied by the sender live in `extra` and are flattened
/// next to the reserved keys on the wire.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Headers {
    pub req_id: RequestId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handler: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub res_id: Option<RequestId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RemoteError>,
    #[serde(default)]
    pub params: Params,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Headers {
    /// Headers for a fire-and-forget publish.
    #[must_use]
    pub fn publish() -> Self {
        Self::default()
    }

    /// Headers for a handler-bound request.
    #[must_use]
    pub fn request() -> Self {
        Self {
            handler: Some(true),
            ..Self::default()
        }
    }

    /// Headers for the response to `res_id`.
    #[must_use]
    pub fn response(res_id: RequestId, error: Option<RemoteError>) -> Self {
        Self {
            res_id: Some(res_id),
            error,
            ..Self::default()
        }
    }

    /// Whether the envelope expects a handled response.
    #[inline]
    #[must_use]
    pub fn is_handler_bound(&self) -> bool {
        self.handler == Some(true)
    }

    /// Get an extracted parameter by name.
    #[inline]
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }
}

/// One routed message unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub path: String,
    pub headers: Headers,
    #[serde(default)]
    pub args: ArgVec,
}

impl Envelope {
    #[must_use]
    pub fn new(path: impl Into<String>, headers: Headers, args: ArgVec) -> Self {
        Self {
            path: path.into(),
            headers,
            args,
        }
    }

    /// First argument, or `Null` when the envelope carries none.
    #[must_use]
    pub fn first_arg(&self) -> Value {
        self.args.first().cloned().unwrap_or(Value::Null)
    }
}
