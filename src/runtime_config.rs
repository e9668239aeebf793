//! # Runtime Configuration Module
//!
//! Environment-driven settings for the coroutine runtime that carries inbound
//! dispatch, handler execution and `invoke` waits.
//!
//! ## Environment Variables
//!
//! ### `BRRTB_STACK_SIZE`
//!
//! Stack size for handler and transport pump coroutines. Accepts decimal
//! (`65536`) or hexadecimal (`0x10000`). Default: `0x10000` (64 KB).
//!
//! Handlers may call `invoke` themselves, which nests a blocking wait inside
//! the handler coroutine, so the default is larger than a plain request
//! handler would need.
//!
//! ### `BRRTB_INVOKE_TIMEOUT_MS`
//!
//! Default deadline for `invoke`, in milliseconds. Default: `5000`.
//!
//! ## Usage
//!
//! ```rust
//! use brrtbus::runtime_config::RuntimeConfig;
//!
//! let config = RuntimeConfig::from_env();
//! println!("Stack size: {} bytes", config.stack_size);
//! ```

use may::coroutine::{self, JoinHandle};
use std::env;
use std::time::Duration;
use tracing::error;

/// Default coroutine stack size (64 KB).
pub const DEFAULT_STACK_SIZE: usize = 0x10000;

/// Default `invoke` deadline.
pub const DEFAULT_INVOKE_TIMEOUT: Duration = Duration::from_millis(5000);

/// Runtime configuration loaded from environment variables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Stack size for coroutines in bytes
    pub stack_size: usize,
    /// Default deadline for `invoke`
    pub invoke_timeout: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            stack_size: DEFAULT_STACK_SIZE,
            invoke_timeout: DEFAULT_INVOKE_TIMEOUT,
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let stack_size = env::var("BRRTB_STACK_SIZE")
            .ok()
            .and_then(|val| parse_stack_size(&val))
            .unwrap_or(DEFAULT_STACK_SIZE);
        let invoke_timeout = env::var("BRRTB_INVOKE_TIMEOUT_MS")
            .ok()
            .and_then(|val| val.trim().parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_INVOKE_TIMEOUT);
        RuntimeConfig {
            stack_size,
            invoke_timeout,
        }
    }
}

/// Parse a stack size given in decimal or `0x`-prefixed hexadecimal.
pub fn parse_stack_size(val: &str) -> Option<usize> {
    let val = val.trim();
    match val.strip_prefix("0x") {
        Some(hex) => usize::from_str_radix(hex, 16).ok(),
        None => val.parse().ok(),
    }
}

/// Spawn a named coroutine with the given stack size.
///
/// Spawn failures are logged here and returned to the caller, which decides
/// whether the work can be dropped.
pub fn spawn_coroutine<F>(name: &str, stack_size: usize, f: F) -> std::io::Result<JoinHandle<()>>
where
    F: FnOnce() + Send + 'static,
{
    // SAFETY: may::coroutine::Builder::spawn() is marked unsafe by the may runtime.
    // The closure is Send + 'static, so it holds no borrowed state, and it never
    // touches thread-local storage directly.
    let result = unsafe {
        coroutine::Builder::new()
            .name(name.to_string())
            .stack_size(stack_size)
            .spawn(f)
    };
    if let Err(e) = &result {
        error!(
            coroutine = %name,
            stack_size = stack_size,
            error = %e,
            "Failed to spawn coroutine"
        );
    }
    result
}
