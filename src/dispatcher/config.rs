use crate::runtime_config::RuntimeConfig;
use std::time::Duration;

/// Which end of the channel a dispatcher serves.
///
/// The role decides where outbound envelopes go and how many answers an
/// `invoke` waits for:
///
/// | Role | `send` / `invoke` targets | retry budget |
/// |---|---|---|
/// | `Spoke` | the hub | 1 |
/// | `Hub` | every peer the transport lists at send time | peer count |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Hub,
    Spoke,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Hub => f.write_str("hub"),
            Role::Spoke => f.write_str("spoke"),
        }
    }
}

/// Per-dispatcher settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatcherConfig {
    pub role: Role,
    /// Deadline used by `invoke`
    pub invoke_timeout: Duration,
    /// Stack size of handler coroutines
    pub stack_size: usize,
}

impl DispatcherConfig {
    /// Settings for `role`, with timeout and stack size taken from
    /// [`RuntimeConfig::from_env`].
    #[must_use]
    pub fn new(role: Role) -> Self {
        let runtime = RuntimeConfig::from_env();
        Self {
            role,
            invoke_timeout: runtime.invoke_timeout,
            stack_size: runtime.stack_size,
        }
    }

    #[must_use]
    pub fn hub() -> Self {
        Self::new(Role::Hub)
    }

    #[must_use]
    pub fn spoke() -> Self {
        Self::new(Role::Spoke)
    }

    #[must_use]
    pub fn with_invoke_timeout(mut self, timeout: Duration) -> Self {
        self.invoke_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_stack_size(mut self, stack_size: usize) -> Self {
        self.stack_size = stack_size;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builders_override_env_defaults() {
        let config = DispatcherConfig::spoke()
            .with_invoke_timeout(Duration::from_millis(20))
            .with_stack_size(0x8000);
        assert_eq!(config.role, Role::Spoke);
        assert_eq!(config.invoke_timeout, Duration::from_millis(20));
        assert_eq!(config.stack_size, 0x8000);
        assert_eq!(DispatcherConfig::hub().role.to_string(), "hub");
    }
}
