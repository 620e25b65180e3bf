//! Tunables the state machines leave as constants in spec.md §4, made
//! overridable so tests don't have to sleep for production timeouts.

use std::path::PathBuf;
use std::time::Duration;

/// Default bounded wait for a `CHK` or `RDY` response (spec.md §4.3).
pub const DEFAULT_NEGOTIATION_WAIT: Duration = Duration::from_secs(1);

/// Default bounded wait for `DONE` after the `DATA` phase completes (spec.md §4.3).
pub const DEFAULT_DONE_WAIT: Duration = Duration::from_secs(5 * 60);

/// Default idle window after which a client with no inbound datagram cancels
/// its transaction (spec.md §4.4).
pub const DEFAULT_CLIENT_IDLE_TIMEOUT: Duration = Duration::from_secs(3);

/// Default initial inter-packet gap a client proposes (spec.md §9).
pub const DEFAULT_INITIAL_IPG_US: u32 = 100;

/// Tunables for [`crate::server::Server`].
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub(crate) negotiation_wait: Duration,
    pub(crate) done_wait: Duration,
}

impl Default for ServerConfig {
    fn default() -> ServerConfig {
        ServerConfig {
            negotiation_wait: DEFAULT_NEGOTIATION_WAIT,
            done_wait: DEFAULT_DONE_WAIT,
        }
    }
}

impl ServerConfig {
    /// Starts building a [`ServerConfig`] from the production defaults.
    #[must_use]
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::default()
    }
}

/// Builder for [`ServerConfig`].
#[derive(Debug, Clone, Default)]
pub struct ServerConfigBuilder {
    config: ServerConfig,
}

impl ServerConfigBuilder {
    /// Overrides the `CHK`/`RDY` wait (production default: 1 s).
    #[must_use]
    pub fn negotiation_wait(mut self, wait: Duration) -> ServerConfigBuilder {
        self.config.negotiation_wait = wait;
        self
    }

    /// Overrides the `DONE` wait (production default: 5 min).
    #[must_use]
    pub fn done_wait(mut self, wait: Duration) -> ServerConfigBuilder {
        self.config.done_wait = wait;
        self
    }

    /// Finalizes the configuration.
    #[must_use]
    pub fn build(self) -> ServerConfig {
        self.config
    }
}

/// Tunables for [`crate::client::Client`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub(crate) idle_timeout: Duration,
    pub(crate) initial_ipg_us: u32,
    pub(crate) staging_dir: PathBuf,
}

impl Default for ClientConfig {
    fn default() -> ClientConfig {
        ClientConfig {
            idle_timeout: DEFAULT_CLIENT_IDLE_TIMEOUT,
            initial_ipg_us: DEFAULT_INITIAL_IPG_US,
            staging_dir: std::env::temp_dir(),
        }
    }
}

impl ClientConfig {
    /// Starts building a [`ClientConfig`] from the production defaults.
    #[must_use]
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }
}

/// Builder for [`ClientConfig`].
#[derive(Debug, Clone, Default)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    /// Overrides the idle-to-cancel window (production default: 3 s).
    #[must_use]
    pub fn idle_timeout(mut self, timeout: Duration) -> ClientConfigBuilder {
        self.config.idle_timeout = timeout;
        self
    }

    /// Overrides the initial `ipg_us` proposal (production default: 100).
    #[must_use]
    pub fn initial_ipg_us(mut self, ipg_us: u32) -> ClientConfigBuilder {
        self.config.initial_ipg_us = ipg_us;
        self
    }

    /// Overrides the directory used to stage an incoming file before it is
    /// verified and handed to the attached handler (production default:
    /// the OS temp directory).
    #[must_use]
    pub fn staging_dir(mut self, dir: PathBuf) -> ClientConfigBuilder {
        self.config.staging_dir = dir;
        self
    }

    /// Finalizes the configuration.
    #[must_use]
    pub fn build(self) -> ClientConfig {
        self.config
    }
}
