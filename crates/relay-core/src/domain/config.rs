//! Relay tuning parameters.
//!
//! [`RelayConfig`] carries the five knobs that govern a peer's lifetime:
//! how long a silent peer is tolerated, how often it is probed, how large an
//! inbound frame may be, how many undelivered frames may queue up before the
//! peer is evicted, and how long a single write may take.
//!
//! Like the rest of the domain layer this is a plain struct: no file I/O and
//! no environment lookups.  The server crate populates it from TOML and CLI
//! arguments and calls [`RelayConfig::validate`] before use.

use std::time::Duration;

use thiserror::Error;

/// Default time a peer may stay silent (no probe-response) before it is
/// considered dead.
pub const DEFAULT_LIVENESS_TIMEOUT: Duration = Duration::from_secs(60);

/// Default maximum size of one inbound frame, in bytes.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 10_000;

/// Default number of undelivered frames buffered per peer.
pub const DEFAULT_OUTBOUND_QUEUE_CAPACITY: usize = 256;

/// Default time allowed for one outbound write.
pub const DEFAULT_WRITE_DEADLINE: Duration = Duration::from_secs(10);

/// Error returned by [`RelayConfig::validate`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// Probes would not arrive before the peer is declared dead.
    #[error("probe period ({probe_period:?}) must be shorter than the liveness timeout ({liveness_timeout:?})")]
    ProbePeriodTooLong {
        probe_period: Duration,
        liveness_timeout: Duration,
    },

    /// A duration that must be positive was zero.
    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),

    /// A size or capacity that must be positive was zero.
    #[error("{0} must be greater than zero")]
    ZeroSize(&'static str),
}

/// Runtime tunables shared by every peer.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use relay_core::domain::RelayConfig;
///
/// let cfg = RelayConfig::with_liveness_timeout(Duration::from_secs(30));
/// assert_eq!(cfg.probe_period, Duration::from_secs(27));
/// assert!(cfg.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    /// A peer is considered dead if no probe-response arrives within this
    /// window.  This is also the inbound read deadline.
    pub liveness_timeout: Duration,

    /// Interval between liveness probes.  Must be shorter than
    /// `liveness_timeout` so a healthy peer always answers in time.
    pub probe_period: Duration,

    /// Inbound frames larger than this many bytes terminate the connection.
    pub max_frame_size: usize,

    /// Maximum number of buffered, undelivered frames per peer.  A broadcast
    /// that finds the queue full evicts the peer.
    pub outbound_queue_capacity: usize,

    /// Maximum time allowed for one outbound write (frames, probe or close).
    pub write_deadline: Duration,
}

impl RelayConfig {
    /// Builds a config with the given liveness timeout, deriving the probe
    /// period as 9/10 of it.  All other fields take their defaults.
    pub fn with_liveness_timeout(liveness_timeout: Duration) -> Self {
        Self {
            liveness_timeout,
            probe_period: probe_period_for(liveness_timeout),
            ..Self::default()
        }
    }

    /// Checks the invariants the peer pumps rely on.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::ZeroDuration`] if any duration is zero.
    /// - [`ConfigError::ProbePeriodTooLong`] if `probe_period >= liveness_timeout`.
    /// - [`ConfigError::ZeroSize`] if the frame size limit or queue capacity is
    ///   zero (a zero-capacity queue could never accept a frame).
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.liveness_timeout.is_zero() {
            return Err(ConfigError::ZeroDuration("liveness_timeout"));
        }
        if self.probe_period.is_zero() {
            return Err(ConfigError::ZeroDuration("probe_period"));
        }
        if self.write_deadline.is_zero() {
            return Err(ConfigError::ZeroDuration("write_deadline"));
        }
        if self.probe_period >= self.liveness_timeout {
            return Err(ConfigError::ProbePeriodTooLong {
                probe_period: self.probe_period,
                liveness_timeout: self.liveness_timeout,
            });
        }
        if self.max_frame_size == 0 {
            return Err(ConfigError::ZeroSize("max_frame_size"));
        }
        if self.outbound_queue_capacity == 0 {
            return Err(ConfigError::ZeroSize("outbound_queue_capacity"));
        }
        Ok(())
    }
}

impl Default for RelayConfig {
    /// | Field                     | Default      |
    /// |---------------------------|--------------|
    /// | liveness_timeout          | 60 seconds   |
    /// | probe_period              | 54 seconds   |
    /// | max_frame_size            | 10 000 bytes |
    /// | outbound_queue_capacity   | 256 frames   |
    /// | write_deadline            | 10 seconds   |
    fn default() -> Self {
        Self {
            liveness_timeout: DEFAULT_LIVENESS_TIMEOUT,
            probe_period: probe_period_for(DEFAULT_LIVENESS_TIMEOUT),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            outbound_queue_capacity: DEFAULT_OUTBOUND_QUEUE_CAPACITY,
            write_deadline: DEFAULT_WRITE_DEADLINE,
        }
    }
}

/// Probe period derived from a liveness timeout: 9/10 of it.
pub fn probe_period_for(liveness_timeout: Duration) -> Duration {
    liveness_timeout * 9 / 10
}

// ── Tests ─────────────────────────────────────────────────────────────────────
