//! Long poll configuration.

use crate::error::{LongPollError, LongPollResult};
use std::time::Duration;
use updraft_config::{LongPollSettings, OnTransportError};
use updraft_events::DeliveryMode;

/// Longest wait the server accepts, in seconds.
pub const MAX_WAIT: u32 = 90;

/// Newest long poll protocol version.
pub const MAX_VERSION: u32 = 3;

/// Capacity of the update queue; a full queue pauses polling.
pub const QUEUE_CAPACITY: usize = 2;

/// What `run` does when the API executor fails at the transport level.
///
/// Remote failure codes, decode errors and remote application errors are
/// always fatal; only transport errors are subject to this policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorPolicy {
    /// Return the error from `run`.
    #[default]
    FailFast,
    /// Log the error, wait `backoff`, then poll again with the same session.
    LogAndContinue { backoff: Duration },
}

/// Long poll configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LongPollConfig {
    /// Seconds the server holds a poll open
    pub wait: u32,
    /// Protocol version
    pub version: u32,
    pub mode: DeliveryMode,
    pub error_policy: ErrorPolicy,
}

impl Default for LongPollConfig {
    fn default() -> Self {
        Self {
            wait: 25,
            version: MAX_VERSION,
            mode: DeliveryMode::ATTACHMENTS,
            error_policy: ErrorPolicy::FailFast,
        }
    }
}

impl LongPollConfig {
    pub fn validate(&self) -> LongPollResult<()> {
        validate_wait(self.wait)?;
        validate_version(self.version)?;
        if let ErrorPolicy::LogAndContinue { backoff } = self.error_policy {
            if backoff.is_zero() {
                return Err(LongPollError::validation(
                    "error_policy",
                    "retry backoff must not be zero",
                ));
            }
        }
        Ok(())
    }
}

impl TryFrom<&LongPollSettings> for LongPollConfig {
    type Error = LongPollError;

    fn try_from(settings: &LongPollSettings) -> LongPollResult<Self> {
        let config = Self {
            wait: settings.wait,
            version: settings.version,
            mode: parse_mode(settings.mode)?,
            error_policy: match settings.on_transport_error {
                OnTransportError::FailFast => ErrorPolicy::FailFast,
                OnTransportError::LogAndContinue => ErrorPolicy::LogAndContinue {
                    backoff: Duration::from_secs(settings.retry_backoff_secs),
                },
            },
        };
        config.validate()?;
        Ok(config)
    }
}

pub(crate) fn validate_wait(wait: u32) -> LongPollResult<()> {
    if wait == 0 || wait > MAX_WAIT {
        return Err(LongPollError::validation(
            "wait",
            format!("{wait}, must be between 1 and {MAX_WAIT}"),
        ));
    }
    Ok(())
}

pub(crate) fn validate_version(version: u32) -> LongPollResult<()> {
    if version == 0 || version > MAX_VERSION {
        return Err(LongPollError::validation(
            "version",
            format!("{version}, must be between 1 and {MAX_VERSION}"),
        ));
    }
    Ok(())
}

pub(crate) fn parse_mode(bits: u32) -> LongPollResult<DeliveryMode> {
    DeliveryMode::from_raw(bits)
        .ok_or_else(|| LongPollError::validation("mode", format!("unknown bits in {bits}")))
}
