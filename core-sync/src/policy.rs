//! Backoff and restore policy
//!
//! Decides, without doing any I/O, what the worker does after a failed
//! iteration: refresh credentials and retry, wait and retry, or give up.

use crate::SyncError;
use core_runtime::config::SyncSettings;
use std::time::Duration;

/// Classification of a failed call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The access token was rejected. `refreshable` is true only for the
    /// playback token, and only before the one refresh allowed per poll.
    AuthExpired { refreshable: bool },
    /// The messaging service asked us to slow down.
    RateLimited { retry_after: Option<Duration> },
    /// Network, timeout, server or credential-store trouble.
    Transient,
}

impl ErrorKind {
    /// Whether this failure adds to the consecutive-error count.
    pub fn is_counted(&self) -> bool {
        !matches!(self, ErrorKind::AuthExpired { refreshable: true })
    }
}

impl From<&SyncError> for ErrorKind {
    fn from(err: &SyncError) -> Self {
        match err {
            SyncError::AuthExpired(_) => ErrorKind::AuthExpired { refreshable: false },
            SyncError::RateLimited { retry_after } => ErrorKind::RateLimited {
                retry_after: *retry_after,
            },
            _ => ErrorKind::Transient,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Sleep for the given interval, then poll again.
    RetryAfter(Duration),
    /// Refresh the access token and retry the same call once.
    RefreshAndRetry,
    /// Restore the original status and terminate the session.
    Escalate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub error_backoff: Duration,
    pub max_consecutive_errors: u32,
}

impl BackoffPolicy {
    pub fn new(error_backoff: Duration, max_consecutive_errors: u32) -> Self {
        Self {
            error_backoff,
            max_consecutive_errors,
        }
    }

    pub fn from_settings(settings: &SyncSettings) -> Self {
        Self::new(settings.error_backoff, settings.max_consecutive_errors)
    }

    /// `consecutive_errors` already includes the failure being decided on
    /// when that failure [is counted](ErrorKind::is_counted).
    pub fn decide(&self, kind: &ErrorKind, consecutive_errors: u32) -> Decision {
        if let ErrorKind::AuthExpired { refreshable: true } = kind {
            return Decision::RefreshAndRetry;
        }

        if consecutive_errors > self.max_consecutive_errors {
            return Decision::Escalate;
        }

        match kind {
            ErrorKind::RateLimited {
                retry_after: Some(retry_after),
            } => Decision::RetryAfter(self.error_backoff.max(*retry_after)),
            _ => Decision::RetryAfter(self.error_backoff),
        }
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::from_settings(&SyncSettings::default())
    }
}
