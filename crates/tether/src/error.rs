// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::Duration;

/// The result for fallible operations in this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// A boxed error raised by a [`Discovery`](crate::Discovery) or
/// [`CredentialStore`](crate::CredentialStore) implementation.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// An error reported by the cache and lock components.
///
/// Configuration, state and argument errors are detected locally and never reach
/// the store. Errors raised by the store client are wrapped in [`Error::Store`]
/// without being reinterpreted.
///
/// Absent cache keys and locks held by someone else are not errors; they are
/// reported through the successful return values of the corresponding operations.
///
/// # Examples
///
/// ```
/// use tether::Error;
///
/// let error = Error::InvalidState {
///     correlation_id: "123".to_string(),
///     message: "connection is not opened".to_string(),
/// };
///
/// assert_eq!(error.code(), "NOT_OPENED");
/// assert_eq!(error.correlation_id(), Some("123"));
/// ```
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The component configuration is missing or invalid.
    #[error("[{correlation_id}] {code}: {message}")]
    Configuration {
        /// The correlation id of the failed call.
        correlation_id: String,
        /// A stable, machine-readable code such as `NO_CONNECTION`.
        code: &'static str,
        /// A description of the problem.
        message: String,
    },

    /// The operation requires an open component.
    #[error("[{correlation_id}] NOT_OPENED: {message}")]
    InvalidState {
        /// The correlation id of the failed call.
        correlation_id: String,
        /// A description of the problem.
        message: String,
    },

    /// An argument is outside of its valid range.
    #[error("[{correlation_id}] INVALID_ARGUMENT: {message}")]
    InvalidArgument {
        /// The correlation id of the failed call.
        correlation_id: String,
        /// A description of the problem.
        message: String,
    },

    /// Bounded lock acquisition ran out of attempts or time.
    #[error("[{correlation_id}] LOCK_TIMEOUT: failed to acquire lock '{key}' after {attempts} attempts in {waited:?}")]
    LockTimeout {
        /// The correlation id of the failed call.
        correlation_id: String,
        /// The lock key.
        key: String,
        /// The number of acquisition attempts made.
        attempts: u32,
        /// The time spent acquiring.
        waited: Duration,
    },

    /// A discovery service or credential store failed to resolve a key.
    #[error("[{correlation_id}] RESOLUTION: {source}")]
    Resolution {
        /// The correlation id of the failed call.
        correlation_id: String,
        /// The error raised by the resolver.
        source: BoxError,
    },

    /// The store client failed.
    #[error(transparent)]
    Store(#[from] tether_store::Error),
}

impl Error {
    /// Creates an [`Error::Resolution`] from an error raised by a resolver.
    pub fn resolution(correlation_id: &str, source: impl Into<BoxError>) -> Self {
        Self::Resolution {
            correlation_id: correlation_id.to_string(),
            source: source.into(),
        }
    }

    pub(crate) fn configuration(correlation_id: &str, code: &'static str, message: impl Into<String>) -> Self {
        Self::Configuration {
            correlation_id: correlation_id.to_string(),
            code,
            message: message.into(),
        }
    }

    pub(crate) fn not_opened(correlation_id: &str) -> Self {
        Self::InvalidState {
            correlation_id: correlation_id.to_string(),
            message: "connection is not opened".to_string(),
        }
    }

    pub(crate) fn invalid_argument(correlation_id: &str, message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            correlation_id: correlation_id.to_string(),
            message: message.into(),
        }
    }

    /// Returns the stable code of this error.
    #[must_use]
    pub fn code(&self) -> &str {
        match self {
            Self::Configuration { code, .. } => code,
            Self::InvalidState { .. } => "NOT_OPENED",
            Self::InvalidArgument { .. } => "INVALID_ARGUMENT",
            Self::LockTimeout { .. } => "LOCK_TIMEOUT",
            Self::Resolution { .. } => "RESOLUTION",
            Self::Store(_) => "STORE",
        }
    }

    /// Returns the correlation id of the call that failed, if the error carries one.
    ///
    /// Store errors originate below the components and carry no correlation id.
    #[must_use]
    pub fn correlation_id(&self) -> Option<&str> {
        match self {
            Self::Configuration { correlation_id, .. }
            | Self::InvalidState { correlation_id, .. }
            | Self::InvalidArgument { correlation_id, .. }
            | Self::LockTimeout { correlation_id, .. }
            | Self::Resolution { correlation_id, .. } => Some(correlation_id),
            Self::Store(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error as _;

    use super::*;

    static_assertions::assert_impl_all!(Error: Send, Sync, std::error::Error);

    #[test]
    fn display_carries_code_and_correlation_id() {
        let error = Error::configuration("abc", "NO_CONNECTION", "connection is not configured");
        assert_eq!(error.to_string(), "[abc] NO_CONNECTION: connection is not configured");
        assert_eq!(error.code(), "NO_CONNECTION");
    }

    #[test]
    fn lock_timeout_display() {
        let error = Error::LockTimeout {
            correlation_id: "c".to_string(),
            key: "orders".to_string(),
            attempts: 4,
            waited: Duration::from_millis(300),
        };

        assert_eq!(
            error.to_string(),
            "[c] LOCK_TIMEOUT: failed to acquire lock 'orders' after 4 attempts in 300ms"
        );
    }

    #[test]
    fn store_error_is_transparent() {
        let error = Error::from(tether_store::Error::from_message("connection reset"));

        assert!(error.to_string().contains("connection reset"));
        assert_eq!(error.code(), "STORE");
        assert_eq!(error.correlation_id(), None);
    }

    #[test]
    fn resolution_keeps_source() {
        let error = Error::resolution("c", "vault unavailable");

        assert_eq!(error.source().map(ToString::to_string).as_deref(), Some("vault unavailable"));
        assert_eq!(error.correlation_id(), Some("c"));
    }
}
