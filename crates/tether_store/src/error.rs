// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Error type for store operations.

/// An error reported by a store client.
///
/// This is an opaque error that wraps whatever the transport or the store itself
/// reported (refused connections, authentication failures, protocol errors).
/// Callers are not expected to reinterpret it; use [`std::error::Error::source()`]
/// to reach the underlying cause when needed.
///
/// # Example
///
/// ```
/// use tether_store::Error;
///
/// let error = Error::from_message("connection refused");
/// assert!(error.to_string().contains("connection refused"));
/// ```
#[ohno::error]
pub struct Error {}

impl Error {
    /// Creates a new error from anything that can be turned into a boxed error.
    ///
    /// Backends use this to wrap the errors of their client libraries.
    pub fn from_message(cause: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::caused_by(cause)
    }
}

/// A specialized [`Result`] type for store operations.
pub type Result<T> = std::result::Result<T, Error>;
