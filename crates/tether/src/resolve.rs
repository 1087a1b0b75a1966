// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Resolution of connection and credential parameters.

use std::fmt::{self, Debug};
use std::sync::Arc;

use crate::{Config, ConnectionParams, CredentialParams, Error, Result};

/// A discovery service that maps a discovery key to connection parameters.
///
/// Implementations report a key they do not know with `Ok(None)` and reserve errors
/// for failures of the service itself. Errors are returned to the caller of `open`
/// unchanged; use [`Error::resolution`] to wrap foreign errors.
pub trait Discovery: Send + Sync {
    /// Resolves `key` to a single set of connection parameters.
    fn resolve_one(&self, correlation_id: &str, key: &str) -> Result<Option<ConnectionParams>>;
}

/// A credential store that maps a store key to credential parameters.
///
/// Implementations report a key they do not know with `Ok(None)`. Errors are
/// returned to the caller of `open` unchanged.
pub trait CredentialStore: Send + Sync {
    /// Looks up the credential stored under `key`.
    fn lookup(&self, correlation_id: &str, key: &str) -> Result<Option<CredentialParams>>;
}

/// The collaborators a component resolves its parameters through.
///
/// # Examples
///
/// ```
/// use tether::{ConnectionParams, Discovery, References, Result};
///
/// struct Fixed;
///
/// impl Discovery for Fixed {
///     fn resolve_one(&self, _correlation_id: &str, _key: &str) -> Result<Option<ConnectionParams>> {
///         Ok(Some(ConnectionParams {
///             host: Some("cache.internal".to_string()),
///             ..ConnectionParams::default()
///         }))
///     }
/// }
///
/// let references = References::new().with_discovery(Fixed);
/// ```
#[derive(Clone, Default)]
pub struct References {
    discovery: Vec<Arc<dyn Discovery>>,
    credential_stores: Vec<Arc<dyn CredentialStore>>,
}

impl References {
    /// Creates an empty set of references.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a discovery service. Services are consulted in the order they were added.
    #[must_use]
    pub fn with_discovery(mut self, discovery: impl Discovery + 'static) -> Self {
        self.discovery.push(Arc::new(discovery));
        self
    }

    /// Adds a credential store. Stores are consulted in the order they were added.
    #[must_use]
    pub fn with_credential_store(mut self, store: impl CredentialStore + 'static) -> Self {
        self.credential_stores.push(Arc::new(store));
        self
    }
}

impl Debug for References {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("References")
            .field("discovery", &self.discovery.len())
            .field("credential_stores", &self.credential_stores.len())
            .finish()
    }
}

/// Resolves the connection parameters a component connects with.
///
/// Configured entries are tried in order. An entry without a discovery key is used
/// as is; an entry with one is resolved through the discovery services and skipped
/// if none of them knows the key.
#[derive(Clone, Default)]
pub struct ConnectionResolver {
    connections: Vec<ConnectionParams>,
    discovery: Vec<Arc<dyn Discovery>>,
}

impl ConnectionResolver {
    /// Creates a resolver with no connections.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the configured connections with those in `config`.
    pub fn configure(&mut self, config: &Config) {
        self.connections = config.all_connections().cloned().collect();
    }

    /// Replaces the discovery services with those in `references`.
    pub fn set_references(&mut self, references: &References) {
        self.discovery.clone_from(&references.discovery);
    }

    /// Returns the first connection that resolves, or `None` if none does.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] with code `NO_DISCOVERY` if an entry needs
    /// discovery and no discovery service is registered, and passes through errors
    /// raised by discovery services.
    pub fn resolve(&self, correlation_id: &str) -> Result<Option<ConnectionParams>> {
        for connection in &self.connections {
            let Some(key) = &connection.discovery_key else {
                return Ok(Some(connection.clone()));
            };

            if self.discovery.is_empty() {
                return Err(Error::configuration(
                    correlation_id,
                    "NO_DISCOVERY",
                    format!("no discovery service is registered to resolve '{key}'"),
                ));
            }

            for discovery in &self.discovery {
                if let Some(resolved) = discovery.resolve_one(correlation_id, key)? {
                    tracing::debug!(correlation_id, discovery_key = %key, "resolved connection through discovery");
                    return Ok(Some(resolved));
                }
            }
        }

        Ok(None)
    }
}

impl Debug for ConnectionResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionResolver")
            .field("connections", &self.connections)
            .field("discovery", &self.discovery.len())
            .finish()
    }
}

/// Resolves the credential a component authenticates with.
///
/// Works like [`ConnectionResolver`], using store keys and credential stores.
#[derive(Clone, Default)]
pub struct CredentialResolver {
    credentials: Vec<CredentialParams>,
    stores: Vec<Arc<dyn CredentialStore>>,
}

impl CredentialResolver {
    /// Creates a resolver with no credentials.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the configured credentials with those in `config`.
    pub fn configure(&mut self, config: &Config) {
        self.credentials = config.all_credentials().cloned().collect();
    }

    /// Replaces the credential stores with those in `references`.
    pub fn set_references(&mut self, references: &References) {
        self.stores.clone_from(&references.credential_stores);
    }

    /// Returns the first credential that resolves, or `None` if none does.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] with code `NO_CREDENTIAL_STORE` if an entry
    /// needs a credential store and none is registered, and passes through errors
    /// raised by credential stores.
    pub fn lookup(&self, correlation_id: &str) -> Result<Option<CredentialParams>> {
        for credential in &self.credentials {
            let Some(key) = &credential.store_key else {
                return Ok(Some(credential.clone()));
            };

            if self.stores.is_empty() {
                return Err(Error::configuration(
                    correlation_id,
                    "NO_CREDENTIAL_STORE",
                    format!("no credential store is registered to look up '{key}'"),
                ));
            }

            for store in &self.stores {
                if let Some(found) = store.lookup(correlation_id, key)? {
                    tracing::debug!(correlation_id, store_key = %key, "resolved credential through credential store");
                    return Ok(Some(found));
                }
            }
        }

        Ok(None)
    }
}

impl Debug for CredentialResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialResolver")
            .field("credentials", &self.credentials)
            .field("stores", &self.stores.len())
            .finish()
    }
}
