// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::{self, Debug};
use std::time::Duration;

use tether_store::{ConnectionSettings, Connector, Store};

use crate::{Config, ConnectionResolver, CredentialResolver, Error, Options, References, Result};

const MIN_TTL: Duration = Duration::from_millis(1);

/// The open/close lifecycle shared by the cache and lock components.
///
/// Holds the resolvers and options set through `configure` and the store client
/// while open.
pub(crate) struct Connection<C: Connector> {
    component: &'static str,
    connector: C,
    connections: ConnectionResolver,
    credentials: CredentialResolver,
    options: Options,
    store: Option<C::Store>,
}

impl<C: Connector> Connection<C> {
    pub fn new(component: &'static str, connector: C) -> Self {
        Self {
            component,
            connector,
            connections: ConnectionResolver::new(),
            credentials: CredentialResolver::new(),
            options: Options::default(),
            store: None,
        }
    }

    pub fn configure(&mut self, config: &Config) {
        self.connections.configure(config);
        self.credentials.configure(config);
        self.options = config.options.clone();
    }

    pub fn set_references(&mut self, references: &References) {
        self.connections.set_references(references);
        self.credentials.set_references(references);
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn is_open(&self) -> bool {
        self.store.is_some()
    }

    pub async fn open(&mut self, correlation_id: &str) -> Result<()> {
        if self.is_open() {
            return Ok(());
        }

        let settings = self.settings(correlation_id)?;
        let store = self.connector.connect(&settings).await?;

        tracing::info!(
            correlation_id,
            component = self.component,
            endpoint = %settings.endpoint(),
            database = settings.database(),
            "opened"
        );

        self.store = Some(store);
        Ok(())
    }

    pub async fn close(&mut self, correlation_id: &str) -> Result<()> {
        let Some(store) = self.store.take() else {
            return Ok(());
        };

        store.close().await?;
        tracing::info!(correlation_id, component = self.component, "closed");
        Ok(())
    }

    /// Returns the store client, failing with [`Error::InvalidState`] while closed.
    pub fn store(&self, correlation_id: &str) -> Result<&C::Store> {
        self.store.as_ref().ok_or_else(|| Error::not_opened(correlation_id))
    }

    fn settings(&self, correlation_id: &str) -> Result<ConnectionSettings> {
        let endpoint = self
            .connections
            .resolve(correlation_id)?
            .and_then(|params| params.endpoint())
            .ok_or_else(|| Error::configuration(correlation_id, "NO_CONNECTION", "connection is not configured"))?;

        let mut settings = ConnectionSettings::new(endpoint)
            .with_database(self.options.database())
            .with_connect_timeout(self.options.timeout());

        if let Some(credential) = self.credentials.lookup(correlation_id)? {
            if let Some(username) = credential.username {
                settings = settings.with_username(username);
            }
            if let Some(password) = credential.password {
                settings = settings.with_password(password);
            }
        }

        Ok(settings)
    }
}

impl<C: Connector + Debug> Debug for Connection<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("component", &self.component)
            .field("connector", &self.connector)
            .field("connections", &self.connections)
            .field("credentials", &self.credentials)
            .field("options", &self.options)
            .field("open", &self.is_open())
            .finish()
    }
}

/// Rejects time-to-live values that would not create an expiring key.
pub(crate) fn check_ttl(correlation_id: &str, name: &str, ttl: Duration) -> Result<()> {
    if ttl < MIN_TTL {
        return Err(Error::invalid_argument(
            correlation_id,
            format!("{name} must be at least 1ms, got {ttl:?}"),
        ));
    }

    Ok(())
}
