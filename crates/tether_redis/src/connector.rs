// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use redis::{ConnectionInfo, IntoConnectionInfo};
use tether_store::{ConnectionSettings, Connector, Endpoint, Error, Result};

use crate::RedisStore;

/// Connects to Redis servers.
///
/// Address endpoints use the configured database, user name and password. URI
/// endpoints keep whatever the URI specifies unless the settings override it: a
/// non-zero database or an explicit credential in the settings wins over the URI.
///
/// Establishing the connection is bounded by
/// [`ConnectionSettings::connect_timeout`].
#[derive(Clone, Copy, Debug, Default)]
pub struct RedisConnector;

impl RedisConnector {
    /// Creates a new connector.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Connector for RedisConnector {
    type Store = RedisStore;

    async fn connect(&self, settings: &ConnectionSettings) -> Result<RedisStore> {
        let info = connection_info(settings)?;
        let client = redis::Client::open(info).map_err(Error::from_message)?;

        tracing::debug!(
            endpoint = %settings.endpoint(),
            database = settings.database(),
            "connecting to redis"
        );

        let connection = tokio::time::timeout(settings.connect_timeout(), client.get_multiplexed_async_connection())
            .await
            .map_err(|_elapsed| {
                Error::from_message(format!(
                    "timed out after {:?} connecting to {}",
                    settings.connect_timeout(),
                    settings.endpoint()
                ))
            })?
            .map_err(Error::from_message)?;

        Ok(RedisStore::new(connection))
    }
}

pub(crate) fn connection_info(settings: &ConnectionSettings) -> Result<ConnectionInfo> {
    let (info, override_database) = match settings.endpoint() {
        Endpoint::Uri(uri) => (uri.as_str().into_connection_info(), settings.database() != 0),
        Endpoint::Address { host, port } => ((host.as_str(), *port).into_connection_info(), true),
    };

    let mut info = info.map_err(Error::from_message)?;

    if override_database {
        info.redis.db = i64::from(settings.database());
    }

    if let Some(username) = settings.username() {
        info.redis.username = Some(username.to_string());
    }

    if let Some(password) = settings.password() {
        info.redis.password = Some(password.to_string());
    }

    Ok(info)
}
