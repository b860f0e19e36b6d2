use std::sync::Arc;

use pbxlink_fabric::{NatsConnection, Transport};
use tracing::{info, warn};

use crate::call::{OutCall, OutCallResponse};
use crate::config::ClientConfig;
use crate::error::{Error, Result};

/// Makes outbound calls through a PBX server reachable over a pub/sub transport
///
/// The transport handle may be absent (see [`Client::detached`]); such a
/// client reports itself disconnected and rejects every call without
/// touching a transport. Clones share the same transport.
pub struct Client<T = NatsConnection> {
    transport: Option<Arc<T>>,
    servers: String,
}

impl<T> Clone for Client<T> {
    fn clone(&self) -> Self {
        Self {
            transport: self.transport.clone(),
            servers: self.servers.clone(),
        }
    }
}

impl Client<NatsConnection> {
    /// Connect to one of the configured NATS servers
    ///
    /// Fails with a connect error when no server can be reached and with
    /// `NotConnected` when the connection is not live right after the
    /// handshake. With `config.degraded` set, both failures are logged and
    /// a detached client is returned instead.
    pub async fn connect(config: &ClientConfig) -> Result<Self> {
        match Self::establish(config).await {
            Ok(client) => Ok(client),
            Err(e) if config.degraded => {
                warn!(
                    servers = %config.servers,
                    error = %e,
                    "Could not connect, continuing with a detached client"
                );
                Ok(Self::detached(config.servers.clone()))
            }
            Err(e) => Err(e),
        }
    }

    async fn establish(config: &ClientConfig) -> Result<Self> {
        let connection = NatsConnection::connect(config.connect_options()?).await?;
        if !connection.is_connected() {
            connection.close().await;
            return Err(Error::not_connected());
        }
        Ok(Self::with_transport(connection, config.servers.clone()))
    }
}

impl<T: Transport> Client<T> {
    /// Bind a client to an already established transport
    pub fn with_transport(transport: T, servers: impl Into<String>) -> Self {
        Self {
            transport: Some(Arc::new(transport)),
            servers: servers.into(),
        }
    }

    /// Client without a transport; every call fails with `NotConnected`
    pub fn detached(servers: impl Into<String>) -> Self {
        Self {
            transport: None,
            servers: servers.into(),
        }
    }

    pub fn servers(&self) -> &str {
        &self.servers
    }

    pub fn transport(&self) -> Option<&T> {
        self.transport.as_deref()
    }

    pub fn is_connected(&self) -> bool {
        self.transport
            .as_ref()
            .is_some_and(|transport| transport.is_connected())
    }

    /// Return the live transport or `NotConnected`
    ///
    /// Never reconnects on its own. The NATS transport reconnects in the
    /// background and reports itself down until it is back; a detached
    /// client stays down for good.
    pub fn ensure_connected(&self) -> Result<&T> {
        match self.transport.as_deref() {
            Some(transport) if transport.is_connected() => Ok(transport),
            _ => Err(Error::not_connected()),
        }
    }

    /// Ask the PBX named by `call.pbx_host` to place the call and wait for
    /// its result, at most `call.pbx_client_timeout`
    ///
    /// Failures are returned as they come from the transport; nothing is
    /// retried here.
    pub async fn make_call(&self, call: &OutCall) -> Result<OutCallResponse> {
        info!(
            servers = %self.servers,
            dest = %call.dest_phone_number,
            pbx_host = %call.pbx_host,
            timeout_ms = call.pbx_client_timeout.as_millis() as u64,
            "Started making a call"
        );

        call.validate()?;
        let transport = self.ensure_connected()?;

        let result: pbxlink_fabric::Result<OutCallResponse> = transport
            .request(&call.pbx_host, call, call.pbx_client_timeout)
            .await;

        match &result {
            Ok(response) => info!(
                servers = %self.servers,
                dest = %call.dest_phone_number,
                status = response.response_status,
                "Finished making a call"
            ),
            Err(e) => warn!(
                servers = %self.servers,
                dest = %call.dest_phone_number,
                error = %e,
                "Call failed"
            ),
        }

        result.map_err(Error::from)
    }

    /// Release the transport. Safe on a detached client and safe to repeat.
    pub async fn close(&self) {
        if let Some(transport) = &self.transport {
            transport.close().await;
        }
    }
}
