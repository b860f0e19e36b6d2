use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_nats::client::RequestErrorKind;
use async_nats::connection::State;
use async_nats::{ServerAddr, ServerInfo};
use futures::StreamExt;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::codec::{Codec, JsonCodec};
use crate::error::{Error, Result};
use crate::transport::{Handler, Message, Subscription, Transport};

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

const FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

/// Where and how to connect
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    pub servers: Vec<ServerAddr>,
    pub root_cas: Vec<PathBuf>,
    pub connect_timeout: Duration,
    pub name: Option<String>,
}

impl ConnectOptions {
    /// Build options from a comma-separated server list and a
    /// comma-separated list of trust-root PEM files (may be empty)
    pub fn parse(servers: &str, root_cas: &str) -> Result<Self> {
        Ok(Self {
            servers: parse_server_list(servers)?,
            root_cas: parse_root_cas(root_cas),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            name: None,
        })
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    fn server_list(&self) -> String {
        self.servers
            .iter()
            .map(|server| format!("{}:{}", server.host(), server.port()))
            .collect::<Vec<_>>()
            .join(",")
    }

    async fn check_root_cas(&self) -> Result<()> {
        for path in &self.root_cas {
            tokio::fs::metadata(path).await.map_err(|e| {
                Error::Tls(format!("failed to read CA file {}: {}", path.display(), e))
            })?;
        }
        Ok(())
    }

    fn to_nats(&self) -> async_nats::ConnectOptions {
        let mut options = async_nats::ConnectOptions::new()
            .connection_timeout(self.connect_timeout)
            .request_timeout(None)
            .event_callback(|event| async move {
                info!(event = %event, "NATS connection event");
            });

        if let Some(name) = &self.name {
            options = options.name(name.as_str());
        }
        if !self.root_cas.is_empty() {
            options = options.require_tls(true);
            for path in &self.root_cas {
                options = options.add_root_certificates(path.clone());
            }
        }
        options
    }
}

/// Split a comma-separated server list
pub fn parse_server_list(servers: &str) -> Result<Vec<ServerAddr>> {
    let addrs = servers
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(parse_server)
        .collect::<Result<Vec<_>>>()?;

    if addrs.is_empty() {
        return Err(Error::connect(servers, "no servers available for connection"));
    }
    Ok(addrs)
}

fn parse_server(server: &str) -> Result<ServerAddr> {
    let authority = match server.split_once("://") {
        Some(("nats" | "tls", rest)) => rest,
        Some(_) => return Err(Error::connect(server, "unsupported URL scheme")),
        None => server,
    };
    if !authority.starts_with('[') && authority.matches(':').count() > 1 {
        return Err(Error::connect(
            server,
            "IPv6 addresses must be enclosed in brackets",
        ));
    }

    server
        .parse::<ServerAddr>()
        .map_err(|e| Error::connect(server, e))
}

fn parse_root_cas(root_cas: &str) -> Vec<PathBuf> {
    root_cas
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
        .collect()
}

/// Subjects are non-empty and contain no whitespace
pub fn validate_subject(subject: &str) -> Result<()> {
    if subject.is_empty() || subject.chars().any(char::is_whitespace) {
        return Err(Error::Protocol(format!("invalid subject '{}'", subject)));
    }
    Ok(())
}

/// Connection to a NATS cluster
///
/// Wire protocol, TLS and reconnection are handled by `async-nats`. While
/// the library is reconnecting the connection reports itself down and
/// rejects work with `NotConnected`.
pub struct NatsConnection<C = JsonCodec> {
    client: RwLock<Option<async_nats::Client>>,
    codec: C,
    servers: String,
    info: ServerInfo,
    next_sid: AtomicU64,
    closed: CancellationToken,
}

impl NatsConnection<JsonCodec> {
    /// Connect to the configured servers, encoding payloads as JSON
    pub async fn connect(options: ConnectOptions) -> Result<Self> {
        Self::connect_with_codec(options, JsonCodec).await
    }
}

impl<C: Codec> NatsConnection<C> {
    /// Connect to the configured servers with a custom codec
    pub async fn connect_with_codec(options: ConnectOptions, codec: C) -> Result<Self> {
        let servers = options.server_list();
        options.check_root_cas().await?;

        let client = options
            .to_nats()
            .connect(options.servers.clone())
            .await
            .map_err(|e| {
                debug!(servers = %servers, error = %e, "Connection attempt failed");
                Error::connect(&servers, e)
            })?;

        let info = client.server_info();
        info!(
            servers = %servers,
            server_id = %info.server_id,
            version = %info.version,
            "Connected to NATS server"
        );

        Ok(Self {
            client: RwLock::new(Some(client)),
            codec,
            servers,
            info,
            next_sid: AtomicU64::new(1),
            closed: CancellationToken::new(),
        })
    }

    /// `INFO` announced by the server when the connection was made
    pub fn server_info(&self) -> &ServerInfo {
        &self.info
    }

    pub fn servers(&self) -> &str {
        &self.servers
    }

    fn is_live(&self) -> bool {
        !self.closed.is_cancelled()
            && self
                .client
                .read()
                .as_ref()
                .is_some_and(|client| matches!(client.connection_state(), State::Connected))
    }

    /// Handle to the live client, or `NotConnected`
    fn live_client(&self) -> Result<async_nats::Client> {
        if !self.is_live() {
            return Err(Error::NotConnected);
        }
        self.client.read().clone().ok_or(Error::NotConnected)
    }

    fn check_payload(client: &async_nats::Client, payload: &[u8]) -> Result<()> {
        let max_payload = client.server_info().max_payload;
        if payload.len() > max_payload {
            return Err(Error::Protocol(format!(
                "payload of {} bytes exceeds server maximum of {} bytes",
                payload.len(),
                max_payload
            )));
        }
        Ok(())
    }

    /// Publish raw bytes
    pub async fn publish_bytes(&self, subject: &str, payload: Vec<u8>) -> Result<()> {
        let client = self.live_client()?;
        validate_subject(subject)?;
        Self::check_payload(&client, &payload)?;

        client
            .publish(subject.to_string(), payload.into())
            .await
            .map_err(|e| Error::Protocol(e.to_string()))
    }

    /// Publish raw bytes and wait for the first reply
    ///
    /// Closing the connection while waiting fails the request with
    /// `NotConnected`.
    pub async fn request_bytes(
        &self,
        subject: &str,
        payload: Vec<u8>,
        timeout: Duration,
    ) -> Result<Vec<u8>> {
        let client = self.live_client()?;
        validate_subject(subject)?;
        Self::check_payload(&client, &payload)?;

        let timed_out = || Error::Timeout {
            subject: subject.to_string(),
            timeout,
        };

        let request = client.request(subject.to_string(), payload.into());
        let reply = tokio::select! {
            _ = self.closed.cancelled() => return Err(Error::NotConnected),
            reply = tokio::time::timeout(timeout, request) => reply,
        };

        match reply {
            Ok(Ok(message)) => Ok(message.payload.to_vec()),
            Ok(Err(e)) => Err(match e.kind() {
                RequestErrorKind::TimedOut => timed_out(),
                RequestErrorKind::NoResponders => Error::NoResponders {
                    subject: subject.to_string(),
                },
                _ if !self.is_live() => Error::NotConnected,
                _ => Error::Protocol(e.to_string()),
            }),
            Err(_) => Err(timed_out()),
        }
    }
}

#[async_trait::async_trait]
impl<C: Codec> Transport for NatsConnection<C> {
    fn is_connected(&self) -> bool {
        self.is_live()
    }

    async fn publish<T>(&self, subject: &str, payload: &T) -> Result<()>
    where
        T: Serialize + Send + Sync + 'static,
    {
        let bytes = self.codec.encode(payload)?;
        self.publish_bytes(subject, bytes).await
    }

    async fn request<Req, Res>(&self, subject: &str, payload: &Req, timeout: Duration) -> Result<Res>
    where
        Req: Serialize + Send + Sync + 'static,
        Res: DeserializeOwned + Send + 'static,
    {
        let bytes = self.codec.encode(payload)?;
        let reply = self.request_bytes(subject, bytes, timeout).await?;
        self.codec.decode(&reply)
    }

    async fn subscribe(&self, subject: &str, handler: Handler) -> Result<Subscription> {
        let client = self.live_client()?;
        validate_subject(subject)?;

        let mut subscriber = client
            .subscribe(subject.to_string())
            .await
            .map_err(|e| Error::Protocol(e.to_string()))?;

        let sid = self.next_sid.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        let task_token = token.clone();
        let closed = self.closed.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = task_token.cancelled() => {
                        if let Err(e) = subscriber.unsubscribe().await {
                            debug!(error = %e, "Unsubscribe failed");
                        }
                        break;
                    }
                    _ = closed.cancelled() => break,
                    msg = subscriber.next() => match msg {
                        Some(msg) => handler(Message {
                            subject: msg.subject.to_string(),
                            reply: msg.reply.map(|reply| reply.to_string()),
                            payload: msg.payload.to_vec(),
                        }),
                        None => break,
                    },
                }
            }
            task_token.cancel();
        });

        debug!(subject, sid, "Subscribed");
        Ok(Subscription::new(subject, sid, token))
    }

    async fn close(&self) {
        self.closed.cancel();
        let client = self.client.write().take();

        if let Some(client) = client {
            match tokio::time::timeout(FLUSH_TIMEOUT, client.flush()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(error = %e, "Flush on close failed"),
                Err(_) => warn!("Flush on close timed out"),
            }
            info!(servers = %self.servers, "NATS connection closed");
        }
    }
}
