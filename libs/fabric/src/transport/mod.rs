use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::codec::Codec;
use crate::error::Result;

pub mod nats;

pub use self::nats::{ConnectOptions, NatsConnection};

/// A message delivered to a subscription
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub subject: String,
    pub reply: Option<String>,
    pub payload: Vec<u8>,
}

impl Message {
    /// Decode the payload with the given codec
    pub fn decode<T: DeserializeOwned, C: Codec>(&self, codec: &C) -> Result<T> {
        codec.decode(&self.payload)
    }
}

/// Callback invoked for every message that reaches a subscription
pub type Handler = Arc<dyn Fn(Message) + Send + Sync + 'static>;

/// Cancellable handle returned by [`Transport::subscribe`]
///
/// Dropping the handle leaves the subscription active; call
/// [`Subscription::unsubscribe`] to stop delivery.
pub struct Subscription {
    subject: String,
    sid: u64,
    token: CancellationToken,
}

impl Subscription {
    pub fn new(subject: impl Into<String>, sid: u64, token: CancellationToken) -> Self {
        Self {
            subject: subject.into(),
            sid,
            token,
        }
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn sid(&self) -> u64 {
        self.sid
    }

    pub fn is_active(&self) -> bool {
        !self.token.is_cancelled()
    }

    /// Stop delivering messages to the handler
    pub fn unsubscribe(&self) {
        self.token.cancel();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("subject", &self.subject)
            .field("sid", &self.sid)
            .field("active", &self.is_active())
            .finish()
    }
}

/// Capability set every pub/sub connection must provide
///
/// Payloads are typed; implementations own the codec that turns them into
/// bytes and decode replies into the caller's response shape.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Current liveness, without blocking or side effects
    fn is_connected(&self) -> bool;

    /// Fire-and-forget publish, no reply awaited
    async fn publish<T>(&self, subject: &str, payload: &T) -> Result<()>
    where
        T: Serialize + Send + Sync + 'static;

    /// Publish and wait up to `timeout` for a single reply
    ///
    /// Fails with `Error::Timeout` when no reply arrives in time and with
    /// `Error::NotConnected` when invoked on a dead connection.
    async fn request<Req, Res>(&self, subject: &str, payload: &Req, timeout: Duration) -> Result<Res>
    where
        Req: Serialize + Send + Sync + 'static,
        Res: DeserializeOwned + Send + 'static;

    /// Register a handler for messages published to `subject`
    async fn subscribe(&self, subject: &str, handler: Handler) -> Result<Subscription>;

    /// Release the connection. Calling it again has no effect.
    async fn close(&self);
}
