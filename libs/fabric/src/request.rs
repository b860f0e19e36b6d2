use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::transport::{ConnectOptions, NatsConnection, Transport};

/// Perform a one-off request/response
///
/// Opens a connection, sends the request, waits for the reply, and closes the connection.
pub async fn request<Req, Res>(
    options: ConnectOptions,
    subject: &str,
    request: &Req,
    timeout: Duration,
) -> Result<Res>
where
    Req: Serialize + Send + Sync + 'static,
    Res: for<'de> Deserialize<'de> + Send + 'static,
{
    let connection = NatsConnection::connect(options).await?;
    let response = connection.request(subject, request, timeout).await;
    connection.close().await;
    response
}

/// Publish a message without waiting for a response (fire-and-forget)
pub async fn publish<T>(options: ConnectOptions, subject: &str, message: &T) -> Result<()>
where
    T: Serialize + Send + Sync + 'static,
{
    let connection = NatsConnection::connect(options).await?;
    let result = connection.publish(subject, message).await;
    connection.close().await;
    result
}
