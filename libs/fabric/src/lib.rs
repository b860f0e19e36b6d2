//! pbxlink Fabric - pub/sub transport and codec layer
//!
//! Provides the [`Transport`] capability (publish, request with timeout,
//! subscribe, close), a live NATS implementation of it, and JSON payload
//! encoding.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use pbxlink_fabric::{request::request, ConnectOptions, NatsConnection, Transport};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize)]
//! struct Ping { data: String }
//!
//! #[derive(Serialize, Deserialize)]
//! struct Pong { result: i32 }
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let options = ConnectOptions::parse("nats://localhost:4222", "")?;
//!
//! // One-off request
//! let ping = Ping { data: "hello".to_string() };
//! let pong: Pong = request(options.clone(), "svc.ping", &ping, Duration::from_secs(1)).await?;
//!
//! // Or keep a connection open
//! let connection = NatsConnection::connect(options).await?;
//! let pong: Pong = connection.request("svc.ping", &ping, Duration::from_secs(1)).await?;
//! connection.close().await;
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod error;
pub mod request;
pub mod transport;

// Re-exports for convenience
pub use codec::{Codec, JsonCodec};
pub use error::{Error, Result};
pub use transport::{ConnectOptions, Handler, Message, NatsConnection, Subscription, Transport};
