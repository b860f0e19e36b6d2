//! pbxlink Client - outbound calls through a PBX over NATS
//!
//! A [`Client`] sends an [`OutCall`] to the PBX host it names and waits for
//! the [`OutCallResponse`], bounded by the call's own timeout. The client is
//! generic over the [`Transport`](pbxlink_fabric::Transport) it uses, so a
//! [`SimulatedTransport`] can replace the live connection in tests.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use pbxlink_client::{Client, ClientConfig, OutCall};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = Client::connect(&ClientConfig::new("nats://localhost:4222")).await?;
//!
//! let call = OutCall::builder()
//!     .src_phone_number("+441712341234")
//!     .dest_phone_number("+441711112222")
//!     .carrier_id(1)
//!     .igrp(1)
//!     .endpoint("demo")
//!     .pbx_host("pbx.demo")
//!     .call_timeout(Duration::from_secs(5))
//!     .timeout(Duration::from_secs(6))
//!     .build()?;
//!
//! let response = client.make_call(&call).await?;
//! println!("status {}", response.response_status);
//!
//! client.close().await;
//! # Ok(())
//! # }
//! ```

pub mod call;
pub mod client;
pub mod config;
pub mod dialer;
pub mod error;
pub mod simulated;

// Re-exports for convenience
pub use call::{OutCall, OutCallBuilder, OutCallResponse};
pub use client::Client;
pub use config::ClientConfig;
pub use error::{Error, Result};
pub use simulated::SimulatedTransport;
