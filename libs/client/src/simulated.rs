//! Deterministic stand-in for a live NATS connection.
//!
//! Requests asking for less than [`REFERENCE_DELAY`] wait out their own
//! timeout and fail with `Timeout`; all others wait [`REFERENCE_DELAY`] and
//! receive a canned successful call result.

use std::any::Any;
use std::collections::HashMap;
use std::time::Duration;

use pbxlink_fabric::{Codec, Error, Handler, JsonCodec, Result, Subscription, Transport};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::call::{fields, status, OutCall, OutCallResponse};
use crate::client::Client;

pub const REFERENCE_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, Default)]
pub struct SimulatedTransport;

impl SimulatedTransport {
    pub fn new() -> Self {
        Self
    }

    /// The reply a PBX gives for a call answered normally
    pub fn canned_response(call: &OutCall) -> OutCallResponse {
        let response_data = HashMap::from([
            (fields::DTMF_RETURNED.to_string(), call.dialled_digits()),
            (fields::HANGUP_CAUSE.to_string(), "NORMAL_CLEARING".to_string()),
            (fields::HANGUP_SIP_CODE.to_string(), "sip:200".to_string()),
            (fields::HANGUP_Q850_CODE.to_string(), "16".to_string()),
        ]);

        OutCallResponse {
            response_status: status::OK,
            response_data,
        }
    }
}

#[async_trait::async_trait]
impl Transport for SimulatedTransport {
    fn is_connected(&self) -> bool {
        true
    }

    async fn publish<T>(&self, _subject: &str, _payload: &T) -> Result<()>
    where
        T: Serialize + Send + Sync + 'static,
    {
        Ok(())
    }

    async fn request<Req, Res>(&self, subject: &str, payload: &Req, timeout: Duration) -> Result<Res>
    where
        Req: Serialize + Send + Sync + 'static,
        Res: DeserializeOwned + Send + 'static,
    {
        if timeout < REFERENCE_DELAY {
            tokio::time::sleep(timeout).await;
            return Err(Error::Timeout {
                subject: subject.to_string(),
                timeout,
            });
        }

        tokio::time::sleep(REFERENCE_DELAY).await;

        let call = (payload as &dyn Any)
            .downcast_ref::<OutCall>()
            .ok_or_else(|| Error::UnsupportedType(std::any::type_name::<Req>().to_string()))?;

        // Go through the wire encoding so the caller's response shape is honoured
        let reply = JsonCodec.encode(&Self::canned_response(call))?;
        JsonCodec.decode(&reply)
    }

    async fn subscribe(&self, subject: &str, _handler: Handler) -> Result<Subscription> {
        Ok(Subscription::new(subject, 0, CancellationToken::new()))
    }

    async fn close(&self) {}
}

impl Client<SimulatedTransport> {
    /// Client bound to a [`SimulatedTransport`]
    pub fn simulated() -> Self {
        Client::with_transport(SimulatedTransport, "simulated")
    }
}
