use std::collections::HashMap;
use std::time::Duration;

use pbxlink_fabric::{Codec, JsonCodec};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Application-level result codes carried in `responseStatus`
pub mod status {
    pub const OK: i32 = 200;
}

/// Result field names found in `responseData`
pub mod fields {
    pub const DTMF_RETURNED: &str = "dtmfReturned";
    pub const HANGUP_CAUSE: &str = "hangupCause";
    pub const HANGUP_SIP_CODE: &str = "hangupSipCode";
    pub const HANGUP_Q850_CODE: &str = "hangupQ850Code";
}

/// One outbound call request sent to a PBX server
///
/// `pbx_client_timeout` is how long the client waits for the PBX to
/// answer; `call_timeout` is forwarded to the PBX and bounds the call
/// itself. Both travel as whole seconds, so both must be a non-zero whole
/// number of seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutCall {
    #[serde(with = "seconds")]
    pub call_timeout: Duration,
    pub carrier_id: u32,
    pub cmd: String,
    pub dest_phone_number: String,
    pub endpoint: String,
    pub igrp: u32,
    #[serde(with = "seconds")]
    pub pbx_client_timeout: Duration,
    pub pbx_host: String,
    pub src_phone_number: String,
}

impl OutCall {
    /// Create a builder for an outbound call
    pub fn builder() -> OutCallBuilder {
        OutCallBuilder::default()
    }

    /// Check the descriptor before it is handed to a transport
    pub fn validate(&self) -> Result<()> {
        if self.dest_phone_number.trim().is_empty() {
            return Err(Error::invalid_call("destination phone number is empty"));
        }
        check_whole_seconds("timeout", self.pbx_client_timeout)?;
        check_whole_seconds("call timeout", self.call_timeout)?;
        if self.pbx_host.trim().is_empty() {
            return Err(Error::invalid_call("PBX host is empty"));
        }
        Ok(())
    }

    /// Destination number as the PBX reports it back, without `+`
    pub fn dialled_digits(&self) -> String {
        self.dest_phone_number.replace('+', "")
    }
}

fn check_whole_seconds(name: &str, value: Duration) -> Result<()> {
    if value.is_zero() {
        return Err(Error::invalid_call(format!("{} must be greater than zero", name)));
    }
    if value.subsec_nanos() != 0 {
        return Err(Error::invalid_call(format!(
            "{} must be a whole number of seconds, got {:?}",
            name, value
        )));
    }
    Ok(())
}

/// Builder for [`OutCall`]
#[derive(Debug, Default)]
pub struct OutCallBuilder {
    call_timeout: Duration,
    carrier_id: u32,
    cmd: String,
    dest_phone_number: String,
    endpoint: String,
    igrp: u32,
    pbx_client_timeout: Duration,
    pbx_host: String,
    src_phone_number: String,
}

impl OutCallBuilder {
    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn carrier_id(mut self, carrier_id: u32) -> Self {
        self.carrier_id = carrier_id;
        self
    }

    pub fn cmd(mut self, cmd: impl Into<String>) -> Self {
        self.cmd = cmd.into();
        self
    }

    pub fn dest_phone_number(mut self, number: impl Into<String>) -> Self {
        self.dest_phone_number = number.into();
        self
    }

    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn igrp(mut self, igrp: u32) -> Self {
        self.igrp = igrp;
        self
    }

    /// Set how long the client waits for the PBX reply
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.pbx_client_timeout = timeout;
        self
    }

    pub fn pbx_host(mut self, host: impl Into<String>) -> Self {
        self.pbx_host = host.into();
        self
    }

    pub fn src_phone_number(mut self, number: impl Into<String>) -> Self {
        self.src_phone_number = number.into();
        self
    }

    /// Build and validate the descriptor
    pub fn build(self) -> Result<OutCall> {
        let call = OutCall {
            call_timeout: self.call_timeout,
            carrier_id: self.carrier_id,
            cmd: self.cmd,
            dest_phone_number: self.dest_phone_number,
            endpoint: self.endpoint,
            igrp: self.igrp,
            pbx_client_timeout: self.pbx_client_timeout,
            pbx_host: self.pbx_host,
            src_phone_number: self.src_phone_number,
        };
        call.validate()?;
        Ok(call)
    }
}

/// Outcome of a completed call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutCallResponse {
    #[serde(rename = "responseStatus", alias = "ResponseStatus", default)]
    pub response_status: i32,
    #[serde(rename = "responseData", alias = "ResponseData", default)]
    pub response_data: HashMap<String, String>,
}

impl OutCallResponse {
    /// Decode a reply payload
    pub fn from_slice(payload: &[u8]) -> Result<Self> {
        Ok(JsonCodec.decode(payload)?)
    }

    pub fn is_ok(&self) -> bool {
        self.response_status == status::OK
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.response_data.get(field).map(String::as_str)
    }

    pub fn dtmf_returned(&self) -> Option<&str> {
        self.get(fields::DTMF_RETURNED)
    }

    pub fn hangup_cause(&self) -> Option<&str> {
        self.get(fields::HANGUP_CAUSE)
    }
}

mod seconds {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
