//! [`JsonRpcClient`] – JSON-RPC 2.0 over HTTP.
//!
//! The actuator service accepts `POST /` with a standard JSON-RPC 2.0 body.
//! Successful procedures usually answer with a three-element `result` array
//! `[ok, data, method_name]`; a `false` first element means the procedure ran
//! but failed (e.g. the IK target is unreachable) and is reported as
//! [`RpcError::Rejected`].
//!
//! # Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use pickservo_hal::{JsonRpcClient, RpcTransport};
//!
//! let client = JsonRpcClient::new("192.168.1.50", 9030, Duration::from_secs(10))
//!     .expect("client builds");
//! // Requires a reachable robot.
//! let _ = client.invoke("GetBatteryVoltage", &[]);
//! ```

use std::time::Duration;

use pickservo_types::{PickError, RpcError};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::rpc::RpcTransport;

#[derive(Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    method: &'a str,
    params: &'a [Value],
    id: i64,
}

/// Blocking JSON-RPC 2.0 client for the robot's actuator service.
pub struct JsonRpcClient {
    url: String,
    timeout: Duration,
    client: reqwest::blocking::Client,
}

impl JsonRpcClient {
    /// Build a client for `http://{host}:{port}/` with a per-request `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`PickError::Config`] if the HTTP client cannot be constructed.
    pub fn new(host: &str, port: u16, timeout: Duration) -> Result<Self, PickError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PickError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            url: format!("http://{host}:{port}/"),
            timeout,
            client,
        })
    }

    /// Endpoint URL this client posts to.
    pub fn url(&self) -> &str {
        &self.url
    }

    fn classify(&self, err: reqwest::Error) -> RpcError {
        if err.is_timeout() {
            RpcError::Timeout(self.timeout)
        } else if err.is_connect() {
            RpcError::ConnectionFailed(err.to_string())
        } else if err.is_decode() {
            RpcError::InvalidResponse(err.to_string())
        } else {
            RpcError::Other(err.to_string())
        }
    }
}

impl RpcTransport for JsonRpcClient {
    #[instrument(skip(self, params), fields(url = %self.url))]
    fn invoke(&self, method: &str, params: &[Value]) -> Result<Value, RpcError> {
        let request = RpcRequest {
            jsonrpc: "2.0",
            method,
            params,
            id: chrono::Utc::now().timestamp_millis(),
        };

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            let body = response.text().unwrap_or_default();
            return Err(RpcError::InvalidResponse(format!(
                "HTTP {}: {}",
                status.as_u16(),
                body
            )));
        }

        let reply: Value = response.json().map_err(|e| self.classify(e))?;
        debug!(%reply, "rpc reply");
        interpret_reply(method, reply)
    }
}

/// Decode a JSON-RPC 2.0 reply envelope into the call's payload.
pub(crate) fn interpret_reply(method: &str, reply: Value) -> Result<Value, RpcError> {
    if let Some(result) = reply.get("result") {
        if let Some([Value::Bool(ok), data, Value::String(_)]) =
            result.as_array().map(Vec::as_slice)
        {
            return if *ok {
                Ok(data.clone())
            } else {
                Err(RpcError::Rejected {
                    method: method.to_string(),
                    message: value_message(data),
                })
            };
        }
        return Ok(result.clone());
    }

    if let Some(error) = reply.get("error") {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());
        return Err(RpcError::Rejected {
            method: method.to_string(),
            message,
        });
    }

    Err(RpcError::InvalidResponse(
        "reply has neither `result` nor `error`".to_string(),
    ))
}

fn value_message(data: &Value) -> String {
    match data {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
