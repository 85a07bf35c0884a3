//! [`RpcTransport`] – the seam between the skill layer and the remote
//! actuator service.
//!
//! One call is one round trip. Implementations block until the reply arrives
//! or their own timeout elapses, and report every failure as a typed
//! [`RpcError`] instead of panicking.

use pickservo_types::RpcError;
use serde_json::Value;

/// A synchronous remote-procedure transport.
pub trait RpcTransport: Send {
    /// Invoke `method` with positional `params` and return the reply payload.
    ///
    /// # Errors
    ///
    /// - [`RpcError::Timeout`] – no reply within the transport's timeout.
    /// - [`RpcError::ConnectionFailed`] – the service could not be reached.
    /// - [`RpcError::InvalidResponse`] – the reply could not be understood.
    /// - [`RpcError::Rejected`] – the service reported the call as failed.
    fn invoke(&self, method: &str, params: &[Value]) -> Result<Value, RpcError>;
}

impl<T: RpcTransport + Sync> RpcTransport for std::sync::Arc<T> {
    fn invoke(&self, method: &str, params: &[Value]) -> Result<Value, RpcError> {
        (**self).invoke(method, params)
    }
}
