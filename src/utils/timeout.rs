//! Timeout helpers shared by the handshake and the listeners.

use crate::error::{RpcError, Result};
use std::future::Future;
use std::time::Duration;

/// How long a fresh connection may take to send its negotiation record
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// How long a listener waits for open connections after a shutdown signal
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Run `fut` with a deadline, mapping expiry to [`RpcError::Timeout`].
pub async fn with_timeout_error<F, T>(fut: F, duration: Duration) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(duration, fut).await {
        Ok(result) => result,
        Err(_) => Err(RpcError::Timeout),
    }
}
