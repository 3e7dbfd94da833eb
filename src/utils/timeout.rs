//! Default intervals and timeouts, plus a small async timeout wrapper.

use std::future::Future;
use std::time::Duration;

use crate::error::{ProtocolError, Result};

/// Liveness tick: heartbeat probe, idle check and reassembly expiry
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);

/// A connection with no inbound bytes for this long is closed
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Time allowed for pumps to finish after shutdown is requested
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Run `fut`, failing with `ProtocolError::Timeout` after `duration`.
pub async fn with_timeout<F, T>(duration: Duration, fut: F) -> Result<T>
where
    F: Future<Output = T>,
{
    tokio::time::timeout(duration, fut)
        .await
        .map_err(|_| ProtocolError::Timeout)
}
