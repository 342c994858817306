//! Deadline helper shared by every outbound call.

use std::future::Future;
use std::time::Duration;

use tracing::error;

use crate::error::{RagError, Result};

/// Await `future`, failing with [`RagError::Timeout`] once `after` elapses.
pub(crate) async fn with_timeout<T, F>(
    operation: &'static str,
    after: Duration,
    future: F,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(after, future).await {
        Ok(result) => result,
        Err(_) => {
            error!(operation, timeout = ?after, "outbound call timed out");
            Err(RagError::Timeout { operation, after })
        }
    }
}
