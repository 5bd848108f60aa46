//! Bounded connectivity probes.

use assetstore_core::ProbeSettings;
use assetstore_error::{AssetstoreResult, BackendUnavailableError};
use std::future::Future;
use tokio_retry2::{Retry, RetryError, strategy::FixedInterval};
use tracing::{debug, warn};

/// Run `check` with a per-attempt timeout, retrying on failure.
///
/// Every failure, including a timeout, is reported as a
/// [`BackendUnavailableError`] for `backend` carrying the last message.
pub async fn probe<F, Fut>(backend: &str, settings: &ProbeSettings, mut check: F) -> AssetstoreResult<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AssetstoreResult<()>>,
{
    let timeout = settings.timeout();
    let strategy = FixedInterval::from_millis(settings.retry_delay_ms).take(settings.retries);

    Retry::spawn(strategy, || {
        let attempt = check();
        async move {
            match tokio::time::timeout(timeout, attempt).await {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => {
                    debug!(error = %e, "Probe attempt failed");
                    Err(RetryError::Transient {
                        err: e.to_string(),
                        retry_after: None,
                    })
                }
                Err(_) => {
                    debug!(timeout_ms = timeout.as_millis() as u64, "Probe attempt timed out");
                    Err(RetryError::Transient {
                        err: format!("timed out after {} ms", timeout.as_millis()),
                        retry_after: None,
                    })
                }
            }
        }
    })
    .await
    .map_err(|message| {
        warn!(backend, %message, "Backend unreachable");
        BackendUnavailableError::new(backend, message).into()
    })
}
