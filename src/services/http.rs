//! Shared HTTP plumbing for the upstream API clients.
//!
//! Rate-limit (429) and server (5xx) responses are retried with exponential
//! backoff; any other non-success status is a permanent per-item failure.
//! Network errors retry like 5xx.

use serde::de::DeserializeOwned;

use crate::errors::AppError;

/// Attempts per request (initial + retries).
const MAX_ATTEMPTS: u32 = 3;

/// Base backoff between attempts (milliseconds), doubled each retry.
const BACKOFF_BASE_MS: u64 = 500;

/// Send a GET request and decode its JSON body, retrying transient failures.
///
/// `what` names the upstream in error messages ("open-meteo archive",
/// "holiday API", ...).
pub(crate) async fn get_json<T: DeserializeOwned>(
    builder: reqwest::RequestBuilder,
    what: &str,
) -> Result<T, AppError> {
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        let cloned = builder
            .try_clone()
            .ok_or_else(|| AppError::Internal(format!("{} request not cloneable", what)))?;

        let msg = match cloned.send().await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    return response.json::<T>().await.map_err(|e| {
                        AppError::Upstream(format!("{} JSON parse error: {}", what, e))
                    });
                }
                if status.as_u16() == 429 || status.is_server_error() {
                    format!("{} returned HTTP {}", what, status)
                } else {
                    // Permanent 4xx — do not retry
                    return Err(AppError::Upstream(format!(
                        "{} returned HTTP {}",
                        what, status
                    )));
                }
            }
            Err(e) => format!("{} request failed: {}", what, e),
        };

        if attempt >= MAX_ATTEMPTS {
            return Err(AppError::Upstream(msg));
        }
        let delay = BACKOFF_BASE_MS * (1 << (attempt - 1));
        tracing::warn!(
            "{} (attempt {}/{}), retrying in {}ms",
            msg,
            attempt,
            MAX_ATTEMPTS,
            delay,
        );
        tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
    }
}
